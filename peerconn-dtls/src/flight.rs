use std::fmt;

/// The handshake flights of RFC 6347 section 4.2.4, as explicit tagged
/// variants. Servers occupy the even flights, clients the odd ones.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flight {
    /// Server: waiting for the initial ClientHello.
    Flight0,
    /// Client: sent ClientHello, waiting for HelloVerifyRequest.
    Flight1,
    /// Server: sent HelloVerifyRequest, waiting for the cookied ClientHello.
    Flight2,
    /// Client: sent the cookied ClientHello, waiting for the server's flight.
    Flight3,
    /// Server: sent ServerHello..ServerHelloDone, waiting for the client's
    /// certificate flight.
    Flight4,
    /// Client: sent Certificate..Finished, waiting for the server Finished.
    Flight5,
    /// Server: sent ChangeCipherSpec + Finished; handshake complete.
    Flight6,
}

impl fmt::Display for Flight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flight::Flight0 => write!(f, "Flight 0"),
            Flight::Flight1 => write!(f, "Flight 1"),
            Flight::Flight2 => write!(f, "Flight 2"),
            Flight::Flight3 => write!(f, "Flight 3"),
            Flight::Flight4 => write!(f, "Flight 4"),
            Flight::Flight5 => write!(f, "Flight 5"),
            Flight::Flight6 => write!(f, "Flight 6"),
        }
    }
}

impl Flight {
    /// The last flight a side sends; afterwards it only retransmits.
    pub fn is_last_send_flight(&self) -> bool {
        matches!(self, Flight::Flight6)
    }

    /// The last flight a side receives.
    pub fn is_last_recv_flight(&self) -> bool {
        matches!(self, Flight::Flight5)
    }

    /// Whether this flight arms the retransmission timer once sent.
    pub fn has_retransmit(&self) -> bool {
        !matches!(self, Flight::Flight0 | Flight::Flight2)
    }
}

/// The per-flight handshake driver state of RFC 6347 section 4.2.4.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Errored,
    Preparing,
    Sending,
    Waiting,
    Finished,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HandshakeState::Errored => write!(f, "Errored"),
            HandshakeState::Preparing => write!(f, "Preparing"),
            HandshakeState::Sending => write!(f, "Sending"),
            HandshakeState::Waiting => write!(f, "Waiting"),
            HandshakeState::Finished => write!(f, "Finished"),
        }
    }
}

pub(crate) fn srv_cli_str(is_client: bool) -> &'static str {
    if is_client {
        "client"
    } else {
        "server"
    }
}

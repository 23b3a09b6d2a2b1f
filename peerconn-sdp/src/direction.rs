use std::fmt;

/// Media direction as carried in an SDP attribute.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

pub const ATTR_KEY_SEND_RECV: &str = "sendrecv";
pub const ATTR_KEY_SEND_ONLY: &str = "sendonly";
pub const ATTR_KEY_RECV_ONLY: &str = "recvonly";
pub const ATTR_KEY_INACTIVE: &str = "inactive";

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::SendRecv => ATTR_KEY_SEND_RECV,
            Direction::SendOnly => ATTR_KEY_SEND_ONLY,
            Direction::RecvOnly => ATTR_KEY_RECV_ONLY,
            Direction::Inactive => ATTR_KEY_INACTIVE,
        };
        write!(f, "{s}")
    }
}

impl Direction {
    pub fn from_str(s: &str) -> Option<Direction> {
        match s {
            ATTR_KEY_SEND_RECV => Some(Direction::SendRecv),
            ATTR_KEY_SEND_ONLY => Some(Direction::SendOnly),
            ATTR_KEY_RECV_ONLY => Some(Direction::RecvOnly),
            ATTR_KEY_INACTIVE => Some(Direction::Inactive),
            _ => None,
        }
    }

    /// The direction the answering side uses when mirroring this one.
    pub fn reverse(&self) -> Direction {
        match self {
            Direction::SendRecv => Direction::SendRecv,
            Direction::SendOnly => Direction::RecvOnly,
            Direction::RecvOnly => Direction::SendOnly,
            Direction::Inactive => Direction::Inactive,
        }
    }
}

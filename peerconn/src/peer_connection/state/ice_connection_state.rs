use std::fmt;

/// The W3C-visible ICE connection state, mapped from the agent's internal
/// state.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCIceConnectionState {
    Unspecified,
    #[default]
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for RTCIceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RTCIceConnectionState::Unspecified => "Unspecified",
            RTCIceConnectionState::New => "new",
            RTCIceConnectionState::Checking => "checking",
            RTCIceConnectionState::Connected => "connected",
            RTCIceConnectionState::Completed => "completed",
            RTCIceConnectionState::Disconnected => "disconnected",
            RTCIceConnectionState::Failed => "failed",
            RTCIceConnectionState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

impl From<ice::ConnectionState> for RTCIceConnectionState {
    fn from(state: ice::ConnectionState) -> Self {
        match state {
            ice::ConnectionState::Unspecified => RTCIceConnectionState::Unspecified,
            ice::ConnectionState::New => RTCIceConnectionState::New,
            ice::ConnectionState::Checking => RTCIceConnectionState::Checking,
            ice::ConnectionState::Connected => RTCIceConnectionState::Connected,
            ice::ConnectionState::Completed => RTCIceConnectionState::Completed,
            ice::ConnectionState::Disconnected => RTCIceConnectionState::Disconnected,
            ice::ConnectionState::Failed => RTCIceConnectionState::Failed,
            ice::ConnectionState::Closed => RTCIceConnectionState::Closed,
        }
    }
}

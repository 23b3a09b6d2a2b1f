use std::fmt;

/// The aggregate state of the peer connection, composed from the ICE and
/// DTLS transport states (W3C webrtc-pc section 4.3.3).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCPeerConnectionState {
    Unspecified,

    /// Any of the ICE or DTLS transports are in the "new" state and none are
    /// failed/connecting/checking/disconnected.
    #[default]
    New,

    /// Any transport is in the "connecting" or "checking" state and none are
    /// failed.
    Connecting,

    /// All transports are in the "connected", "completed" or "closed" state
    /// and at least one is "connected" or "completed".
    Connected,

    /// Any transport is "disconnected" and none are failed.
    Disconnected,

    /// Any transport is in a "failed" state.
    Failed,

    /// The peer connection is closed.
    Closed,
}

impl fmt::Display for RTCPeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RTCPeerConnectionState::Unspecified => "Unspecified",
            RTCPeerConnectionState::New => "new",
            RTCPeerConnectionState::Connecting => "connecting",
            RTCPeerConnectionState::Connected => "connected",
            RTCPeerConnectionState::Disconnected => "disconnected",
            RTCPeerConnectionState::Failed => "failed",
            RTCPeerConnectionState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

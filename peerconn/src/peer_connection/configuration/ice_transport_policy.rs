use std::fmt;

/// Which ICE candidates the agent is allowed to use.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCIceTransportPolicy {
    Unspecified = 0,

    /// All candidate types are used.
    #[default]
    All = 1,

    /// Only media relay candidates (TURN) are used.
    Relay = 2,
}

const ICE_TRANSPORT_POLICY_RELAY_STR: &str = "relay";
const ICE_TRANSPORT_POLICY_ALL_STR: &str = "all";

impl From<&str> for RTCIceTransportPolicy {
    fn from(raw: &str) -> Self {
        match raw {
            ICE_TRANSPORT_POLICY_RELAY_STR => RTCIceTransportPolicy::Relay,
            ICE_TRANSPORT_POLICY_ALL_STR => RTCIceTransportPolicy::All,
            _ => RTCIceTransportPolicy::Unspecified,
        }
    }
}

impl fmt::Display for RTCIceTransportPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCIceTransportPolicy::Relay => write!(f, "{ICE_TRANSPORT_POLICY_RELAY_STR}"),
            RTCIceTransportPolicy::All => write!(f, "{ICE_TRANSPORT_POLICY_ALL_STR}"),
            _ => write!(f, "{}", super::UNSPECIFIED_STR),
        }
    }
}

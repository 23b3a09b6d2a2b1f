use serde::Serialize;
use shared::TransportProtocol;
use std::fmt;

/// The network family and transport a candidate uses.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum NetworkType {
    #[default]
    #[serde(rename = "udp4")]
    Udp4,
    #[serde(rename = "udp6")]
    Udp6,
    #[serde(rename = "tcp4")]
    Tcp4,
    #[serde(rename = "tcp6")]
    Tcp6,
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkType::Udp4 => "udp4",
            NetworkType::Udp6 => "udp6",
            NetworkType::Tcp4 => "tcp4",
            NetworkType::Tcp6 => "tcp6",
        };
        write!(f, "{s}")
    }
}

impl NetworkType {
    pub fn is_udp(&self) -> bool {
        matches!(self, NetworkType::Udp4 | NetworkType::Udp6)
    }

    pub fn is_tcp(&self) -> bool {
        matches!(self, NetworkType::Tcp4 | NetworkType::Tcp6)
    }

    /// The transport keyword as it appears in a candidate attribute.
    pub fn transport(&self) -> &'static str {
        if self.is_udp() {
            "udp"
        } else {
            "tcp"
        }
    }

    pub fn to_protocol(self) -> TransportProtocol {
        if self.is_udp() {
            TransportProtocol::UDP
        } else {
            TransportProtocol::TCP
        }
    }
}

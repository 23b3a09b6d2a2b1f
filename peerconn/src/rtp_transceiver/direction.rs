use std::fmt;

/// The direction of a transceiver (W3C webrtc-pc section 4.4.1).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCRtpTransceiverDirection {
    Unspecified,
    #[default]
    Sendrecv,
    Sendonly,
    Recvonly,
    Inactive,
}

const DIRECTION_SENDRECV_STR: &str = "sendrecv";
const DIRECTION_SENDONLY_STR: &str = "sendonly";
const DIRECTION_RECVONLY_STR: &str = "recvonly";
const DIRECTION_INACTIVE_STR: &str = "inactive";

impl From<&str> for RTCRtpTransceiverDirection {
    fn from(raw: &str) -> Self {
        match raw {
            DIRECTION_SENDRECV_STR => RTCRtpTransceiverDirection::Sendrecv,
            DIRECTION_SENDONLY_STR => RTCRtpTransceiverDirection::Sendonly,
            DIRECTION_RECVONLY_STR => RTCRtpTransceiverDirection::Recvonly,
            DIRECTION_INACTIVE_STR => RTCRtpTransceiverDirection::Inactive,
            _ => RTCRtpTransceiverDirection::Unspecified,
        }
    }
}

impl fmt::Display for RTCRtpTransceiverDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCRtpTransceiverDirection::Sendrecv => write!(f, "{DIRECTION_SENDRECV_STR}"),
            RTCRtpTransceiverDirection::Sendonly => write!(f, "{DIRECTION_SENDONLY_STR}"),
            RTCRtpTransceiverDirection::Recvonly => write!(f, "{DIRECTION_RECVONLY_STR}"),
            RTCRtpTransceiverDirection::Inactive => write!(f, "{DIRECTION_INACTIVE_STR}"),
            _ => write!(f, "Unspecified"),
        }
    }
}

impl RTCRtpTransceiverDirection {
    /// The direction an answerer uses when mirroring this offered direction.
    pub fn reverse(&self) -> RTCRtpTransceiverDirection {
        match self {
            RTCRtpTransceiverDirection::Sendonly => RTCRtpTransceiverDirection::Recvonly,
            RTCRtpTransceiverDirection::Recvonly => RTCRtpTransceiverDirection::Sendonly,
            other => *other,
        }
    }

    pub fn has_send(&self) -> bool {
        matches!(
            self,
            RTCRtpTransceiverDirection::Sendrecv | RTCRtpTransceiverDirection::Sendonly
        )
    }

    pub fn has_recv(&self) -> bool {
        matches!(
            self,
            RTCRtpTransceiverDirection::Sendrecv | RTCRtpTransceiverDirection::Recvonly
        )
    }
}

#[cfg(test)]
mod direction_test {
    use super::*;

    #[test]
    fn test_reverse() {
        assert_eq!(
            RTCRtpTransceiverDirection::Sendonly.reverse(),
            RTCRtpTransceiverDirection::Recvonly
        );
        assert_eq!(
            RTCRtpTransceiverDirection::Sendrecv.reverse(),
            RTCRtpTransceiverDirection::Sendrecv
        );
        assert_eq!(
            RTCRtpTransceiverDirection::Inactive.reverse(),
            RTCRtpTransceiverDirection::Inactive
        );
    }

    #[test]
    fn test_string_roundtrip() {
        for s in ["sendrecv", "sendonly", "recvonly", "inactive"] {
            assert_eq!(RTCRtpTransceiverDirection::from(s).to_string(), s);
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of a session description (W3C webrtc-pc section 4.7.2).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RTCSdpType {
    #[default]
    #[serde(rename = "Unspecified")]
    Unspecified = 0,

    /// The description is an initial proposal in an offer/answer exchange.
    #[serde(rename = "offer")]
    Offer,

    /// The description is a provisional answer and may be changed when the
    /// definitive answer is given.
    #[serde(rename = "pranswer")]
    Pranswer,

    /// The description is the definitive answer; the offer/answer exchange
    /// ends with this description being applied.
    #[serde(rename = "answer")]
    Answer,

    /// The description rolls back to the last stable state.
    #[serde(rename = "rollback")]
    Rollback,
}

const SDP_TYPE_OFFER_STR: &str = "offer";
const SDP_TYPE_PRANSWER_STR: &str = "pranswer";
const SDP_TYPE_ANSWER_STR: &str = "answer";
const SDP_TYPE_ROLLBACK_STR: &str = "rollback";

impl From<&str> for RTCSdpType {
    fn from(raw: &str) -> Self {
        match raw {
            SDP_TYPE_OFFER_STR => RTCSdpType::Offer,
            SDP_TYPE_PRANSWER_STR => RTCSdpType::Pranswer,
            SDP_TYPE_ANSWER_STR => RTCSdpType::Answer,
            SDP_TYPE_ROLLBACK_STR => RTCSdpType::Rollback,
            _ => RTCSdpType::Unspecified,
        }
    }
}

impl fmt::Display for RTCSdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCSdpType::Offer => write!(f, "{SDP_TYPE_OFFER_STR}"),
            RTCSdpType::Pranswer => write!(f, "{SDP_TYPE_PRANSWER_STR}"),
            RTCSdpType::Answer => write!(f, "{SDP_TYPE_ANSWER_STR}"),
            RTCSdpType::Rollback => write!(f, "{SDP_TYPE_ROLLBACK_STR}"),
            _ => write!(f, "Unspecified"),
        }
    }
}

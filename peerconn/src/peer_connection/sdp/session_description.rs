use serde::{Deserialize, Serialize};
use shared::error::Result;

use crate::peer_connection::sdp::sdp_type::RTCSdpType;

/// An immutable description of one end of the session: a type and the SDP
/// text (W3C webrtc-pc section 4.7.1).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RTCSessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: RTCSdpType,

    pub sdp: String,

    /// The parsed form, kept alongside so consumers don't re-parse.
    #[serde(skip)]
    pub(crate) parsed: Option<sdp::SessionDescription>,
}

impl PartialEq for RTCSessionDescription {
    fn eq(&self, other: &Self) -> bool {
        self.sdp_type == other.sdp_type && self.sdp == other.sdp
    }
}

impl RTCSessionDescription {
    /// Creates an offer description, validating the SDP text.
    pub fn offer(sdp: String) -> Result<Self> {
        RTCSessionDescription::new(RTCSdpType::Offer, sdp)
    }

    /// Creates a provisional answer description, validating the SDP text.
    pub fn pranswer(sdp: String) -> Result<Self> {
        RTCSessionDescription::new(RTCSdpType::Pranswer, sdp)
    }

    /// Creates an answer description, validating the SDP text.
    pub fn answer(sdp: String) -> Result<Self> {
        RTCSessionDescription::new(RTCSdpType::Answer, sdp)
    }

    /// Creates a rollback description; it carries no SDP.
    pub fn rollback() -> Self {
        RTCSessionDescription {
            sdp_type: RTCSdpType::Rollback,
            sdp: String::new(),
            parsed: None,
        }
    }

    fn new(sdp_type: RTCSdpType, sdp: String) -> Result<Self> {
        let parsed = sdp::SessionDescription::unmarshal(&sdp)?;
        Ok(RTCSessionDescription {
            sdp_type,
            sdp,
            parsed: Some(parsed),
        })
    }

    /// The parsed session description; parses lazily if constructed
    /// directly from fields.
    pub fn unmarshal(&self) -> Result<sdp::SessionDescription> {
        match &self.parsed {
            Some(parsed) => Ok(parsed.clone()),
            None => sdp::SessionDescription::unmarshal(&self.sdp),
        }
    }
}

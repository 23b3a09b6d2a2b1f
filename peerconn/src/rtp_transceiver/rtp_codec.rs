use std::fmt;

/// The kind of media a codec or track carries.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RtpCodecKind {
    #[default]
    Audio,
    Video,
}

impl fmt::Display for RtpCodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtpCodecKind::Audio => write!(f, "audio"),
            RtpCodecKind::Video => write!(f, "video"),
        }
    }
}

impl RtpCodecKind {
    pub fn from_media(media: &str) -> Option<RtpCodecKind> {
        match media {
            "audio" => Some(RtpCodecKind::Audio),
            "video" => Some(RtpCodecKind::Video),
            _ => None,
        }
    }
}

/// A codec this engine can negotiate: the payload framing parameters, not
/// the compression itself (codecs are external collaborators).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RTCRtpCodecCapability {
    pub kind: RtpCodecKind,
    pub name: String,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub channels: u16,
    pub fmtp: String,
    pub rtcp_feedback: Vec<String>,
    /// Whether an RTX repair stream (payload type + 1) accompanies it.
    pub rtx: bool,
}

impl RTCRtpCodecCapability {
    /// The `<codec>/<rate>[/<channels>]` portion of an rtpmap line.
    pub fn rtpmap_value(&self) -> String {
        if self.channels > 0 {
            format!("{}/{}/{}", self.name, self.clock_rate, self.channels)
        } else {
            format!("{}/{}", self.name, self.clock_rate)
        }
    }

    pub fn rtx_payload_type(&self) -> Option<u8> {
        self.rtx.then(|| self.payload_type + 1)
    }
}

use shared::error::{Error, Result};

use crate::description::media::MediaDescription;

/// ConnectionRole is the `a=setup` role of RFC 4145 as used by DTLS-SRTP.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ConnectionRole {
    #[default]
    Actpass,
    Active,
    Passive,
}

impl std::fmt::Display for ConnectionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionRole::Actpass => "actpass",
            ConnectionRole::Active => "active",
            ConnectionRole::Passive => "passive",
        };
        write!(f, "{s}")
    }
}

impl ConnectionRole {
    pub fn from_str(s: &str) -> Option<ConnectionRole> {
        match s {
            "actpass" => Some(ConnectionRole::Actpass),
            "active" => Some(ConnectionRole::Active),
            "passive" => Some(ConnectionRole::Passive),
            _ => None,
        }
    }
}

/// A codec as described by the rtpmap/fmtp/rtcp-fb attributes of one media
/// section.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Codec {
    pub payload_type: u8,
    pub name: String,
    pub clock_rate: u32,
    pub channels: u16,
    pub fmtp: String,
    pub rtcp_feedback: Vec<String>,
}

/// Extracts every codec declared in `md`, in payload-type order of the m=
/// line.
pub fn codecs_from_media_description(md: &MediaDescription) -> Result<Vec<Codec>> {
    let mut codecs = vec![];

    for format in &md.media_name.formats {
        let payload_type: u8 = match format.parse() {
            Ok(pt) => pt,
            // the application m-line carries a protocol name instead
            Err(_) => continue,
        };

        let mut codec = Codec {
            payload_type,
            ..Default::default()
        };

        for rtpmap in md.attributes_by_key("rtpmap") {
            let Some((pt, rest)) = rtpmap.split_once(' ') else {
                continue;
            };
            if pt.parse::<u8>() != Ok(payload_type) {
                continue;
            }
            let mut parts = rest.split('/');
            codec.name = parts.next().unwrap_or_default().to_owned();
            codec.clock_rate = parts
                .next()
                .and_then(|r| r.parse().ok())
                .ok_or_else(|| Error::SdpInvalidValue(rtpmap.to_owned()))?;
            codec.channels = parts.next().and_then(|c| c.parse().ok()).unwrap_or(0);
        }

        for fmtp in md.attributes_by_key("fmtp") {
            if let Some((pt, rest)) = fmtp.split_once(' ') {
                if pt.parse::<u8>() == Ok(payload_type) {
                    codec.fmtp = rest.to_owned();
                }
            }
        }

        for fb in md.attributes_by_key("rtcp-fb") {
            if let Some((pt, rest)) = fb.split_once(' ') {
                if pt.parse::<u8>() == Ok(payload_type) {
                    codec.rtcp_feedback.push(rest.to_owned());
                }
            }
        }

        codecs.push(codec);
    }

    Ok(codecs)
}

/// Returns the original payload type an RTX payload type repairs, from its
/// `apt=` fmtp parameter.
pub fn rtx_repairs(codec: &Codec) -> Option<u8> {
    if !codec.name.eq_ignore_ascii_case("rtx") {
        return None;
    }
    codec
        .fmtp
        .split(';')
        .find_map(|p| p.trim().strip_prefix("apt="))
        .and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod util_test {
    use super::*;
    use crate::description::session::SessionDescription;

    const VIDEO: &str = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96 97\r\n\
a=rtpmap:96 VP9/90000\r\n\
a=fmtp:96 profile-id=0\r\n\
a=rtcp-fb:96 nack\r\n\
a=rtcp-fb:96 nack pli\r\n\
a=rtpmap:97 rtx/90000\r\n\
a=fmtp:97 apt=96\r\n";

    #[test]
    fn test_codec_extraction() {
        let sd = SessionDescription::unmarshal(VIDEO).unwrap();
        let codecs = codecs_from_media_description(&sd.media_descriptions[0]).unwrap();
        assert_eq!(codecs.len(), 2);

        assert_eq!(codecs[0].payload_type, 96);
        assert_eq!(codecs[0].name, "VP9");
        assert_eq!(codecs[0].clock_rate, 90000);
        assert_eq!(codecs[0].fmtp, "profile-id=0");
        assert_eq!(codecs[0].rtcp_feedback, vec!["nack", "nack pli"]);

        assert_eq!(codecs[1].name, "rtx");
        assert_eq!(rtx_repairs(&codecs[1]), Some(96));
        assert_eq!(rtx_repairs(&codecs[0]), None);
    }

    #[test]
    fn test_connection_role() {
        assert_eq!(ConnectionRole::from_str("actpass"), Some(ConnectionRole::Actpass));
        assert_eq!(ConnectionRole::from_str("holdconn"), None);
        assert_eq!(ConnectionRole::Active.to_string(), "active");
    }
}

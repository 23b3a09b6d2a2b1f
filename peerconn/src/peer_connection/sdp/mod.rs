pub mod sdp_type;
pub mod session_description;

pub use sdp_type::RTCSdpType;
pub use session_description::RTCSessionDescription;

use shared::error::{Error, Result};

use crate::data_channel::{DATA_CHANNEL_MID, SCTP_PORT};
use crate::rtp_transceiver::direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RtpCodecKind};
use sdp::description::common::{Attribute, ConnectionInformation, Origin};
use sdp::description::media::{MediaDescription, MediaName};
use sdp::SessionDescription;

/// The extmap id this engine assigns to urn:ietf:params:rtp-hdrext:sdes:mid.
pub const MID_EXTENSION_ID: u8 = 1;
pub const SDES_MID_URI: &str = "urn:ietf:params:rtp-hdrext:sdes:mid";
pub const ABS_SEND_TIME_EXTENSION_ID: u8 = 2;
pub const ABS_SEND_TIME_URI: &str =
    "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time";
pub const TRANSPORT_CC_EXTENSION_ID: u8 = 3;
pub const TRANSPORT_CC_URI: &str =
    "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";

pub(crate) const MEDIA_PROTO_SAVPF: &[&str] = &["UDP", "TLS", "RTP", "SAVPF"];
pub(crate) const APPLICATION_PROTO_SCTP: &[&str] = &["UDP", "DTLS", "SCTP"];

/// Everything the builder needs to emit one audio/video m-section.
pub(crate) struct MediaSectionParams<'a> {
    pub mid: &'a str,
    pub kind: RtpCodecKind,
    pub direction: RTCRtpTransceiverDirection,
    pub codecs: &'a [RTCRtpCodecCapability],
    pub ssrc: u32,
    pub rtx_ssrc: Option<u32>,
    pub cname: &'a str,
    pub ice_ufrag: &'a str,
    pub ice_pwd: &'a str,
    pub fingerprint: &'a str,
    pub setup: &'a str,
}

pub(crate) fn build_media_description(params: MediaSectionParams<'_>) -> MediaDescription {
    let mut md = MediaDescription {
        media_name: MediaName {
            media: params.kind.to_string(),
            port: 9,
            protos: MEDIA_PROTO_SAVPF.iter().map(|s| (*s).to_owned()).collect(),
            formats: vec![],
        },
        connection_information: Some(ConnectionInformation::default()),
        attributes: vec![],
    };

    md = md
        .with_value_attribute("ice-ufrag", params.ice_ufrag)
        .with_value_attribute("ice-pwd", params.ice_pwd)
        .with_value_attribute("fingerprint", &format!("sha-256 {}", params.fingerprint))
        .with_value_attribute("setup", params.setup)
        .with_value_attribute("mid", params.mid)
        .with_property_attribute(&params.direction.to_string())
        .with_property_attribute("rtcp-mux")
        .with_value_attribute("extmap", &format!("{MID_EXTENSION_ID} {SDES_MID_URI}"))
        .with_value_attribute(
            "extmap",
            &format!("{ABS_SEND_TIME_EXTENSION_ID} {ABS_SEND_TIME_URI}"),
        )
        .with_value_attribute(
            "extmap",
            &format!("{TRANSPORT_CC_EXTENSION_ID} {TRANSPORT_CC_URI}"),
        );

    for codec in params.codecs {
        md = md.with_codec(
            codec.payload_type,
            &codec.name,
            codec.clock_rate,
            codec.channels,
            &codec.fmtp,
        );
        for feedback in &codec.rtcp_feedback {
            md = md.with_value_attribute(
                "rtcp-fb",
                &format!("{} {}", codec.payload_type, feedback),
            );
        }
        if let Some(rtx_pt) = codec.rtx_payload_type() {
            md = md.with_codec(
                rtx_pt,
                "rtx",
                codec.clock_rate,
                0,
                &format!("apt={}", codec.payload_type),
            );
        }
    }

    if let Some(rtx_ssrc) = params.rtx_ssrc {
        md = md.with_value_attribute(
            "ssrc-group",
            &format!("FID {} {}", params.ssrc, rtx_ssrc),
        );
        md = md.with_value_attribute("ssrc", &format!("{} cname:{}", params.ssrc, params.cname));
        md = md.with_value_attribute("ssrc", &format!("{rtx_ssrc} cname:{}", params.cname));
    } else {
        md = md.with_value_attribute("ssrc", &format!("{} cname:{}", params.ssrc, params.cname));
    }

    md
}

/// The `m=application` section carrying the data channel.
pub(crate) fn build_application_description(
    ice_ufrag: &str,
    ice_pwd: &str,
    fingerprint: &str,
    setup: &str,
) -> MediaDescription {
    MediaDescription {
        media_name: MediaName {
            media: "application".to_owned(),
            port: 9,
            protos: APPLICATION_PROTO_SCTP
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            formats: vec!["webrtc-datachannel".to_owned()],
        },
        connection_information: Some(ConnectionInformation::default()),
        attributes: vec![],
    }
    .with_value_attribute("ice-ufrag", ice_ufrag)
    .with_value_attribute("ice-pwd", ice_pwd)
    .with_value_attribute("fingerprint", &format!("sha-256 {fingerprint}"))
    .with_value_attribute("setup", setup)
    .with_value_attribute("mid", DATA_CHANNEL_MID)
    .with_value_attribute("sctp-port", &SCTP_PORT.to_string())
}

/// Assembles the session wrapper: origin, BUNDLE group, trickle option.
pub(crate) fn build_session(
    session_id: u64,
    session_version: u64,
    bundle_mids: Option<&[String]>,
    media: Vec<MediaDescription>,
) -> SessionDescription {
    let mut sd = SessionDescription {
        origin: Origin {
            session_id,
            session_version,
            ..Default::default()
        },
        ..Default::default()
    };

    if let Some(mids) = bundle_mids {
        if !mids.is_empty() {
            sd.attributes.push(Attribute::new(
                "group",
                Some(&format!("BUNDLE {}", mids.join(" "))),
            ));
        }
    }
    sd.attributes
        .push(Attribute::new("ice-options", Some("trickle")));

    for md in media {
        sd.media_descriptions.push(md);
    }
    sd
}

// --- extraction helpers -------------------------------------------------

/// ICE credentials from the session or the first m-section that carries
/// them (the primary bundle section).
pub(crate) fn extract_ice_credentials(sd: &SessionDescription) -> Result<(String, String)> {
    let find = |key: &str| -> Option<String> {
        if let Some(Some(v)) = sd.attribute(key) {
            return Some(v.to_owned());
        }
        for md in &sd.media_descriptions {
            if let Some(Some(v)) = md.attribute(key) {
                return Some(v.to_owned());
            }
        }
        None
    };

    let ufrag = find("ice-ufrag").ok_or(Error::ErrSessionDescriptionMissingIceUfrag)?;
    let pwd = find("ice-pwd").ok_or(Error::ErrSessionDescriptionMissingIcePwd)?;
    Ok((ufrag, pwd))
}

/// The certificate fingerprint value (hex part after the hash name).
pub(crate) fn extract_fingerprint(sd: &SessionDescription) -> Result<String> {
    let find = |attrs: &[Attribute]| -> Option<String> {
        attrs
            .iter()
            .find(|a| a.key == "fingerprint")
            .and_then(|a| a.value.as_deref())
            .and_then(|v| v.split_once(' '))
            .map(|(_, hex)| hex.to_owned())
    };

    if let Some(fp) = find(&sd.attributes) {
        return Ok(fp);
    }
    for md in &sd.media_descriptions {
        if let Some(fp) = find(&md.attributes) {
            return Ok(fp);
        }
    }
    Err(Error::ErrSessionDescriptionNoFingerprint)
}

/// The remote's `a=setup` role; actpass when absent (offers).
pub(crate) fn extract_setup(sd: &SessionDescription) -> sdp::util::ConnectionRole {
    for md in &sd.media_descriptions {
        if let Some(Some(v)) = md.attribute("setup") {
            if let Some(role) = sdp::util::ConnectionRole::from_str(v) {
                return role;
            }
        }
    }
    sdp::util::ConnectionRole::Actpass
}

/// Per-m-section facts the coordinator routes on.
#[derive(Debug, Clone, Default)]
pub(crate) struct RemoteMediaInfo {
    pub mid: Option<String>,
    pub kind: Option<RtpCodecKind>,
    pub is_application: bool,
    pub direction: RTCRtpTransceiverDirection,
    pub codecs: Vec<sdp::util::Codec>,
    pub ssrc: Option<u32>,
    pub rtx_ssrc: Option<u32>,
    pub candidates: Vec<String>,
}

pub(crate) fn parse_remote_media(md: &MediaDescription) -> RemoteMediaInfo {
    let mut info = RemoteMediaInfo {
        mid: md.attribute("mid").flatten().map(|m| m.to_owned()),
        kind: RtpCodecKind::from_media(&md.media_name.media),
        is_application: md.media_name.media == "application",
        ..Default::default()
    };

    for direction in ["sendrecv", "sendonly", "recvonly", "inactive"] {
        if md.attribute(direction).is_some() {
            info.direction = RTCRtpTransceiverDirection::from(direction);
            break;
        }
    }

    info.codecs = sdp::util::codecs_from_media_description(md).unwrap_or_default();

    // the FID group names primary and repair SSRC in order
    if let Some(Some(group)) = md.attribute("ssrc-group") {
        let parts: Vec<&str> = group.split_whitespace().collect();
        if parts.len() >= 3 && parts[0] == "FID" {
            info.ssrc = parts[1].parse().ok();
            info.rtx_ssrc = parts[2].parse().ok();
        }
    }
    if info.ssrc.is_none() {
        if let Some(first) = md.attributes_by_key("ssrc").next() {
            info.ssrc = first.split_whitespace().next().and_then(|s| s.parse().ok());
        }
    }

    for candidate in md.attributes_by_key("candidate") {
        info.candidates.push(candidate.to_owned());
    }

    info
}

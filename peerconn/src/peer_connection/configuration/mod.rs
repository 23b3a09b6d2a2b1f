pub mod bundle_policy;
pub mod ice_transport_policy;

use shared::error::{Error, Result};

use crate::peer_connection::certificate::RTCCertificate;
use crate::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RtpCodecKind};
use bundle_policy::RTCBundlePolicy;
use ice_transport_policy::RTCIceTransportPolicy;

pub(crate) const UNSPECIFIED_STR: &str = "Unspecified";

/// An ICE server (STUN or TURN) the agent may use.
#[derive(Debug, Clone, Default)]
pub struct RTCIceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

impl RTCIceServer {
    pub(crate) fn parse_urls(&self) -> Result<Vec<ice::url::Url>> {
        let mut out = vec![];
        for raw in &self.urls {
            let mut url = ice::url::Url::parse(raw)?;
            if url.is_turn() {
                if self.username.is_empty() {
                    return Err(Error::ErrUsernameEmpty);
                }
                if self.credential.is_empty() {
                    return Err(Error::ErrPasswordEmpty);
                }
                url.username = self.username.clone();
                url.password = self.credential.clone();
            }
            out.push(url);
        }
        Ok(out)
    }
}

/// RTCConfiguration collects the options a peer connection is created with.
#[derive(Default)]
pub struct RTCConfiguration {
    pub ice_servers: Vec<RTCIceServer>,
    pub ice_transport_policy: RTCIceTransportPolicy,
    pub bundle_policy: RTCBundlePolicy,
    pub certificates: Vec<RTCCertificate>,
    /// Per-kind codec preference lists; empty means the built-in defaults.
    pub codec_preferences: Vec<RTCRtpCodecCapability>,
    /// The local socket addresses host candidates are built from. The
    /// embedding runtime owns interface enumeration and the sockets
    /// themselves.
    pub local_addrs: Vec<std::net::SocketAddr>,
    /// Optional process-wide mDNS resolver for `.local` remote candidates.
    pub mdns_resolver: Option<Box<dyn ice::mdns::MdnsResolver>>,
    /// The CNAME carried in SDES and `a=ssrc` lines; random when empty.
    pub cname: String,
}

impl RTCConfiguration {
    pub(crate) fn default_codecs(kind: RtpCodecKind) -> Vec<RTCRtpCodecCapability> {
        match kind {
            RtpCodecKind::Audio => vec![RTCRtpCodecCapability {
                kind: RtpCodecKind::Audio,
                name: "opus".to_owned(),
                payload_type: 111,
                clock_rate: 48000,
                channels: 2,
                fmtp: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
                rtx: false,
            }],
            RtpCodecKind::Video => vec![RTCRtpCodecCapability {
                kind: RtpCodecKind::Video,
                name: "VP9".to_owned(),
                payload_type: 96,
                clock_rate: 90000,
                channels: 0,
                fmtp: "profile-id=0".to_owned(),
                rtcp_feedback: vec![
                    "nack".to_owned(),
                    "nack pli".to_owned(),
                    "ccm fir".to_owned(),
                    "transport-cc".to_owned(),
                ],
                rtx: true,
            }],
        }
    }

    /// The codecs offered for `kind`: the configured preferences when set,
    /// the defaults otherwise.
    pub(crate) fn codecs_for(&self, kind: RtpCodecKind) -> Vec<RTCRtpCodecCapability> {
        let preferred: Vec<RTCRtpCodecCapability> = self
            .codec_preferences
            .iter()
            .filter(|c| c.kind == kind)
            .cloned()
            .collect();
        if preferred.is_empty() {
            Self::default_codecs(kind)
        } else {
            preferred
        }
    }
}

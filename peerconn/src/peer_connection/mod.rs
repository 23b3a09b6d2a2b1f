pub mod certificate;
pub mod configuration;
pub mod event;
pub mod sdp;
pub mod state;

use bytes::BytesMut;
use log::{debug, info, trace, warn};
use shared::error::{Error, Result};
use shared::handler::Protocol;
use shared::time::SystemInstant;
use shared::{TaggedBytesMut, TransportContext, TransportMessage};
use std::collections::{HashMap, VecDeque};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::data_channel::{RTCDataChannel, RTCDataChannelInit, DATA_CHANNEL_MID};
use crate::jitter::JitterBufferEvent;
use crate::media_stream::MediaStreamTrack;
use crate::rtp_transceiver::direction::RTCRtpTransceiverDirection;
use crate::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RtpCodecKind};
use crate::rtp_transceiver::RTCRtpTransceiver;
use crate::session::twcc::{parse_transport_cc_extension, TwccRecorder};
use crate::session::{ForwardExtensions, RtcpAction, RtpSession, SessionConfig, SessionStats};
use crate::svc::{LayerFilterStats, ScalabilityMode, Vp9LayerFilter};
use crate::transport::{classify, Classified, DtlsRole, Transport, TransportState};

use certificate::RTCCertificate;
use configuration::bundle_policy::RTCBundlePolicy;
use configuration::ice_transport_policy::RTCIceTransportPolicy;
use configuration::RTCConfiguration;
use event::{RTCIceCandidateInit, RTCMessage, RTCPeerConnectionEvent, RTCTrackEvent};
use self::sdp::{
    build_application_description, build_media_description, build_session,
    extract_fingerprint, extract_ice_credentials, extract_setup, parse_remote_media,
    MediaSectionParams, RTCSdpType, RTCSessionDescription, RemoteMediaInfo,
    ABS_SEND_TIME_EXTENSION_ID, MID_EXTENSION_ID, TRANSPORT_CC_EXTENSION_ID,
};
use state::signaling_state::{check_next_signaling_state, StateChangeOp};
use state::{
    RTCIceConnectionState, RTCIceGatheringState, RTCPeerConnectionState, RTCSignalingState,
};

/// Options accepted by create_offer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RTCOfferOptions {
    pub ice_restart: bool,
}

/// A point-in-time statistics snapshot.
#[derive(Debug, Clone, Default)]
pub struct RTCStatsReport {
    pub sessions: Vec<SessionStats>,
    pub selected_candidate_pair: Option<(String, String)>,
    /// Round-trip time is reported once downstream consumers define how SR
    /// timestamps should feed it; see the receiver's last-SR bookkeeping.
    pub round_trip_time: Option<f64>,
}

/// RTCPeerConnection coordinates one peer-to-peer session: signaling,
/// transceivers, the ICE agent, the DTLS transport and the per-MID RTP
/// sessions. It performs no I/O; the embedding runtime pumps datagrams and
/// timers through the [Protocol] surface and drains events.
///
/// All state transitions for one peer happen on whatever task owns this
/// value; event consumers must not block that task.
pub struct RTCPeerConnection {
    pub(crate) configuration: RTCConfiguration,
    pub(crate) certificate: RTCCertificate,
    cname: String,

    signaling_state: RTCSignalingState,
    connection_state: RTCPeerConnectionState,
    ice_connection_state: RTCIceConnectionState,
    ice_gathering_state: RTCIceGatheringState,

    current_local_description: Option<RTCSessionDescription>,
    current_remote_description: Option<RTCSessionDescription>,
    pending_local_description: Option<RTCSessionDescription>,
    pending_remote_description: Option<RTCSessionDescription>,

    pub(crate) ice_agent: ice::Agent,
    pub(crate) transport: Transport,
    dtls_client_config: Option<Arc<dtls::HandshakeConfig>>,
    dtls_started: bool,
    dtls_connected: bool,
    selected_remote: Option<TransportContext>,

    pub(crate) transceivers: Vec<RTCRtpTransceiver>,
    pub(crate) rtp_sessions: HashMap<String, RtpSession>,
    ssrc_routes: HashMap<u32, String>,
    /// Per-MID VP9 layer filters applied on the forwarding path.
    layer_filters: HashMap<String, Vp9LayerFilter>,
    pub(crate) data_channels: Vec<RTCDataChannel>,

    /// Last known greater MID; MIDs are generated as increasing numbers,
    /// with "0" reserved for the data channel section.
    greater_mid: u32,
    sdp_session_id: u64,
    sdp_session_version: u64,

    epoch: SystemInstant,
    twcc_send_seq: u16,
    twcc_recorder: TwccRecorder,
    remote_ice_credentials: Option<(String, String)>,
    checks_started: bool,

    read_outs: VecDeque<RTCMessage>,
    write_outs: VecDeque<TaggedBytesMut>,
    events: VecDeque<RTCPeerConnectionEvent>,
    is_closed: bool,
}

impl RTCPeerConnection {
    /// Creates a peer connection. The DTLS certificate is generated here,
    /// before any operation that needs its fingerprint can run.
    pub fn new(mut configuration: RTCConfiguration) -> Result<Self> {
        let certificate = match configuration.certificates.first() {
            Some(cert) => cert.clone(),
            None => RTCCertificate::generate()?,
        };
        configuration.certificates = vec![certificate.clone()];

        let mut candidate_types = vec![];
        if configuration.ice_transport_policy == RTCIceTransportPolicy::Relay {
            candidate_types.push(ice::CandidateType::Relay);
        }

        let mut urls = vec![];
        for server in &configuration.ice_servers {
            urls.extend(server.parse_urls()?);
        }

        let ice_agent = ice::Agent::new(Arc::new(ice::AgentConfig {
            urls,
            candidate_types,
            ..Default::default()
        }))?;

        let cname = if configuration.cname.is_empty() {
            shared::util::math_rand_alpha_number(16)
        } else {
            configuration.cname.clone()
        };

        Ok(RTCPeerConnection {
            configuration,
            certificate,
            cname,
            signaling_state: RTCSignalingState::Stable,
            connection_state: RTCPeerConnectionState::New,
            ice_connection_state: RTCIceConnectionState::New,
            ice_gathering_state: RTCIceGatheringState::New,
            current_local_description: None,
            current_remote_description: None,
            pending_local_description: None,
            pending_remote_description: None,
            ice_agent,
            transport: Transport::new(None),
            dtls_client_config: None,
            dtls_started: false,
            dtls_connected: false,
            selected_remote: None,
            transceivers: vec![],
            rtp_sessions: HashMap::new(),
            ssrc_routes: HashMap::new(),
            layer_filters: HashMap::new(),
            data_channels: vec![],
            greater_mid: 0,
            sdp_session_id: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64 & 0x7FFF_FFFF_FFFF_FFFF)
                .unwrap_or(1),
            sdp_session_version: 1,
            epoch: SystemInstant::now(),
            twcc_send_seq: 0,
            twcc_recorder: TwccRecorder::new(Instant::now()),
            remote_ice_credentials: None,
            checks_started: false,
            read_outs: VecDeque::new(),
            write_outs: VecDeque::new(),
            events: VecDeque::new(),
            is_closed: false,
        })
    }

    fn check_not_closed(&self) -> Result<()> {
        if self.is_closed {
            Err(Error::ErrConnectionClosed)
        } else {
            Ok(())
        }
    }

    fn emit(&mut self, event: RTCPeerConnectionEvent) {
        // never push to a closed event stream
        if !self.is_closed
            || matches!(
                event,
                RTCPeerConnectionEvent::OnConnectionStateChange(RTCPeerConnectionState::Closed)
            )
        {
            self.events.push_back(event);
        }
    }

    // --- accessors -------------------------------------------------------

    pub fn signaling_state(&self) -> RTCSignalingState {
        self.signaling_state
    }

    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.connection_state
    }

    pub fn ice_connection_state(&self) -> RTCIceConnectionState {
        self.ice_connection_state
    }

    pub fn ice_gathering_state(&self) -> RTCIceGatheringState {
        self.ice_gathering_state
    }

    pub fn local_description(&self) -> Option<&RTCSessionDescription> {
        self.pending_local_description
            .as_ref()
            .or(self.current_local_description.as_ref())
    }

    pub fn remote_description(&self) -> Option<&RTCSessionDescription> {
        self.pending_remote_description
            .as_ref()
            .or(self.current_remote_description.as_ref())
    }

    pub fn transceivers(&self) -> &[RTCRtpTransceiver] {
        &self.transceivers
    }

    /// The local ICE credentials currently in force, regenerated by ICE
    /// restarts.
    pub fn local_ice_credentials(&self) -> (String, String) {
        let credentials = self.ice_agent.get_local_credentials();
        (credentials.ufrag.clone(), credentials.pwd.clone())
    }

    // --- track / transceiver API ----------------------------------------

    /// Adds a transceiver of the given kind and direction.
    pub fn add_transceiver(
        &mut self,
        kind: RtpCodecKind,
        direction: RTCRtpTransceiverDirection,
    ) -> Result<usize> {
        self.check_not_closed()?;
        let codecs = self.configuration.codecs_for(kind);
        self.transceivers
            .push(RTCRtpTransceiver::new(kind, direction, codecs));
        Ok(self.transceivers.len() - 1)
    }

    /// Adds a local track, creating (or reusing) a sendrecv transceiver.
    /// Returns the transceiver index acting as the sender handle.
    pub fn add_track(&mut self, track: MediaStreamTrack) -> Result<usize> {
        self.check_not_closed()?;

        if self.transceivers.iter().any(|t| {
            t.sender_track
                .as_ref()
                .map(|existing| existing.id == track.id)
                .unwrap_or(false)
        }) {
            return Err(Error::ErrExistingTrack);
        }

        if let Some(index) = self.transceivers.iter().position(|t| {
            t.kind == track.kind && t.sender_track.is_none() && t.direction.has_send()
        }) {
            self.transceivers[index].sender_track = Some(track);
            return Ok(index);
        }

        let index =
            self.add_transceiver(track.kind, RTCRtpTransceiverDirection::Sendrecv)?;
        self.transceivers[index].sender_track = Some(track);
        Ok(index)
    }

    /// Creates a data channel handle. The handle starts pending and opens
    /// once the transport connects.
    pub fn create_data_channel(
        &mut self,
        label: &str,
        options: RTCDataChannelInit,
    ) -> Result<usize> {
        self.check_not_closed()?;
        self.data_channels.push(RTCDataChannel::new(label, options));
        Ok(self.data_channels.len() - 1)
    }

    pub fn data_channel(&self, index: usize) -> Option<&RTCDataChannel> {
        self.data_channels.get(index)
    }

    // --- offer / answer --------------------------------------------------

    fn next_mid(&mut self) -> String {
        self.greater_mid += 1;
        self.greater_mid.to_string()
    }

    /// Builds an offer covering every transceiver plus the data channel
    /// section (MID "0").
    pub fn create_offer(&mut self, options: RTCOfferOptions) -> Result<RTCSessionDescription> {
        self.check_not_closed()?;

        if options.ice_restart {
            self.restart_ice()?;
        }

        // assign MIDs to transceivers that don't have one yet
        for i in 0..self.transceivers.len() {
            if self.transceivers[i].mid.is_none() {
                let mid = self.next_mid();
                self.transceivers[i].mid = Some(mid);
            }
        }
        self.ensure_sessions(Instant::now())?;

        let credentials = self.ice_agent.get_local_credentials().clone();
        let fingerprint = self.certificate.fingerprint();

        let mut media = vec![];
        let mut bundle_mids = vec![];
        for transceiver in &self.transceivers {
            let mid = transceiver.mid.clone().unwrap_or_default();
            let session = self.rtp_sessions.get(&mid);
            let (ssrc, rtx_ssrc) = match session {
                Some(s) => (s.ssrc(), s.config().rtx_ssrc),
                None => (rand::random(), None),
            };
            media.push(build_media_description(MediaSectionParams {
                mid: &mid,
                kind: transceiver.kind,
                direction: transceiver.direction,
                codecs: &transceiver.codecs,
                ssrc,
                rtx_ssrc,
                cname: &self.cname,
                ice_ufrag: &credentials.ufrag,
                ice_pwd: &credentials.pwd,
                fingerprint: &fingerprint,
                setup: "actpass",
            }));
            bundle_mids.push(mid);
        }

        media.push(build_application_description(
            &credentials.ufrag,
            &credentials.pwd,
            &fingerprint,
            "actpass",
        ));
        bundle_mids.push(DATA_CHANNEL_MID.to_owned());

        self.sdp_session_version += 1;
        let bundle = (self.configuration.bundle_policy != RTCBundlePolicy::Disable)
            .then_some(bundle_mids.as_slice());
        let sd = build_session(
            self.sdp_session_id,
            self.sdp_session_version,
            bundle,
            media,
        );

        RTCSessionDescription::offer(sd.marshal())
    }

    /// Builds an answer mirroring the remote offer's m-section order and
    /// payload types.
    pub fn create_answer(&mut self) -> Result<RTCSessionDescription> {
        self.check_not_closed()?;
        let remote = self
            .remote_description()
            .cloned()
            .ok_or(Error::ErrNoRemoteDescription)?;
        let parsed = remote.unmarshal()?;

        let credentials = self.ice_agent.get_local_credentials().clone();
        let fingerprint = self.certificate.fingerprint();
        // mirror the remote's setup role: an active remote leaves us
        // passive, otherwise we take the client side
        let setup = match extract_setup(&parsed) {
            ::sdp::util::ConnectionRole::Active => "passive",
            _ => "active",
        };

        let mut media = vec![];
        let mut bundle_mids = vec![];
        for md in &parsed.media_descriptions {
            let info = parse_remote_media(md);
            let mid = info.mid.clone().unwrap_or_default();

            if info.is_application {
                media.push(build_application_description(
                    &credentials.ufrag,
                    &credentials.pwd,
                    &fingerprint,
                    setup,
                ));
                bundle_mids.push(mid);
                continue;
            }

            let Some(kind) = info.kind else { continue };
            let accepted = self.accept_remote_codecs(kind, &info);
            let transceiver_index = self.find_or_create_transceiver(&mid, kind, &info);
            let direction = self.transceivers[transceiver_index].direction;
            if !accepted.is_empty() {
                // the answer adopts the remote's payload types
                self.transceivers[transceiver_index].codecs = accepted.clone();
            }
            self.ensure_sessions(Instant::now())?;

            let session = self.rtp_sessions.get(&mid);
            let (ssrc, rtx_ssrc) = match session {
                Some(s) => (s.ssrc(), s.config().rtx_ssrc),
                None => (rand::random(), None),
            };

            media.push(build_media_description(MediaSectionParams {
                mid: &mid,
                kind,
                direction,
                codecs: &accepted,
                ssrc,
                rtx_ssrc,
                cname: &self.cname,
                ice_ufrag: &credentials.ufrag,
                ice_pwd: &credentials.pwd,
                fingerprint: &fingerprint,
                setup,
            }));
            bundle_mids.push(mid);
        }

        self.sdp_session_version += 1;
        let bundle = (self.configuration.bundle_policy != RTCBundlePolicy::Disable)
            .then_some(bundle_mids.as_slice());
        let sd = build_session(
            self.sdp_session_id,
            self.sdp_session_version,
            bundle,
            media,
        );

        RTCSessionDescription::answer(sd.marshal())
    }

    /// Intersects remote codecs with our capabilities, keeping the remote's
    /// payload types (including its RTX mapping).
    fn accept_remote_codecs(
        &self,
        kind: RtpCodecKind,
        info: &RemoteMediaInfo,
    ) -> Vec<RTCRtpCodecCapability> {
        let ours = self.configuration.codecs_for(kind);
        let mut accepted = vec![];
        for remote in &info.codecs {
            if remote.name.eq_ignore_ascii_case("rtx") {
                continue;
            }
            let Some(local) = ours
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(&remote.name))
            else {
                continue;
            };
            let has_rtx = info
                .codecs
                .iter()
                .any(|c| ::sdp::util::rtx_repairs(c) == Some(remote.payload_type));
            accepted.push(RTCRtpCodecCapability {
                kind,
                name: remote.name.clone(),
                payload_type: remote.payload_type,
                clock_rate: remote.clock_rate,
                channels: remote.channels,
                fmtp: remote.fmtp.clone(),
                rtcp_feedback: local.rtcp_feedback.clone(),
                rtx: has_rtx,
            });
        }
        accepted
    }

    /// Synthesizes a transceiver for a remote m-line we have not seen,
    /// emitting OnTrack for receive directions.
    fn find_or_create_transceiver(
        &mut self,
        mid: &str,
        kind: RtpCodecKind,
        info: &RemoteMediaInfo,
    ) -> usize {
        if let Some(index) = self
            .transceivers
            .iter()
            .position(|t| t.mid.as_deref() == Some(mid))
        {
            return index;
        }

        // adopt a local transceiver of the same kind still waiting for a MID
        if let Some(index) = self
            .transceivers
            .iter()
            .position(|t| t.mid.is_none() && t.kind == kind)
        {
            self.transceivers[index].mid = Some(mid.to_owned());
            self.transceivers[index].current_direction = Some(info.direction.reverse());
            return index;
        }

        let mut transceiver = RTCRtpTransceiver::new(
            kind,
            info.direction.reverse(),
            self.configuration.codecs_for(kind),
        );
        transceiver.mid = Some(mid.to_owned());
        transceiver.current_direction = Some(info.direction.reverse());

        if info.direction.has_send() {
            // the remote sends: synthesize the receive track now
            let track = MediaStreamTrack::new_remote(kind, mid, None);
            transceiver.receiver_track = Some(track.clone());
            self.emit(RTCPeerConnectionEvent::OnTrack(RTCTrackEvent {
                mid: mid.to_owned(),
                kind,
                track,
            }));
        }

        self.greater_mid = self
            .greater_mid
            .max(mid.parse::<u32>().unwrap_or(self.greater_mid));
        self.transceivers.push(transceiver);
        self.transceivers.len() - 1
    }

    /// Creates the per-MID RTP session for every negotiated transceiver.
    fn ensure_sessions(&mut self, now: Instant) -> Result<()> {
        for i in 0..self.transceivers.len() {
            let Some(mid) = self.transceivers[i].mid.clone() else {
                continue;
            };
            if self.rtp_sessions.contains_key(&mid) {
                continue;
            }
            let Some(codec) = self.transceivers[i].codecs.first().cloned() else {
                continue;
            };

            let ssrc: u32 = rand::random();
            let rtx_ssrc = codec.rtx.then(rand::random::<u32>);
            let config = SessionConfig {
                mid: mid.clone(),
                cname: self.cname.clone(),
                ssrc,
                rtx_ssrc,
                payload_type: codec.payload_type,
                rtx_payload_type: codec.rtx_payload_type(),
                clock_rate: codec.clock_rate,
                remote_ssrc: None,
                remote_rtx_ssrc: None,
                jitter_latency_ms: 0,
            };
            self.rtp_sessions
                .insert(mid.clone(), RtpSession::new(config, now));
        }
        Ok(())
    }

    // --- set description -------------------------------------------------

    pub fn set_local_description(&mut self, desc: RTCSessionDescription) -> Result<()> {
        self.check_not_closed()?;

        if desc.sdp_type == RTCSdpType::Rollback {
            return self.rollback();
        }

        let next = match desc.sdp_type {
            RTCSdpType::Offer => RTCSignalingState::HaveLocalOffer,
            RTCSdpType::Answer => RTCSignalingState::Stable,
            RTCSdpType::Pranswer => RTCSignalingState::HaveLocalPranswer,
            _ => return Err(Error::ErrIncorrectSignalingState),
        };
        let new_state = check_next_signaling_state(
            self.signaling_state,
            next,
            StateChangeOp::SetLocal,
            desc.sdp_type,
        )?;

        match desc.sdp_type {
            RTCSdpType::Offer | RTCSdpType::Pranswer => {
                self.pending_local_description = Some(desc);
            }
            RTCSdpType::Answer => {
                self.current_local_description = Some(desc);
                self.current_remote_description = self.pending_remote_description.take();
                self.pending_local_description = None;
            }
            _ => {}
        }

        self.update_signaling_state(new_state);
        self.start_gathering()?;
        self.maybe_start_checks()?;
        Ok(())
    }

    pub fn set_remote_description(&mut self, desc: RTCSessionDescription) -> Result<()> {
        self.check_not_closed()?;

        if desc.sdp_type == RTCSdpType::Rollback {
            return self.rollback();
        }

        let next = match desc.sdp_type {
            RTCSdpType::Offer => RTCSignalingState::HaveRemoteOffer,
            RTCSdpType::Answer => RTCSignalingState::Stable,
            RTCSdpType::Pranswer => RTCSignalingState::HaveRemotePranswer,
            _ => return Err(Error::ErrIncorrectSignalingState),
        };
        let new_state = check_next_signaling_state(
            self.signaling_state,
            next,
            StateChangeOp::SetRemote,
            desc.sdp_type,
        )?;

        let parsed = desc.unmarshal()?;

        // DTLS identity must be present and will be enforced in the handshake
        let remote_fingerprint = extract_fingerprint(&parsed)?;
        let (remote_ufrag, remote_pwd) = extract_ice_credentials(&parsed)?;

        // a credential change on an established session is an ICE restart
        if let Some((prev_ufrag, prev_pwd)) = &self.remote_ice_credentials {
            if *prev_ufrag != remote_ufrag || *prev_pwd != remote_pwd {
                info!("remote ICE credentials changed: restarting ICE");
                self.ice_agent.restart(String::new(), String::new(), true)?;
                self.checks_started = false;
            }
        }
        self.remote_ice_credentials = Some((remote_ufrag.clone(), remote_pwd.clone()));

        // decide the DTLS role from the remote setup attribute: a remote
        // that takes active makes us the server; passive or actpass remotes
        // leave the client side to us
        let role = match extract_setup(&parsed) {
            ::sdp::util::ConnectionRole::Active => DtlsRole::Server,
            _ => DtlsRole::Client,
        };
        self.configure_dtls(role, &remote_fingerprint)?;

        // walk the m-sections: synthesize transceivers, learn SSRCs, add
        // candidates
        let mut has_application = false;
        let mut remote_ssrcs: Vec<(String, Option<u32>, Option<u32>)> = vec![];
        for md in &parsed.media_descriptions {
            let info = parse_remote_media(md);
            if info.is_application {
                has_application = true;
            }

            if let (Some(mid), Some(kind)) = (info.mid.clone(), info.kind) {
                self.find_or_create_transceiver(&mid, kind, &info);
                remote_ssrcs.push((mid.clone(), info.ssrc, info.rtx_ssrc));
                if let Some(ssrc) = info.ssrc {
                    self.ssrc_routes.insert(ssrc, mid.clone());
                }
                if let Some(rtx_ssrc) = info.rtx_ssrc {
                    self.ssrc_routes.insert(rtx_ssrc, mid.clone());
                }
            }

            for candidate in &info.candidates {
                if let Err(err) = self.add_remote_candidate_str(candidate) {
                    warn!("discarding remote candidate from SDP: {err}");
                }
            }
        }

        if has_application && self.data_channels.is_empty() {
            self.emit(RTCPeerConnectionEvent::OnDataChannel(String::new()));
        }

        match desc.sdp_type {
            RTCSdpType::Offer | RTCSdpType::Pranswer => {
                self.pending_remote_description = Some(desc);
            }
            RTCSdpType::Answer => {
                self.current_remote_description = Some(desc);
                self.current_local_description = self.pending_local_description.take();
                self.pending_remote_description = None;
            }
            _ => {}
        }

        self.update_signaling_state(new_state);
        self.ice_agent
            .set_remote_credentials(remote_ufrag, remote_pwd)?;
        self.ensure_sessions(Instant::now())?;
        for (mid, ssrc, rtx_ssrc) in remote_ssrcs {
            if let Some(session) = self.rtp_sessions.get_mut(&mid) {
                session.set_remote_ssrcs(ssrc, rtx_ssrc);
            }
        }
        self.maybe_start_checks()?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.signaling_state == RTCSignalingState::Stable
            || self.signaling_state == RTCSignalingState::Closed
        {
            return Err(Error::ErrSignalingStateCannotRollback);
        }
        self.pending_local_description = None;
        self.pending_remote_description = None;
        self.update_signaling_state(RTCSignalingState::Stable);
        Ok(())
    }

    fn update_signaling_state(&mut self, next: RTCSignalingState) {
        if self.signaling_state != next {
            trace!("signaling state {} -> {}", self.signaling_state, next);
            self.signaling_state = next;
            self.emit(RTCPeerConnectionEvent::OnSignalingStateChange(next));
        }
    }

    fn configure_dtls(&mut self, role: DtlsRole, remote_fingerprint: &str) -> Result<()> {
        if self.transport.dtls_role != DtlsRole::Auto {
            return Ok(());
        }
        self.transport.dtls_role = role;

        let mut config =
            dtls::HandshakeConfig::new(self.certificate.dtls_certificate.clone());
        config.remote_fingerprint = Some(remote_fingerprint.to_owned());
        let config = Arc::new(config);

        match role {
            DtlsRole::Server => {
                self.transport.dtls_endpoint.set_server_config(Some(config));
            }
            _ => {
                self.dtls_client_config = Some(config);
            }
        }
        Ok(())
    }

    fn start_gathering(&mut self) -> Result<()> {
        if self.ice_gathering_state != RTCIceGatheringState::New {
            return Ok(());
        }
        self.set_gathering_state(RTCIceGatheringState::Gathering);

        // resolve the configured STUN servers; interface addresses come from
        // the host
        let mut stun_servers: Vec<SocketAddr> = vec![];
        for server in &self.configuration.ice_servers {
            for url in server.parse_urls()? {
                if url.is_turn() {
                    continue;
                }
                if let Ok(mut addrs) = (url.host.as_str(), url.port).to_socket_addrs() {
                    if let Some(addr) = addrs.find(|a| a.is_ipv4()) {
                        stun_servers.push(addr);
                    }
                }
            }
        }

        let local_addrs = self.configuration.local_addrs.clone();
        self.ice_agent.gather_candidates(&local_addrs, &stun_servers)
    }

    fn set_gathering_state(&mut self, state: RTCIceGatheringState) {
        if self.ice_gathering_state != state {
            self.ice_gathering_state = state;
            self.emit(RTCPeerConnectionEvent::OnIceGatheringStateChange(state));
        }
    }

    fn maybe_start_checks(&mut self) -> Result<()> {
        if self.checks_started
            || self.local_description().is_none()
            || self.remote_description().is_none()
        {
            return Ok(());
        }
        let Some((ufrag, pwd)) = self.remote_ice_credentials.clone() else {
            return Ok(());
        };

        // the offerer controls
        let is_controlling = self
            .local_description()
            .map(|d| d.sdp_type == RTCSdpType::Offer)
            .unwrap_or(false);

        self.checks_started = true;
        self.set_connection_state(RTCPeerConnectionState::Connecting);
        self.ice_agent
            .start_connectivity_checks(is_controlling, ufrag, pwd)
    }

    // --- candidates ------------------------------------------------------

    /// Adds a remote candidate received over signaling.
    pub fn add_ice_candidate(&mut self, candidate: RTCIceCandidateInit) -> Result<()> {
        self.check_not_closed()?;
        self.add_remote_candidate_str(&candidate.candidate)
    }

    fn add_remote_candidate_str(&mut self, raw: &str) -> Result<()> {
        let mut candidate = ice::candidate::unmarshal_candidate(raw)?;

        // `.local` hostnames resolve through the host's process-wide
        // resolver before the agent sees them
        if ice::mdns::is_mdns_hostname(&candidate.address) {
            match &self.configuration.mdns_resolver {
                Some(resolver) => match resolver.resolve(&candidate.address) {
                    Some(ip) => candidate.address = ip.to_string(),
                    None => return Err(Error::ErrMulticastDnsNotSupported),
                },
                None => return Err(Error::ErrMulticastDnsNotSupported),
            }
        }

        self.ice_agent.add_remote_candidate(candidate)
    }

    /// Restarts ICE: fresh credentials and a new gathering cycle, keeping
    /// transceivers and sessions intact.
    pub fn restart_ice(&mut self) -> Result<()> {
        self.check_not_closed()?;
        self.ice_agent.restart(String::new(), String::new(), true)?;
        self.remote_ice_credentials = None;
        self.checks_started = false;
        self.set_gathering_state(RTCIceGatheringState::New);
        Ok(())
    }

    // --- media send path -------------------------------------------------

    /// Installs (or replaces) a VP9 SVC layer filter on a forwarding MID.
    /// Narrowing selections wait for a keyframe before taking effect.
    pub fn set_preferred_layers(&mut self, mid: &str, max_spatial: u8, max_temporal: u8) {
        self.layer_filters
            .entry(mid.to_owned())
            .or_insert_with(|| Vp9LayerFilter::new(u8::MAX, u8::MAX))
            .select_layers(max_spatial, max_temporal);
    }

    /// Installs a filter from an SDP scalability mode string like `L2T3`.
    pub fn set_scalability_mode(&mut self, mid: &str, mode: &str) -> Result<()> {
        let mode = ScalabilityMode::parse(mode)?;
        self.layer_filters
            .insert(mid.to_owned(), Vp9LayerFilter::from_mode(mode));
        Ok(())
    }

    /// Forwarding counters of the layer filter on `mid`, when one exists.
    pub fn layer_filter_stats(&self, mid: &str) -> Option<LayerFilterStats> {
        self.layer_filters.get(mid).map(|f| f.stats())
    }

    /// Forwards a pre-formed RTP packet on the given MID: layer-filtered,
    /// offsets applied, extensions rewritten, SRTP protected and queued for
    /// the wire.
    pub fn write_rtp(&mut self, mid: &str, packet: &rtp::Packet) -> Result<()> {
        self.check_not_closed()?;
        if !self.transport.has_srtp() {
            return Err(Error::ErrNoSuchSrtpProfile);
        }

        if let Some(filter) = self.layer_filters.get_mut(mid) {
            if !filter.filter(&packet.payload) {
                return Ok(());
            }
        }

        self.twcc_send_seq = self.twcc_send_seq.wrapping_add(1);
        let abs_send_time = ((self.epoch.ntp(Instant::now()) >> 14) & 0xFFFFFF) as u32;
        let extensions = ForwardExtensions {
            mid_id: Some(MID_EXTENSION_ID),
            abs_send_time: Some((ABS_SEND_TIME_EXTENSION_ID, abs_send_time)),
            transport_cc: Some((TRANSPORT_CC_EXTENSION_ID, self.twcc_send_seq)),
        };

        let session = self
            .rtp_sessions
            .get_mut(mid)
            .ok_or(Error::ErrCodecNotFound)?;
        let out = session.forward_rtp(packet, extensions)?;
        let plaintext = out.marshal()?;
        self.send_srtp(&plaintext)
    }

    fn send_srtp(&mut self, plaintext_rtp: &[u8]) -> Result<()> {
        let protected = self.transport.encrypt_rtp(plaintext_rtp)?;
        self.queue_to_selected(protected.as_ref());
        Ok(())
    }

    fn send_srtcp(&mut self, packets: &[rtcp::Packet]) -> Result<()> {
        if !self.transport.has_srtp() {
            return Ok(());
        }
        let compound = rtcp::packet::marshal_compound(packets)?;
        let protected = self.transport.encrypt_rtcp(&compound)?;
        self.queue_to_selected(protected.as_ref());
        Ok(())
    }

    fn queue_to_selected(&mut self, payload: &[u8]) {
        let Some(transport) = self
            .ice_agent
            .selected_transport()
            .or(self.selected_remote)
        else {
            trace!("no selected pair; dropping outbound payload");
            return;
        };
        self.write_outs.push_back(TransportMessage {
            now: Instant::now(),
            transport,
            message: BytesMut::from(payload),
        });
    }

    // --- stats / teardown ------------------------------------------------

    pub fn get_stats(&self) -> RTCStatsReport {
        RTCStatsReport {
            sessions: self.rtp_sessions.values().map(|s| s.stats()).collect(),
            selected_candidate_pair: self
                .ice_agent
                .get_selected_candidate_pair()
                .map(|(l, r)| (l.to_string(), r.to_string())),
            round_trip_time: None,
        }
    }

    /// Gracefully shuts the connection down: BYEs best-effort, DTLS
    /// close_notify, ICE teardown, and a final Closed state event. All
    /// timers die with the state they lived in.
    pub fn do_close(&mut self) -> Result<()> {
        if self.is_closed {
            return Ok(());
        }

        // best-effort BYE per session before keys go away
        let mids: Vec<String> = self.rtp_sessions.keys().cloned().collect();
        for mid in mids {
            if let Some(session) = self.rtp_sessions.get_mut(&mid) {
                let (compound, _) = session.close("teardown");
                let _ = self.send_srtcp(&compound);
            }
        }

        if let Some(remote) = self.selected_remote {
            self.transport
                .dtls_endpoint
                .close(remote.local_addr, remote.peer_addr);
            while let Some(t) = self.transport.dtls_endpoint.poll_transmit() {
                self.write_outs.push_back(t);
            }
        }

        for dc in &mut self.data_channels {
            dc.set_closed();
        }

        self.ice_agent.close()?;
        self.signaling_state = RTCSignalingState::Closed;
        self.set_connection_state(RTCPeerConnectionState::Closed);
        self.is_closed = true;
        Ok(())
    }

    fn set_connection_state(&mut self, state: RTCPeerConnectionState) {
        if self.connection_state != state {
            info!("connection state {} -> {}", self.connection_state, state);
            self.connection_state = state;
            self.emit(RTCPeerConnectionEvent::OnConnectionStateChange(state));
        }
    }

    // --- inbound dispatch ------------------------------------------------

    fn handle_stun(&mut self, msg: TaggedBytesMut) {
        if let Err(err) = self.ice_agent.handle_read(msg) {
            trace!("discarded inbound STUN: {err}");
        }
        self.drain_ice();
    }

    fn handle_dtls(&mut self, msg: TaggedBytesMut) {
        let remote = msg.transport;
        match self.transport.dtls_endpoint.read(msg) {
            Ok(events) => {
                for event in events {
                    match event {
                        dtls::EndpointEvent::HandshakeComplete => {
                            self.on_dtls_connected(remote);
                        }
                        dtls::EndpointEvent::ApplicationData(data) => {
                            self.read_outs
                                .push_back(RTCMessage::DataChannelMessage(data));
                        }
                    }
                }
            }
            Err(err) => {
                // handshake failures close the transport and fail the
                // connection; stray packets are dropped quietly
                if matches!(err, Error::ErrAlertFatalOrClose | Error::ErrHandshakeTimeout) {
                    warn!("DTLS failure: {err}");
                    self.set_connection_state(RTCPeerConnectionState::Failed);
                } else {
                    debug!("discarded inbound DTLS: {err}");
                }
            }
        }
        while let Some(t) = self.transport.dtls_endpoint.poll_transmit() {
            self.write_outs.push_back(t);
        }
    }

    fn on_dtls_connected(&mut self, remote: TransportContext) {
        let Some(state) = self
            .transport
            .dtls_endpoint
            .get_connection_state(remote.peer_addr)
        else {
            return;
        };

        let is_client = state.is_client();
        match state.export_srtp_keying_material() {
            Ok((profile, keys)) => {
                if let Err(err) = self.transport.install_srtp_keys(profile, &keys, is_client) {
                    warn!("failed to key SRTP: {err}");
                    self.set_connection_state(RTCPeerConnectionState::Failed);
                    return;
                }
            }
            Err(err) => {
                warn!("failed to export SRTP keying material: {err}");
                self.set_connection_state(RTCPeerConnectionState::Failed);
                return;
            }
        }

        self.dtls_connected = true;
        self.selected_remote = Some(remote);

        // even stream ids for the DTLS client side, odd for the server
        let id_base = if is_client { 0u16 } else { 1u16 };
        for (i, dc) in self.data_channels.iter_mut().enumerate() {
            dc.set_open(id_base + i as u16 * 2);
        }

        self.refresh_connection_state();
    }

    fn refresh_connection_state(&mut self) {
        if self.is_closed {
            return;
        }
        let transport_state = self.transport.compose_state(
            self.ice_agent.state(),
            self.dtls_connected,
            self.is_closed,
        );
        let next = match transport_state {
            TransportState::New => RTCPeerConnectionState::New,
            TransportState::Connecting => RTCPeerConnectionState::Connecting,
            TransportState::Connected => RTCPeerConnectionState::Connected,
            TransportState::Disconnected => RTCPeerConnectionState::Disconnected,
            TransportState::Failed => RTCPeerConnectionState::Failed,
            TransportState::Closed => RTCPeerConnectionState::Closed,
        };
        // never regress below Connecting once signaling kicked off checks
        if next == RTCPeerConnectionState::New && self.checks_started {
            return;
        }
        self.set_connection_state(next);
    }

    fn handle_srtp(&mut self, msg: TaggedBytesMut) {
        let now = msg.now;
        let decrypted = match self.transport.decrypt_rtp(&msg.message) {
            Ok(d) => d,
            Err(err) => {
                // replay and authentication failures are always silent drops
                debug!("discarded inbound SRTP: {err}");
                return;
            }
        };
        let packet = match rtp::Packet::unmarshal(&decrypted) {
            Ok(p) => p,
            Err(err) => {
                debug!("discarded undecodable RTP: {err}");
                return;
            }
        };

        // transport-wide feedback bookkeeping
        if let Some(payload) = packet.header.get_extension(TRANSPORT_CC_EXTENSION_ID) {
            if let Some(seq) = parse_transport_cc_extension(&payload) {
                self.twcc_recorder.record(seq, now);
            }
        }

        let Some(mid) = self.route_inbound(&packet) else {
            debug!(
                "no route for inbound ssrc {:x}; dropping",
                packet.header.ssrc
            );
            return;
        };

        let Some(session) = self.rtp_sessions.get_mut(&mid) else {
            return;
        };
        let events = session.handle_rtp(packet, now);
        self.dispatch_jitter_events(&mid, events);
    }

    fn route_inbound(&mut self, packet: &rtp::Packet) -> Option<String> {
        // the sdes:mid header extension is authoritative
        if let Some(payload) = packet.header.get_extension(MID_EXTENSION_ID) {
            if let Ok(mid) = std::str::from_utf8(&payload) {
                let mid = mid.trim_end_matches('\0').to_owned();
                if self.rtp_sessions.contains_key(&mid) {
                    self.ssrc_routes.insert(packet.header.ssrc, mid.clone());
                    return Some(mid);
                }
            }
        }

        if let Some(mid) = self.ssrc_routes.get(&packet.header.ssrc) {
            return Some(mid.clone());
        }

        // a single negotiated session takes undeclared SSRCs
        if self.rtp_sessions.len() == 1 {
            let mid = self.rtp_sessions.keys().next().cloned();
            if let Some(mid) = &mid {
                self.ssrc_routes.insert(packet.header.ssrc, mid.clone());
            }
            return mid;
        }

        None
    }

    fn dispatch_jitter_events(&mut self, mid: &str, events: Vec<JitterBufferEvent>) {
        for event in events {
            match event {
                JitterBufferEvent::Packet(p) => {
                    self.read_outs
                        .push_back(RTCMessage::RtpPacket(mid.to_owned(), p));
                }
                JitterBufferEvent::PacketLoss { from, to } => {
                    trace!("mid {mid}: jitter buffer abandoned [{from}, {to})");
                }
            }
        }
    }

    fn handle_srtcp(&mut self, msg: TaggedBytesMut) {
        let now = msg.now;
        let decrypted = match self.transport.decrypt_rtcp(&msg.message) {
            Ok(d) => d,
            Err(err) => {
                debug!("discarded inbound SRTCP: {err}");
                return;
            }
        };
        let packets = match rtcp::packet::unmarshal_compound(&decrypted) {
            Ok(p) => p,
            Err(err) => {
                debug!("discarded undecodable RTCP: {err}");
                return;
            }
        };

        let mids: Vec<String> = self.rtp_sessions.keys().cloned().collect();
        for packet in &packets {
            for mid in &mids {
                let actions = {
                    let Some(session) = self.rtp_sessions.get_mut(mid) else {
                        continue;
                    };
                    session.handle_rtcp(packet, now)
                };
                for action in actions {
                    match action {
                        RtcpAction::Retransmit(packets) => {
                            for p in packets {
                                if let Ok(raw) = p.marshal() {
                                    let _ = self.send_srtp(&raw);
                                }
                            }
                        }
                        RtcpAction::KeyframeRequest => {
                            self.emit(RTCPeerConnectionEvent::OnKeyframeRequest {
                                mid: mid.clone(),
                            });
                        }
                        RtcpAction::ReceiverGone(ssrc) => {
                            self.ssrc_routes.remove(&ssrc);
                        }
                    }
                }
            }
        }
    }

    fn drain_ice(&mut self) {
        while let Some(t) = self.ice_agent.poll_transmit() {
            self.write_outs.push_back(t);
        }

        while let Some(event) = self.ice_agent.poll_event() {
            match event {
                ice::Event::ConnectionStateChange(state) => {
                    let next = RTCIceConnectionState::from(state);
                    if self.ice_connection_state != next {
                        self.ice_connection_state = next;
                        self.emit(RTCPeerConnectionEvent::OnIceConnectionStateChange(next));
                    }
                    self.refresh_connection_state();
                }
                ice::Event::GatheringStateChange(state) => {
                    let next = RTCIceGatheringState::from(state);
                    if next == RTCIceGatheringState::Complete {
                        self.emit(RTCPeerConnectionEvent::OnIceCandidate(None));
                    }
                    self.set_gathering_state(next);
                }
                ice::Event::CandidateGathered(candidate) => {
                    let init = RTCIceCandidateInit {
                        candidate: candidate.marshal(),
                        sdp_mid: Some(DATA_CHANNEL_MID.to_owned()),
                        sdp_mline_index: Some(0),
                        username_fragment: Some(
                            self.ice_agent.get_local_credentials().ufrag.clone(),
                        ),
                    };
                    self.emit(RTCPeerConnectionEvent::OnIceCandidate(Some(init)));
                }
                ice::Event::SelectedCandidatePairChange(_, _) => {
                    if let Some(transport) = self.ice_agent.selected_transport() {
                        self.selected_remote = Some(transport);
                        self.maybe_start_dtls(transport);
                    }
                    self.refresh_connection_state();
                }
            }
        }
    }

    fn maybe_start_dtls(&mut self, transport: TransportContext) {
        if self.dtls_started || self.transport.dtls_role != DtlsRole::Client {
            return;
        }
        let Some(config) = self.dtls_client_config.clone() else {
            return;
        };
        info!("starting DTLS handshake as client");
        self.dtls_started = true;
        if let Err(err) = self.transport.dtls_endpoint.connect(
            transport.local_addr,
            transport.peer_addr,
            config,
        ) {
            warn!("DTLS connect failed: {err}");
            self.set_connection_state(RTCPeerConnectionState::Failed);
        }
        while let Some(t) = self.transport.dtls_endpoint.poll_transmit() {
            self.write_outs.push_back(t);
        }
    }
}

impl Protocol<TaggedBytesMut, RTCMessage, ()> for RTCPeerConnection {
    type Rout = RTCMessage;
    type Wout = TaggedBytesMut;
    type Eout = RTCPeerConnectionEvent;
    type Error = Error;

    fn handle_read(&mut self, msg: TaggedBytesMut) -> Result<()> {
        if self.is_closed {
            return Err(Error::ErrConnectionClosed);
        }

        match classify(&msg.message) {
            Classified::Stun => self.handle_stun(msg),
            Classified::Dtls => self.handle_dtls(msg),
            Classified::Rtp => self.handle_srtp(msg),
            Classified::Rtcp => self.handle_srtcp(msg),
            Classified::Unknown => {
                trace!("discarded unclassifiable datagram");
            }
        }
        Ok(())
    }

    fn poll_read(&mut self) -> Option<RTCMessage> {
        self.read_outs.pop_front()
    }

    fn handle_write(&mut self, msg: RTCMessage) -> Result<()> {
        match msg {
            RTCMessage::RtpPacket(mid, packet) => self.write_rtp(&mid, &packet),
            RTCMessage::DataChannelMessage(data) => {
                let Some(remote) = self.selected_remote else {
                    return Err(Error::ErrDataChannelClosed);
                };
                self.transport.dtls_endpoint.write(
                    remote.local_addr,
                    remote.peer_addr,
                    &data,
                )?;
                while let Some(t) = self.transport.dtls_endpoint.poll_transmit() {
                    self.write_outs.push_back(t);
                }
                Ok(())
            }
        }
    }

    fn poll_write(&mut self) -> Option<TaggedBytesMut> {
        self.drain_ice();
        self.write_outs.pop_front()
    }

    fn poll_event(&mut self) -> Option<RTCPeerConnectionEvent> {
        self.events.pop_front()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if self.is_closed {
            return Ok(());
        }

        self.ice_agent.handle_timeout(now);
        self.drain_ice();

        if let Some(remote) = self.selected_remote {
            if let Err(err) =
                self.transport
                    .dtls_endpoint
                    .handle_timeout(remote.local_addr, remote.peer_addr, now)
            {
                warn!("DTLS handshake gave up: {err}");
                self.set_connection_state(RTCPeerConnectionState::Failed);
            }
            while let Some(t) = self.transport.dtls_endpoint.poll_transmit() {
                self.write_outs.push_back(t);
            }
        }

        // session timers: RTCP reports, NACK retries, jitter age-out
        let mids: Vec<String> = self.rtp_sessions.keys().cloned().collect();
        for mid in &mids {
            let (compound, nack, losses, jitter_events) = {
                let Some(session) = self.rtp_sessions.get_mut(mid) else {
                    continue;
                };
                let compound = session.poll_rtcp(now);
                let (nack, losses) = session.poll_nack(now);
                let jitter_events = session.handle_jitter_timeout(now);
                (compound, nack, losses, jitter_events)
            };

            if let Some(compound) = compound {
                let _ = self.send_srtcp(&compound);
            }
            if let Some(nack) = nack {
                let _ = self.send_srtcp_feedback(rtcp::Packet::TransportLayerNack(nack));
            }
            for loss in losses {
                self.emit(RTCPeerConnectionEvent::OnReceiverPermanentLoss {
                    mid: mid.clone(),
                    from: loss.from,
                    to: loss.to,
                });
            }
            self.dispatch_jitter_events(mid, jitter_events);
        }

        // transport-wide congestion feedback
        let twcc_ssrc = self
            .rtp_sessions
            .values()
            .next()
            .map(|s| (s.ssrc(), s.config().remote_ssrc.unwrap_or(0)));
        if let Some((sender_ssrc, media_ssrc)) = twcc_ssrc {
            if let Some(feedback) = self.twcc_recorder.poll(now, sender_ssrc, media_ssrc) {
                let _ = self.send_srtcp_feedback(rtcp::Packet::TransportLayerCc(feedback));
            }
        }

        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Instant> {
        if self.is_closed {
            return None;
        }

        let mut eto: Option<Instant> = None;
        let mut update = |t: Option<Instant>| {
            if let Some(t) = t {
                eto = Some(eto.map_or(t, |curr| curr.min(t)));
            }
        };

        update(self.ice_agent.poll_timeout());
        if let Some(remote) = self.selected_remote {
            update(self.transport.dtls_endpoint.poll_timeout(remote.peer_addr));
        }
        for session in self.rtp_sessions.values() {
            update(session.poll_timeout());
        }
        update(self.twcc_recorder.poll_timeout());
        eto
    }

    fn close(&mut self) -> Result<()> {
        self.do_close()
    }
}

impl RTCPeerConnection {
    /// Feedback packets travel alone, prefixed by an empty receiver report
    /// to satisfy the compound rules.
    fn send_srtcp_feedback(&mut self, feedback: rtcp::Packet) -> Result<()> {
        let ssrc = self
            .rtp_sessions
            .values()
            .next()
            .map(|s| s.ssrc())
            .unwrap_or(0);
        self.send_srtcp(&[
            rtcp::Packet::ReceiverReport(rtcp::receiver_report::ReceiverReport {
                ssrc,
                reports: vec![],
            }),
            feedback,
        ])
    }
}

use bytes::BytesMut;

use crate::media_stream::MediaStreamTrack;
use crate::peer_connection::state::{
    RTCIceConnectionState, RTCIceGatheringState, RTCPeerConnectionState, RTCSignalingState,
};
use crate::rtp_transceiver::rtp_codec::RtpCodecKind;

/// A trickled ICE candidate, ready for the signaling channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RTCIceCandidateInit {
    /// The candidate attribute value (without the `candidate:` prefix).
    pub candidate: String,
    pub sdp_mid: Option<String>,
    /// The m-line index, meaningful when bundling is disabled.
    pub sdp_mline_index: Option<u16>,
    pub username_fragment: Option<String>,
}

/// A new inbound media stream was negotiated or appeared on the wire.
#[derive(Debug, Clone)]
pub struct RTCTrackEvent {
    pub mid: String,
    pub kind: RtpCodecKind,
    pub track: MediaStreamTrack,
}

/// Everything a peer connection tells its application, drained via
/// `poll_event`. Emission stops permanently once the connection closed.
pub enum RTCPeerConnectionEvent {
    OnSignalingStateChange(RTCSignalingState),
    OnConnectionStateChange(RTCPeerConnectionState),
    OnIceConnectionStateChange(RTCIceConnectionState),
    OnIceGatheringStateChange(RTCIceGatheringState),
    /// A gathered candidate, or None for end-of-candidates.
    OnIceCandidate(Option<RTCIceCandidateInit>),
    OnTrack(RTCTrackEvent),
    /// The remote negotiated a data channel (label).
    OnDataChannel(String),
    /// NACK retries were exhausted for `[from, to]` on this MID; packets in
    /// the range are permanently lost. Observability, not an error.
    OnReceiverPermanentLoss { mid: String, from: u16, to: u16 },
    /// The remote asked for a keyframe (PLI/FIR) on this MID.
    OnKeyframeRequest { mid: String },
}

/// What `poll_read` hands to the application.
pub enum RTCMessage {
    /// An in-order, depacketized RTP packet for the given MID.
    RtpPacket(String, rtp::Packet),
    /// Application data from the DTLS stream (SCTP payload for the
    /// embedding host's data channel stack).
    DataChannelMessage(BytesMut),
}

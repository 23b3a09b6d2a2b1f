pub mod direction;
pub mod rtp_codec;

use crate::media_stream::track::MediaStreamTrack;
use direction::RTCRtpTransceiverDirection;
use rtp_codec::{RTCRtpCodecCapability, RtpCodecKind};

/// RTCRtpTransceiver represents a permanent pairing of a sender and a
/// receiver bound to one m-section. Transceivers are never removed; stopping
/// one sets its direction to inactive so m-line indices stay aligned.
pub struct RTCRtpTransceiver {
    /// The MID negotiated for this transceiver; None until negotiation
    /// assigns one.
    pub mid: Option<String>,
    pub kind: RtpCodecKind,
    pub direction: RTCRtpTransceiverDirection,
    /// The direction the remote description granted, if any.
    pub current_direction: Option<RTCRtpTransceiverDirection>,

    /// The local track fed into the sender half, if any.
    pub sender_track: Option<MediaStreamTrack>,
    /// The remote track synthesized for the receiver half, if any.
    pub receiver_track: Option<MediaStreamTrack>,

    /// Codec capabilities this transceiver offers, in preference order.
    pub codecs: Vec<RTCRtpCodecCapability>,

    pub(crate) stopped: bool,
}

impl RTCRtpTransceiver {
    pub fn new(
        kind: RtpCodecKind,
        direction: RTCRtpTransceiverDirection,
        codecs: Vec<RTCRtpCodecCapability>,
    ) -> Self {
        RTCRtpTransceiver {
            mid: None,
            kind,
            direction,
            current_direction: None,
            sender_track: None,
            receiver_track: None,
            codecs,
            stopped: false,
        }
    }

    /// Stopping never removes the transceiver; it goes inactive and keeps
    /// its MID so m-line indices stay stable.
    pub fn stop(&mut self) {
        self.stopped = true;
        self.direction = RTCRtpTransceiverDirection::Inactive;
    }

    pub fn stopped(&self) -> bool {
        self.stopped
    }
}

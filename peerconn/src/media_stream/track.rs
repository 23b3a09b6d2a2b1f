use std::fmt;

use crate::media_stream::track_settings::{
    MediaTrackCapabilities, MediaTrackConstraints, MediaTrackSettings,
};
use crate::rtp_transceiver::rtp_codec::RtpCodecKind;
use shared::util::math_rand_alpha_number;

/// The lifecycle state of a track.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum MediaStreamTrackState {
    #[default]
    Live,
    Ended,
}

impl fmt::Display for MediaStreamTrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaStreamTrackState::Live => write!(f, "live"),
            MediaStreamTrackState::Ended => write!(f, "ended"),
        }
    }
}

/// MediaStreamTrack is the W3C-shaped handle for one source or sink of
/// media. The engine moves RTP payloads; encoding and decoding live outside.
#[derive(Debug, Clone)]
pub struct MediaStreamTrack {
    pub id: String,
    pub kind: RtpCodecKind,
    pub label: String,
    /// Restriction identifier for simulcast layers, when present.
    pub rid: Option<String>,
    pub enabled: bool,
    pub muted: bool,
    pub(crate) ready_state: MediaStreamTrackState,

    pub settings: MediaTrackSettings,
    pub capabilities: MediaTrackCapabilities,
    pub constraints: MediaTrackConstraints,
}

impl MediaStreamTrack {
    pub fn new(kind: RtpCodecKind, label: &str) -> Self {
        MediaStreamTrack {
            id: math_rand_alpha_number(16),
            kind,
            label: label.to_owned(),
            rid: None,
            enabled: true,
            muted: false,
            ready_state: MediaStreamTrackState::Live,
            settings: MediaTrackSettings::default(),
            capabilities: MediaTrackCapabilities::default(),
            constraints: MediaTrackConstraints::default(),
        }
    }

    /// A remote track synthesized for an inbound stream; `rid` is set for
    /// simulcast layers when first seen.
    pub(crate) fn new_remote(kind: RtpCodecKind, mid: &str, rid: Option<String>) -> Self {
        let mut track = MediaStreamTrack::new(kind, &format!("remote-{mid}"));
        track.rid = rid;
        track.muted = true; // unmuted on first media
        track
    }

    pub fn ready_state(&self) -> MediaStreamTrackState {
        self.ready_state
    }

    /// Stops the track permanently.
    pub fn stop(&mut self) {
        self.ready_state = MediaStreamTrackState::Ended;
    }
}

#[cfg(test)]
mod track_test {
    use super::*;

    #[test]
    fn test_track_defaults() {
        let t = MediaStreamTrack::new(RtpCodecKind::Audio, "mic");
        assert!(t.enabled);
        assert!(!t.muted);
        assert_eq!(t.ready_state(), MediaStreamTrackState::Live);
        assert_eq!(t.kind, RtpCodecKind::Audio);
        assert!(t.rid.is_none());
    }

    #[test]
    fn test_stop_is_permanent() {
        let mut t = MediaStreamTrack::new(RtpCodecKind::Video, "cam");
        t.stop();
        assert_eq!(t.ready_state(), MediaStreamTrackState::Ended);
    }

    #[test]
    fn test_remote_track_starts_muted() {
        let t = MediaStreamTrack::new_remote(RtpCodecKind::Video, "2", Some("hi".to_owned()));
        assert!(t.muted);
        assert_eq!(t.rid.as_deref(), Some("hi"));
    }
}

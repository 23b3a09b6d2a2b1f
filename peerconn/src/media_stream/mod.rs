pub mod track;
pub mod track_settings;

pub use track::MediaStreamTrack;
pub use track_settings::{MediaTrackCapabilities, MediaTrackConstraints, MediaTrackSettings};

use std::fmt;

/// Progress of local ICE candidate gathering.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCIceGatheringState {
    Unspecified,
    #[default]
    New,
    Gathering,
    Complete,
}

impl fmt::Display for RTCIceGatheringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RTCIceGatheringState::Unspecified => "Unspecified",
            RTCIceGatheringState::New => "new",
            RTCIceGatheringState::Gathering => "gathering",
            RTCIceGatheringState::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

impl From<ice::state::GatheringState> for RTCIceGatheringState {
    fn from(state: ice::state::GatheringState) -> Self {
        match state {
            ice::state::GatheringState::New => RTCIceGatheringState::New,
            ice::state::GatheringState::Gathering => RTCIceGatheringState::Gathering,
            ice::state::GatheringState::Complete => RTCIceGatheringState::Complete,
        }
    }
}

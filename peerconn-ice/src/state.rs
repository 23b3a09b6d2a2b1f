use serde::Serialize;
use std::fmt;

/// ConnectionState is the overall state of the ICE agent and its connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub enum ConnectionState {
    #[serde(rename = "unspecified")]
    Unspecified,

    /// The agent is gathering addresses or waiting for remote candidates.
    #[default]
    #[serde(rename = "new")]
    New,

    /// The agent has been given local and remote candidates and is attempting
    /// to find a match.
    #[serde(rename = "checking")]
    Checking,

    /// The agent has a pairing but is still checking other pairs.
    #[serde(rename = "connected")]
    Connected,

    /// The agent has finished checking.
    #[serde(rename = "completed")]
    Completed,

    /// The agent has not received a response to checks recently.
    #[serde(rename = "disconnected")]
    Disconnected,

    /// The agent has finished and failed to find a connection.
    #[serde(rename = "failed")]
    Failed,

    /// The agent has finished and has shut down.
    #[serde(rename = "closed")]
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Unspecified => "Unspecified",
            ConnectionState::New => "New",
            ConnectionState::Checking => "Checking",
            ConnectionState::Connected => "Connected",
            ConnectionState::Completed => "Completed",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Failed => "Failed",
            ConnectionState::Closed => "Closed",
        };
        write!(f, "{s}")
    }
}

/// GatheringState describes the progress of local candidate gathering.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub enum GatheringState {
    #[default]
    #[serde(rename = "new")]
    New,
    #[serde(rename = "gathering")]
    Gathering,
    #[serde(rename = "complete")]
    Complete,
}

impl fmt::Display for GatheringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GatheringState::New => "new",
            GatheringState::Gathering => "gathering",
            GatheringState::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

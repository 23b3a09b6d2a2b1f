//! The data channel handle. The SCTP association itself is an external
//! collaborator; this module owns the negotiated surface (label, id, the
//! m=application section) and the handle lifecycle.

use shared::error::{Error, Result};
use std::fmt;

/// The SCTP port announced in `a=sctp-port`.
pub const SCTP_PORT: u16 = 5000;
/// The MID reserved for the data channel m-section.
pub const DATA_CHANNEL_MID: &str = "0";

/// Options accepted by create_data_channel.
#[derive(Debug, Clone, Default)]
pub struct RTCDataChannelInit {
    pub ordered: Option<bool>,
    pub max_retransmits: Option<u16>,
    pub max_packet_life_time: Option<u16>,
    pub protocol: String,
    pub negotiated: Option<u16>,
}

/// The lifecycle of a channel handle. A channel created before negotiation
/// starts out pending and transitions to open internally; the handle
/// contract is identical in both phases.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RTCDataChannelState {
    /// Negotiation or transport establishment still in progress.
    #[default]
    Pending,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for RTCDataChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RTCDataChannelState::Pending => "pending",
            RTCDataChannelState::Open => "open",
            RTCDataChannelState::Closing => "closing",
            RTCDataChannelState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// RTCDataChannel is a single handle that starts pending and becomes open
/// once the transport is up; no separate proxy type exists for the
/// pre-negotiation phase.
pub struct RTCDataChannel {
    pub label: String,
    pub protocol: String,
    /// The stream id; assigned at negotiation, even for the offerer.
    pub id: Option<u16>,
    pub ordered: bool,
    pub max_retransmits: Option<u16>,
    pub max_packet_life_time: Option<u16>,
    state: RTCDataChannelState,
}

impl RTCDataChannel {
    pub(crate) fn new(label: &str, options: RTCDataChannelInit) -> Self {
        RTCDataChannel {
            label: label.to_owned(),
            protocol: options.protocol,
            id: options.negotiated,
            ordered: options.ordered.unwrap_or(true),
            max_retransmits: options.max_retransmits,
            max_packet_life_time: options.max_packet_life_time,
            state: RTCDataChannelState::Pending,
        }
    }

    pub fn ready_state(&self) -> RTCDataChannelState {
        self.state
    }

    pub(crate) fn set_open(&mut self, id: u16) {
        if self.state == RTCDataChannelState::Pending {
            self.id.get_or_insert(id);
            self.state = RTCDataChannelState::Open;
        }
    }

    pub(crate) fn set_closed(&mut self) {
        self.state = RTCDataChannelState::Closed;
    }

    /// Queues application data; fails until the channel opened and after it
    /// closed. The payload transport over SCTP is delegated to the
    /// embedding host via the DTLS application stream.
    pub fn ensure_sendable(&self) -> Result<()> {
        match self.state {
            RTCDataChannelState::Open => Ok(()),
            _ => Err(Error::ErrDataChannelClosed),
        }
    }
}

#[cfg(test)]
mod data_channel_test {
    use super::*;

    #[test]
    fn test_pending_to_open_single_handle() {
        let mut dc = RTCDataChannel::new("chat", RTCDataChannelInit::default());
        assert_eq!(dc.ready_state(), RTCDataChannelState::Pending);
        assert!(dc.ensure_sendable().is_err());

        dc.set_open(1);
        assert_eq!(dc.ready_state(), RTCDataChannelState::Open);
        assert_eq!(dc.id, Some(1));
        assert!(dc.ensure_sendable().is_ok());

        dc.set_closed();
        assert_eq!(dc.ensure_sendable(), Err(Error::ErrDataChannelClosed));
    }

    #[test]
    fn test_negotiated_id_preserved() {
        let mut dc = RTCDataChannel::new(
            "telemetry",
            RTCDataChannelInit {
                negotiated: Some(7),
                ..Default::default()
            },
        );
        dc.set_open(1);
        assert_eq!(dc.id, Some(7));
    }
}

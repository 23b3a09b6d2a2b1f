//! Receiver-side gap tracking and NACK scheduling.

use rtcp::transport_feedbacks::transport_layer_nack::{
    nack_pairs_from_sequence_numbers, TransportLayerNack,
};
use rtp::sequence::seq_gt;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// How often an outstanding NACK is re-sent.
pub const NACK_RETRY_INTERVAL: Duration = Duration::from_millis(5);
/// How many times a missing packet is NACKed before it is given up on.
pub const NACK_MAX_RETRIES: u8 = 10;

struct MissingPacket {
    retries: u8,
    next_nack_at: Instant,
}

/// A sequence range `[from, to]` the receiver has given up on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PermanentLoss {
    pub from: u16,
    pub to: u16,
}

/// NackGenerator watches the inbound sequence number flow of one SSRC,
/// requests retransmission of holes and reports permanent losses once the
/// retry budget is exhausted.
#[derive(Default)]
pub struct NackGenerator {
    last_seq: Option<u16>,
    /// Missing sequence numbers, keyed for deterministic NACK ordering.
    missing: BTreeMap<u16, MissingPacket>,
}

impl NackGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes an arrived packet; new gaps behind it start their NACK
    /// schedule immediately.
    pub fn packet_received(&mut self, seq: u16, now: Instant) {
        match self.last_seq {
            None => {
                self.last_seq = Some(seq);
            }
            Some(last) => {
                if seq_gt(seq, last) {
                    let mut gap = last.wrapping_add(1);
                    while gap != seq {
                        self.missing.insert(
                            gap,
                            MissingPacket {
                                retries: 0,
                                next_nack_at: now,
                            },
                        );
                        gap = gap.wrapping_add(1);
                    }
                    self.last_seq = Some(seq);
                } else {
                    // a late arrival fills its hole
                    self.missing.remove(&seq);
                }
            }
        }
    }

    /// Builds the NACK feedback due at `now`, if any, and collects ranges
    /// whose retries ran out.
    pub fn poll(
        &mut self,
        now: Instant,
        sender_ssrc: u32,
        media_ssrc: u32,
    ) -> (Option<TransportLayerNack>, Vec<PermanentLoss>) {
        let mut due = vec![];
        let mut exhausted = vec![];

        for (&seq, state) in self.missing.iter_mut() {
            if now < state.next_nack_at {
                continue;
            }
            if state.retries >= NACK_MAX_RETRIES {
                exhausted.push(seq);
                continue;
            }
            state.retries += 1;
            state.next_nack_at = now + NACK_RETRY_INTERVAL;
            due.push(seq);
        }

        for seq in &exhausted {
            self.missing.remove(seq);
        }

        let nack = if due.is_empty() {
            None
        } else {
            Some(TransportLayerNack {
                sender_ssrc,
                media_ssrc,
                nacks: nack_pairs_from_sequence_numbers(&due),
            })
        };

        (nack, coalesce_ranges(&exhausted))
    }

    /// The next instant a retry is due.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.missing.values().map(|m| m.next_nack_at).min()
    }

    pub fn missing_len(&self) -> usize {
        self.missing.len()
    }
}

fn coalesce_ranges(seqs: &[u16]) -> Vec<PermanentLoss> {
    let mut out: Vec<PermanentLoss> = vec![];
    for &seq in seqs {
        match out.last_mut() {
            Some(range) if range.to.wrapping_add(1) == seq => range.to = seq,
            _ => out.push(PermanentLoss { from: seq, to: seq }),
        }
    }
    out
}

#[cfg(test)]
mod nack_test {
    use super::*;

    #[test]
    fn test_gap_detection_and_nack() {
        let mut gen = NackGenerator::new();
        let now = Instant::now();
        gen.packet_received(100, now);
        gen.packet_received(104, now);
        assert_eq!(gen.missing_len(), 3);

        let (nack, lost) = gen.poll(now, 1, 2);
        let nack = nack.expect("nack due");
        assert!(lost.is_empty());
        assert_eq!(nack.nacks.len(), 1);
        assert_eq!(nack.nacks[0].packet_list(), vec![101, 102, 103]);
    }

    #[test]
    fn test_late_arrival_cancels_nack() {
        let mut gen = NackGenerator::new();
        let now = Instant::now();
        gen.packet_received(10, now);
        gen.packet_received(12, now);
        gen.packet_received(11, now);
        assert_eq!(gen.missing_len(), 0);
        assert!(gen.poll(now, 1, 2).0.is_none());
    }

    #[test]
    fn test_retry_schedule_and_permanent_loss() {
        let mut gen = NackGenerator::new();
        let mut now = Instant::now();
        gen.packet_received(5, now);
        gen.packet_received(7, now);

        for i in 0..NACK_MAX_RETRIES {
            let (nack, lost) = gen.poll(now, 1, 2);
            assert!(nack.is_some(), "retry {i} should produce a NACK");
            assert!(lost.is_empty());
            now += NACK_RETRY_INTERVAL;
        }

        // the retry budget is spent: next poll reports permanent loss
        let (nack, lost) = gen.poll(now, 1, 2);
        assert!(nack.is_none());
        assert_eq!(lost, vec![PermanentLoss { from: 6, to: 6 }]);
        assert_eq!(gen.missing_len(), 0);
    }

    #[test]
    fn test_loss_range_coalescing() {
        assert_eq!(
            coalesce_ranges(&[3, 4, 5, 9, 10, 20]),
            vec![
                PermanentLoss { from: 3, to: 5 },
                PermanentLoss { from: 9, to: 10 },
                PermanentLoss { from: 20, to: 20 },
            ]
        );
    }

    #[test]
    fn test_not_due_before_interval() {
        let mut gen = NackGenerator::new();
        let now = Instant::now();
        gen.packet_received(1, now);
        gen.packet_received(3, now);

        let (first, _) = gen.poll(now, 1, 2);
        assert!(first.is_some());
        // immediately after, the retry is not due yet
        let (second, _) = gen.poll(now + Duration::from_millis(1), 1, 2);
        assert!(second.is_none());
    }
}

//! Reorders an RTP stream, detecting and reporting losses it gives up on.

use rtp::sequence::{seq_gt, timestamp_gt};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Hard cap on buffered out-of-order packets; the newest packet is dropped
/// beyond it.
const DEFAULT_CAPACITY: usize = 512;

/// What the buffer hands back to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JitterBufferEvent {
    /// An in-order packet, ready for the application.
    Packet(rtp::Packet),
    /// The half-open gap `[from, to)` was abandoned; those sequence numbers
    /// will never be delivered.
    PacketLoss { from: u16, to: u16 },
}

struct Entry {
    packet: rtp::Packet,
    inserted_at: Instant,
}

/// JitterBuffer delivers packets of one receive stream in strictly
/// increasing sequence order, holding out-of-order arrivals back until
/// either the gap fills or the latency budget runs out.
pub struct JitterBuffer {
    latency: Duration,
    clock_rate: u32,
    capacity: usize,

    /// The last sequence number handed to the consumer.
    present_seq: Option<u16>,
    /// The newest RTP timestamp observed, for timestamp-based age-out.
    newest_timestamp: Option<u32>,

    /// Out-of-order packets waiting for their gap to fill, keyed by
    /// sequence number.
    buffered: HashMap<u16, Entry>,
}

impl JitterBuffer {
    pub fn new(latency_ms: u64, clock_rate: u32) -> Self {
        JitterBuffer {
            latency: Duration::from_millis(latency_ms),
            clock_rate,
            capacity: DEFAULT_CAPACITY,
            present_seq: None,
            newest_timestamp: None,
            buffered: HashMap::new(),
        }
    }

    /// The buffered sequence number closest after present_seq, honoring
    /// 16-bit wraparound.
    fn oldest_buffered(&self) -> Option<u16> {
        let present = self.present_seq?;
        self.buffered
            .keys()
            .copied()
            .min_by_key(|seq| seq.wrapping_sub(present))
    }

    /// Feeds one packet; returns everything that became deliverable.
    pub fn push(&mut self, packet: rtp::Packet, now: Instant) -> Vec<JitterBufferEvent> {
        let mut events = vec![];
        let seq = packet.header.sequence_number;
        let ts = packet.header.timestamp;

        match self.newest_timestamp {
            Some(newest) if !timestamp_gt(ts, newest) => {}
            _ => self.newest_timestamp = Some(ts),
        }

        match self.present_seq {
            None => {
                // The stream initializes on the first packet.
                self.present_seq = Some(seq);
                events.push(JitterBufferEvent::Packet(packet));
            }
            Some(present) => {
                if seq == present.wrapping_add(1) {
                    self.present_seq = Some(seq);
                    events.push(JitterBufferEvent::Packet(packet));
                } else if !seq_gt(seq, present) || self.buffered.contains_key(&seq) {
                    // duplicate or older than anything deliverable
                    return events;
                } else {
                    if self.buffered.len() >= self.capacity {
                        // overflow: drop the newest arrival
                        return events;
                    }
                    self.buffered.insert(
                        seq,
                        Entry {
                            packet,
                            inserted_at: now,
                        },
                    );
                }
            }
        }

        events.extend(self.drain_contiguous());
        events.extend(self.age_out_by_timestamp());
        events
    }

    /// Emits buffered packets that are now contiguous with present_seq.
    fn drain_contiguous(&mut self) -> Vec<JitterBufferEvent> {
        let mut events = vec![];
        while let Some(present) = self.present_seq {
            let next = present.wrapping_add(1);
            match self.buffered.remove(&next) {
                Some(entry) => {
                    self.present_seq = Some(next);
                    events.push(JitterBufferEvent::Packet(entry.packet));
                }
                None => break,
            }
        }
        events
    }

    /// Emits any buffered packet whose RTP timestamp lags the newest by more
    /// than the latency budget, abandoning the gap in front of it.
    fn age_out_by_timestamp(&mut self) -> Vec<JitterBufferEvent> {
        let Some(newest) = self.newest_timestamp else {
            return vec![];
        };
        let mut events = vec![];
        while let Some(seq) = self.oldest_buffered() {
            let ts = self.buffered[&seq].packet.header.timestamp;
            let elapsed_ticks = newest.wrapping_sub(ts) as u64;
            let elapsed_ms = elapsed_ticks * 1000 / self.clock_rate as u64;
            if elapsed_ms <= self.latency.as_millis() as u64 {
                break;
            }
            let entry = self.buffered.remove(&seq).expect("entry exists");
            events.extend(self.give_up_until(entry));
        }
        events
    }

    /// Abandons the gap in front of `entry`, emits it, and drains whatever
    /// became contiguous.
    fn give_up_until(&mut self, entry: Entry) -> Vec<JitterBufferEvent> {
        let mut events = vec![];
        let seq = entry.packet.header.sequence_number;
        if let Some(present) = self.present_seq {
            let from = present.wrapping_add(1);
            if from != seq {
                events.push(JitterBufferEvent::PacketLoss { from, to: seq });
            }
        }
        self.present_seq = Some(seq);
        events.push(JitterBufferEvent::Packet(entry.packet));
        events.extend(self.drain_contiguous());
        events
    }

    /// Wall-clock driven age-out: the oldest buffered packet is released
    /// (with its loss report) once it sat for longer than the latency.
    pub fn handle_timeout(&mut self, now: Instant) -> Vec<JitterBufferEvent> {
        let mut events = vec![];
        while let Some(seq) = self.oldest_buffered() {
            if now.duration_since(self.buffered[&seq].inserted_at) <= self.latency {
                break;
            }
            let entry = self.buffered.remove(&seq).expect("entry exists");
            events.extend(self.give_up_until(entry));
        }
        events
    }

    /// The instant the oldest buffered packet expires, if any.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.buffered
            .values()
            .map(|e| e.inserted_at + self.latency)
            .min()
    }

    /// End-of-stream: flushes everything left in sequence order.
    pub fn flush(&mut self) -> Vec<JitterBufferEvent> {
        let mut events = vec![];
        while let Some(seq) = self.oldest_buffered() {
            let entry = self.buffered.remove(&seq).expect("entry exists");
            events.extend(self.give_up_until(entry));
        }
        events
    }

    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }
}

#[cfg(test)]
mod jitter_test {
    use super::*;
    use bytes::Bytes;

    fn packet(seq: u16, ts: u32) -> rtp::Packet {
        rtp::Packet {
            header: rtp::Header {
                version: 2,
                payload_type: 96,
                sequence_number: seq,
                timestamp: ts,
                ssrc: 0x10,
                ..Default::default()
            },
            payload: Bytes::from_static(b"p"),
            padding_size: 0,
        }
    }

    fn seqs(events: &[JitterBufferEvent]) -> Vec<u16> {
        events
            .iter()
            .filter_map(|e| match e {
                JitterBufferEvent::Packet(p) => Some(p.header.sequence_number),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_in_order_passthrough() {
        let mut jb = JitterBuffer::new(200, 90000);
        let now = Instant::now();
        assert_eq!(seqs(&jb.push(packet(10, 0), now)), vec![10]);
        assert_eq!(seqs(&jb.push(packet(11, 3000), now)), vec![11]);
        assert_eq!(jb.buffered_len(), 0);
    }

    #[test]
    fn test_reorder_within_latency() {
        let mut jb = JitterBuffer::new(200, 90000);
        let now = Instant::now();
        assert_eq!(seqs(&jb.push(packet(10, 0), now)), vec![10]);
        assert!(jb.push(packet(12, 6000), now).is_empty());
        // the gap fills: 11 then 12 come out together
        assert_eq!(seqs(&jb.push(packet(11, 3000), now)), vec![11, 12]);
    }

    #[test]
    fn test_loss_reported_after_wall_clock_timeout() {
        // clock 90000, latency 200ms, seq [100,101,103,104]
        let mut jb = JitterBuffer::new(200, 90000);
        let t0 = Instant::now();
        assert_eq!(seqs(&jb.push(packet(100, 0), t0)), vec![100]);
        assert_eq!(seqs(&jb.push(packet(101, 3000), t0)), vec![101]);
        assert!(jb.push(packet(103, 9000), t0).is_empty());
        assert!(jb.push(packet(104, 12000), t0).is_empty());

        let events = jb.handle_timeout(t0 + Duration::from_millis(250));
        assert_eq!(
            events[0],
            JitterBufferEvent::PacketLoss { from: 102, to: 103 }
        );
        assert_eq!(seqs(&events), vec![103, 104]);
    }

    #[test]
    fn test_timestamp_age_out() {
        // a new packet far in the future releases stale buffered ones
        let mut jb = JitterBuffer::new(200, 90000);
        let now = Instant::now();
        jb.push(packet(50, 0), now);
        jb.push(packet(52, 3000), now);
        // 90000 ticks = 1s >> 200ms: 52 must be released with its gap
        let events = jb.push(packet(54, 93000), now);
        assert_eq!(
            events[0],
            JitterBufferEvent::PacketLoss { from: 51, to: 52 }
        );
        assert!(seqs(&events).contains(&52));
    }

    #[test]
    fn test_sequence_wraparound() {
        let mut jb = JitterBuffer::new(200, 90000);
        let now = Instant::now();
        assert_eq!(seqs(&jb.push(packet(65535, 0), now)), vec![65535]);
        assert_eq!(seqs(&jb.push(packet(0, 3000), now)), vec![0]);
        assert!(jb.push(packet(2, 9000), now).is_empty());
        assert_eq!(seqs(&jb.push(packet(1, 6000), now)), vec![1, 2]);
    }

    #[test]
    fn test_duplicate_and_old_dropped() {
        let mut jb = JitterBuffer::new(200, 90000);
        let now = Instant::now();
        jb.push(packet(10, 0), now);
        assert!(jb.push(packet(10, 0), now).is_empty());
        assert!(jb.push(packet(5, 0), now).is_empty());
    }

    #[test]
    fn test_flush_emits_in_order_with_losses() {
        let mut jb = JitterBuffer::new(200, 90000);
        let now = Instant::now();
        jb.push(packet(10, 0), now);
        jb.push(packet(13, 9000), now);
        jb.push(packet(15, 15000), now);

        let events = jb.flush();
        assert_eq!(
            events[0],
            JitterBufferEvent::PacketLoss { from: 11, to: 13 }
        );
        assert_eq!(
            events[2],
            JitterBufferEvent::PacketLoss { from: 14, to: 15 }
        );
        assert_eq!(seqs(&events), vec![13, 15]);
    }
}

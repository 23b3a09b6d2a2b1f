//! Produces transport-wide congestion control feedback from inbound packet
//! arrival times.

use std::time::{Duration, Instant};

use rtcp::transport_feedbacks::transport_layer_cc::{
    PacketStatusChunk, RecvDelta, SymbolType, TransportLayerCc,
};
use rtp::sequence::seq_gt;

/// How often feedback is emitted while packets keep arriving.
pub const TWCC_FEEDBACK_INTERVAL: Duration = Duration::from_millis(100);

/// The one-byte extension payload of a transport-wide sequence number.
pub fn parse_transport_cc_extension(payload: &[u8]) -> Option<u16> {
    if payload.len() < 2 {
        return None;
    }
    Some(u16::from_be_bytes([payload[0], payload[1]]))
}

struct Arrival {
    seq: u16,
    at: Instant,
}

/// TwccRecorder accumulates (transport-wide seq, arrival time) pairs and
/// periodically flushes them into a TransportLayerCc feedback packet.
pub struct TwccRecorder {
    epoch: Instant,
    arrivals: Vec<Arrival>,
    fb_pkt_count: u8,
    next_feedback_at: Instant,
}

impl TwccRecorder {
    pub fn new(now: Instant) -> Self {
        TwccRecorder {
            epoch: now,
            arrivals: vec![],
            fb_pkt_count: 0,
            next_feedback_at: now + TWCC_FEEDBACK_INTERVAL,
        }
    }

    pub fn record(&mut self, seq: u16, at: Instant) {
        self.arrivals.push(Arrival { seq, at });
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        (!self.arrivals.is_empty()).then_some(self.next_feedback_at)
    }

    /// Builds the feedback due at `now`, if any arrivals are pending.
    pub fn poll(&mut self, now: Instant, sender_ssrc: u32, media_ssrc: u32) -> Option<TransportLayerCc> {
        if now < self.next_feedback_at || self.arrivals.is_empty() {
            return None;
        }
        self.next_feedback_at = now + TWCC_FEEDBACK_INTERVAL;

        let mut arrivals = std::mem::take(&mut self.arrivals);
        arrivals.sort_by(|a, b| {
            if a.seq == b.seq {
                std::cmp::Ordering::Equal
            } else if seq_gt(b.seq, a.seq) {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Greater
            }
        });
        arrivals.dedup_by_key(|a| a.seq);

        let base_sequence_number = arrivals[0].seq;
        let span = arrivals
            .last()
            .expect("nonempty")
            .seq
            .wrapping_sub(base_sequence_number) as usize
            + 1;

        // reference time in 64ms units since the recorder epoch
        let first_arrival = arrivals[0].at;
        let reference_time =
            (first_arrival.duration_since(self.epoch).as_millis() as u64 / 64) as u32 & 0xFFFFFF;
        let reference_instant = self.epoch + Duration::from_millis(reference_time as u64 * 64);

        // walk the sequence span, marking received packets and their deltas
        let mut symbols = vec![SymbolType::NotReceived; span];
        let mut recv_deltas = vec![];
        let mut previous = reference_instant;
        for arrival in &arrivals {
            let offset = arrival.seq.wrapping_sub(base_sequence_number) as usize;
            let delta_us: i64 = if arrival.at >= previous {
                arrival.at.duration_since(previous).as_micros() as i64
            } else {
                -(previous.duration_since(arrival.at).as_micros() as i64)
            };
            let delta_units = delta_us / 250;
            let symbol = if (0..=255).contains(&delta_units) {
                SymbolType::ReceivedSmallDelta
            } else {
                SymbolType::ReceivedLargeDelta
            };
            symbols[offset] = symbol;
            recv_deltas.push(RecvDelta {
                type_tcc_packet: symbol,
                delta_us: delta_units * 250,
            });
            previous = arrival.at;
        }

        // run-length encode the symbol sequence
        let mut packet_chunks = vec![];
        let mut run_symbol = symbols[0];
        let mut run_length = 0u16;
        for symbol in &symbols {
            if *symbol == run_symbol && run_length < (1 << 13) - 1 {
                run_length += 1;
            } else {
                packet_chunks.push(PacketStatusChunk::RunLength {
                    symbol: run_symbol,
                    run_length,
                });
                run_symbol = *symbol;
                run_length = 1;
            }
        }
        packet_chunks.push(PacketStatusChunk::RunLength {
            symbol: run_symbol,
            run_length,
        });

        let feedback = TransportLayerCc {
            sender_ssrc,
            media_ssrc,
            base_sequence_number,
            packet_status_count: span as u16,
            reference_time,
            fb_pkt_count: self.fb_pkt_count,
            packet_chunks,
            recv_deltas,
        };
        self.fb_pkt_count = self.fb_pkt_count.wrapping_add(1);
        Some(feedback)
    }
}

#[cfg(test)]
mod twcc_test {
    use super::*;

    #[test]
    fn test_extension_parse() {
        assert_eq!(parse_transport_cc_extension(&[0x00, 0x2a]), Some(42));
        assert_eq!(parse_transport_cc_extension(&[0x01]), None);
    }

    #[test]
    fn test_feedback_covers_span_with_holes() {
        let t0 = Instant::now();
        let mut rec = TwccRecorder::new(t0);
        rec.record(10, t0 + Duration::from_millis(70));
        rec.record(11, t0 + Duration::from_millis(72));
        // 12 is lost
        rec.record(13, t0 + Duration::from_millis(80));

        let fb = rec
            .poll(t0 + TWCC_FEEDBACK_INTERVAL, 1, 2)
            .expect("feedback due");
        assert_eq!(fb.base_sequence_number, 10);
        assert_eq!(fb.packet_status_count, 4);
        assert_eq!(fb.recv_deltas.len(), 3);

        // the marshaled feedback must survive a round trip
        let raw = fb.marshal().expect("marshal");
        let parsed = TransportLayerCc::unmarshal(&raw).expect("unmarshal");
        assert_eq!(parsed.packet_status_count, 4);
        assert_eq!(parsed.recv_deltas.len(), 3);
    }

    #[test]
    fn test_no_feedback_before_interval() {
        let t0 = Instant::now();
        let mut rec = TwccRecorder::new(t0);
        rec.record(1, t0);
        assert!(rec.poll(t0 + Duration::from_millis(10), 1, 2).is_none());
    }

    #[test]
    fn test_fb_pkt_count_increments() {
        let t0 = Instant::now();
        let mut rec = TwccRecorder::new(t0);
        rec.record(1, t0);
        let a = rec.poll(t0 + TWCC_FEEDBACK_INTERVAL, 1, 2).unwrap();
        rec.record(2, t0 + TWCC_FEEDBACK_INTERVAL);
        let b = rec.poll(t0 + 2 * TWCC_FEEDBACK_INTERVAL, 1, 2).unwrap();
        assert_eq!(a.fb_pkt_count, 0);
        assert_eq!(b.fb_pkt_count, 1);
    }
}

#[cfg(test)]
mod session_test;

pub mod nack;
pub mod retransmission;
pub mod twcc;

use log::{debug, trace};
use shared::error::{Error, Result};
use shared::time::{ntp_to_middle_32, SystemInstant};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::jitter::{JitterBuffer, JitterBufferEvent};
use nack::{NackGenerator, PermanentLoss};
use retransmission::RetransmissionBuffer;

use rtcp::goodbye::Goodbye;
use rtcp::reception_report::ReceptionReport;
use rtcp::receiver_report::ReceiverReport;
use rtcp::sender_report::SenderReport;
use rtcp::source_description::SourceDescription;
use rtcp::transport_feedbacks::transport_layer_nack::TransportLayerNack;

/// The fixed RTCP reporting interval.
pub const RTCP_INTERVAL: Duration = Duration::from_secs(5);

/// Default latency budget of the receive-side jitter buffer.
pub const DEFAULT_JITTER_LATENCY_MS: u64 = 200;

/// Everything a session needs to know about its negotiated stream.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub mid: String,
    pub cname: String,
    pub ssrc: u32,
    pub rtx_ssrc: Option<u32>,
    pub payload_type: u8,
    pub rtx_payload_type: Option<u8>,
    pub clock_rate: u32,
    /// The remote's primary SSRC, when announced in SDP.
    pub remote_ssrc: Option<u32>,
    /// The remote's RTX SSRC from its FID group, when announced.
    pub remote_rtx_ssrc: Option<u32>,
    pub jitter_latency_ms: u64,
}

/// Extension rewrites applied to forwarded packets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardExtensions {
    /// extmap id of urn:ietf:params:rtp-hdrext:sdes:mid
    pub mid_id: Option<u8>,
    /// extmap id and 24-bit value of abs-send-time
    pub abs_send_time: Option<(u8, u32)>,
    /// extmap id and transport-wide sequence number
    pub transport_cc: Option<(u8, u16)>,
}

/// Actions the caller must take after feeding RTCP into the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpAction {
    /// Retransmit these packets (already RTX-wrapped when negotiated).
    Retransmit(Vec<rtp::Packet>),
    /// The remote asked for a keyframe (PLI or FIR); surface upstream.
    KeyframeRequest,
    /// The remote said goodbye on this SSRC.
    ReceiverGone(u32),
}

/// Per-remote-SSRC receiver statistics per RFC 3550 appendix A.1.
struct ReceiverStats {
    unwrapper: rtp::sequence::SequenceUnwrapper,
    base_seq: Option<u64>,
    max_seq: u64,
    received: u64,
    bytes: u64,
    expected_prior: u64,
    received_prior: u64,
    jitter: f64,
    last_transit: Option<i64>,
    last_sr_ntp_middle: u32,
    last_sr_at: Option<Instant>,
    /// When the last SR was sent by the remote, by our clock; kept for DLSR
    /// generation only.
    last_sr_send_time: Option<Instant>,
}

impl ReceiverStats {
    fn new() -> Self {
        ReceiverStats {
            unwrapper: rtp::sequence::SequenceUnwrapper::new(),
            base_seq: None,
            max_seq: 0,
            received: 0,
            bytes: 0,
            expected_prior: 0,
            received_prior: 0,
            jitter: 0.0,
            last_transit: None,
            last_sr_ntp_middle: 0,
            last_sr_at: None,
            last_sr_send_time: None,
        }
    }

    fn expected(&self) -> u64 {
        match self.base_seq {
            Some(base) => self.max_seq - base + 1,
            None => 0,
        }
    }

    fn cumulative_lost(&self) -> u32 {
        let expected = self.expected();
        let lost = expected.saturating_sub(self.received);
        lost.min((1 << 24) - 1) as u32
    }
}

/// A snapshot of session counters for stats reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub mid: String,
    pub ssrc: u32,
    pub packets_sent: u64,
    pub octets_sent: u64,
    pub packets_received: u64,
    pub octets_received: u64,
    pub packets_lost: u32,
    pub jitter: u32,
    pub nacks_sent: u64,
    pub retransmissions_sent: u64,
}

/// RtpSession owns one MID's send and receive state: sequencing, statistics,
/// the retransmission history, the NACK schedule, the jitter buffers and the
/// RTCP report timer.
pub struct RtpSession {
    config: SessionConfig,
    epoch: SystemInstant,

    // sender state
    sequence_number: u16,
    rtx_sequence_number: u16,
    last_timestamp: u32,
    packets_sent: u64,
    octets_sent: u64,
    sent_since_last_report: bool,

    /// Offsets mapping upstream sequence/timestamp spaces onto our
    /// continuous outgoing stream; re-anchored when the upstream changes.
    forward_offsets: Option<ForwardOffsets>,

    retransmission_buffer: RetransmissionBuffer,
    nack_generator: NackGenerator,
    nacks_sent: u64,
    retransmissions_sent: u64,

    receiver_stats: HashMap<u32, ReceiverStats>,
    jitter_buffers: HashMap<u32, JitterBuffer>,

    next_report_at: Instant,
    closed: bool,
}

struct ForwardOffsets {
    upstream_ssrc: u32,
    seq_offset: u16,
    ts_offset: u32,
}

impl RtpSession {
    pub fn new(config: SessionConfig, now: Instant) -> Self {
        let sequence_number = rand::random::<u16>();
        RtpSession {
            config,
            epoch: SystemInstant::now(),
            sequence_number,
            rtx_sequence_number: rand::random::<u16>(),
            last_timestamp: 0,
            packets_sent: 0,
            octets_sent: 0,
            sent_since_last_report: false,
            forward_offsets: None,
            retransmission_buffer: RetransmissionBuffer::new(),
            nack_generator: NackGenerator::new(),
            nacks_sent: 0,
            retransmissions_sent: 0,
            receiver_stats: HashMap::new(),
            jitter_buffers: HashMap::new(),
            next_report_at: now + RTCP_INTERVAL,
            closed: false,
        }
    }

    pub fn mid(&self) -> &str {
        &self.config.mid
    }

    pub fn ssrc(&self) -> u32 {
        self.config.ssrc
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn set_remote_ssrcs(&mut self, remote_ssrc: Option<u32>, remote_rtx_ssrc: Option<u32>) {
        self.config.remote_ssrc = remote_ssrc;
        self.config.remote_rtx_ssrc = remote_rtx_ssrc;
    }

    // --- send path -------------------------------------------------------

    /// Forwards a pre-formed RTP packet from an upstream source onto this
    /// session's outgoing stream.
    ///
    /// The first packet from a new upstream anchors sequence and timestamp
    /// offsets, so pausing a forwarder and resuming with a different
    /// upstream keeps the outgoing stream continuous.
    pub fn forward_rtp(
        &mut self,
        packet: &rtp::Packet,
        extensions: ForwardExtensions,
    ) -> Result<rtp::Packet> {
        if self.closed {
            return Err(Error::ErrConnectionClosed);
        }

        let upstream_ssrc = packet.header.ssrc;
        let needs_anchor = match &self.forward_offsets {
            Some(offsets) => offsets.upstream_ssrc != upstream_ssrc,
            None => true,
        };
        if needs_anchor {
            let next_seq = self.sequence_number.wrapping_add(1);
            let next_ts = self.last_timestamp.wrapping_add(1);
            self.forward_offsets = Some(ForwardOffsets {
                upstream_ssrc,
                seq_offset: next_seq.wrapping_sub(packet.header.sequence_number),
                ts_offset: next_ts.wrapping_sub(packet.header.timestamp),
            });
            debug!(
                "session {}: anchored forwarding offsets for upstream ssrc {upstream_ssrc:x}",
                self.config.mid
            );
        }
        let offsets = self.forward_offsets.as_ref().expect("anchored above");

        let mut out = packet.clone();
        out.header.ssrc = self.config.ssrc;
        out.header.payload_type = self.config.payload_type;
        out.header.sequence_number = packet.header.sequence_number.wrapping_add(offsets.seq_offset);
        out.header.timestamp = packet.header.timestamp.wrapping_add(offsets.ts_offset);

        if let Some(id) = extensions.mid_id {
            out.header
                .set_extension(id, bytes::Bytes::copy_from_slice(self.config.mid.as_bytes()))?;
        }
        if let Some((id, abs_send_time)) = extensions.abs_send_time {
            out.header.set_extension(
                id,
                bytes::Bytes::copy_from_slice(&abs_send_time.to_be_bytes()[1..4]),
            )?;
        }
        if let Some((id, twcc_seq)) = extensions.transport_cc {
            out.header
                .set_extension(id, bytes::Bytes::copy_from_slice(&twcc_seq.to_be_bytes()))?;
        }

        self.sequence_number = out.header.sequence_number;
        self.last_timestamp = out.header.timestamp;
        self.packets_sent += 1;
        self.octets_sent += out.payload.len() as u64;
        self.sent_since_last_report = true;

        self.retransmission_buffer.put(out.clone());
        Ok(out)
    }

    // --- receive path ----------------------------------------------------

    /// Feeds an inbound (already decrypted) RTP packet; returns in-order
    /// packets and abandoned-loss reports from the jitter buffer. RTX
    /// packets are unwrapped back onto the primary stream first.
    pub fn handle_rtp(&mut self, packet: rtp::Packet, now: Instant) -> Vec<JitterBufferEvent> {
        let packet = if Some(packet.header.ssrc) == self.config.remote_rtx_ssrc {
            match (self.config.rtx_payload_type, self.config.remote_ssrc) {
                (Some(_), Some(remote_ssrc)) => {
                    match rtp::rtx::unwrap(&packet, self.config.payload_type, remote_ssrc) {
                        Ok(p) => p,
                        Err(_) => return vec![],
                    }
                }
                _ => return vec![],
            }
        } else {
            packet
        };

        let ssrc = packet.header.ssrc;
        let seq = packet.header.sequence_number;

        let stats = self
            .receiver_stats
            .entry(ssrc)
            .or_insert_with(ReceiverStats::new);
        let extended = stats.unwrapper.unwrap(seq);
        if stats.base_seq.is_none() {
            stats.base_seq = Some(extended);
        }
        if extended > stats.max_seq {
            stats.max_seq = extended;
        }
        stats.received += 1;
        stats.bytes += packet.payload.len() as u64;

        // interarrival jitter, RFC 3550 appendix A.8
        let arrival_ticks = (self.epoch.duration_since_unix_epoch(now).as_nanos() as i64)
            / (1_000_000_000 / self.config.clock_rate.max(1) as i64);
        let transit = arrival_ticks - packet.header.timestamp as i64;
        if let Some(last_transit) = stats.last_transit {
            let d = (transit - last_transit).abs() as f64;
            stats.jitter += (d - stats.jitter) / 16.0;
        }
        stats.last_transit = Some(transit);

        self.nack_generator.packet_received(seq, now);

        let latency = if self.config.jitter_latency_ms == 0 {
            DEFAULT_JITTER_LATENCY_MS
        } else {
            self.config.jitter_latency_ms
        };
        let clock_rate = self.config.clock_rate;
        self.jitter_buffers
            .entry(ssrc)
            .or_insert_with(|| JitterBuffer::new(latency, clock_rate))
            .push(packet, now)
    }

    /// Dispatches one inbound RTCP packet.
    pub fn handle_rtcp(&mut self, packet: &rtcp::Packet, now: Instant) -> Vec<RtcpAction> {
        let mut actions = vec![];
        match packet {
            rtcp::Packet::SenderReport(sr) => {
                let stats = self
                    .receiver_stats
                    .entry(sr.ssrc)
                    .or_insert_with(ReceiverStats::new);
                stats.last_sr_ntp_middle = ntp_to_middle_32(sr.ntp_time);
                stats.last_sr_at = Some(now);
                stats.last_sr_send_time = Some(now);
            }
            rtcp::Packet::ReceiverReport(_) => {
                // congestion feedback for our streams; surfaced via stats
            }
            rtcp::Packet::Goodbye(bye) => {
                for ssrc in &bye.sources {
                    if self.receiver_stats.remove(ssrc).is_some() {
                        self.jitter_buffers.remove(ssrc);
                        actions.push(RtcpAction::ReceiverGone(*ssrc));
                    }
                }
            }
            rtcp::Packet::TransportLayerNack(nack) => {
                let mut retransmissions = vec![];
                for pair in &nack.nacks {
                    for seq in pair.packet_list() {
                        // unknown sequence numbers are silently skipped
                        if let Some(stored) = self.retransmission_buffer.get(seq) {
                            let out = match (
                                self.config.rtx_payload_type,
                                self.config.rtx_ssrc,
                            ) {
                                (Some(rtx_pt), Some(rtx_ssrc)) => {
                                    self.rtx_sequence_number =
                                        self.rtx_sequence_number.wrapping_add(1);
                                    rtp::rtx::wrap(
                                        stored,
                                        self.rtx_sequence_number,
                                        rtx_pt,
                                        rtx_ssrc,
                                    )
                                }
                                _ => stored.clone(),
                            };
                            retransmissions.push(out);
                        } else {
                            trace!(
                                "session {}: NACKed seq {seq} no longer buffered",
                                self.config.mid
                            );
                        }
                    }
                }
                if !retransmissions.is_empty() {
                    self.retransmissions_sent += retransmissions.len() as u64;
                    actions.push(RtcpAction::Retransmit(retransmissions));
                }
            }
            rtcp::Packet::PictureLossIndication(_) | rtcp::Packet::FullIntraRequest(_) => {
                actions.push(RtcpAction::KeyframeRequest);
            }
            _ => {}
        }
        actions
    }

    // --- RTCP generation -------------------------------------------------

    /// Builds the compound report due at `now`, if the interval elapsed:
    /// SR when we sent in the interval, RR otherwise, plus SDES(CNAME).
    pub fn poll_rtcp(&mut self, now: Instant) -> Option<Vec<rtcp::Packet>> {
        if self.closed || now < self.next_report_at {
            return None;
        }
        self.next_report_at = now + RTCP_INTERVAL;

        let reports = self.build_reception_reports(now);
        let report = if self.sent_since_last_report {
            self.sent_since_last_report = false;
            rtcp::Packet::SenderReport(SenderReport {
                ssrc: self.config.ssrc,
                ntp_time: self.epoch.ntp(now),
                rtp_time: self.last_timestamp,
                packet_count: self.packets_sent as u32,
                octet_count: self.octets_sent as u32,
                reports,
            })
        } else {
            rtcp::Packet::ReceiverReport(ReceiverReport {
                ssrc: self.config.ssrc,
                reports,
            })
        };

        Some(vec![
            report,
            rtcp::Packet::SourceDescription(SourceDescription::with_cname(
                self.config.ssrc,
                &self.config.cname,
            )),
        ])
    }

    fn build_reception_reports(&mut self, now: Instant) -> Vec<ReceptionReport> {
        let mut reports = vec![];
        for (ssrc, stats) in self.receiver_stats.iter_mut() {
            let expected = stats.expected();
            let expected_interval = expected.saturating_sub(stats.expected_prior);
            let received_interval = stats.received.saturating_sub(stats.received_prior);
            let lost_interval = expected_interval.saturating_sub(received_interval);
            stats.expected_prior = expected;
            stats.received_prior = stats.received;

            let fraction_lost = if expected_interval == 0 {
                0
            } else {
                ((lost_interval << 8) / expected_interval).min(255) as u8
            };

            let delay = stats
                .last_sr_at
                .map(|at| {
                    let elapsed = now.duration_since(at);
                    // 1/65536-second units
                    (elapsed.as_secs_f64() * 65536.0) as u32
                })
                .unwrap_or(0);

            reports.push(ReceptionReport {
                ssrc: *ssrc,
                fraction_lost,
                total_lost: stats.cumulative_lost(),
                last_sequence_number: stats.max_seq as u32,
                jitter: stats.jitter as u32,
                last_sender_report: stats.last_sr_ntp_middle,
                delay,
            });
        }
        reports
    }

    /// Collects the NACK due at `now`, with any permanent losses.
    pub fn poll_nack(&mut self, now: Instant) -> (Option<TransportLayerNack>, Vec<PermanentLoss>) {
        if self.closed {
            return (None, vec![]);
        }
        let media_ssrc = self.config.remote_ssrc.unwrap_or(0);
        let (nack, losses) = self.nack_generator.poll(now, self.config.ssrc, media_ssrc);
        if nack.is_some() {
            self.nacks_sent += 1;
        }
        (nack, losses)
    }

    /// Wall-clock driven jitter buffer age-out for every receive stream.
    pub fn handle_jitter_timeout(&mut self, now: Instant) -> Vec<JitterBufferEvent> {
        let mut events = vec![];
        for jb in self.jitter_buffers.values_mut() {
            events.extend(jb.handle_timeout(now));
        }
        events
    }

    /// The earliest instant any of this session's timers fires.
    pub fn poll_timeout(&self) -> Option<Instant> {
        if self.closed {
            return None;
        }
        let mut eto = Some(self.next_report_at);
        if let Some(nack_at) = self.nack_generator.poll_timeout() {
            eto = Some(eto.map_or(nack_at, |t| t.min(nack_at)));
        }
        for jb in self.jitter_buffers.values() {
            if let Some(jb_at) = jb.poll_timeout() {
                eto = Some(eto.map_or(jb_at, |t| t.min(jb_at)));
            }
        }
        eto
    }

    /// Generates the goodbye sent on teardown and flushes the jitter
    /// buffers. Further sends fail with `ErrConnectionClosed`.
    pub fn close(&mut self, reason: &str) -> (Vec<rtcp::Packet>, Vec<JitterBufferEvent>) {
        self.closed = true;

        let mut flushed = vec![];
        for jb in self.jitter_buffers.values_mut() {
            flushed.extend(jb.flush());
        }

        let mut sources = vec![self.config.ssrc];
        if let Some(rtx) = self.config.rtx_ssrc {
            sources.push(rtx);
        }
        let compound = vec![
            rtcp::Packet::ReceiverReport(ReceiverReport {
                ssrc: self.config.ssrc,
                reports: vec![],
            }),
            rtcp::Packet::Goodbye(Goodbye {
                sources,
                reason: reason.to_owned(),
            }),
        ];

        (compound, flushed)
    }

    pub fn stats(&self) -> SessionStats {
        let (packets_received, octets_received, packets_lost, jitter) = self
            .receiver_stats
            .values()
            .fold((0u64, 0u64, 0u32, 0u32), |acc, s| {
                (
                    acc.0 + s.received,
                    acc.1 + s.bytes,
                    acc.2 + s.cumulative_lost(),
                    acc.3.max(s.jitter as u32),
                )
            });

        SessionStats {
            mid: self.config.mid.clone(),
            ssrc: self.config.ssrc,
            packets_sent: self.packets_sent,
            octets_sent: self.octets_sent,
            packets_received,
            octets_received,
            packets_lost,
            jitter,
            nacks_sent: self.nacks_sent,
            retransmissions_sent: self.retransmissions_sent,
        }
    }
}

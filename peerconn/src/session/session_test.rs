use super::*;
use bytes::Bytes;
use rtcp::transport_feedbacks::transport_layer_nack::NackPair;

fn session() -> RtpSession {
    RtpSession::new(
        SessionConfig {
            mid: "1".to_owned(),
            cname: "test-cname".to_owned(),
            ssrc: 0x1000,
            rtx_ssrc: Some(0x2000),
            payload_type: 96,
            rtx_payload_type: Some(97),
            clock_rate: 90000,
            remote_ssrc: Some(0x3000),
            remote_rtx_ssrc: Some(0x4000),
            jitter_latency_ms: 200,
        },
        Instant::now(),
    )
}

fn upstream_packet(ssrc: u32, seq: u16, ts: u32, len: usize) -> rtp::Packet {
    rtp::Packet {
        header: rtp::Header {
            version: 2,
            payload_type: 100,
            sequence_number: seq,
            timestamp: ts,
            ssrc,
            ..Default::default()
        },
        payload: Bytes::from(vec![0xab; len]),
        padding_size: 0,
    }
}

#[test]
fn test_forwarding_rewrites_and_counts() {
    let mut s = session();
    let out = s
        .forward_rtp(&upstream_packet(0x9999, 700, 1000, 10), ForwardExtensions::default())
        .expect("forward");
    assert_eq!(out.header.ssrc, 0x1000);
    assert_eq!(out.header.payload_type, 96);

    let stats = s.stats();
    assert_eq!(stats.packets_sent, 1);
    assert_eq!(stats.octets_sent, 10);
}

#[test]
fn test_forwarding_offsets_survive_upstream_switch() {
    let mut s = session();
    let a1 = s
        .forward_rtp(&upstream_packet(0xaaaa, 100, 5000, 4), ForwardExtensions::default())
        .unwrap();
    let a2 = s
        .forward_rtp(&upstream_packet(0xaaaa, 101, 8000, 4), ForwardExtensions::default())
        .unwrap();
    assert_eq!(a2.header.sequence_number, a1.header.sequence_number.wrapping_add(1));

    // upstream switches: the very different sequence space must continue
    // seamlessly from where we left off
    let b1 = s
        .forward_rtp(&upstream_packet(0xbbbb, 30000, 999999, 4), ForwardExtensions::default())
        .unwrap();
    assert_eq!(
        b1.header.sequence_number,
        a2.header.sequence_number.wrapping_add(1)
    );
    let b2 = s
        .forward_rtp(&upstream_packet(0xbbbb, 30001, 1003000, 4), ForwardExtensions::default())
        .unwrap();
    assert_eq!(
        b2.header.sequence_number,
        b1.header.sequence_number.wrapping_add(1)
    );
    assert_eq!(
        b2.header.timestamp.wrapping_sub(b1.header.timestamp),
        3000
    );
}

#[test]
fn test_forward_extensions_written() {
    let mut s = session();
    let out = s
        .forward_rtp(
            &upstream_packet(0x1, 1, 1, 1),
            ForwardExtensions {
                mid_id: Some(1),
                abs_send_time: Some((2, 0x123456)),
                transport_cc: Some((3, 777)),
            },
        )
        .unwrap();
    assert_eq!(out.header.get_extension(1).unwrap().as_ref(), b"1");
    assert_eq!(
        out.header.get_extension(2).unwrap().as_ref(),
        &0x123456u32.to_be_bytes()[1..4]
    );
    assert_eq!(
        out.header.get_extension(3).unwrap().as_ref(),
        &777u16.to_be_bytes()
    );
}

#[test]
fn test_sender_report_counts_match_sent_packets() {
    let mut s = session();
    let now = Instant::now();
    for i in 0..5u16 {
        s.forward_rtp(&upstream_packet(0x5, i, i as u32 * 100, 7), ForwardExtensions::default())
            .unwrap();
    }

    let compound = s.poll_rtcp(now + RTCP_INTERVAL).expect("report due");
    match &compound[0] {
        rtcp::Packet::SenderReport(sr) => {
            assert_eq!(sr.ssrc, 0x1000);
            assert_eq!(sr.packet_count, 5);
            assert_eq!(sr.octet_count, 35);
        }
        other => panic!("expected SR, got {other:?}"),
    }
    match &compound[1] {
        rtcp::Packet::SourceDescription(sdes) => {
            assert_eq!(sdes.cname(0x1000), Some("test-cname"));
        }
        other => panic!("expected SDES, got {other:?}"),
    }
}

#[test]
fn test_receiver_report_when_nothing_sent() {
    let mut s = session();
    let now = Instant::now();
    s.handle_rtp(upstream_packet(0x3000, 1, 0, 4), now);
    let compound = s.poll_rtcp(now + RTCP_INTERVAL).expect("report due");
    assert!(matches!(compound[0], rtcp::Packet::ReceiverReport(_)));
}

#[test]
fn test_rtcp_not_due_early() {
    let mut s = session();
    assert!(s.poll_rtcp(Instant::now()).is_none());
}

#[test]
fn test_nack_triggers_exactly_one_retransmission_per_request() {
    let mut s = session();
    for i in 0..10u16 {
        s.forward_rtp(&upstream_packet(0x5, i, 0, 4), ForwardExtensions::default())
            .unwrap();
    }
    // NACK two of the sent packets by their on-the-wire sequence numbers
    let base = s.sequence_number.wrapping_sub(9);
    let nack = rtcp::Packet::TransportLayerNack(TransportLayerNack {
        sender_ssrc: 0x3000,
        media_ssrc: 0x1000,
        nacks: vec![NackPair {
            packet_id: base,
            lost_packets: 0b1,
        }],
    });

    let actions = s.handle_rtcp(&nack, Instant::now());
    assert_eq!(actions.len(), 1);
    match &actions[0] {
        RtcpAction::Retransmit(packets) => {
            assert_eq!(packets.len(), 2, "one retransmission per NACKed seq");
            // RTX wrapping: repair stream PT/SSRC with OSN prefix
            assert!(packets.iter().all(|p| p.header.payload_type == 97));
            assert!(packets.iter().all(|p| p.header.ssrc == 0x2000));
        }
        other => panic!("expected retransmit, got {other:?}"),
    }

    // an unknown sequence number is silently skipped
    let bogus = rtcp::Packet::TransportLayerNack(TransportLayerNack {
        sender_ssrc: 0x3000,
        media_ssrc: 0x1000,
        nacks: vec![NackPair {
            packet_id: s.sequence_number.wrapping_add(5000),
            lost_packets: 0,
        }],
    });
    assert!(s.handle_rtcp(&bogus, Instant::now()).is_empty());
}

#[test]
fn test_inbound_rtx_unwrapped_to_primary() {
    let mut s = session();
    let now = Instant::now();
    // deliver seq 50 on the primary stream
    let events = s.handle_rtp(upstream_packet(0x3000, 50, 0, 4), now);
    assert_eq!(events.len(), 1);

    // seq 51 arrives as an RTX retransmission
    let original = upstream_packet(0x3000, 51, 100, 4);
    let rtx = rtp::rtx::wrap(&original, 7, 97, 0x4000);
    let events = s.handle_rtp(rtx, now);
    assert_eq!(events.len(), 1);
    match &events[0] {
        crate::jitter::JitterBufferEvent::Packet(p) => {
            assert_eq!(p.header.sequence_number, 51);
            assert_eq!(p.header.ssrc, 0x3000);
            assert_eq!(p.header.payload_type, 96);
        }
        other => panic!("expected packet, got {other:?}"),
    }
}

#[test]
fn test_bye_removes_receiver_state() {
    let mut s = session();
    let now = Instant::now();
    s.handle_rtp(upstream_packet(0x3000, 1, 0, 4), now);

    let bye = rtcp::Packet::Goodbye(rtcp::goodbye::Goodbye {
        sources: vec![0x3000],
        reason: String::new(),
    });
    let actions = s.handle_rtcp(&bye, now);
    assert_eq!(actions, vec![RtcpAction::ReceiverGone(0x3000)]);
}

#[test]
fn test_pli_surfaces_keyframe_request() {
    let mut s = session();
    let pli = rtcp::Packet::PictureLossIndication(
        rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication {
            sender_ssrc: 0x3000,
            media_ssrc: 0x1000,
        },
    );
    assert_eq!(
        s.handle_rtcp(&pli, Instant::now()),
        vec![RtcpAction::KeyframeRequest]
    );
}

#[test]
fn test_close_emits_bye_with_reason() {
    let mut s = session();
    let (compound, _) = s.close("session ended");
    assert!(matches!(compound[0], rtcp::Packet::ReceiverReport(_)));
    match &compound[1] {
        rtcp::Packet::Goodbye(bye) => {
            assert_eq!(bye.sources, vec![0x1000, 0x2000]);
            assert_eq!(bye.reason, "session ended");
        }
        other => panic!("expected BYE, got {other:?}"),
    }
    assert!(s
        .forward_rtp(&upstream_packet(1, 1, 1, 1), ForwardExtensions::default())
        .is_err());
}

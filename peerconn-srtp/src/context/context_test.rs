use super::*;
use bytes::BytesMut;

const MASTER_KEY: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
    0x0f,
];
const MASTER_SALT: [u8; 14] = [
    0xa0, 0xa1, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xab, 0xac, 0xad,
];
const MASTER_SALT_GCM: [u8; 12] = [
    0xa0, 0xa1, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xab,
];

fn rtp_packet(seq: u16) -> BytesMut {
    rtp::Packet {
        header: rtp::Header {
            version: 2,
            payload_type: 96,
            sequence_number: seq,
            timestamp: 90000,
            ssrc: 0xcafebabe,
            ..Default::default()
        },
        payload: bytes::Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
        padding_size: 0,
    }
    .marshal()
    .unwrap()
}

fn contexts(profile: ProtectionProfile) -> (Context, Context) {
    let salt: &[u8] = match profile {
        ProtectionProfile::AeadAes128Gcm => &MASTER_SALT_GCM,
        _ => &MASTER_SALT,
    };
    (
        Context::new(&MASTER_KEY, salt, profile).unwrap(),
        Context::new(&MASTER_KEY, salt, profile).unwrap(),
    )
}

#[test]
fn test_rtp_encrypt_decrypt_roundtrip() {
    for profile in [
        ProtectionProfile::Aes128CmHmacSha1_80,
        ProtectionProfile::Aes128CmHmacSha1_32,
        ProtectionProfile::AeadAes128Gcm,
    ] {
        let (mut tx, mut rx) = contexts(profile);
        let plaintext = rtp_packet(1000);
        let protected = tx.encrypt_rtp(&plaintext).expect("encrypt");
        assert_ne!(&protected[12..16], &plaintext[12..16], "payload encrypted");
        let decrypted = rx.decrypt_rtp(&protected).expect("decrypt");
        assert_eq!(decrypted.as_ref(), plaintext.as_ref(), "{profile:?}");
    }
}

#[test]
fn test_rtp_bit_flip_rejected() {
    let (mut tx, mut rx) = contexts(ProtectionProfile::Aes128CmHmacSha1_80);
    let protected = tx.encrypt_rtp(&rtp_packet(7)).unwrap();
    let mut tampered = protected.to_vec();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    assert_eq!(
        rx.decrypt_rtp(&tampered),
        Err(Error::RtpFailedToVerifyAuthTag)
    );
    // The failed packet must not occupy replay state.
    assert!(rx.decrypt_rtp(&protected).is_ok());
}

#[test]
fn test_rtp_replay_window() {
    // encrypt 10..=20, replay 15, then 21, then 21 again
    let (mut tx, mut rx) = contexts(ProtectionProfile::Aes128CmHmacSha1_80);
    let mut protected = vec![];
    for seq in 10..=21u16 {
        protected.push(tx.encrypt_rtp(&rtp_packet(seq)).unwrap());
    }
    for p in &protected[..11] {
        rx.decrypt_rtp(p).expect("in order delivery");
    }
    let replayed = rx.decrypt_rtp(&protected[5]);
    assert_eq!(replayed, Err(Error::SrtpSsrcDuplicated(0xcafebabe, 15)));
    rx.decrypt_rtp(&protected[11]).expect("seq 21 accepted");
    assert_eq!(
        rx.decrypt_rtp(&protected[11]),
        Err(Error::SrtpSsrcDuplicated(0xcafebabe, 21))
    );
}

#[test]
fn test_rtp_old_packet_outside_window_rejected() {
    let (mut tx, mut rx) = contexts(ProtectionProfile::Aes128CmHmacSha1_80);
    let old = tx.encrypt_rtp(&rtp_packet(100)).unwrap();
    for seq in 101..=200u16 {
        let p = tx.encrypt_rtp(&rtp_packet(seq)).unwrap();
        rx.decrypt_rtp(&p).unwrap();
    }
    assert!(rx.decrypt_rtp(&old).is_err(), "older than highest-64");
}

#[test]
fn test_rollover_counter_increments_on_wrap() {
    let (mut tx, mut rx) = contexts(ProtectionProfile::Aes128CmHmacSha1_80);
    for seq in [65534u16, 65535, 0, 1] {
        let p = tx.encrypt_rtp(&rtp_packet(seq)).unwrap();
        let d = rx.decrypt_rtp(&p).unwrap();
        assert_eq!(d.as_ref(), rtp_packet(seq).as_ref());
    }
    assert_eq!(tx.rollover_counter(0xcafebabe), 1);
    assert_eq!(rx.rollover_counter(0xcafebabe), 1);
}

#[test]
fn test_rtcp_compound_roundtrip() {
    use rtcp::sender_report::SenderReport;
    use rtcp::source_description::SourceDescription;

    let compound = rtcp::packet::marshal_compound(&[
        rtcp::Packet::SenderReport(SenderReport {
            ssrc: 0x1122,
            ntp_time: 1,
            rtp_time: 2,
            packet_count: 3,
            octet_count: 4,
            reports: vec![],
        }),
        rtcp::Packet::SourceDescription(SourceDescription::with_cname(0x1122, "peer")),
    ])
    .unwrap();

    for profile in [
        ProtectionProfile::Aes128CmHmacSha1_80,
        ProtectionProfile::AeadAes128Gcm,
    ] {
        let (mut tx, mut rx) = contexts(profile);
        let protected = tx.encrypt_rtcp(&compound).expect("encrypt");
        let decrypted = rx.decrypt_rtcp(&protected).expect("decrypt");
        assert_eq!(decrypted.as_ref(), compound.as_ref(), "{profile:?}");
    }
}

#[test]
fn test_rtcp_replay_rejected() {
    let (mut tx, mut rx) = contexts(ProtectionProfile::Aes128CmHmacSha1_80);
    let compound = rtcp::receiver_report::ReceiverReport {
        ssrc: 0x3344,
        reports: vec![],
    }
    .marshal()
    .unwrap();

    let protected = tx.encrypt_rtcp(&compound).unwrap();
    rx.decrypt_rtcp(&protected).expect("first delivery");
    assert_eq!(
        rx.decrypt_rtcp(&protected),
        Err(Error::SrtcpSsrcDuplicated(0x3344, 1))
    );
}

#[test]
fn test_wrong_key_lengths_rejected() {
    assert_eq!(
        Context::new(&MASTER_KEY[..8], &MASTER_SALT, ProtectionProfile::Aes128CmHmacSha1_80)
            .err(),
        Some(Error::ErrShortSrtpMasterKey)
    );
    assert_eq!(
        Context::new(&MASTER_KEY, &MASTER_SALT[..4], ProtectionProfile::Aes128CmHmacSha1_80)
            .err(),
        Some(Error::ErrShortSrtpMasterSalt)
    );
}

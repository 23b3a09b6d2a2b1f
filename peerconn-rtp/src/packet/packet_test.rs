use super::*;

fn sample_packet() -> Packet {
    Packet {
        header: Header {
            version: 2,
            marker: true,
            payload_type: 111,
            sequence_number: 500,
            timestamp: 48000,
            ssrc: 0x1234,
            ..Default::default()
        },
        payload: Bytes::from_static(&[0x01, 0x02, 0x03, 0x04]),
        padding_size: 0,
    }
}

#[test]
fn test_packet_roundtrip() {
    let p = sample_packet();
    let raw = p.marshal().expect("marshal");
    let parsed = Packet::unmarshal(&raw).expect("unmarshal");
    assert_eq!(parsed, p);
}

#[test]
fn test_packet_roundtrip_with_padding() {
    let mut p = sample_packet();
    p.header.padding = true;
    p.padding_size = 4;
    let raw = p.marshal().expect("marshal");
    assert_eq!(raw.len(), p.marshal_size());
    assert_eq!(raw[raw.len() - 1], 4);
    let parsed = Packet::unmarshal(&raw).expect("unmarshal");
    assert_eq!(parsed.payload, p.payload);
    assert_eq!(parsed.padding_size, 4);
    assert_eq!(parsed, p);
}

#[test]
fn test_packet_padding_larger_than_payload() {
    // padding flag set, last byte declares more padding than there is data
    let mut raw = sample_packet().marshal().unwrap().to_vec();
    raw[0] |= 1 << 5;
    let last = raw.len() - 1;
    raw[last] = 0xff;
    assert_eq!(Packet::unmarshal(&raw), Err(Error::ErrShortPacket));
}

#[test]
fn test_packet_truncated() {
    assert_eq!(
        Packet::unmarshal(&[0x80, 0x60, 0x00]),
        Err(Error::ErrHeaderSizeInsufficient)
    );
}

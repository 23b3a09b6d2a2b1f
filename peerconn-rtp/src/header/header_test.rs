use super::*;

#[test]
fn test_basic_header_unmarshal() {
    #[rustfmt::skip]
    let raw: Vec<u8> = vec![
        0x90, 0xe0, 0x69, 0x8f,
        0xd9, 0xc2, 0x93, 0xda,
        0x1c, 0x64, 0x27, 0x82,
        // one-byte extension header
        0xbe, 0xde, 0x00, 0x01,
        0x50, 0xaa, 0x00, 0x00,
    ];

    let (h, n) = Header::unmarshal(&raw).expect("header should parse");
    assert_eq!(n, raw.len());
    assert_eq!(h.version, 2);
    assert!(!h.padding);
    assert!(h.extension);
    assert!(h.marker);
    assert_eq!(h.payload_type, 96);
    assert_eq!(h.sequence_number, 27023);
    assert_eq!(h.timestamp, 3653407706);
    assert_eq!(h.ssrc, 476325762);
    assert_eq!(h.extension_profile, EXTENSION_PROFILE_ONE_BYTE);
    assert_eq!(h.extensions.len(), 1);
    assert_eq!(h.extensions[0].id, 5);
    assert_eq!(h.extensions[0].payload.as_ref(), &[0xaa]);
}

#[test]
fn test_header_roundtrip_with_csrc_and_extensions() {
    let mut h = Header {
        version: 2,
        marker: true,
        payload_type: 111,
        sequence_number: 1234,
        timestamp: 48000,
        ssrc: 0xdeadbeef,
        csrc: vec![0x11223344, 0x55667788],
        ..Default::default()
    };
    h.set_extension(1, Bytes::from_static(b"0"))
        .expect("mid extension");
    h.set_extension(3, Bytes::from_static(&[0x00, 0x01, 0x02]))
        .expect("twcc extension");

    let raw = h.marshal().expect("marshal");
    assert_eq!(raw.len(), h.marshal_size());
    let (parsed, n) = Header::unmarshal(&raw).expect("unmarshal");
    assert_eq!(n, raw.len());
    assert_eq!(parsed, h);
}

#[test]
fn test_header_too_small() {
    assert_eq!(
        Header::unmarshal(&[0x80, 0x60]),
        Err(Error::ErrHeaderSizeInsufficient)
    );
}

#[test]
fn test_extension_truncated() {
    // X bit set but no room for the extension header
    let raw: Vec<u8> = vec![
        0x90, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xbe, 0xde,
    ];
    assert_eq!(
        Header::unmarshal(&raw),
        Err(Error::ErrHeaderSizeInsufficientForExtension)
    );
}

#[test]
fn test_set_extension_rejects_bad_id() {
    let mut h = Header::default();
    assert_eq!(
        h.set_extension(15, Bytes::from_static(b"x")),
        Err(Error::ErrRfc8285OneByteHeaderIdRange)
    );
    assert_eq!(
        h.set_extension(0, Bytes::from_static(b"x")),
        Err(Error::ErrRfc8285OneByteHeaderIdRange)
    );
}

#[test]
fn test_del_extension_clears_x_bit() {
    let mut h = Header::default();
    h.set_extension(1, Bytes::from_static(b"a")).unwrap();
    assert!(h.extension);
    h.del_extension(1);
    assert!(!h.extension);
}

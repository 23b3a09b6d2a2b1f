//! RTP retransmission payload format per RFC 4588.
//!
//! A retransmitted packet travels on the RTX stream: the original sequence
//! number (OSN) is prepended to the payload and the packet is re-addressed
//! with the RTX payload type and SSRC.

use bytes::{BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

use crate::packet::Packet;

/// Wraps `pkt` for the RTX stream. The caller supplies the next sequence
/// number of the RTX stream; timestamp is carried over unchanged.
pub fn wrap(pkt: &Packet, rtx_sequence_number: u16, rtx_payload_type: u8, rtx_ssrc: u32) -> Packet {
    let mut payload = BytesMut::with_capacity(2 + pkt.payload.len());
    payload.put_u16(pkt.header.sequence_number);
    payload.put_slice(&pkt.payload);

    let mut header = pkt.header.clone();
    header.payload_type = rtx_payload_type;
    header.ssrc = rtx_ssrc;
    header.sequence_number = rtx_sequence_number;

    Packet {
        header,
        payload: payload.freeze(),
        padding_size: pkt.padding_size,
    }
}

/// Recovers the original packet from an RTX packet.
pub fn unwrap(pkt: &Packet, original_payload_type: u8, original_ssrc: u32) -> Result<Packet> {
    if pkt.payload.len() < 2 {
        return Err(Error::ErrShortPacket);
    }

    let osn = u16::from_be_bytes([pkt.payload[0], pkt.payload[1]]);

    let mut header = pkt.header.clone();
    header.payload_type = original_payload_type;
    header.ssrc = original_ssrc;
    header.sequence_number = osn;

    Ok(Packet {
        header,
        payload: Bytes::copy_from_slice(&pkt.payload[2..]),
        padding_size: pkt.padding_size,
    })
}

#[cfg(test)]
mod rtx_test {
    use super::*;
    use crate::header::Header;

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let original = Packet {
            header: Header {
                version: 2,
                payload_type: 96,
                sequence_number: 1000,
                timestamp: 90000,
                ssrc: 0x1111,
                ..Default::default()
            },
            payload: Bytes::from_static(&[0xde, 0xad]),
            padding_size: 0,
        };

        let rtx = wrap(&original, 7, 97, 0x2222);
        assert_eq!(rtx.header.payload_type, 97);
        assert_eq!(rtx.header.ssrc, 0x2222);
        assert_eq!(rtx.header.sequence_number, 7);
        assert_eq!(rtx.payload.as_ref(), &[0x03, 0xe8, 0xde, 0xad]);

        let recovered = unwrap(&rtx, 96, 0x1111).expect("unwrap");
        assert_eq!(recovered, original);
    }

    #[test]
    fn test_unwrap_too_short() {
        let rtx = Packet {
            payload: Bytes::from_static(&[0x01]),
            ..Default::default()
        };
        assert_eq!(unwrap(&rtx, 96, 1), Err(Error::ErrShortPacket));
    }
}

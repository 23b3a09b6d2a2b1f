//! Redundant audio data framing per RFC 2198.
//!
//! A RED payload carries zero or more redundant blocks, each with a 4-byte
//! header (F=1, block PT, 14-bit timestamp offset, 10-bit length), followed by
//! a 1-byte primary header (F=0, block PT) and the primary payload.

use bytes::{BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};
use std::collections::VecDeque;

use crate::header::Header;
use crate::packet::Packet;

/// How many reconstructed sequence numbers the decoder remembers for
/// duplicate suppression.
const DEDUP_WINDOW: usize = 150;

/// A block going into a RED payload.
pub struct RedBlock {
    pub payload_type: u8,
    pub timestamp_offset: u16,
    pub payload: Bytes,
}

/// Encodes redundant blocks plus a primary payload into one RED payload.
/// The last entry of `blocks` is the primary; its timestamp offset is unused.
pub fn encode(blocks: &[RedBlock]) -> Result<Bytes> {
    if blocks.is_empty() {
        return Err(Error::ErrShortPacket);
    }

    let mut buf = BytesMut::new();
    let (redundant, primary) = blocks.split_at(blocks.len() - 1);
    for b in redundant {
        if b.timestamp_offset >= 1 << 14 || b.payload.len() >= 1 << 10 {
            return Err(Error::ErrShortRedBlock);
        }
        buf.put_u8(0x80 | b.payload_type);
        buf.put_u8((b.timestamp_offset >> 6) as u8);
        buf.put_u8(((b.timestamp_offset << 2) as u8) | (b.payload.len() >> 8) as u8);
        buf.put_u8(b.payload.len() as u8);
    }
    buf.put_u8(primary[0].payload_type & 0x7f);
    for b in redundant {
        buf.put_slice(&b.payload);
    }
    buf.put_slice(&primary[0].payload);
    Ok(buf.freeze())
}

/// Splits a RED payload back into per-block (payload type, timestamp offset,
/// data) triples; the last returned block is the primary with offset 0.
pub fn decode(payload: &[u8]) -> Result<Vec<(u8, u16, Bytes)>> {
    let mut headers = vec![];
    let mut offset = 0usize;
    loop {
        if offset >= payload.len() {
            return Err(Error::ErrShortPacket);
        }
        let b = payload[offset];
        if b & 0x80 == 0 {
            headers.push((b & 0x7f, 0u16, 0usize));
            offset += 1;
            break;
        }
        if offset + 4 > payload.len() {
            return Err(Error::ErrShortPacket);
        }
        let ts_offset = (payload[offset + 1] as u16) << 6 | (payload[offset + 2] as u16) >> 2;
        let length = ((payload[offset + 2] as usize) & 0x03) << 8 | payload[offset + 3] as usize;
        headers.push((b & 0x7f, ts_offset, length));
        offset += 4;
    }

    let mut blocks = Vec::with_capacity(headers.len());
    let last = headers.len() - 1;
    for (i, (pt, ts_offset, length)) in headers.into_iter().enumerate() {
        let length = if i == last {
            payload.len() - offset
        } else {
            length
        };
        if offset + length > payload.len() {
            return Err(Error::ErrShortRedBlock);
        }
        blocks.push((
            pt,
            ts_offset,
            Bytes::copy_from_slice(&payload[offset..offset + length]),
        ));
        offset += length;
    }
    Ok(blocks)
}

/// Reconstructs RTP packets from RED packets, suppressing duplicates.
#[derive(Default)]
pub struct RedDecoder {
    seen: VecDeque<u16>,
}

impl RedDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expands `pkt` into up to N packets: redundant blocks first (oldest
    /// first, with reconstructed sequence numbers and timestamps), primary
    /// last. Blocks whose sequence number was already emitted are dropped.
    pub fn decode(&mut self, pkt: &Packet) -> Result<Vec<Packet>> {
        let blocks = decode(&pkt.payload)?;
        let redundant_count = (blocks.len() - 1) as u16;

        let mut out = Vec::with_capacity(blocks.len());
        for (i, (pt, ts_offset, data)) in blocks.into_iter().enumerate() {
            let distance = redundant_count - i as u16;
            let seq = pkt.header.sequence_number.wrapping_sub(distance);
            if self.seen.contains(&seq) {
                continue;
            }
            self.seen.push_back(seq);
            if self.seen.len() > DEDUP_WINDOW {
                self.seen.pop_front();
            }

            out.push(Packet {
                header: Header {
                    version: pkt.header.version,
                    marker: pkt.header.marker && distance == 0,
                    payload_type: pt,
                    sequence_number: seq,
                    timestamp: pkt.header.timestamp.wrapping_sub(ts_offset as u32),
                    ssrc: pkt.header.ssrc,
                    ..Default::default()
                },
                payload: data,
                padding_size: 0,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod red_test {
    use super::*;

    fn red_packet() -> Packet {
        // block PTs [0, 0, 111], ts offsets [320, 160], base seq 500, base ts 48000
        let payload = encode(&[
            RedBlock {
                payload_type: 0,
                timestamp_offset: 320,
                payload: Bytes::from_static(b"aa"),
            },
            RedBlock {
                payload_type: 0,
                timestamp_offset: 160,
                payload: Bytes::from_static(b"bb"),
            },
            RedBlock {
                payload_type: 111,
                timestamp_offset: 0,
                payload: Bytes::from_static(b"primary"),
            },
        ])
        .expect("encode");

        Packet {
            header: Header {
                version: 2,
                payload_type: 63,
                sequence_number: 500,
                timestamp: 48000,
                ssrc: 0x99,
                ..Default::default()
            },
            payload,
            padding_size: 0,
        }
    }

    #[test]
    fn test_red_depacketize() {
        let mut dec = RedDecoder::new();
        let out = dec.decode(&red_packet()).expect("decode");
        assert_eq!(out.len(), 3);

        assert_eq!(out[0].header.sequence_number, 498);
        assert_eq!(out[0].header.timestamp, 47680);
        assert_eq!(out[0].header.payload_type, 0);
        assert_eq!(out[0].payload.as_ref(), b"aa");

        assert_eq!(out[1].header.sequence_number, 499);
        assert_eq!(out[1].header.timestamp, 47840);

        assert_eq!(out[2].header.sequence_number, 500);
        assert_eq!(out[2].header.timestamp, 48000);
        assert_eq!(out[2].header.payload_type, 111);
        assert_eq!(out[2].payload.as_ref(), b"primary");
    }

    #[test]
    fn test_red_dedup_window() {
        let mut dec = RedDecoder::new();
        assert_eq!(dec.decode(&red_packet()).unwrap().len(), 3);
        // Same packet again: all three sequence numbers suppressed.
        assert!(dec.decode(&red_packet()).unwrap().is_empty());
    }

    #[test]
    fn test_red_truncated_block() {
        let pkt = Packet {
            payload: Bytes::from_static(&[0x80, 0x00, 0x00]),
            ..Default::default()
        };
        let mut dec = RedDecoder::new();
        assert_eq!(dec.decode(&pkt), Err(Error::ErrShortPacket));
    }
}

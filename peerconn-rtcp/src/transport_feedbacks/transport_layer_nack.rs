use bytes::{BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

use crate::header::{self, Header, PacketType, FORMAT_TLN, HEADER_LENGTH};

/// PID plus bitmask of the following 16 lost packets (RFC 4585 section 6.2.1).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct NackPair {
    /// The sequence number of the first lost packet.
    pub packet_id: u16,
    /// Bitmask of following lost packets: bit i set means packet_id+i+1 lost.
    pub lost_packets: u16,
}

impl NackPair {
    /// All sequence numbers this pair reports as lost, in ascending order.
    pub fn packet_list(&self) -> Vec<u16> {
        let mut out = vec![self.packet_id];
        for i in 0..16u16 {
            if self.lost_packets & (1 << i) != 0 {
                out.push(self.packet_id.wrapping_add(i + 1));
            }
        }
        out
    }
}

/// Packs a sorted run of lost sequence numbers into PID/BLP pairs.
pub fn nack_pairs_from_sequence_numbers(seqs: &[u16]) -> Vec<NackPair> {
    let mut pairs: Vec<NackPair> = vec![];
    for &seq in seqs {
        if let Some(last) = pairs.last_mut() {
            let distance = seq.wrapping_sub(last.packet_id);
            if distance > 0 && distance <= 16 {
                last.lost_packets |= 1 << (distance - 1);
                continue;
            }
        }
        pairs.push(NackPair {
            packet_id: seq,
            lost_packets: 0,
        });
    }
    pairs
}

/// TransportLayerNack (RTPFB/NACK) reports missing RTP sequence numbers
/// (RFC 4585 section 6.2.1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportLayerNack {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub nacks: Vec<NackPair>,
}

impl TransportLayerNack {
    pub fn marshal_size(&self) -> usize {
        HEADER_LENGTH + 8 + self.nacks.len() * 4
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_TLN,
            packet_type: PacketType::TransportSpecificFeedback,
            length: header::length_field(self.marshal_size()),
        }
    }

    pub fn marshal(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.header().marshal_to(&mut buf)?;
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        for nack in &self.nacks {
            buf.put_u16(nack.packet_id);
            buf.put_u16(nack.lost_packets);
        }
        Ok(buf.freeze())
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        let h = Header::unmarshal(raw)?;
        if h.packet_type != PacketType::TransportSpecificFeedback || h.count != FORMAT_TLN {
            return Err(Error::WrongType);
        }
        if raw.len() < HEADER_LENGTH + 8 {
            return Err(Error::PacketTooShort);
        }

        let sender_ssrc = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let media_ssrc = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);

        let mut offset = HEADER_LENGTH + 8;
        let mut nacks = vec![];
        while raw.len() >= offset + 4 {
            nacks.push(NackPair {
                packet_id: u16::from_be_bytes([raw[offset], raw[offset + 1]]),
                lost_packets: u16::from_be_bytes([raw[offset + 2], raw[offset + 3]]),
            });
            offset += 4;
        }

        Ok(TransportLayerNack {
            sender_ssrc,
            media_ssrc,
            nacks,
        })
    }
}

#[cfg(test)]
mod transport_layer_nack_test {
    use super::*;

    #[test]
    fn test_nack_pair_packet_list() {
        let pair = NackPair {
            packet_id: 42,
            lost_packets: 0b0000_0000_0000_0101,
        };
        assert_eq!(pair.packet_list(), vec![42, 43, 45]);
    }

    #[test]
    fn test_nack_pairs_from_sequence_numbers() {
        let pairs = nack_pairs_from_sequence_numbers(&[100, 101, 105, 130]);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].packet_id, 100);
        assert_eq!(pairs[0].lost_packets, 0b10001);
        assert_eq!(pairs[1].packet_id, 130);
        assert_eq!(pairs[1].lost_packets, 0);
    }

    #[test]
    fn test_nack_roundtrip() {
        let nack = TransportLayerNack {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0x902f9e2e,
            nacks: vec![NackPair {
                packet_id: 0xaaa,
                lost_packets: 0x5555,
            }],
        };
        let raw = nack.marshal().expect("marshal");
        assert_eq!(TransportLayerNack::unmarshal(&raw).expect("unmarshal"), nack);
    }

    #[test]
    fn test_nack_pair_wraparound() {
        let pairs = nack_pairs_from_sequence_numbers(&[65534, 65535, 0, 1]);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].packet_id, 65534);
        assert_eq!(
            pairs[0].packet_list(),
            vec![65534, 65535, 0, 1]
        );
    }
}

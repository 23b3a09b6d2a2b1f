//! Transport-wide congestion control feedback
//! (draft-holmer-rmcat-transport-wide-cc-extensions-01).

use bytes::{BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

use crate::header::{self, Header, PacketType, FORMAT_TCC, HEADER_LENGTH};

/// Reception status of one transport-wide sequence number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SymbolType {
    #[default]
    NotReceived = 0,
    ReceivedSmallDelta = 1,
    ReceivedLargeDelta = 2,
}

impl TryFrom<u8> for SymbolType {
    type Error = Error;

    fn try_from(b: u8) -> Result<Self> {
        match b {
            0 => Ok(SymbolType::NotReceived),
            1 => Ok(SymbolType::ReceivedSmallDelta),
            2 => Ok(SymbolType::ReceivedLargeDelta),
            _ => Err(Error::WrongType),
        }
    }
}

/// A packet status chunk: either a run of one symbol or an explicit vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketStatusChunk {
    RunLength {
        symbol: SymbolType,
        run_length: u16,
    },
    StatusVector {
        /// true = 2-bit symbols (7 per chunk), false = 1-bit (14 per chunk)
        two_bit: bool,
        symbols: Vec<SymbolType>,
    },
}

impl PacketStatusChunk {
    fn symbol_count(&self) -> usize {
        match self {
            PacketStatusChunk::RunLength { run_length, .. } => *run_length as usize,
            PacketStatusChunk::StatusVector { symbols, .. } => symbols.len(),
        }
    }

    fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            PacketStatusChunk::RunLength { symbol, run_length } => {
                if *run_length >= 1 << 13 {
                    return Err(Error::PacketStatusChunkLength);
                }
                buf.put_u16((*symbol as u16) << 13 | run_length);
            }
            PacketStatusChunk::StatusVector { two_bit, symbols } => {
                let mut word = 1u16 << 15;
                if *two_bit {
                    if symbols.len() != 7 {
                        return Err(Error::PacketStatusChunkLength);
                    }
                    word |= 1 << 14;
                    for (i, s) in symbols.iter().enumerate() {
                        word |= (*s as u16) << (12 - 2 * i);
                    }
                } else {
                    if symbols.len() != 14 {
                        return Err(Error::PacketStatusChunkLength);
                    }
                    for (i, s) in symbols.iter().enumerate() {
                        let bit = match s {
                            SymbolType::NotReceived => 0u16,
                            SymbolType::ReceivedSmallDelta => 1,
                            SymbolType::ReceivedLargeDelta => {
                                return Err(Error::PacketStatusChunkLength)
                            }
                        };
                        word |= bit << (13 - i);
                    }
                }
                buf.put_u16(word);
            }
        }
        Ok(())
    }

    fn unmarshal(raw: [u8; 2]) -> Result<Self> {
        let word = u16::from_be_bytes(raw);
        if word & (1 << 15) == 0 {
            Ok(PacketStatusChunk::RunLength {
                symbol: SymbolType::try_from(((word >> 13) & 0x3) as u8)?,
                run_length: word & 0x1FFF,
            })
        } else if word & (1 << 14) != 0 {
            let mut symbols = Vec::with_capacity(7);
            for i in 0..7 {
                symbols.push(SymbolType::try_from(((word >> (12 - 2 * i)) & 0x3) as u8)?);
            }
            Ok(PacketStatusChunk::StatusVector {
                two_bit: true,
                symbols,
            })
        } else {
            let mut symbols = Vec::with_capacity(14);
            for i in 0..14 {
                symbols.push(if (word >> (13 - i)) & 0x1 != 0 {
                    SymbolType::ReceivedSmallDelta
                } else {
                    SymbolType::NotReceived
                });
            }
            Ok(PacketStatusChunk::StatusVector {
                two_bit: false,
                symbols,
            })
        }
    }
}

/// Per-received-packet arrival time delta, in multiples of 250 microseconds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct RecvDelta {
    pub type_tcc_packet: SymbolType,
    /// Delta in microseconds; must be a multiple of 250.
    pub delta_us: i64,
}

impl RecvDelta {
    fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        let delta = self.delta_us / 250;
        match self.type_tcc_packet {
            SymbolType::ReceivedSmallDelta => {
                if !(0..=u8::MAX as i64).contains(&delta) {
                    return Err(Error::DeltaExceedLimit);
                }
                buf.put_u8(delta as u8);
            }
            SymbolType::ReceivedLargeDelta => {
                if !(i16::MIN as i64..=i16::MAX as i64).contains(&delta) {
                    return Err(Error::DeltaExceedLimit);
                }
                buf.put_i16(delta as i16);
            }
            SymbolType::NotReceived => return Err(Error::WrongType),
        }
        Ok(())
    }
}

/// TransportLayerCc (RTPFB/TWCC) reports per-packet arrival information for
/// every transport-wide sequence number in a window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportLayerCc {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    /// Transport-wide sequence number of the first packet in this feedback.
    pub base_sequence_number: u16,
    /// Number of packet status symbols across all chunks.
    pub packet_status_count: u16,
    /// Arrival time of the first packet, in multiples of 64ms (24 bits).
    pub reference_time: u32,
    /// Feedback packet counter for loss detection of feedback itself.
    pub fb_pkt_count: u8,
    pub packet_chunks: Vec<PacketStatusChunk>,
    pub recv_deltas: Vec<RecvDelta>,
}

impl TransportLayerCc {
    pub fn marshal_size(&self) -> usize {
        let mut size = HEADER_LENGTH + 12 + self.packet_chunks.len() * 2;
        for d in &self.recv_deltas {
            size += match d.type_tcc_packet {
                SymbolType::ReceivedSmallDelta => 1,
                SymbolType::ReceivedLargeDelta => 2,
                SymbolType::NotReceived => 0,
            };
        }
        (size + 3) / 4 * 4
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_TCC,
            packet_type: PacketType::TransportSpecificFeedback,
            length: header::length_field(self.marshal_size()),
        }
    }

    pub fn marshal(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.header().marshal_to(&mut buf)?;
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        buf.put_u16(self.base_sequence_number);
        buf.put_u16(self.packet_status_count);
        buf.put_u8((self.reference_time >> 16) as u8);
        buf.put_u8((self.reference_time >> 8) as u8);
        buf.put_u8(self.reference_time as u8);
        buf.put_u8(self.fb_pkt_count);
        for chunk in &self.packet_chunks {
            chunk.marshal_to(&mut buf)?;
        }
        for delta in &self.recv_deltas {
            delta.marshal_to(&mut buf)?;
        }
        while buf.len() % 4 != 0 {
            buf.put_u8(0);
        }
        Ok(buf.freeze())
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        let h = Header::unmarshal(raw)?;
        if h.packet_type != PacketType::TransportSpecificFeedback || h.count != FORMAT_TCC {
            return Err(Error::WrongType);
        }
        if raw.len() < HEADER_LENGTH + 12 {
            return Err(Error::PacketTooShort);
        }

        let sender_ssrc = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let media_ssrc = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);
        let base_sequence_number = u16::from_be_bytes([raw[12], raw[13]]);
        let packet_status_count = u16::from_be_bytes([raw[14], raw[15]]);
        let reference_time = (raw[16] as u32) << 16 | (raw[17] as u32) << 8 | raw[18] as u32;
        let fb_pkt_count = raw[19];

        let mut offset = HEADER_LENGTH + 16;
        let mut packet_chunks = vec![];
        let mut symbols_seen = 0usize;
        while symbols_seen < packet_status_count as usize {
            if raw.len() < offset + 2 {
                return Err(Error::PacketTooShort);
            }
            let chunk = PacketStatusChunk::unmarshal([raw[offset], raw[offset + 1]])?;
            offset += 2;
            symbols_seen += chunk.symbol_count();
            packet_chunks.push(chunk);
        }

        // walk symbols again to read the deltas of received packets
        let mut recv_deltas = vec![];
        let mut remaining = packet_status_count as usize;
        for chunk in &packet_chunks {
            let symbols: Vec<SymbolType> = match chunk {
                PacketStatusChunk::RunLength { symbol, run_length } => {
                    vec![*symbol; (*run_length as usize).min(remaining)]
                }
                PacketStatusChunk::StatusVector { symbols, .. } => {
                    symbols[..symbols.len().min(remaining)].to_vec()
                }
            };
            remaining -= symbols.len();
            for s in symbols {
                match s {
                    SymbolType::ReceivedSmallDelta => {
                        if raw.len() < offset + 1 {
                            return Err(Error::PacketTooShort);
                        }
                        recv_deltas.push(RecvDelta {
                            type_tcc_packet: s,
                            delta_us: raw[offset] as i64 * 250,
                        });
                        offset += 1;
                    }
                    SymbolType::ReceivedLargeDelta => {
                        if raw.len() < offset + 2 {
                            return Err(Error::PacketTooShort);
                        }
                        let delta = i16::from_be_bytes([raw[offset], raw[offset + 1]]);
                        recv_deltas.push(RecvDelta {
                            type_tcc_packet: s,
                            delta_us: delta as i64 * 250,
                        });
                        offset += 2;
                    }
                    SymbolType::NotReceived => {}
                }
            }
        }

        Ok(TransportLayerCc {
            sender_ssrc,
            media_ssrc,
            base_sequence_number,
            packet_status_count,
            reference_time,
            fb_pkt_count,
            packet_chunks,
            recv_deltas,
        })
    }
}

#[cfg(test)]
mod transport_layer_cc_test {
    use super::*;

    #[test]
    fn test_run_length_chunk_roundtrip() {
        let tcc = TransportLayerCc {
            sender_ssrc: 1,
            media_ssrc: 2,
            base_sequence_number: 100,
            packet_status_count: 3,
            reference_time: 0x123456,
            fb_pkt_count: 1,
            packet_chunks: vec![PacketStatusChunk::RunLength {
                symbol: SymbolType::ReceivedSmallDelta,
                run_length: 3,
            }],
            recv_deltas: vec![
                RecvDelta {
                    type_tcc_packet: SymbolType::ReceivedSmallDelta,
                    delta_us: 1000,
                },
                RecvDelta {
                    type_tcc_packet: SymbolType::ReceivedSmallDelta,
                    delta_us: 250,
                },
                RecvDelta {
                    type_tcc_packet: SymbolType::ReceivedSmallDelta,
                    delta_us: 0,
                },
            ],
        };
        let raw = tcc.marshal().expect("marshal");
        assert_eq!(raw.len() % 4, 0);
        assert_eq!(TransportLayerCc::unmarshal(&raw).expect("unmarshal"), tcc);
    }

    #[test]
    fn test_status_vector_chunk_roundtrip() {
        let tcc = TransportLayerCc {
            sender_ssrc: 1,
            media_ssrc: 2,
            base_sequence_number: 42,
            packet_status_count: 7,
            reference_time: 1,
            fb_pkt_count: 0,
            packet_chunks: vec![PacketStatusChunk::StatusVector {
                two_bit: true,
                symbols: vec![
                    SymbolType::ReceivedSmallDelta,
                    SymbolType::NotReceived,
                    SymbolType::ReceivedLargeDelta,
                    SymbolType::NotReceived,
                    SymbolType::NotReceived,
                    SymbolType::NotReceived,
                    SymbolType::NotReceived,
                ],
            }],
            recv_deltas: vec![
                RecvDelta {
                    type_tcc_packet: SymbolType::ReceivedSmallDelta,
                    delta_us: 500,
                },
                RecvDelta {
                    type_tcc_packet: SymbolType::ReceivedLargeDelta,
                    delta_us: -1000,
                },
            ],
        };
        let raw = tcc.marshal().expect("marshal");
        assert_eq!(TransportLayerCc::unmarshal(&raw).expect("unmarshal"), tcc);
    }

    #[test]
    fn test_delta_exceeds_limit() {
        let d = RecvDelta {
            type_tcc_packet: SymbolType::ReceivedSmallDelta,
            delta_us: 250 * 300,
        };
        let mut buf = BytesMut::new();
        assert_eq!(d.marshal_to(&mut buf), Err(Error::DeltaExceedLimit));
    }
}

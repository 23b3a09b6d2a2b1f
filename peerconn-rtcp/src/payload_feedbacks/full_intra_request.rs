use bytes::{BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

use crate::header::{self, Header, PacketType, FORMAT_FIR, HEADER_LENGTH};

/// A single FIR request entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct FirEntry {
    pub ssrc: u32,
    pub sequence_number: u8,
}

/// FullIntraRequest (PSFB/FIR) requests a decoder refresh point from a media
/// sender (RFC 5104 section 4.3.1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FullIntraRequest {
    pub sender_ssrc: u32,
    pub media_ssrc: u32,
    pub fir: Vec<FirEntry>,
}

impl FullIntraRequest {
    pub fn marshal_size(&self) -> usize {
        HEADER_LENGTH + 8 + self.fir.len() * 8
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_FIR,
            packet_type: PacketType::PayloadSpecificFeedback,
            length: header::length_field(self.marshal_size()),
        }
    }

    pub fn marshal(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.header().marshal_to(&mut buf)?;
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        for fir in &self.fir {
            buf.put_u32(fir.ssrc);
            buf.put_u8(fir.sequence_number);
            buf.put_u8(0);
            buf.put_u16(0);
        }
        Ok(buf.freeze())
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        let h = Header::unmarshal(raw)?;
        if h.packet_type != PacketType::PayloadSpecificFeedback || h.count != FORMAT_FIR {
            return Err(Error::WrongType);
        }
        if raw.len() < HEADER_LENGTH + 8 {
            return Err(Error::PacketTooShort);
        }

        let sender_ssrc = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let media_ssrc = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);

        let mut offset = HEADER_LENGTH + 8;
        let mut fir = vec![];
        while raw.len() >= offset + 8 {
            fir.push(FirEntry {
                ssrc: u32::from_be_bytes([
                    raw[offset],
                    raw[offset + 1],
                    raw[offset + 2],
                    raw[offset + 3],
                ]),
                sequence_number: raw[offset + 4],
            });
            offset += 8;
        }

        Ok(FullIntraRequest {
            sender_ssrc,
            media_ssrc,
            fir,
        })
    }
}

#[cfg(test)]
mod full_intra_request_test {
    use super::*;

    #[test]
    fn test_fir_roundtrip() {
        let fir = FullIntraRequest {
            sender_ssrc: 1,
            media_ssrc: 2,
            fir: vec![FirEntry {
                ssrc: 2,
                sequence_number: 7,
            }],
        };
        let raw = fir.marshal().expect("marshal");
        assert_eq!(FullIntraRequest::unmarshal(&raw).expect("unmarshal"), fir);
    }
}

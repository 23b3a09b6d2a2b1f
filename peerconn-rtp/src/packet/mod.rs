#[cfg(test)]
mod packet_test;

use bytes::{BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};
use std::fmt;

use crate::header::Header;

/// Packet represents an RTP packet: a header plus payload, with any trailing
/// padding preserved as a count so marshal/unmarshal round-trips bit-exact.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    pub header: Header,
    pub payload: Bytes,
    pub padding_size: u8,
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RTP PACKET:")?;
        writeln!(f, "\tVersion: {}", self.header.version)?;
        writeln!(f, "\tMarker: {}", self.header.marker)?;
        writeln!(f, "\tPayload Type: {}", self.header.payload_type)?;
        writeln!(f, "\tSequence Number: {}", self.header.sequence_number)?;
        writeln!(f, "\tTimestamp: {}", self.header.timestamp)?;
        writeln!(f, "\tSSRC: {} ({:x})", self.header.ssrc, self.header.ssrc)?;
        writeln!(f, "\tPayload Length: {}", self.payload.len())
    }
}

impl Packet {
    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        let (header, header_len) = Header::unmarshal(raw)?;

        let mut end = raw.len();
        let padding_size = if header.padding {
            if end <= header_len {
                return Err(Error::ErrShortPacket);
            }
            let p = raw[end - 1];
            if p as usize > end - header_len {
                return Err(Error::ErrShortPacket);
            }
            end -= p as usize;
            p
        } else {
            0
        };

        Ok(Packet {
            header,
            payload: Bytes::copy_from_slice(&raw[header_len..end]),
            padding_size,
        })
    }

    pub fn marshal_size(&self) -> usize {
        self.header.marshal_size() + self.payload.len() + self.padding_size as usize
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        self.header.marshal_to(buf)?;
        buf.put_slice(&self.payload);
        if self.header.padding {
            if self.padding_size == 0 {
                return Err(Error::ErrShortPacket);
            }
            for _ in 0..self.padding_size - 1 {
                buf.put_u8(0);
            }
            buf.put_u8(self.padding_size);
        }
        Ok(())
    }

    pub fn marshal(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.marshal_to(&mut buf)?;
        Ok(buf)
    }
}

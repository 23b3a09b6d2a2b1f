use bytes::{BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

use crate::header::{self, Header, PacketType, HEADER_LENGTH};

/// Goodbye (RTCP BYE) indicates that one or more sources are no longer active
/// (RFC 3550 section 6.6). An optional reason string may be attached.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Goodbye {
    /// The SSRCs that are leaving.
    pub sources: Vec<u32>,
    /// Optional text describing why.
    pub reason: String,
}

impl Goodbye {
    pub fn marshal_size(&self) -> usize {
        let mut size = HEADER_LENGTH + self.sources.len() * 4;
        if !self.reason.is_empty() {
            size += 1 + self.reason.len();
        }
        (size + 3) / 4 * 4
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.sources.len() as u8,
            packet_type: PacketType::Goodbye,
            length: header::length_field(self.marshal_size()),
        }
    }

    pub fn marshal(&self) -> Result<Bytes> {
        if self.sources.len() > header::COUNT_MAX as usize {
            return Err(Error::TooManyReports);
        }
        if self.reason.len() > u8::MAX as usize {
            return Err(Error::ReasonTooLong);
        }

        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.header().marshal_to(&mut buf)?;
        for source in &self.sources {
            buf.put_u32(*source);
        }
        if !self.reason.is_empty() {
            buf.put_u8(self.reason.len() as u8);
            buf.put_slice(self.reason.as_bytes());
        }
        while buf.len() % 4 != 0 {
            buf.put_u8(0);
        }
        Ok(buf.freeze())
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        let h = Header::unmarshal(raw)?;
        if h.packet_type != PacketType::Goodbye {
            return Err(Error::WrongType);
        }

        let mut offset = HEADER_LENGTH;
        let mut sources = Vec::with_capacity(h.count as usize);
        for _ in 0..h.count {
            if raw.len() < offset + 4 {
                return Err(Error::PacketTooShort);
            }
            sources.push(u32::from_be_bytes([
                raw[offset],
                raw[offset + 1],
                raw[offset + 2],
                raw[offset + 3],
            ]));
            offset += 4;
        }

        let mut reason = String::new();
        if raw.len() > offset {
            let len = raw[offset] as usize;
            offset += 1;
            if raw.len() < offset + len {
                return Err(Error::PacketTooShort);
            }
            reason = String::from_utf8(raw[offset..offset + len].to_vec())
                .map_err(|e| Error::Other(e.to_string()))?;
        }

        Ok(Goodbye { sources, reason })
    }
}

#[cfg(test)]
mod goodbye_test {
    use super::*;

    #[test]
    fn test_goodbye_roundtrip() {
        let bye = Goodbye {
            sources: vec![0x902f9e2e],
            reason: "session ended".to_owned(),
        };
        let raw = bye.marshal().expect("marshal");
        assert_eq!(raw.len() % 4, 0);
        assert_eq!(Goodbye::unmarshal(&raw).expect("unmarshal"), bye);
    }

    #[test]
    fn test_goodbye_no_reason() {
        let bye = Goodbye {
            sources: vec![1, 2],
            reason: String::new(),
        };
        let raw = bye.marshal().expect("marshal");
        assert_eq!(Goodbye::unmarshal(&raw).expect("unmarshal"), bye);
    }

    #[test]
    fn test_goodbye_reason_too_long() {
        let bye = Goodbye {
            sources: vec![1],
            reason: "x".repeat(256),
        };
        assert_eq!(bye.marshal(), Err(Error::ReasonTooLong));
    }
}

use bytes::{BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

use crate::header::{self, Header, PacketType, HEADER_LENGTH};

/// SDES item types (RFC 3550 section 6.5).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SdesType {
    #[default]
    SdesEnd = 0,
    SdesCname = 1,
    SdesName = 2,
    SdesEmail = 3,
    SdesPhone = 4,
    SdesLocation = 5,
    SdesTool = 6,
    SdesNote = 7,
    SdesPrivate = 8,
}

impl TryFrom<u8> for SdesType {
    type Error = Error;

    fn try_from(b: u8) -> Result<Self> {
        match b {
            0 => Ok(SdesType::SdesEnd),
            1 => Ok(SdesType::SdesCname),
            2 => Ok(SdesType::SdesName),
            3 => Ok(SdesType::SdesEmail),
            4 => Ok(SdesType::SdesPhone),
            5 => Ok(SdesType::SdesLocation),
            6 => Ok(SdesType::SdesTool),
            7 => Ok(SdesType::SdesNote),
            8 => Ok(SdesType::SdesPrivate),
            _ => Err(Error::WrongType),
        }
    }
}

/// A single SDES item within a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceDescriptionItem {
    pub sdes_type: SdesType,
    pub text: String,
}

/// A per-source chunk of SDES items.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceDescriptionChunk {
    pub source: u32,
    pub items: Vec<SourceDescriptionItem>,
}

impl SourceDescriptionChunk {
    fn raw_size(&self) -> usize {
        4 + self.items.iter().map(|i| 2 + i.text.len()).sum::<usize>() + 1
    }

    /// Size including the end octet and padding to a 32-bit boundary.
    fn marshal_size(&self) -> usize {
        (self.raw_size() + 3) / 4 * 4
    }
}

/// SourceDescription (RTCP SDES) associates SSRCs with textual metadata,
/// most importantly the canonical name (RFC 3550 section 6.5).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceDescription {
    pub chunks: Vec<SourceDescriptionChunk>,
}

impl SourceDescription {
    /// Convenience constructor for the common single-CNAME packet.
    pub fn with_cname(ssrc: u32, cname: &str) -> Self {
        SourceDescription {
            chunks: vec![SourceDescriptionChunk {
                source: ssrc,
                items: vec![SourceDescriptionItem {
                    sdes_type: SdesType::SdesCname,
                    text: cname.to_owned(),
                }],
            }],
        }
    }

    /// Returns the CNAME reported for `ssrc`, if any.
    pub fn cname(&self, ssrc: u32) -> Option<&str> {
        self.chunks.iter().find(|c| c.source == ssrc).and_then(|c| {
            c.items
                .iter()
                .find(|i| i.sdes_type == SdesType::SdesCname)
                .map(|i| i.text.as_str())
        })
    }

    pub fn marshal_size(&self) -> usize {
        HEADER_LENGTH + self.chunks.iter().map(|c| c.marshal_size()).sum::<usize>()
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.chunks.len() as u8,
            packet_type: PacketType::SourceDescription,
            length: header::length_field(self.marshal_size()),
        }
    }

    pub fn marshal(&self) -> Result<Bytes> {
        if self.chunks.len() > header::COUNT_MAX as usize {
            return Err(Error::TooManyReports);
        }

        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.header().marshal_to(&mut buf)?;
        for chunk in &self.chunks {
            buf.put_u32(chunk.source);
            for item in &chunk.items {
                if item.text.len() > u8::MAX as usize {
                    return Err(Error::SdesTextTooLong);
                }
                buf.put_u8(item.sdes_type as u8);
                buf.put_u8(item.text.len() as u8);
                buf.put_slice(item.text.as_bytes());
            }
            // end octet plus padding to the next 32-bit boundary
            let written = chunk.raw_size();
            for _ in 0..chunk.marshal_size() - written + 1 {
                buf.put_u8(0);
            }
        }
        Ok(buf.freeze())
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        let h = Header::unmarshal(raw)?;
        if h.packet_type != PacketType::SourceDescription {
            return Err(Error::WrongType);
        }

        let mut offset = HEADER_LENGTH;
        let mut chunks = Vec::with_capacity(h.count as usize);
        for _ in 0..h.count {
            if raw.len() < offset + 4 {
                return Err(Error::PacketTooShort);
            }
            let source = u32::from_be_bytes([
                raw[offset],
                raw[offset + 1],
                raw[offset + 2],
                raw[offset + 3],
            ]);
            offset += 4;

            let mut items = vec![];
            loop {
                if raw.len() <= offset {
                    return Err(Error::PacketTooShort);
                }
                let t = raw[offset];
                offset += 1;
                if t == 0 {
                    // chunk terminates on a null octet; consume padding
                    while offset % 4 != 0 {
                        if raw.len() <= offset {
                            return Err(Error::PacketTooShort);
                        }
                        offset += 1;
                    }
                    break;
                }
                let sdes_type = SdesType::try_from(t)?;
                if raw.len() <= offset {
                    return Err(Error::PacketTooShort);
                }
                let len = raw[offset] as usize;
                offset += 1;
                if raw.len() < offset + len {
                    return Err(Error::PacketTooShort);
                }
                let text = String::from_utf8(raw[offset..offset + len].to_vec())
                    .map_err(|e| Error::Other(e.to_string()))?;
                offset += len;
                items.push(SourceDescriptionItem { sdes_type, text });
            }

            chunks.push(SourceDescriptionChunk { source, items });
        }

        Ok(SourceDescription { chunks })
    }
}

#[cfg(test)]
mod source_description_test {
    use super::*;

    #[test]
    fn test_sdes_cname_roundtrip() {
        let sdes = SourceDescription::with_cname(0x902f9e2e, "{9c00eb92-1afb-9d49-a47d-91f64eee69f5}");
        let raw = sdes.marshal().expect("marshal");
        assert_eq!(raw.len() % 4, 0);
        let parsed = SourceDescription::unmarshal(&raw).expect("unmarshal");
        assert_eq!(parsed, sdes);
        assert_eq!(
            parsed.cname(0x902f9e2e),
            Some("{9c00eb92-1afb-9d49-a47d-91f64eee69f5}")
        );
    }

    #[test]
    fn test_sdes_multiple_chunks() {
        let sdes = SourceDescription {
            chunks: vec![
                SourceDescriptionChunk {
                    source: 1,
                    items: vec![SourceDescriptionItem {
                        sdes_type: SdesType::SdesCname,
                        text: "a".to_owned(),
                    }],
                },
                SourceDescriptionChunk {
                    source: 2,
                    items: vec![SourceDescriptionItem {
                        sdes_type: SdesType::SdesTool,
                        text: "peerconn".to_owned(),
                    }],
                },
            ],
        };
        let raw = sdes.marshal().expect("marshal");
        assert_eq!(SourceDescription::unmarshal(&raw).expect("unmarshal"), sdes);
    }

    #[test]
    fn test_sdes_text_too_long() {
        let sdes = SourceDescription::with_cname(1, &"x".repeat(300));
        assert_eq!(sdes.marshal(), Err(Error::SdesTextTooLong));
    }
}

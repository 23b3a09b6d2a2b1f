#[cfg(test)]
mod header_test;

use bytes::{BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

pub const HEADER_LENGTH: usize = 4;
pub const VERSION_SHIFT: u8 = 6;
pub const PADDING_SHIFT: u8 = 5;
pub const EXTENSION_SHIFT: u8 = 4;
pub const MARKER_SHIFT: u8 = 7;
pub const PT_MASK: u8 = 0x7f;
pub const SEQ_NUM_OFFSET: usize = 2;
pub const TIMESTAMP_OFFSET: usize = 4;
pub const SSRC_OFFSET: usize = 8;
pub const CSRC_OFFSET: usize = 12;
pub const CSRC_LENGTH: usize = 4;

/// The one-byte extension profile of RFC 8285.
pub const EXTENSION_PROFILE_ONE_BYTE: u16 = 0xBEDE;

/// A single RFC 8285 one-byte header extension element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Extension {
    pub id: u8,
    pub payload: Bytes,
}

/// Header represents an RTP packet header per RFC 3550 section 5.1.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    pub extension_profile: u16,
    pub extensions: Vec<Extension>,
}

impl Header {
    /// Parses a header from `raw`, returning it together with the number of
    /// bytes consumed.
    pub fn unmarshal(raw: &[u8]) -> Result<(Self, usize)> {
        if raw.len() < CSRC_OFFSET {
            return Err(Error::ErrHeaderSizeInsufficient);
        }

        let version = raw[0] >> VERSION_SHIFT & 0x3;
        let padding = (raw[0] >> PADDING_SHIFT & 0x1) > 0;
        let extension = (raw[0] >> EXTENSION_SHIFT & 0x1) > 0;
        let cc = (raw[0] & 0xF) as usize;
        let marker = (raw[1] >> MARKER_SHIFT & 0x1) > 0;
        let payload_type = raw[1] & PT_MASK;
        let sequence_number = u16::from_be_bytes([raw[2], raw[3]]);
        let timestamp = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let ssrc = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);

        let mut curr_offset = CSRC_OFFSET + cc * CSRC_LENGTH;
        if raw.len() < curr_offset {
            return Err(Error::ErrHeaderSizeInsufficient);
        }

        let mut csrc = Vec::with_capacity(cc);
        for i in 0..cc {
            let offset = CSRC_OFFSET + i * CSRC_LENGTH;
            csrc.push(u32::from_be_bytes([
                raw[offset],
                raw[offset + 1],
                raw[offset + 2],
                raw[offset + 3],
            ]));
        }

        let mut extension_profile = 0u16;
        let mut extensions = vec![];
        if extension {
            if raw.len() < curr_offset + 4 {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }
            extension_profile = u16::from_be_bytes([raw[curr_offset], raw[curr_offset + 1]]);
            let extension_length =
                u16::from_be_bytes([raw[curr_offset + 2], raw[curr_offset + 3]]) as usize * 4;
            curr_offset += 4;

            if raw.len() < curr_offset + extension_length {
                return Err(Error::ErrHeaderSizeInsufficientForExtension);
            }

            match extension_profile {
                EXTENSION_PROFILE_ONE_BYTE => {
                    let end = curr_offset + extension_length;
                    while curr_offset < end {
                        let b = raw[curr_offset];
                        if b == 0x00 {
                            // padding
                            curr_offset += 1;
                            continue;
                        }
                        let ext_id = b >> 4;
                        let len = (b as usize & 0x0F) + 1;
                        curr_offset += 1;
                        if ext_id == 0x0F {
                            // id 15 is reserved, stop parsing
                            break;
                        }
                        if curr_offset + len > end {
                            return Err(Error::ErrHeaderSizeInsufficientForExtension);
                        }
                        extensions.push(Extension {
                            id: ext_id,
                            payload: Bytes::copy_from_slice(&raw[curr_offset..curr_offset + len]),
                        });
                        curr_offset += len;
                    }
                    curr_offset = end;
                }
                _ => {
                    // RFC 3550 extension: keep the body as a single opaque element
                    extensions.push(Extension {
                        id: 0,
                        payload: Bytes::copy_from_slice(
                            &raw[curr_offset..curr_offset + extension_length],
                        ),
                    });
                    curr_offset += extension_length;
                }
            }
        }

        Ok((
            Header {
                version,
                padding,
                extension,
                marker,
                payload_type,
                sequence_number,
                timestamp,
                ssrc,
                csrc,
                extension_profile,
                extensions,
            },
            curr_offset,
        ))
    }

    /// The number of bytes this header occupies once marshaled.
    pub fn marshal_size(&self) -> usize {
        let mut size = CSRC_OFFSET + self.csrc.len() * CSRC_LENGTH;
        if self.extension {
            size += 4 + self.extension_payload_len();
        }
        size
    }

    fn extension_payload_len(&self) -> usize {
        let raw: usize = match self.extension_profile {
            EXTENSION_PROFILE_ONE_BYTE => self
                .extensions
                .iter()
                .map(|e| 1 + e.payload.len())
                .sum::<usize>(),
            _ => self.extensions.iter().map(|e| e.payload.len()).sum(),
        };
        // padded to a 32-bit boundary
        (raw + 3) / 4 * 4
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        let mut b0 = (self.version << VERSION_SHIFT) | self.csrc.len() as u8;
        if self.padding {
            b0 |= 1 << PADDING_SHIFT;
        }
        if self.extension {
            b0 |= 1 << EXTENSION_SHIFT;
        }
        buf.put_u8(b0);

        let mut b1 = self.payload_type;
        if self.marker {
            b1 |= 1 << MARKER_SHIFT;
        }
        buf.put_u8(b1);

        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);

        for csrc in &self.csrc {
            buf.put_u32(*csrc);
        }

        if self.extension {
            let payload_len = self.extension_payload_len();
            buf.put_u16(self.extension_profile);
            buf.put_u16((payload_len / 4) as u16);

            let mut written = 0usize;
            match self.extension_profile {
                EXTENSION_PROFILE_ONE_BYTE => {
                    for ext in &self.extensions {
                        if !(1..=14).contains(&ext.id) {
                            return Err(Error::ErrRfc8285OneByteHeaderIdRange);
                        }
                        if ext.payload.is_empty() || ext.payload.len() > 16 {
                            return Err(Error::ErrRfc8285OneByteHeaderSize);
                        }
                        buf.put_u8(ext.id << 4 | (ext.payload.len() - 1) as u8);
                        buf.put_slice(&ext.payload);
                        written += 1 + ext.payload.len();
                    }
                }
                _ => {
                    for ext in &self.extensions {
                        buf.put_slice(&ext.payload);
                        written += ext.payload.len();
                    }
                }
            }
            while written < payload_len {
                buf.put_u8(0x00);
                written += 1;
            }
        }

        Ok(())
    }

    pub fn marshal(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.marshal_to(&mut buf)?;
        Ok(buf)
    }

    /// Returns the payload of the extension with `id`, if present.
    pub fn get_extension(&self, id: u8) -> Option<Bytes> {
        if !self.extension {
            return None;
        }
        self.extensions
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.payload.clone())
    }

    /// Sets (or replaces) a one-byte extension element.
    pub fn set_extension(&mut self, id: u8, payload: Bytes) -> Result<()> {
        if !(1..=14).contains(&id) {
            return Err(Error::ErrRfc8285OneByteHeaderIdRange);
        }
        if payload.is_empty() || payload.len() > 16 {
            return Err(Error::ErrRfc8285OneByteHeaderSize);
        }

        self.extension = true;
        if self.extension_profile == 0 {
            self.extension_profile = EXTENSION_PROFILE_ONE_BYTE;
        }
        if let Some(ext) = self.extensions.iter_mut().find(|e| e.id == id) {
            ext.payload = payload;
        } else {
            self.extensions.push(Extension { id, payload });
        }
        Ok(())
    }

    /// Removes the extension with `id`; clears the X bit when none remain.
    pub fn del_extension(&mut self, id: u8) {
        self.extensions.retain(|e| e.id != id);
        if self.extensions.is_empty() {
            self.extension = false;
            self.extension_profile = 0;
        }
    }
}

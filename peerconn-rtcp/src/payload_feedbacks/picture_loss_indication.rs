use bytes::{BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

use crate::header::{self, Header, PacketType, FORMAT_PLI, HEADER_LENGTH};

const PLI_LENGTH: usize = HEADER_LENGTH + 8;

/// PictureLossIndication (PSFB/PLI) tells the sender that some amount of
/// encoded video was lost and a keyframe is needed (RFC 4585 section 6.3.1).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct PictureLossIndication {
    /// SSRC of the sender of this feedback.
    pub sender_ssrc: u32,
    /// SSRC of the media source the loss concerns.
    pub media_ssrc: u32,
}

impl PictureLossIndication {
    pub fn marshal_size(&self) -> usize {
        PLI_LENGTH
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: FORMAT_PLI,
            packet_type: PacketType::PayloadSpecificFeedback,
            length: header::length_field(PLI_LENGTH),
        }
    }

    pub fn marshal(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(PLI_LENGTH);
        self.header().marshal_to(&mut buf)?;
        buf.put_u32(self.sender_ssrc);
        buf.put_u32(self.media_ssrc);
        Ok(buf.freeze())
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        let h = Header::unmarshal(raw)?;
        if h.packet_type != PacketType::PayloadSpecificFeedback || h.count != FORMAT_PLI {
            return Err(Error::WrongType);
        }
        if raw.len() < PLI_LENGTH {
            return Err(Error::PacketTooShort);
        }

        Ok(PictureLossIndication {
            sender_ssrc: u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
            media_ssrc: u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]),
        })
    }
}

#[cfg(test)]
mod picture_loss_indication_test {
    use super::*;

    #[test]
    fn test_pli_roundtrip() {
        let pli = PictureLossIndication {
            sender_ssrc: 0x902f9e2e,
            media_ssrc: 0x902f9e2e,
        };
        let raw = pli.marshal().expect("marshal");
        assert_eq!(
            PictureLossIndication::unmarshal(&raw).expect("unmarshal"),
            pli
        );
    }
}

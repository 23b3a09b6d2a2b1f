use bytes::{BufMut, BytesMut};
use shared::error::{Error, Result};
use std::fmt;

pub const HEADER_LENGTH: usize = 4;
pub const SSRC_LENGTH: usize = 4;
pub const VERSION: u8 = 2;

pub(crate) const COUNT_MAX: u8 = (1 << 5) - 1;

/// RTCP packet types registered with IANA that this stack understands.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum PacketType {
    #[default]
    Unsupported = 0,
    SenderReport = 200,
    ReceiverReport = 201,
    SourceDescription = 202,
    Goodbye = 203,
    ApplicationDefined = 204,
    TransportSpecificFeedback = 205,
    PayloadSpecificFeedback = 206,
    ExtendedReport = 207,
}

/// Feedback message type for transport-specific feedback (RTPFB).
pub const FORMAT_TLN: u8 = 1;
pub const FORMAT_TCC: u8 = 15;
/// Feedback message type for payload-specific feedback (PSFB).
pub const FORMAT_PLI: u8 = 1;
pub const FORMAT_FIR: u8 = 4;

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PacketType::Unsupported => "Unsupported",
            PacketType::SenderReport => "SR",
            PacketType::ReceiverReport => "RR",
            PacketType::SourceDescription => "SDES",
            PacketType::Goodbye => "BYE",
            PacketType::ApplicationDefined => "APP",
            PacketType::TransportSpecificFeedback => "TSFB",
            PacketType::PayloadSpecificFeedback => "PSFB",
            PacketType::ExtendedReport => "XR",
        };
        write!(f, "{s}")
    }
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(b: u8) -> Result<Self> {
        match b {
            200 => Ok(PacketType::SenderReport),
            201 => Ok(PacketType::ReceiverReport),
            202 => Ok(PacketType::SourceDescription),
            203 => Ok(PacketType::Goodbye),
            204 => Ok(PacketType::ApplicationDefined),
            205 => Ok(PacketType::TransportSpecificFeedback),
            206 => Ok(PacketType::PayloadSpecificFeedback),
            207 => Ok(PacketType::ExtendedReport),
            _ => Err(Error::ErrUnknownRtcpPacketType(b)),
        }
    }
}

/// Header is the common RTCP packet header per RFC 3550 section 6.4.1.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Header {
    /// Padding flag: the packet contains trailing padding octets.
    pub padding: bool,
    /// Reception report count or feedback message type, depending on type.
    pub count: u8,
    /// The RTCP packet type.
    pub packet_type: PacketType,
    /// Packet length in 32-bit words minus one, including header and padding.
    pub length: u16,
}

impl Header {
    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < HEADER_LENGTH {
            return Err(Error::PacketTooShort);
        }

        let version = raw[0] >> 6 & 0x3;
        if version != VERSION {
            return Err(Error::BadVersion);
        }

        Ok(Header {
            padding: (raw[0] >> 5 & 0x1) > 0,
            count: raw[0] & 0x1f,
            packet_type: PacketType::try_from(raw[1])?,
            length: u16::from_be_bytes([raw[2], raw[3]]),
        })
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        if self.count > COUNT_MAX {
            return Err(Error::InvalidHeader);
        }

        let mut b0 = VERSION << 6 | self.count;
        if self.padding {
            b0 |= 1 << 5;
        }
        buf.put_u8(b0);
        buf.put_u8(self.packet_type as u8);
        buf.put_u16(self.length);
        Ok(())
    }
}

/// Length of the packet body in bytes, derived from the header length field.
pub(crate) fn body_length(header: &Header) -> usize {
    header.length as usize * 4
}

/// Computes the header length field for a packet of `size` bytes total.
pub(crate) fn length_field(size: usize) -> u16 {
    (size / 4 - 1) as u16
}

#[cfg(test)]
mod header_test {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let h = Header {
            padding: false,
            count: 2,
            packet_type: PacketType::SenderReport,
            length: 7,
        };
        let mut buf = BytesMut::new();
        h.marshal_to(&mut buf).expect("marshal");
        assert_eq!(Header::unmarshal(&buf).expect("unmarshal"), h);
    }

    #[test]
    fn test_unknown_packet_type() {
        let raw = [0x80, 0xc0, 0x00, 0x00]; // pt = 192
        assert_eq!(
            Header::unmarshal(&raw),
            Err(Error::ErrUnknownRtcpPacketType(192))
        );
    }

    #[test]
    fn test_bad_version() {
        let raw = [0x00, 0xc8, 0x00, 0x06];
        assert_eq!(Header::unmarshal(&raw), Err(Error::BadVersion));
    }
}

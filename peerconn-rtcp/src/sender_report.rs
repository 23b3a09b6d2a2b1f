use bytes::{BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

use crate::header::{self, Header, PacketType, HEADER_LENGTH};
use crate::reception_report::{ReceptionReport, RECEPTION_REPORT_LENGTH};

pub const SR_HEADER_LENGTH: usize = 24;

/// SenderReport (RTCP SR) carries transmission and reception statistics from
/// an active sender (RFC 3550 section 6.4.1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SenderReport {
    /// The synchronization source identifier of the sender.
    pub ssrc: u32,
    /// The wallclock time when this report was sent, as a 64-bit NTP timestamp.
    pub ntp_time: u64,
    /// The RTP timestamp corresponding to ntp_time.
    pub rtp_time: u32,
    /// Total number of RTP data packets transmitted since starting.
    pub packet_count: u32,
    /// Total number of payload octets transmitted since starting.
    pub octet_count: u32,
    /// Zero or more reception report blocks.
    pub reports: Vec<ReceptionReport>,
}

impl SenderReport {
    pub fn marshal_size(&self) -> usize {
        HEADER_LENGTH + SR_HEADER_LENGTH + self.reports.len() * RECEPTION_REPORT_LENGTH
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.reports.len() as u8,
            packet_type: PacketType::SenderReport,
            length: header::length_field(self.marshal_size()),
        }
    }

    pub fn marshal(&self) -> Result<Bytes> {
        if self.reports.len() > header::COUNT_MAX as usize {
            return Err(Error::TooManyReports);
        }

        let mut buf = BytesMut::with_capacity(self.marshal_size());
        self.header().marshal_to(&mut buf)?;
        buf.put_u32(self.ssrc);
        buf.put_u64(self.ntp_time);
        buf.put_u32(self.rtp_time);
        buf.put_u32(self.packet_count);
        buf.put_u32(self.octet_count);
        for report in &self.reports {
            report.marshal_to(&mut buf)?;
        }
        Ok(buf.freeze())
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        let h = Header::unmarshal(raw)?;
        if h.packet_type != PacketType::SenderReport {
            return Err(Error::WrongType);
        }
        if raw.len() < HEADER_LENGTH + SR_HEADER_LENGTH {
            return Err(Error::PacketTooShort);
        }

        let ssrc = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let ntp_time = u64::from_be_bytes([
            raw[8], raw[9], raw[10], raw[11], raw[12], raw[13], raw[14], raw[15],
        ]);
        let rtp_time = u32::from_be_bytes([raw[16], raw[17], raw[18], raw[19]]);
        let packet_count = u32::from_be_bytes([raw[20], raw[21], raw[22], raw[23]]);
        let octet_count = u32::from_be_bytes([raw[24], raw[25], raw[26], raw[27]]);

        let mut offset = HEADER_LENGTH + SR_HEADER_LENGTH;
        let mut reports = Vec::with_capacity(h.count as usize);
        for _ in 0..h.count {
            if raw.len() < offset + RECEPTION_REPORT_LENGTH {
                return Err(Error::PacketTooShort);
            }
            reports.push(ReceptionReport::unmarshal(&raw[offset..])?);
            offset += RECEPTION_REPORT_LENGTH;
        }

        Ok(SenderReport {
            ssrc,
            ntp_time,
            rtp_time,
            packet_count,
            octet_count,
            reports,
        })
    }
}

#[cfg(test)]
mod sender_report_test {
    use super::*;

    #[test]
    fn test_sender_report_roundtrip() {
        let sr = SenderReport {
            ssrc: 0x902f9e2e,
            ntp_time: 0xda8bd1fcdddda05a,
            rtp_time: 0xaaf4edd5,
            packet_count: 1,
            octet_count: 2,
            reports: vec![ReceptionReport {
                ssrc: 0xbc5e9a40,
                fraction_lost: 0,
                total_lost: 0,
                last_sequence_number: 0x46e1,
                jitter: 273,
                last_sender_report: 0x9f36432,
                delay: 150137,
            }],
        };
        let raw = sr.marshal().expect("marshal");
        assert_eq!(raw.len(), sr.marshal_size());
        assert_eq!(SenderReport::unmarshal(&raw).expect("unmarshal"), sr);
    }

    #[test]
    fn test_sender_report_wrong_type() {
        let raw = [
            0x80, 0xc9, 0x00, 0x01, // RR header
            0x90, 0x2f, 0x9e, 0x2e,
        ];
        assert_eq!(SenderReport::unmarshal(&raw), Err(Error::WrongType));
    }

    #[test]
    fn test_sender_report_truncated() {
        let raw = [0x80, 0xc8, 0x00, 0x06, 0x90, 0x2f];
        assert_eq!(SenderReport::unmarshal(&raw), Err(Error::PacketTooShort));
    }
}

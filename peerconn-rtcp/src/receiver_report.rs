use bytes::{BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

use crate::header::{self, Header, PacketType, HEADER_LENGTH, SSRC_LENGTH};
use crate::reception_report::{ReceptionReport, RECEPTION_REPORT_LENGTH};

/// ReceiverReport (RTCP RR) carries reception statistics from a participant
/// that is not an active sender (RFC 3550 section 6.4.2).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReceiverReport {
    /// The synchronization source identifier of the packet sender.
    pub ssrc: u32,
    /// Zero or more reception report blocks.
    pub reports: Vec<ReceptionReport>,
}

impl ReceiverReport {
    pub fn marshal_size(&self) -> usize {
        HEADER_LENGTH + SSRC_LENGTH + self.reports.len() * RECEPTION_REPORT_LENGTH
    }

    pub fn header(&self) -> Header {
        Header {
            padding: false,
            count: self.reports.len() as u8,
            packet_type: PacketType::ReceiverReport,
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
        for report in &self.reports {
            report.marshal_to(&mut buf)?;
        }
        Ok(buf.freeze())
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        let h = Header::unmarshal(raw)?;
        if h.packet_type != PacketType::ReceiverReport {
            return Err(Error::WrongType);
        }
        if raw.len() < HEADER_LENGTH + SSRC_LENGTH {
            return Err(Error::PacketTooShort);
        }

        let ssrc = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);

        let mut offset = HEADER_LENGTH + SSRC_LENGTH;
        let mut reports = Vec::with_capacity(h.count as usize);
        for _ in 0..h.count {
            if raw.len() < offset + RECEPTION_REPORT_LENGTH {
                return Err(Error::PacketTooShort);
            }
            reports.push(ReceptionReport::unmarshal(&raw[offset..])?);
            offset += RECEPTION_REPORT_LENGTH;
        }

        Ok(ReceiverReport { ssrc, reports })
    }
}

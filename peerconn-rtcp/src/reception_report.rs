use bytes::{BufMut, BytesMut};
use shared::error::{Error, Result};

pub const RECEPTION_REPORT_LENGTH: usize = 24;
const FRACTION_LOST_OFFSET: usize = 4;
const TOTAL_LOST_OFFSET: usize = 5;
const LAST_SEQ_OFFSET: usize = 8;
const JITTER_OFFSET: usize = 12;
const LAST_SR_OFFSET: usize = 16;
const DELAY_OFFSET: usize = 20;

/// ReceptionReport is a block within a SenderReport or ReceiverReport that
/// summarizes the reception of a single SSRC (RFC 3550 section 6.4.1).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ReceptionReport {
    /// The SSRC this report concerns.
    pub ssrc: u32,
    /// Fraction of packets lost since the previous report, as a fixed point
    /// number with the binary point at the left edge.
    pub fraction_lost: u8,
    /// Cumulative number of packets lost, a 24-bit signed-saturating count.
    pub total_lost: u32,
    /// Extended highest sequence number received: cycles<<16 | max seq.
    pub last_sequence_number: u32,
    /// Interarrival jitter in timestamp units, per RFC 3550 A.8.
    pub jitter: u32,
    /// Middle 32 bits of the NTP timestamp of the last SR received.
    pub last_sender_report: u32,
    /// Delay since the last SR, in units of 1/65536 seconds.
    pub delay: u32,
}

impl ReceptionReport {
    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < RECEPTION_REPORT_LENGTH {
            return Err(Error::PacketTooShort);
        }

        let total_lost = (raw[TOTAL_LOST_OFFSET] as u32) << 16
            | (raw[TOTAL_LOST_OFFSET + 1] as u32) << 8
            | raw[TOTAL_LOST_OFFSET + 2] as u32;

        Ok(ReceptionReport {
            ssrc: u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]),
            fraction_lost: raw[FRACTION_LOST_OFFSET],
            total_lost,
            last_sequence_number: u32::from_be_bytes([
                raw[LAST_SEQ_OFFSET],
                raw[LAST_SEQ_OFFSET + 1],
                raw[LAST_SEQ_OFFSET + 2],
                raw[LAST_SEQ_OFFSET + 3],
            ]),
            jitter: u32::from_be_bytes([
                raw[JITTER_OFFSET],
                raw[JITTER_OFFSET + 1],
                raw[JITTER_OFFSET + 2],
                raw[JITTER_OFFSET + 3],
            ]),
            last_sender_report: u32::from_be_bytes([
                raw[LAST_SR_OFFSET],
                raw[LAST_SR_OFFSET + 1],
                raw[LAST_SR_OFFSET + 2],
                raw[LAST_SR_OFFSET + 3],
            ]),
            delay: u32::from_be_bytes([
                raw[DELAY_OFFSET],
                raw[DELAY_OFFSET + 1],
                raw[DELAY_OFFSET + 2],
                raw[DELAY_OFFSET + 3],
            ]),
        })
    }

    pub fn marshal_to(&self, buf: &mut BytesMut) -> Result<()> {
        if self.total_lost >= 1 << 24 {
            return Err(Error::InvalidTotalLost);
        }

        buf.put_u32(self.ssrc);
        buf.put_u8(self.fraction_lost);
        buf.put_u8((self.total_lost >> 16) as u8);
        buf.put_u8((self.total_lost >> 8) as u8);
        buf.put_u8(self.total_lost as u8);
        buf.put_u32(self.last_sequence_number);
        buf.put_u32(self.jitter);
        buf.put_u32(self.last_sender_report);
        buf.put_u32(self.delay);
        Ok(())
    }
}

#[cfg(test)]
mod reception_report_test {
    use super::*;

    #[test]
    fn test_reception_report_roundtrip() {
        let r = ReceptionReport {
            ssrc: 0x902f9e2e,
            fraction_lost: 81,
            total_lost: 0x0000_1234,
            last_sequence_number: 0x0001_0203,
            jitter: 273,
            last_sender_report: 0x9f36432,
            delay: 150137,
        };
        let mut buf = BytesMut::new();
        r.marshal_to(&mut buf).expect("marshal");
        assert_eq!(buf.len(), RECEPTION_REPORT_LENGTH);
        assert_eq!(ReceptionReport::unmarshal(&buf).expect("unmarshal"), r);
    }

    #[test]
    fn test_total_lost_overflow() {
        let r = ReceptionReport {
            total_lost: 1 << 24,
            ..Default::default()
        };
        let mut buf = BytesMut::new();
        assert_eq!(r.marshal_to(&mut buf), Err(Error::InvalidTotalLost));
    }
}

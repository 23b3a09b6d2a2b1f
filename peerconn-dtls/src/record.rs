use shared::error::{Error, Result};

/// DTLS 1.2 on the wire: {254, 253}.
pub const PROTOCOL_VERSION1_2: (u8, u8) = (0xfe, 0xfd);
/// DTLS 1.0, sent in the record layer of initial flights for compatibility.
pub const PROTOCOL_VERSION1_0: (u8, u8) = (0xfe, 0xff);

/// The 13-byte record layer header of RFC 6347 section 4.1.
pub const RECORD_LAYER_HEADER_SIZE: usize = 13;

/// Largest handshake fragment we will emit or accept.
pub const MAX_FRAGMENT_SIZE: usize = 16384;

/// Largest sequence number representable in the 48-bit field.
pub const MAX_SEQUENCE_NUMBER: u64 = (1 << 48) - 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Unsupported = 0,
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl TryFrom<u8> for ContentType {
    type Error = Error;

    fn try_from(b: u8) -> Result<Self> {
        match b {
            20 => Ok(ContentType::ChangeCipherSpec),
            21 => Ok(ContentType::Alert),
            22 => Ok(ContentType::Handshake),
            23 => Ok(ContentType::ApplicationData),
            _ => Err(Error::ErrInvalidContentType),
        }
    }
}

/// RecordLayerHeader is the fixed prefix of every DTLS record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct RecordLayerHeader {
    pub content_type: ContentType,
    pub protocol_version: (u8, u8),
    pub epoch: u16,
    pub sequence_number: u64, // uint48
    pub content_len: u16,
}

impl RecordLayerHeader {
    pub fn marshal(&self) -> Result<Vec<u8>> {
        if self.sequence_number > MAX_SEQUENCE_NUMBER {
            return Err(Error::ErrSequenceNumberOverflow);
        }

        let mut out = Vec::with_capacity(RECORD_LAYER_HEADER_SIZE);
        out.push(self.content_type as u8);
        out.push(self.protocol_version.0);
        out.push(self.protocol_version.1);
        out.extend_from_slice(&self.epoch.to_be_bytes());
        out.extend_from_slice(&self.sequence_number.to_be_bytes()[2..8]);
        out.extend_from_slice(&self.content_len.to_be_bytes());
        Ok(out)
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < RECORD_LAYER_HEADER_SIZE {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }

        let content_type = ContentType::try_from(raw[0])?;
        let protocol_version = (raw[1], raw[2]);
        if protocol_version != PROTOCOL_VERSION1_2 && protocol_version != PROTOCOL_VERSION1_0 {
            return Err(Error::ErrUnsupportedProtocolVersion);
        }

        let epoch = u16::from_be_bytes([raw[3], raw[4]]);
        let mut seq = [0u8; 8];
        seq[2..8].copy_from_slice(&raw[5..11]);
        let sequence_number = u64::from_be_bytes(seq);
        let content_len = u16::from_be_bytes([raw[11], raw[12]]);

        Ok(RecordLayerHeader {
            content_type,
            protocol_version,
            epoch,
            sequence_number,
            content_len,
        })
    }
}

/// Splits a datagram into its raw records, in order. Each returned slice
/// includes the record header.
pub fn split_records(datagram: &[u8]) -> Result<Vec<&[u8]>> {
    let mut records = vec![];
    let mut offset = 0usize;
    while offset < datagram.len() {
        if datagram.len() < offset + RECORD_LAYER_HEADER_SIZE {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        let content_len =
            u16::from_be_bytes([datagram[offset + 11], datagram[offset + 12]]) as usize;
        let end = offset + RECORD_LAYER_HEADER_SIZE + content_len;
        if datagram.len() < end {
            return Err(Error::ErrInvalidPacketLength);
        }
        records.push(&datagram[offset..end]);
        offset = end;
    }
    Ok(records)
}

#[cfg(test)]
mod record_test {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let h = RecordLayerHeader {
            content_type: ContentType::Handshake,
            protocol_version: PROTOCOL_VERSION1_2,
            epoch: 1,
            sequence_number: 0x0000_1234_5678,
            content_len: 42,
        };
        let raw = h.marshal().expect("marshal");
        assert_eq!(raw.len(), RECORD_LAYER_HEADER_SIZE);
        assert_eq!(RecordLayerHeader::unmarshal(&raw).expect("unmarshal"), h);
    }

    #[test]
    fn test_sequence_number_overflow() {
        let h = RecordLayerHeader {
            sequence_number: 1 << 48,
            ..Default::default()
        };
        assert_eq!(h.marshal(), Err(Error::ErrSequenceNumberOverflow));
    }

    #[test]
    fn test_split_records_multiple_per_datagram() {
        let mk = |len: u8| {
            let mut r = vec![22, 0xfe, 0xfd, 0, 0, 0, 0, 0, 0, 0, 1, 0, len];
            r.extend(std::iter::repeat(0xab).take(len as usize));
            r
        };
        let mut datagram = mk(3);
        datagram.extend(mk(5));

        let records = split_records(&datagram).expect("split");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].len(), RECORD_LAYER_HEADER_SIZE + 3);
        assert_eq!(records[1].len(), RECORD_LAYER_HEADER_SIZE + 5);
    }

    #[test]
    fn test_split_records_truncated() {
        let datagram = vec![22, 0xfe, 0xfd, 0, 0, 0, 0, 0, 0, 0, 1, 0, 10, 0xab];
        assert_eq!(split_records(&datagram), Err(Error::ErrInvalidPacketLength));
    }
}

use shared::error::{Error, Result};

use crate::attributes::ATTR_FINGERPRINT;
use crate::message::{Message, Setter, ATTRIBUTE_HEADER_SIZE, MESSAGE_HEADER_SIZE};

/// The XOR value of RFC 5389 section 15.5, "STUN" in ASCII.
pub const FINGERPRINT_XOR_VALUE: u32 = 0x5354_554e;

const FINGERPRINT_SIZE: usize = 4;

/// FINGERPRINT attribute: CRC-32 of the message up to this attribute, XORed
/// with [FINGERPRINT_XOR_VALUE]. Always the last attribute of a message.
#[derive(Debug, Copy, Clone, Default)]
pub struct FingerprintAttr;

pub const FINGERPRINT: FingerprintAttr = FingerprintAttr;

impl FingerprintAttr {
    fn value(raw_prefix: &[u8]) -> u32 {
        crc32fast::hash(raw_prefix) ^ FINGERPRINT_XOR_VALUE
    }

    /// Verifies the FINGERPRINT attribute of a decoded message.
    pub fn check(&self, m: &Message) -> Result<()> {
        let offset = m.attr_offset(ATTR_FINGERPRINT)?;
        let stored = m.get(ATTR_FINGERPRINT)?;
        if stored.len() != FINGERPRINT_SIZE {
            return Err(Error::ErrAttributeSizeInvalid);
        }
        let stored = u32::from_be_bytes([stored[0], stored[1], stored[2], stored[3]]);

        let mut prefix = m.raw[..offset].to_vec();
        let adjusted =
            (offset - MESSAGE_HEADER_SIZE + ATTRIBUTE_HEADER_SIZE + FINGERPRINT_SIZE) as u16;
        prefix[2..4].copy_from_slice(&adjusted.to_be_bytes());

        if Self::value(&prefix) != stored {
            return Err(Error::ErrFingerprintMismatch);
        }
        Ok(())
    }
}

impl Setter for FingerprintAttr {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let adjusted =
            (m.raw.len() - MESSAGE_HEADER_SIZE + ATTRIBUTE_HEADER_SIZE + FINGERPRINT_SIZE) as u16;
        m.raw[2..4].copy_from_slice(&adjusted.to_be_bytes());

        let v = Self::value(&m.raw.clone());
        m.add(ATTR_FINGERPRINT, &v.to_be_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod fingerprint_test {
    use super::*;
    use crate::message::{TransactionId, BINDING_REQUEST};

    #[test]
    fn test_fingerprint_roundtrip() {
        let mut m = Message::new();
        m.build(&[&BINDING_REQUEST, &TransactionId::new(), &FINGERPRINT])
            .expect("build");

        let mut decoded = Message {
            raw: m.raw.clone(),
            ..Default::default()
        };
        decoded.decode().expect("decode");
        FINGERPRINT.check(&decoded).expect("fingerprint");
    }

    #[test]
    fn test_fingerprint_detects_corruption() {
        let mut m = Message::new();
        m.build(&[&BINDING_REQUEST, &TransactionId::new(), &FINGERPRINT])
            .unwrap();

        let mut raw = m.raw.clone();
        raw[10] ^= 0x01;
        let mut decoded = Message {
            raw,
            ..Default::default()
        };
        decoded.decode().unwrap();
        assert_eq!(
            FINGERPRINT.check(&decoded).unwrap_err(),
            Error::ErrFingerprintMismatch
        );
    }
}

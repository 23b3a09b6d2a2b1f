use hmac::{Hmac, Mac};
use sha1::Sha1;
use shared::error::{Error, Result};
use subtle::ConstantTimeEq;

use crate::attributes::ATTR_MESSAGE_INTEGRITY;
use crate::message::{Message, Setter, ATTRIBUTE_HEADER_SIZE, MESSAGE_HEADER_SIZE};

type HmacSha1 = Hmac<Sha1>;

const INTEGRITY_VALUE_SIZE: usize = 20;

/// MESSAGE-INTEGRITY (RFC 5389 section 15.4): HMAC-SHA1 over the message up
/// to (and with the length field covering) this attribute.
#[derive(Debug, Clone, Default)]
pub struct MessageIntegrity(pub Vec<u8>);

impl MessageIntegrity {
    /// Short-term credential key: the password itself (RFC 5389 section
    /// 10.2), as ICE uses it.
    pub fn new_short_term_integrity(password: String) -> Self {
        MessageIntegrity(password.into_bytes())
    }

    fn hmac(key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
        let mut mac =
            HmacSha1::new_from_slice(key).map_err(|e| Error::Other(e.to_string()))?;
        mac.update(message);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Verifies the MESSAGE-INTEGRITY attribute of a decoded message.
    pub fn check(&self, m: &mut Message) -> Result<()> {
        let offset = m.attr_offset(ATTR_MESSAGE_INTEGRITY)?;
        let stored = m.get(ATTR_MESSAGE_INTEGRITY)?.to_vec();
        if stored.len() != INTEGRITY_VALUE_SIZE {
            return Err(Error::ErrAttributeSizeInvalid);
        }

        // The length field must cover up to the end of this attribute.
        let mut prefix = m.raw[..offset].to_vec();
        let adjusted =
            (offset - MESSAGE_HEADER_SIZE + ATTRIBUTE_HEADER_SIZE + INTEGRITY_VALUE_SIZE) as u16;
        prefix[2..4].copy_from_slice(&adjusted.to_be_bytes());

        let expected = Self::hmac(&self.0, &prefix)?;
        if expected.ct_eq(&stored).unwrap_u8() != 1 {
            return Err(Error::ErrIntegrityMismatch);
        }
        Ok(())
    }
}

impl Setter for MessageIntegrity {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        // Patch the length field to cover the attribute being added, per the
        // dummy-attribute procedure of RFC 5389 section 15.4.
        let adjusted = (m.raw.len() - MESSAGE_HEADER_SIZE
            + ATTRIBUTE_HEADER_SIZE
            + INTEGRITY_VALUE_SIZE) as u16;
        m.raw[2..4].copy_from_slice(&adjusted.to_be_bytes());

        let tag = Self::hmac(&self.0, &m.raw.clone())?;
        m.add(ATTR_MESSAGE_INTEGRITY, &tag);
        Ok(())
    }
}

#[cfg(test)]
mod integrity_test {
    use super::*;
    use crate::message::{TransactionId, BINDING_REQUEST};

    #[test]
    fn test_integrity_roundtrip() {
        let mut m = Message::new();
        m.build(&[
            &BINDING_REQUEST,
            &TransactionId::new(),
            &MessageIntegrity::new_short_term_integrity("pwd".to_owned()),
        ])
        .expect("build");

        let mut decoded = Message {
            raw: m.raw.clone(),
            ..Default::default()
        };
        decoded.decode().expect("decode");
        MessageIntegrity::new_short_term_integrity("pwd".to_owned())
            .check(&mut decoded)
            .expect("integrity");
    }

    #[test]
    fn test_integrity_wrong_password() {
        let mut m = Message::new();
        m.build(&[
            &BINDING_REQUEST,
            &TransactionId::new(),
            &MessageIntegrity::new_short_term_integrity("pwd".to_owned()),
        ])
        .unwrap();

        let mut decoded = Message {
            raw: m.raw.clone(),
            ..Default::default()
        };
        decoded.decode().unwrap();
        assert_eq!(
            MessageIntegrity::new_short_term_integrity("other".to_owned())
                .check(&mut decoded)
                .unwrap_err(),
            Error::ErrIntegrityMismatch
        );
    }

    #[test]
    fn test_integrity_tampered_message() {
        let mut m = Message::new();
        m.build(&[
            &BINDING_REQUEST,
            &TransactionId::new(),
            &MessageIntegrity::new_short_term_integrity("pwd".to_owned()),
        ])
        .unwrap();

        let mut raw = m.raw.clone();
        raw[9] ^= 0xff; // flip a transaction id byte
        let mut decoded = Message {
            raw,
            ..Default::default()
        };
        decoded.decode().unwrap();
        assert!(MessageIntegrity::new_short_term_integrity("pwd".to_owned())
            .check(&mut decoded)
            .is_err());
    }
}

use shared::error::{Error, Result};

use crate::prf::VERIFY_DATA_LENGTH;

/// Finished carries the PRF digest proving both sides saw the same handshake
/// (RFC 5246 section 7.4.9).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

impl Finished {
    pub fn marshal(&self) -> Vec<u8> {
        self.verify_data.clone()
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() != VERIFY_DATA_LENGTH {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        Ok(Finished {
            verify_data: raw.to_vec(),
        })
    }
}

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

pub const HANDSHAKE_RANDOM_LENGTH: usize = 32;
const RANDOM_BYTES_LENGTH: usize = 28;

/// The 32-byte hello random: 4 bytes of time plus 28 random bytes
/// (RFC 5246 section 7.4.1.2).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct HandshakeRandom {
    pub gmt_unix_time: u32,
    pub random_bytes: [u8; RANDOM_BYTES_LENGTH],
}

impl HandshakeRandom {
    /// Fills the random with the current time and fresh entropy.
    pub fn populate(&mut self) {
        self.gmt_unix_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        rand::thread_rng().fill(&mut self.random_bytes);
    }

    pub fn marshal(&self) -> [u8; HANDSHAKE_RANDOM_LENGTH] {
        let mut out = [0u8; HANDSHAKE_RANDOM_LENGTH];
        out[..4].copy_from_slice(&self.gmt_unix_time.to_be_bytes());
        out[4..].copy_from_slice(&self.random_bytes);
        out
    }

    pub fn unmarshal(raw: &[u8; HANDSHAKE_RANDOM_LENGTH]) -> Self {
        let mut random_bytes = [0u8; RANDOM_BYTES_LENGTH];
        random_bytes.copy_from_slice(&raw[4..]);
        HandshakeRandom {
            gmt_unix_time: u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]),
            random_bytes,
        }
    }
}

#[cfg(test)]
mod context_test;

use bytes::Bytes;
use shared::error::{Error, Result};
use shared::replay_detector::{ReplayDetector, SlidingWindowDetector};
use std::collections::HashMap;

use crate::cipher::cipher_aead_aes_gcm::CipherAeadAesGcm;
use crate::cipher::cipher_aes_cm_hmac_sha1::CipherAesCmHmacSha1;
use crate::cipher::Cipher;
use crate::protection_profile::ProtectionProfile;

/// The anti-replay window, in packets, required by RFC 3711 section 3.3.2.
pub const REPLAY_WINDOW_SIZE: u64 = 64;

const MAX_ROC_DISAMBIGUATE_WINDOW: u16 = 32768;
const MAX_SRTCP_INDEX: u64 = (1 << 31) - 1;
const MAX_SRTP_INDEX: u64 = (1 << 48) - 1;

/// Per-SSRC sender/receiver state for SRTP: the rollover counter and the
/// highest authenticated sequence number, per RFC 3711 section 3.3.1.
struct SrtpSsrcState {
    ssrc: u32,
    rollover_counter: u32,
    rollover_has_processed: bool,
    last_sequence_number: u16,
    replay_detector: SlidingWindowDetector,
}

impl SrtpSsrcState {
    fn new(ssrc: u32) -> Self {
        Self {
            ssrc,
            rollover_counter: 0,
            rollover_has_processed: false,
            last_sequence_number: 0,
            replay_detector: SlidingWindowDetector::new(REPLAY_WINDOW_SIZE, MAX_SRTP_INDEX),
        }
    }

    /// Guesses the rollover counter for `sequence_number` without committing
    /// to it, per the pseudocode in RFC 3711 appendix A.
    fn next_rollover_count(&self, sequence_number: u16) -> u32 {
        if !self.rollover_has_processed {
            return self.rollover_counter;
        }

        let s_l = self.last_sequence_number as i32;
        let seq = sequence_number as i32;
        let window = MAX_ROC_DISAMBIGUATE_WINDOW as i32;
        if s_l < window {
            if seq - s_l > window {
                return self.rollover_counter.wrapping_sub(1);
            }
        } else if s_l - window > seq {
            return self.rollover_counter.wrapping_add(1);
        }
        self.rollover_counter
    }

    /// Commits `sequence_number` after successful authentication.
    fn update_rollover_count(&mut self, sequence_number: u16) {
        if !self.rollover_has_processed {
            self.rollover_has_processed = true;
            self.last_sequence_number = sequence_number;
            return;
        }

        let guessed = self.next_rollover_count(sequence_number);
        if guessed == self.rollover_counter {
            if sequence_number > self.last_sequence_number {
                self.last_sequence_number = sequence_number;
            }
        } else if guessed == self.rollover_counter.wrapping_add(1) {
            self.rollover_counter = guessed;
            self.last_sequence_number = sequence_number;
        }
        // guessed == rollover_counter - 1: a straggler from the previous
        // cycle, no state change
    }
}

/// Per-SSRC state for SRTCP: the outbound explicit index and the inbound
/// replay window.
struct SrtcpSsrcState {
    srtcp_index: usize,
    replay_detector: SlidingWindowDetector,
}

impl SrtcpSsrcState {
    fn new() -> Self {
        Self {
            srtcp_index: 0,
            replay_detector: SlidingWindowDetector::new(REPLAY_WINDOW_SIZE, MAX_SRTCP_INDEX),
        }
    }
}

/// Context represents one direction of an SRTP session: it either protects
/// outbound packets or validates and decrypts inbound ones. The two
/// directions of a session use separate contexts built from the paired
/// keying material.
pub struct Context {
    cipher: Box<dyn Cipher>,
    srtp_ssrc_states: HashMap<u32, SrtpSsrcState>,
    srtcp_ssrc_states: HashMap<u32, SrtcpSsrcState>,
}

impl Context {
    /// Creates a context from a master key and salt of the profile's lengths.
    pub fn new(
        master_key: &[u8],
        master_salt: &[u8],
        profile: ProtectionProfile,
    ) -> Result<Self> {
        if master_key.len() != profile.key_len() {
            return Err(Error::ErrShortSrtpMasterKey);
        }
        if master_salt.len() != profile.salt_len() {
            return Err(Error::ErrShortSrtpMasterSalt);
        }

        let cipher: Box<dyn Cipher> = match profile {
            ProtectionProfile::Aes128CmHmacSha1_80 | ProtectionProfile::Aes128CmHmacSha1_32 => {
                Box::new(CipherAesCmHmacSha1::new(profile, master_key, master_salt)?)
            }
            ProtectionProfile::AeadAes128Gcm => {
                Box::new(CipherAeadAesGcm::new(profile, master_key, master_salt)?)
            }
        };

        Ok(Context {
            cipher,
            srtp_ssrc_states: HashMap::new(),
            srtcp_ssrc_states: HashMap::new(),
        })
    }

    fn srtp_state(&mut self, ssrc: u32) -> &mut SrtpSsrcState {
        self.srtp_ssrc_states
            .entry(ssrc)
            .or_insert_with(|| SrtpSsrcState::new(ssrc))
    }

    /// Encrypts a full plaintext RTP packet into an SRTP packet.
    pub fn encrypt_rtp(&mut self, plaintext: &[u8]) -> Result<Bytes> {
        let (header, _) = rtp::Header::unmarshal(plaintext)?;
        let payload = &plaintext[header.marshal_size()..];

        let state = self.srtp_state(header.ssrc);
        let roc = state.next_rollover_count(header.sequence_number);
        state.update_rollover_count(header.sequence_number);

        self.cipher.encrypt_rtp(payload, &header, roc)
    }

    /// Authenticates and decrypts an SRTP packet. Replayed packets and
    /// packets older than the window are rejected with `ErrDuplicated`.
    pub fn decrypt_rtp(&mut self, encrypted: &[u8]) -> Result<Bytes> {
        let (header, _) = rtp::Header::unmarshal(encrypted)?;

        let state = self.srtp_state(header.ssrc);
        let roc = state.next_rollover_count(header.sequence_number);
        let index = (roc as u64) << 16 | header.sequence_number as u64;
        if !state.replay_detector.check(index) {
            return Err(Error::SrtpSsrcDuplicated(
                header.ssrc,
                header.sequence_number,
            ));
        }

        let decrypted = self.cipher.decrypt_rtp(encrypted, &header, roc)?;

        // Only commit window and ROC state after authentication succeeded.
        let state = self.srtp_state(header.ssrc);
        state.replay_detector.accept();
        state.update_rollover_count(header.sequence_number);

        Ok(decrypted)
    }

    /// Encrypts a compound RTCP packet into an SRTCP packet with an explicit
    /// index.
    pub fn encrypt_rtcp(&mut self, decrypted: &[u8]) -> Result<Bytes> {
        if decrypted.len() < rtcp::header::HEADER_LENGTH + rtcp::header::SSRC_LENGTH {
            return Err(Error::ErrTooShortRtcp);
        }
        let ssrc = u32::from_be_bytes([decrypted[4], decrypted[5], decrypted[6], decrypted[7]]);

        let state = self
            .srtcp_ssrc_states
            .entry(ssrc)
            .or_insert_with(SrtcpSsrcState::new);
        state.srtcp_index += 1;
        if state.srtcp_index as u64 > MAX_SRTCP_INDEX {
            return Err(Error::ErrExceededMaxPackets);
        }
        let index = state.srtcp_index;

        self.cipher.encrypt_rtcp(decrypted, index, ssrc)
    }

    /// Authenticates and decrypts an SRTCP packet.
    pub fn decrypt_rtcp(&mut self, encrypted: &[u8]) -> Result<Bytes> {
        if encrypted.len() < rtcp::header::HEADER_LENGTH + rtcp::header::SSRC_LENGTH {
            return Err(Error::ErrTooShortRtcp);
        }
        let ssrc = u32::from_be_bytes([encrypted[4], encrypted[5], encrypted[6], encrypted[7]]);

        let index = self.cipher.get_rtcp_index(encrypted)?;
        let state = self
            .srtcp_ssrc_states
            .entry(ssrc)
            .or_insert_with(SrtcpSsrcState::new);
        if !state.replay_detector.check(index as u64) {
            return Err(Error::SrtcpSsrcDuplicated(ssrc, index));
        }

        let decrypted = self.cipher.decrypt_rtcp(encrypted, index, ssrc)?;

        if let Some(state) = self.srtcp_ssrc_states.get_mut(&ssrc) {
            state.replay_detector.accept();
        }

        Ok(decrypted)
    }

    /// The rollover counter currently tracked for `ssrc`.
    pub fn rollover_counter(&self, ssrc: u32) -> u32 {
        self.srtp_ssrc_states
            .get(&ssrc)
            .map(|s| s.rollover_counter)
            .unwrap_or(0)
    }
}

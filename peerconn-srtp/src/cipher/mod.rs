pub(crate) mod cipher_aead_aes_gcm;
pub(crate) mod cipher_aes_cm_hmac_sha1;

use bytes::Bytes;
use shared::error::Result;

/// Cipher represents a profile-specific pair of SRTP and SRTCP transforms
/// operating on already-derived session keys.
pub(crate) trait Cipher {
    /// Authentication tag length appended to SRTP packets.
    fn rtp_auth_tag_len(&self) -> usize;

    /// Authentication tag length appended to SRTCP packets.
    fn rtcp_auth_tag_len(&self) -> usize;

    /// Retrieves the explicit SRTCP index from the tail of an encrypted
    /// SRTCP packet.
    fn get_rtcp_index(&self, input: &[u8]) -> Result<usize>;

    fn encrypt_rtp(&mut self, payload: &[u8], header: &rtp::Header, roc: u32) -> Result<Bytes>;

    fn decrypt_rtp(&mut self, encrypted: &[u8], header: &rtp::Header, roc: u32) -> Result<Bytes>;

    fn encrypt_rtcp(&mut self, decrypted: &[u8], srtcp_index: usize, ssrc: u32) -> Result<Bytes>;

    fn decrypt_rtcp(&mut self, encrypted: &[u8], srtcp_index: usize, ssrc: u32) -> Result<Bytes>;
}

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, KeyInit, Nonce};
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use shared::error::{Error, Result};

use super::Cipher;
use crate::key_derivation::*;
use crate::protection_profile::ProtectionProfile;

pub(crate) const RTCP_ENCRYPTION_FLAG: u32 = 1 << 31;

/// AEAD_AES_128_GCM SRTP transform per RFC 7714.
pub(crate) struct CipherAeadAesGcm {
    profile: ProtectionProfile,

    srtp_cipher: Aes128Gcm,
    srtcp_cipher: Aes128Gcm,

    srtp_session_salt: Vec<u8>,
    srtcp_session_salt: Vec<u8>,
}

impl CipherAeadAesGcm {
    pub(crate) fn new(
        profile: ProtectionProfile,
        master_key: &[u8],
        master_salt: &[u8],
    ) -> Result<Self> {
        let srtp_session_key = aes_cm_key_derivation(
            LABEL_SRTP_ENCRYPTION,
            master_key,
            master_salt,
            0,
            master_key.len(),
        )?;
        let srtcp_session_key = aes_cm_key_derivation(
            LABEL_SRTCP_ENCRYPTION,
            master_key,
            master_salt,
            0,
            master_key.len(),
        )?;

        let srtp_cipher = Aes128Gcm::new_from_slice(&srtp_session_key)
            .map_err(|e| Error::Other(e.to_string()))?;
        let srtcp_cipher = Aes128Gcm::new_from_slice(&srtcp_session_key)
            .map_err(|e| Error::Other(e.to_string()))?;

        let srtp_session_salt = aes_cm_key_derivation(
            LABEL_SRTP_SALT,
            master_key,
            master_salt,
            0,
            master_salt.len(),
        )?;
        let srtcp_session_salt = aes_cm_key_derivation(
            LABEL_SRTCP_SALT,
            master_key,
            master_salt,
            0,
            master_salt.len(),
        )?;

        Ok(CipherAeadAesGcm {
            profile,
            srtp_cipher,
            srtcp_cipher,
            srtp_session_salt,
            srtcp_session_salt,
        })
    }

    /// The 12-octet IV of RFC 7714 section 8.1.
    fn rtp_initialization_vector(&self, header: &rtp::Header, roc: u32) -> [u8; 12] {
        let mut iv = [0u8; 12];
        iv[2..6].copy_from_slice(&header.ssrc.to_be_bytes());
        iv[6..10].copy_from_slice(&roc.to_be_bytes());
        iv[10..12].copy_from_slice(&header.sequence_number.to_be_bytes());
        for (i, s) in self.srtp_session_salt.iter().enumerate() {
            iv[i] ^= s;
        }
        iv
    }

    /// The 12-octet IV of RFC 7714 section 9.1.
    fn rtcp_initialization_vector(&self, srtcp_index: usize, ssrc: u32) -> [u8; 12] {
        let mut iv = [0u8; 12];
        iv[2..6].copy_from_slice(&ssrc.to_be_bytes());
        iv[8..12].copy_from_slice(&(srtcp_index as u32).to_be_bytes());
        for (i, s) in self.srtcp_session_salt.iter().enumerate() {
            iv[i] ^= s;
        }
        iv
    }

    /// The associated data for SRTCP: the 8-byte prefix plus the trailing
    /// E-bit/index word (RFC 7714 section 9.2).
    fn rtcp_additional_authenticated_data(rtcp_packet: &[u8], srtcp_index: usize) -> [u8; 12] {
        let mut aad = [0u8; 12];
        aad[..8].copy_from_slice(&rtcp_packet[..8]);
        BigEndian::write_u32(&mut aad[8..], srtcp_index as u32 | RTCP_ENCRYPTION_FLAG);
        aad
    }
}

impl Cipher for CipherAeadAesGcm {
    fn rtp_auth_tag_len(&self) -> usize {
        self.profile.rtp_auth_tag_len()
    }

    fn rtcp_auth_tag_len(&self) -> usize {
        self.profile.rtcp_auth_tag_len()
    }

    fn get_rtcp_index(&self, input: &[u8]) -> Result<usize> {
        if input.len() < SRTCP_INDEX_SIZE {
            return Err(Error::SrtcpTooSmall(input.len(), SRTCP_INDEX_SIZE));
        }
        let pos = input.len() - SRTCP_INDEX_SIZE;
        let val = BigEndian::read_u32(&input[pos..]);
        Ok((val & !RTCP_ENCRYPTION_FLAG) as usize)
    }

    fn encrypt_rtp(&mut self, payload: &[u8], header: &rtp::Header, roc: u32) -> Result<Bytes> {
        let header_raw = header.marshal()?;
        let nonce = self.rtp_initialization_vector(header, roc);

        let encrypted = self
            .srtp_cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: payload,
                    aad: &header_raw,
                },
            )
            .map_err(|_| Error::ErrFailedToVerifyAuthTag)?;

        let mut writer = BytesMut::with_capacity(header_raw.len() + encrypted.len());
        writer.extend_from_slice(&header_raw);
        writer.extend_from_slice(&encrypted);
        Ok(writer.freeze())
    }

    fn decrypt_rtp(&mut self, encrypted: &[u8], header: &rtp::Header, roc: u32) -> Result<Bytes> {
        let header_len = header.marshal_size();
        if encrypted.len() < header_len + self.rtp_auth_tag_len() {
            return Err(Error::SrtpTooSmall(
                encrypted.len(),
                header_len + self.rtp_auth_tag_len(),
            ));
        }

        let nonce = self.rtp_initialization_vector(header, roc);
        let decrypted = self
            .srtp_cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &encrypted[header_len..],
                    aad: &encrypted[..header_len],
                },
            )
            .map_err(|_| Error::RtpFailedToVerifyAuthTag)?;

        let mut writer = BytesMut::with_capacity(header_len + decrypted.len());
        writer.extend_from_slice(&encrypted[..header_len]);
        writer.extend_from_slice(&decrypted);
        Ok(writer.freeze())
    }

    fn encrypt_rtcp(&mut self, decrypted: &[u8], srtcp_index: usize, ssrc: u32) -> Result<Bytes> {
        if decrypted.len() < 8 {
            return Err(Error::ErrTooShortRtcp);
        }

        let nonce = self.rtcp_initialization_vector(srtcp_index, ssrc);
        let aad = Self::rtcp_additional_authenticated_data(decrypted, srtcp_index);

        let encrypted = self
            .srtcp_cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &decrypted[8..],
                    aad: &aad,
                },
            )
            .map_err(|_| Error::ErrFailedToVerifyAuthTag)?;

        let mut writer = BytesMut::with_capacity(8 + encrypted.len() + SRTCP_INDEX_SIZE);
        writer.extend_from_slice(&decrypted[..8]);
        writer.extend_from_slice(&encrypted);
        writer.put_u32(srtcp_index as u32 | RTCP_ENCRYPTION_FLAG);
        Ok(writer.freeze())
    }

    fn decrypt_rtcp(&mut self, encrypted: &[u8], srtcp_index: usize, ssrc: u32) -> Result<Bytes> {
        let min = 8 + self.rtcp_auth_tag_len() + SRTCP_INDEX_SIZE;
        if encrypted.len() < min {
            return Err(Error::SrtcpTooSmall(encrypted.len(), min));
        }

        let nonce = self.rtcp_initialization_vector(srtcp_index, ssrc);
        let aad = Self::rtcp_additional_authenticated_data(encrypted, srtcp_index);

        let decrypted = self
            .srtcp_cipher
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &encrypted[8..encrypted.len() - SRTCP_INDEX_SIZE],
                    aad: &aad,
                },
            )
            .map_err(|_| Error::RtcpFailedToVerifyAuthTag)?;

        let mut writer = BytesMut::with_capacity(8 + decrypted.len());
        writer.extend_from_slice(&encrypted[..8]);
        writer.extend_from_slice(&decrypted);
        Ok(writer.freeze())
    }
}

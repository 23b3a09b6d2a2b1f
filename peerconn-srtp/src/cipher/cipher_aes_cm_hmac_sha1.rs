use aes::cipher::generic_array::GenericArray;
use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use ctr::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use shared::error::{Error, Result};
use subtle::ConstantTimeEq;

use super::Cipher;
use crate::key_derivation::*;
use crate::protection_profile::ProtectionProfile;

type HmacSha1 = Hmac<Sha1>;
type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

pub(crate) struct CipherAesCmHmacSha1 {
    profile: ProtectionProfile,

    srtp_session_key: Vec<u8>,
    srtp_session_salt: Vec<u8>,
    srtp_session_auth: HmacSha1,

    srtcp_session_key: Vec<u8>,
    srtcp_session_salt: Vec<u8>,
    srtcp_session_auth: HmacSha1,
}

impl CipherAesCmHmacSha1 {
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

        let auth_key_len = profile.auth_key_len();
        let srtp_session_auth_tag = aes_cm_key_derivation(
            LABEL_SRTP_AUTHENTICATION_TAG,
            master_key,
            master_salt,
            0,
            auth_key_len,
        )?;
        let srtcp_session_auth_tag = aes_cm_key_derivation(
            LABEL_SRTCP_AUTHENTICATION_TAG,
            master_key,
            master_salt,
            0,
            auth_key_len,
        )?;

        let srtp_session_auth = HmacSha1::new_from_slice(&srtp_session_auth_tag)
            .map_err(|e| Error::Other(e.to_string()))?;
        let srtcp_session_auth = HmacSha1::new_from_slice(&srtcp_session_auth_tag)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(CipherAesCmHmacSha1 {
            profile,
            srtp_session_key,
            srtp_session_salt,
            srtp_session_auth,
            srtcp_session_key,
            srtcp_session_salt,
            srtcp_session_auth,
        })
    }

    /// https://tools.ietf.org/html/rfc3711#section-4.2
    /// In the case of SRTP, M SHALL consist of the Authenticated
    /// Portion of the packet concatenated with the roc:
    /// M = Authenticated Portion || roc. The HMAC output is truncated to the
    /// profile's tag length.
    fn generate_srtp_auth_tag(&mut self, buf: &[u8], roc: u32) -> Vec<u8> {
        self.srtp_session_auth.reset();
        self.srtp_session_auth.update(buf);
        self.srtp_session_auth.update(&roc.to_be_bytes());

        let result = self.srtp_session_auth.clone().finalize();
        let code_bytes = result.into_bytes();

        code_bytes[0..self.rtp_auth_tag_len()].to_vec()
    }

    fn generate_srtcp_auth_tag(&mut self, buf: &[u8]) -> Vec<u8> {
        self.srtcp_session_auth.reset();
        self.srtcp_session_auth.update(buf);

        let result = self.srtcp_session_auth.clone().finalize();
        let code_bytes = result.into_bytes();

        code_bytes[0..self.rtcp_auth_tag_len()].to_vec()
    }
}

impl Cipher for CipherAesCmHmacSha1 {
    fn rtp_auth_tag_len(&self) -> usize {
        self.profile.rtp_auth_tag_len()
    }

    fn rtcp_auth_tag_len(&self) -> usize {
        self.profile.rtcp_auth_tag_len()
    }

    fn get_rtcp_index(&self, input: &[u8]) -> Result<usize> {
        let min = self.rtcp_auth_tag_len() + SRTCP_INDEX_SIZE;
        if input.len() < min {
            return Err(Error::SrtcpTooSmall(input.len(), min));
        }
        let tail_offset = input.len() - min;
        Ok(
            (BigEndian::read_u32(&input[tail_offset..tail_offset + SRTCP_INDEX_SIZE])
                & !(1 << 31)) as usize,
        )
    }

    fn encrypt_rtp(&mut self, payload: &[u8], header: &rtp::Header, roc: u32) -> Result<Bytes> {
        let header_len = header.marshal_size();
        let mut writer =
            BytesMut::with_capacity(header_len + payload.len() + self.rtp_auth_tag_len());

        // Copy the header unencrypted, then the plaintext payload.
        header.marshal_to(&mut writer)?;
        writer.extend_from_slice(payload);

        // Encrypt the payload in place.
        let counter = generate_counter(
            header.sequence_number,
            roc,
            header.ssrc,
            &self.srtp_session_salt,
        )?;
        let key = GenericArray::from_slice(&self.srtp_session_key);
        let nonce = GenericArray::from_slice(&counter);
        let mut stream = Aes128Ctr::new(key, nonce);
        stream.apply_keystream(&mut writer[header_len..]);

        // Generate and append the auth tag.
        let auth_tag = self.generate_srtp_auth_tag(&writer, roc);
        writer.extend(auth_tag);

        Ok(writer.freeze())
    }

    fn decrypt_rtp(&mut self, encrypted: &[u8], header: &rtp::Header, roc: u32) -> Result<Bytes> {
        if encrypted.len() < self.rtp_auth_tag_len() {
            return Err(Error::SrtpTooSmall(
                encrypted.len(),
                self.rtp_auth_tag_len(),
            ));
        }

        let tag_start = encrypted.len() - self.rtp_auth_tag_len();
        let actual_tag = &encrypted[tag_start..];
        let cipher_text = &encrypted[..tag_start];

        // Constant time compare to prevent timing attacks.
        let expected_tag = self.generate_srtp_auth_tag(cipher_text, roc);
        if actual_tag.ct_eq(&expected_tag).unwrap_u8() != 1 {
            return Err(Error::RtpFailedToVerifyAuthTag);
        }

        let mut writer = BytesMut::with_capacity(cipher_text.len());
        writer.extend_from_slice(cipher_text);

        let counter = generate_counter(
            header.sequence_number,
            roc,
            header.ssrc,
            &self.srtp_session_salt,
        )?;
        let key = GenericArray::from_slice(&self.srtp_session_key);
        let nonce = GenericArray::from_slice(&counter);
        let mut stream = Aes128Ctr::new(key, nonce);
        let payload_offset = header.marshal_size();
        stream.seek(0);
        stream.apply_keystream(&mut writer[payload_offset..]);

        Ok(writer.freeze())
    }

    fn encrypt_rtcp(&mut self, decrypted: &[u8], srtcp_index: usize, ssrc: u32) -> Result<Bytes> {
        let mut writer = BytesMut::with_capacity(
            decrypted.len() + SRTCP_INDEX_SIZE + self.rtcp_auth_tag_len(),
        );
        writer.extend_from_slice(decrypted);

        // Encrypt everything after the first header and SSRC.
        let counter = generate_counter(
            (srtcp_index & 0xFFFF) as u16,
            (srtcp_index >> 16) as u32,
            ssrc,
            &self.srtcp_session_salt,
        )?;
        let key = GenericArray::from_slice(&self.srtcp_session_key);
        let nonce = GenericArray::from_slice(&counter);
        let mut stream = Aes128Ctr::new(key, nonce);
        stream.apply_keystream(
            &mut writer[rtcp::header::HEADER_LENGTH + rtcp::header::SSRC_LENGTH..],
        );

        // Add the SRTCP index with the E-bit set.
        writer.put_u32(srtcp_index as u32 | (1u32 << 31));

        let auth_tag = self.generate_srtcp_auth_tag(&writer);
        writer.extend(auth_tag);

        Ok(writer.freeze())
    }

    fn decrypt_rtcp(&mut self, encrypted: &[u8], srtcp_index: usize, ssrc: u32) -> Result<Bytes> {
        let min = self.rtcp_auth_tag_len() + SRTCP_INDEX_SIZE;
        if encrypted.len() < min + rtcp::header::HEADER_LENGTH + rtcp::header::SSRC_LENGTH {
            return Err(Error::SrtcpTooSmall(encrypted.len(), min));
        }

        let tail_offset = encrypted.len() - min;
        let mut writer = BytesMut::with_capacity(tail_offset);
        writer.extend_from_slice(&encrypted[0..tail_offset]);

        let is_encrypted = encrypted[tail_offset] >> 7;
        if is_encrypted == 0 {
            return Ok(writer.freeze());
        }

        let actual_tag = &encrypted[encrypted.len() - self.rtcp_auth_tag_len()..];
        let cipher_text = &encrypted[..encrypted.len() - self.rtcp_auth_tag_len()];

        let expected_tag = self.generate_srtcp_auth_tag(cipher_text);
        if actual_tag.ct_eq(&expected_tag).unwrap_u8() != 1 {
            return Err(Error::RtcpFailedToVerifyAuthTag);
        }

        let counter = generate_counter(
            (srtcp_index & 0xFFFF) as u16,
            (srtcp_index >> 16) as u32,
            ssrc,
            &self.srtcp_session_salt,
        )?;
        let key = GenericArray::from_slice(&self.srtcp_session_key);
        let nonce = GenericArray::from_slice(&counter);
        let mut stream = Aes128Ctr::new(key, nonce);
        stream.seek(0);
        stream.apply_keystream(
            &mut writer[rtcp::header::HEADER_LENGTH + rtcp::header::SSRC_LENGTH..],
        );

        Ok(writer.freeze())
    }
}

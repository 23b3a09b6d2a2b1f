use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, KeyInit, Nonce};
use shared::error::{Error, Result};
use std::fmt;

use crate::prf::prf_encryption_keys;
use crate::record::{RecordLayerHeader, RECORD_LAYER_HEADER_SIZE};

const GCM_KEY_LENGTH: usize = 16;
const GCM_IMPLICIT_IV_LENGTH: usize = 4;
const GCM_EXPLICIT_NONCE_LENGTH: usize = 8;
const GCM_TAG_LENGTH: usize = 16;

/// The two cipher suites mandated for WebRTC DTLS (RFC 8827 section 6.5).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum CipherSuiteId {
    TlsEcdheEcdsaWithAes128GcmSha256 = 0xc02b,
    TlsEcdheRsaWithAes128GcmSha256 = 0xc02f,
}

impl fmt::Display for CipherSuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherSuiteId::TlsEcdheEcdsaWithAes128GcmSha256 => {
                write!(f, "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256")
            }
            CipherSuiteId::TlsEcdheRsaWithAes128GcmSha256 => {
                write!(f, "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256")
            }
        }
    }
}

impl CipherSuiteId {
    pub fn from_u16(v: u16) -> Result<Self> {
        match v {
            0xc02b => Ok(CipherSuiteId::TlsEcdheEcdsaWithAes128GcmSha256),
            0xc02f => Ok(CipherSuiteId::TlsEcdheRsaWithAes128GcmSha256),
            _ => Err(Error::ErrInvalidCipherSuite),
        }
    }

    /// True when the server's certificate must carry an ECDSA key.
    pub fn is_ecdsa(&self) -> bool {
        matches!(self, CipherSuiteId::TlsEcdheEcdsaWithAes128GcmSha256)
    }
}

pub(crate) fn find_matching_cipher_suite(
    remote: &[CipherSuiteId],
    local: &[CipherSuiteId],
) -> Result<CipherSuiteId> {
    for r in remote {
        if local.contains(r) {
            return Ok(*r);
        }
    }
    Err(Error::ErrCipherSuiteNoIntersection)
}

/// AES-128-GCM record protection (RFC 5288 applied to DTLS).
///
/// Initialized once the master secret is known; protects and validates
/// records of epoch > 0.
pub struct CipherSuite {
    pub id: CipherSuiteId,
    local_gcm: Aes128Gcm,
    remote_gcm: Aes128Gcm,
    local_write_iv: Vec<u8>,
    remote_write_iv: Vec<u8>,
}

impl CipherSuite {
    pub fn new(
        id: CipherSuiteId,
        master_secret: &[u8],
        client_random: &[u8],
        server_random: &[u8],
        is_client: bool,
    ) -> Result<Self> {
        let keys = prf_encryption_keys(
            master_secret,
            client_random,
            server_random,
            GCM_KEY_LENGTH,
            GCM_IMPLICIT_IV_LENGTH,
        )?;

        let (local_key, local_iv, remote_key, remote_iv) = if is_client {
            (
                keys.client_write_key,
                keys.client_write_iv,
                keys.server_write_key,
                keys.server_write_iv,
            )
        } else {
            (
                keys.server_write_key,
                keys.server_write_iv,
                keys.client_write_key,
                keys.client_write_iv,
            )
        };

        let local_gcm =
            Aes128Gcm::new_from_slice(&local_key).map_err(|e| Error::Hash(e.to_string()))?;
        let remote_gcm =
            Aes128Gcm::new_from_slice(&remote_key).map_err(|e| Error::Hash(e.to_string()))?;

        Ok(CipherSuite {
            id,
            local_gcm,
            remote_gcm,
            local_write_iv: local_iv,
            remote_write_iv: remote_iv,
        })
    }

    /// The additional data of RFC 5246 section 6.2.3.3:
    /// seq_num + type + version + length of the plaintext.
    fn additional_data(header: &RecordLayerHeader, payload_len: usize) -> [u8; 13] {
        let mut aad = [0u8; 13];
        aad[..2].copy_from_slice(&header.epoch.to_be_bytes());
        aad[2..8].copy_from_slice(&header.sequence_number.to_be_bytes()[2..8]);
        aad[8] = header.content_type as u8;
        aad[9] = header.protocol_version.0;
        aad[10] = header.protocol_version.1;
        aad[11..13].copy_from_slice(&(payload_len as u16).to_be_bytes());
        aad
    }

    /// Encrypts `payload` for the record described by `header`, returning the
    /// full record (header + explicit nonce + ciphertext + tag).
    pub fn encrypt(&self, header: &RecordLayerHeader, payload: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; GCM_IMPLICIT_IV_LENGTH + GCM_EXPLICIT_NONCE_LENGTH];
        nonce[..GCM_IMPLICIT_IV_LENGTH].copy_from_slice(&self.local_write_iv);
        nonce[GCM_IMPLICIT_IV_LENGTH..GCM_IMPLICIT_IV_LENGTH + 2]
            .copy_from_slice(&header.epoch.to_be_bytes());
        nonce[GCM_IMPLICIT_IV_LENGTH + 2..]
            .copy_from_slice(&header.sequence_number.to_be_bytes()[2..8]);

        let aad = Self::additional_data(header, payload.len());
        let ciphertext = self
            .local_gcm
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: payload,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::ErrFailedToVerifyAuthTag)?;

        let mut out_header = *header;
        out_header.content_len = (GCM_EXPLICIT_NONCE_LENGTH + ciphertext.len()) as u16;

        let mut out = out_header.marshal()?;
        out.extend_from_slice(&nonce[GCM_IMPLICIT_IV_LENGTH..]);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts a full record, returning the plaintext payload.
    pub fn decrypt(&self, raw: &[u8]) -> Result<Vec<u8>> {
        let header = RecordLayerHeader::unmarshal(raw)?;
        let body = &raw[RECORD_LAYER_HEADER_SIZE..];
        if body.len() < GCM_EXPLICIT_NONCE_LENGTH + GCM_TAG_LENGTH {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }

        let mut nonce = [0u8; GCM_IMPLICIT_IV_LENGTH + GCM_EXPLICIT_NONCE_LENGTH];
        nonce[..GCM_IMPLICIT_IV_LENGTH].copy_from_slice(&self.remote_write_iv);
        nonce[GCM_IMPLICIT_IV_LENGTH..].copy_from_slice(&body[..GCM_EXPLICIT_NONCE_LENGTH]);

        let ciphertext = &body[GCM_EXPLICIT_NONCE_LENGTH..];
        let plaintext_len = ciphertext.len() - GCM_TAG_LENGTH;
        let aad = Self::additional_data(&header, plaintext_len);

        self.remote_gcm
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::ErrFailedToVerifyAuthTag)
    }
}

#[cfg(test)]
mod cipher_suite_test {
    use super::*;
    use crate::record::{ContentType, PROTOCOL_VERSION1_2};

    fn pair() -> (CipherSuite, CipherSuite) {
        let master = [9u8; 48];
        let cr = [1u8; 32];
        let sr = [2u8; 32];
        (
            CipherSuite::new(
                CipherSuiteId::TlsEcdheEcdsaWithAes128GcmSha256,
                &master,
                &cr,
                &sr,
                true,
            )
            .unwrap(),
            CipherSuite::new(
                CipherSuiteId::TlsEcdheEcdsaWithAes128GcmSha256,
                &master,
                &cr,
                &sr,
                false,
            )
            .unwrap(),
        )
    }

    fn header(seq: u64, len: u16) -> RecordLayerHeader {
        RecordLayerHeader {
            content_type: ContentType::ApplicationData,
            protocol_version: PROTOCOL_VERSION1_2,
            epoch: 1,
            sequence_number: seq,
            content_len: len,
        }
    }

    #[test]
    fn test_encrypt_decrypt_both_directions() {
        let (client, server) = pair();
        let payload = b"application data";

        let record = client.encrypt(&header(5, payload.len() as u16), payload).unwrap();
        assert_eq!(server.decrypt(&record).unwrap(), payload);

        let record = server.encrypt(&header(9, payload.len() as u16), payload).unwrap();
        assert_eq!(client.decrypt(&record).unwrap(), payload);
    }

    #[test]
    fn test_tampered_record_rejected() {
        let (client, server) = pair();
        let mut record = client
            .encrypt(&header(1, 4), b"data")
            .unwrap();
        let last = record.len() - 1;
        record[last] ^= 0x80;
        assert_eq!(
            server.decrypt(&record),
            Err(Error::ErrFailedToVerifyAuthTag)
        );
    }

    #[test]
    fn test_suite_negotiation() {
        let local = [
            CipherSuiteId::TlsEcdheEcdsaWithAes128GcmSha256,
            CipherSuiteId::TlsEcdheRsaWithAes128GcmSha256,
        ];
        assert_eq!(
            find_matching_cipher_suite(
                &[CipherSuiteId::TlsEcdheRsaWithAes128GcmSha256],
                &local
            )
            .unwrap(),
            CipherSuiteId::TlsEcdheRsaWithAes128GcmSha256
        );
        assert_eq!(
            find_matching_cipher_suite(&[], &local),
            Err(Error::ErrCipherSuiteNoIntersection)
        );
    }
}

//! The TLS 1.2 pseudo-random function (RFC 5246 section 5) with SHA-256,
//! plus the derivations DTLS-SRTP needs.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use shared::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

pub const MASTER_SECRET_LABEL: &str = "master secret";
pub const EXTENDED_MASTER_SECRET_LABEL: &str = "extended master secret";
pub const KEY_EXPANSION_LABEL: &str = "key expansion";
pub const VERIFY_DATA_CLIENT_LABEL: &str = "client finished";
pub const VERIFY_DATA_SERVER_LABEL: &str = "server finished";

pub const MASTER_SECRET_LENGTH: usize = 48;
pub const VERIFY_DATA_LENGTH: usize = 12;

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| Error::Hash(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// P_SHA256(secret, seed) expanded to `length` bytes.
pub fn prf_p_hash(secret: &[u8], seed: &[u8], length: usize) -> Result<Vec<u8>> {
    let mut last_round = seed.to_vec();
    let mut out = vec![];

    while out.len() < length {
        last_round = hmac_sha256(secret, &last_round)?;
        let mut with_secret = last_round.clone();
        with_secret.extend_from_slice(seed);
        out.extend_from_slice(&hmac_sha256(secret, &with_secret)?);
    }

    out.truncate(length);
    Ok(out)
}

fn prf(secret: &[u8], label: &str, seed: &[u8], length: usize) -> Result<Vec<u8>> {
    let mut label_seed = label.as_bytes().to_vec();
    label_seed.extend_from_slice(seed);
    prf_p_hash(secret, &label_seed, length)
}

/// master_secret = PRF(pre_master_secret, "master secret",
///                     ClientHello.random + ServerHello.random)
pub fn prf_master_secret(
    pre_master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
) -> Result<Vec<u8>> {
    let mut seed = client_random.to_vec();
    seed.extend_from_slice(server_random);
    prf(
        pre_master_secret,
        MASTER_SECRET_LABEL,
        &seed,
        MASTER_SECRET_LENGTH,
    )
}

/// RFC 7627: master secret bound to the session hash of the handshake.
pub fn prf_extended_master_secret(
    pre_master_secret: &[u8],
    session_hash: &[u8],
) -> Result<Vec<u8>> {
    prf(
        pre_master_secret,
        EXTENDED_MASTER_SECRET_LABEL,
        session_hash,
        MASTER_SECRET_LENGTH,
    )
}

/// The key block of RFC 5246 section 6.3, seeded server-random-first.
pub struct EncryptionKeys {
    pub client_write_key: Vec<u8>,
    pub server_write_key: Vec<u8>,
    pub client_write_iv: Vec<u8>,
    pub server_write_iv: Vec<u8>,
}

pub fn prf_encryption_keys(
    master_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
    key_len: usize,
    iv_len: usize,
) -> Result<EncryptionKeys> {
    let mut seed = server_random.to_vec();
    seed.extend_from_slice(client_random);

    let material = prf(
        master_secret,
        KEY_EXPANSION_LABEL,
        &seed,
        2 * key_len + 2 * iv_len,
    )?;

    let mut offset = 0;
    let client_write_key = material[offset..offset + key_len].to_vec();
    offset += key_len;
    let server_write_key = material[offset..offset + key_len].to_vec();
    offset += key_len;
    let client_write_iv = material[offset..offset + iv_len].to_vec();
    offset += iv_len;
    let server_write_iv = material[offset..offset + iv_len].to_vec();

    Ok(EncryptionKeys {
        client_write_key,
        server_write_key,
        client_write_iv,
        server_write_iv,
    })
}

/// verify_data = PRF(master_secret, finished_label, Hash(handshake_messages))
pub fn prf_verify_data(master_secret: &[u8], transcript: &[u8], label: &str) -> Result<Vec<u8>> {
    let session_hash = Sha256::digest(transcript);
    prf(master_secret, label, &session_hash, VERIFY_DATA_LENGTH)
}

pub fn prf_verify_data_client(master_secret: &[u8], transcript: &[u8]) -> Result<Vec<u8>> {
    prf_verify_data(master_secret, transcript, VERIFY_DATA_CLIENT_LABEL)
}

pub fn prf_verify_data_server(master_secret: &[u8], transcript: &[u8]) -> Result<Vec<u8>> {
    prf_verify_data(master_secret, transcript, VERIFY_DATA_SERVER_LABEL)
}

#[cfg(test)]
mod prf_test {
    use super::*;

    #[test]
    fn test_p_hash_length_and_determinism() {
        let a = prf_p_hash(b"secret", b"seed", 60).unwrap();
        let b = prf_p_hash(b"secret", b"seed", 60).unwrap();
        assert_eq!(a.len(), 60);
        assert_eq!(a, b);
        assert_ne!(a, prf_p_hash(b"secret", b"other", 60).unwrap());
    }

    #[test]
    fn test_master_secret_is_48_bytes() {
        let ms = prf_master_secret(&[1u8; 32], &[2u8; 32], &[3u8; 32]).unwrap();
        assert_eq!(ms.len(), MASTER_SECRET_LENGTH);
    }

    #[test]
    fn test_key_block_partitioning() {
        let keys = prf_encryption_keys(&[1u8; 48], &[2u8; 32], &[3u8; 32], 16, 4).unwrap();
        assert_eq!(keys.client_write_key.len(), 16);
        assert_eq!(keys.server_write_key.len(), 16);
        assert_eq!(keys.client_write_iv.len(), 4);
        assert_eq!(keys.server_write_iv.len(), 4);
        assert_ne!(keys.client_write_key, keys.server_write_key);
    }

    #[test]
    fn test_verify_data_labels_differ() {
        let ms = [7u8; 48];
        let transcript = b"handshake bytes";
        let c = prf_verify_data_client(&ms, transcript).unwrap();
        let s = prf_verify_data_server(&ms, transcript).unwrap();
        assert_eq!(c.len(), VERIFY_DATA_LENGTH);
        assert_ne!(c, s);
    }
}

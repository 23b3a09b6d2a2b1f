use shared::error::{Error, Result};

use crate::cipher_suite::CipherSuiteId;
use crate::extension::{marshal_extensions, unmarshal_extensions, Extension};
use crate::handshake::handshake_random::{HandshakeRandom, HANDSHAKE_RANDOM_LENGTH};
use crate::record::PROTOCOL_VERSION1_2;

/// ClientHello opens the handshake; it is sent twice when the server demands
/// cookie verification (RFC 6347 section 4.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub version: (u8, u8),
    pub random: HandshakeRandom,
    pub cookie: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub extensions: Vec<Extension>,
}

impl Default for ClientHello {
    fn default() -> Self {
        ClientHello {
            version: PROTOCOL_VERSION1_2,
            random: HandshakeRandom::default(),
            cookie: vec![],
            cipher_suites: vec![],
            extensions: vec![],
        }
    }
}

impl ClientHello {
    /// The cipher suites the peer offered that we recognize.
    pub fn known_cipher_suites(&self) -> Vec<CipherSuiteId> {
        self.cipher_suites
            .iter()
            .filter_map(|id| CipherSuiteId::from_u16(*id).ok())
            .collect()
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut out = vec![self.version.0, self.version.1];
        out.extend_from_slice(&self.random.marshal());
        out.push(0); // session id length
        out.push(self.cookie.len() as u8);
        out.extend_from_slice(&self.cookie);
        out.extend_from_slice(&((self.cipher_suites.len() * 2) as u16).to_be_bytes());
        for cs in &self.cipher_suites {
            out.extend_from_slice(&cs.to_be_bytes());
        }
        out.push(1); // compression methods length
        out.push(0); // null compression
        out.extend_from_slice(&marshal_extensions(&self.extensions));
        out
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < 2 + HANDSHAKE_RANDOM_LENGTH + 2 {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }

        let version = (raw[0], raw[1]);
        let mut offset = 2usize;

        let mut random_raw = [0u8; HANDSHAKE_RANDOM_LENGTH];
        random_raw.copy_from_slice(&raw[offset..offset + HANDSHAKE_RANDOM_LENGTH]);
        let random = HandshakeRandom::unmarshal(&random_raw);
        offset += HANDSHAKE_RANDOM_LENGTH;

        let session_id_len = raw[offset] as usize;
        offset += 1 + session_id_len;
        if raw.len() <= offset {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }

        let cookie_len = raw[offset] as usize;
        offset += 1;
        if raw.len() < offset + cookie_len + 2 {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        let cookie = raw[offset..offset + cookie_len].to_vec();
        offset += cookie_len;

        let suites_len = u16::from_be_bytes([raw[offset], raw[offset + 1]]) as usize;
        offset += 2;
        if raw.len() < offset + suites_len || suites_len % 2 != 0 {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        let mut cipher_suites = vec![];
        for i in 0..suites_len / 2 {
            cipher_suites.push(u16::from_be_bytes([
                raw[offset + i * 2],
                raw[offset + i * 2 + 1],
            ]));
        }
        offset += suites_len;

        if raw.len() <= offset {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        let compression_len = raw[offset] as usize;
        if compression_len == 0 {
            return Err(Error::ErrInvalidCompressionMethod);
        }
        offset += 1 + compression_len;
        if raw.len() < offset {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }

        let (extensions, _) = unmarshal_extensions(&raw[offset..])?;

        Ok(ClientHello {
            version,
            random,
            cookie,
            cipher_suites,
            extensions,
        })
    }
}

#[cfg(test)]
mod client_hello_test {
    use super::*;
    use crate::crypto::SIGNATURE_HASH_ALGORITHMS;
    use crate::curve::NamedCurve;
    use crate::SrtpProtectionProfile;

    #[test]
    fn test_client_hello_roundtrip() {
        let mut random = HandshakeRandom::default();
        random.populate();
        let hello = ClientHello {
            random,
            cookie: vec![0xaa; 20],
            cipher_suites: vec![0xc02b, 0xc02f],
            extensions: vec![
                Extension::SupportedEllipticCurves(vec![NamedCurve::X25519, NamedCurve::P256]),
                Extension::SignatureAlgorithms(SIGNATURE_HASH_ALGORITHMS.to_vec()),
                Extension::UseSrtp(vec![SrtpProtectionProfile::Srtp_Aes128CmHmacSha1_80]),
                Extension::UseExtendedMasterSecret,
            ],
            ..Default::default()
        };
        let raw = hello.marshal();
        assert_eq!(ClientHello::unmarshal(&raw).unwrap(), hello);
    }

    #[test]
    fn test_client_hello_truncated() {
        assert!(ClientHello::unmarshal(&[0xfe, 0xfd, 0x01]).is_err());
    }
}

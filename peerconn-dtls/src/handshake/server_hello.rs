use shared::error::{Error, Result};

use crate::extension::{marshal_extensions, unmarshal_extensions, Extension};
use crate::handshake::handshake_random::{HandshakeRandom, HANDSHAKE_RANDOM_LENGTH};
use crate::record::PROTOCOL_VERSION1_2;

/// ServerHello commits the negotiated version, cipher suite and extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub version: (u8, u8),
    pub random: HandshakeRandom,
    pub cipher_suite: u16,
    pub extensions: Vec<Extension>,
}

impl Default for ServerHello {
    fn default() -> Self {
        ServerHello {
            version: PROTOCOL_VERSION1_2,
            random: HandshakeRandom::default(),
            cipher_suite: 0,
            extensions: vec![],
        }
    }
}

impl ServerHello {
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = vec![self.version.0, self.version.1];
        out.extend_from_slice(&self.random.marshal());
        out.push(0); // session id length
        out.extend_from_slice(&self.cipher_suite.to_be_bytes());
        out.push(0); // null compression
        out.extend_from_slice(&marshal_extensions(&self.extensions));
        out
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < 2 + HANDSHAKE_RANDOM_LENGTH + 1 {
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
        if raw.len() < offset + 3 {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }

        let cipher_suite = u16::from_be_bytes([raw[offset], raw[offset + 1]]);
        offset += 3; // cipher suite + compression method

        let (extensions, _) = unmarshal_extensions(&raw[offset..])?;

        Ok(ServerHello {
            version,
            random,
            cipher_suite,
            extensions,
        })
    }
}

/// HelloVerifyRequest carries the stateless cookie the client must echo
/// (RFC 6347 section 4.2.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloVerifyRequest {
    pub version: (u8, u8),
    pub cookie: Vec<u8>,
}

impl HelloVerifyRequest {
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = vec![self.version.0, self.version.1, self.cookie.len() as u8];
        out.extend_from_slice(&self.cookie);
        out
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < 3 {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        let cookie_len = raw[2] as usize;
        if raw.len() < 3 + cookie_len {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        Ok(HelloVerifyRequest {
            version: (raw[0], raw[1]),
            cookie: raw[3..3 + cookie_len].to_vec(),
        })
    }
}

#[cfg(test)]
mod server_hello_test {
    use super::*;
    use crate::SrtpProtectionProfile;

    #[test]
    fn test_server_hello_roundtrip() {
        let mut random = HandshakeRandom::default();
        random.populate();
        let hello = ServerHello {
            random,
            cipher_suite: 0xc02b,
            extensions: vec![
                Extension::UseSrtp(vec![SrtpProtectionProfile::Srtp_Aes128CmHmacSha1_80]),
                Extension::UseExtendedMasterSecret,
            ],
            ..Default::default()
        };
        let raw = hello.marshal();
        assert_eq!(ServerHello::unmarshal(&raw).unwrap(), hello);
    }

    #[test]
    fn test_hello_verify_request_roundtrip() {
        let hvr = HelloVerifyRequest {
            version: PROTOCOL_VERSION1_2,
            cookie: vec![0x11; 20],
        };
        let raw = hvr.marshal();
        assert_eq!(HelloVerifyRequest::unmarshal(&raw).unwrap(), hvr);
    }
}

use shared::error::{Error, Result};

use crate::crypto::SignatureHashAlgorithm;
use crate::curve::{NamedCurve, ELLIPTIC_CURVE_TYPE_NAMED_CURVE};

/// ServerKeyExchange: signed ephemeral ECDHE parameters (RFC 8422
/// section 5.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyExchange {
    pub named_curve: NamedCurve,
    pub public_key: Vec<u8>,
    pub algorithm: SignatureHashAlgorithm,
    pub signature: Vec<u8>,
}

impl ServerKeyExchange {
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = vec![ELLIPTIC_CURVE_TYPE_NAMED_CURVE];
        out.extend_from_slice(&(self.named_curve as u16).to_be_bytes());
        out.push(self.public_key.len() as u8);
        out.extend_from_slice(&self.public_key);
        out.push(self.algorithm.hash);
        out.push(self.algorithm.signature);
        out.extend_from_slice(&(self.signature.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < 4 {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        if raw[0] != ELLIPTIC_CURVE_TYPE_NAMED_CURVE {
            return Err(Error::ErrInvalidEllipticCurveType);
        }

        let named_curve = NamedCurve::from_u16(u16::from_be_bytes([raw[1], raw[2]]));
        let key_len = raw[3] as usize;
        if raw.len() < 4 + key_len + 4 {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        let public_key = raw[4..4 + key_len].to_vec();
        let mut offset = 4 + key_len;

        let algorithm = SignatureHashAlgorithm {
            hash: raw[offset],
            signature: raw[offset + 1],
        };
        offset += 2;

        let sig_len = u16::from_be_bytes([raw[offset], raw[offset + 1]]) as usize;
        offset += 2;
        if raw.len() < offset + sig_len {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        let signature = raw[offset..offset + sig_len].to_vec();

        Ok(ServerKeyExchange {
            named_curve,
            public_key,
            algorithm,
            signature,
        })
    }
}

/// ClientKeyExchange: the client's ephemeral public key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientKeyExchange {
    pub public_key: Vec<u8>,
}

impl ClientKeyExchange {
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = vec![self.public_key.len() as u8];
        out.extend_from_slice(&self.public_key);
        out
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::ErrInvalidClientKeyExchange);
        }
        let key_len = raw[0] as usize;
        if raw.len() < 1 + key_len || key_len == 0 {
            return Err(Error::ErrInvalidClientKeyExchange);
        }
        Ok(ClientKeyExchange {
            public_key: raw[1..1 + key_len].to_vec(),
        })
    }
}

#[cfg(test)]
mod key_exchange_test {
    use super::*;
    use crate::crypto::{HASH_SHA256, SIGNATURE_ECDSA};

    #[test]
    fn test_server_key_exchange_roundtrip() {
        let ske = ServerKeyExchange {
            named_curve: NamedCurve::X25519,
            public_key: vec![7u8; 32],
            algorithm: SignatureHashAlgorithm {
                hash: HASH_SHA256,
                signature: SIGNATURE_ECDSA,
            },
            signature: vec![8u8; 71],
        };
        let raw = ske.marshal();
        assert_eq!(ServerKeyExchange::unmarshal(&raw).unwrap(), ske);
    }

    #[test]
    fn test_client_key_exchange_roundtrip() {
        let cke = ClientKeyExchange {
            public_key: vec![5u8; 65],
        };
        let raw = cke.marshal();
        assert_eq!(ClientKeyExchange::unmarshal(&raw).unwrap(), cke);
    }

    #[test]
    fn test_client_key_exchange_empty_rejected() {
        assert_eq!(
            ClientKeyExchange::unmarshal(&[0]),
            Err(Error::ErrInvalidClientKeyExchange)
        );
    }
}

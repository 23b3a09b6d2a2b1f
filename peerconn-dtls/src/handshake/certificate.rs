use shared::error::{Error, Result};

use crate::crypto::SignatureHashAlgorithm;
use crate::handshake::{put_u24, read_u24};

pub const CERTIFICATE_TYPE_RSA_SIGN: u8 = 1;
pub const CERTIFICATE_TYPE_ECDSA_SIGN: u8 = 64;

/// The Certificate message: a chain of DER certificates. WebRTC identities
/// are single self-signed certificates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandshakeMessageCertificate {
    pub certificates: Vec<Vec<u8>>,
}

impl HandshakeMessageCertificate {
    pub fn marshal(&self) -> Vec<u8> {
        let total: usize = self.certificates.iter().map(|c| 3 + c.len()).sum();
        let mut out = vec![];
        put_u24(&mut out, total as u32);
        for cert in &self.certificates {
            put_u24(&mut out, cert.len() as u32);
            out.extend_from_slice(cert);
        }
        out
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < 3 {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        let total = read_u24(&raw[0..3]) as usize;
        if raw.len() < 3 + total {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }

        let mut certificates = vec![];
        let mut offset = 3usize;
        let end = 3 + total;
        while offset < end {
            if end < offset + 3 {
                return Err(Error::ErrDtlsPacketInvalidLength);
            }
            let len = read_u24(&raw[offset..offset + 3]) as usize;
            offset += 3;
            if end < offset + len {
                return Err(Error::ErrDtlsPacketInvalidLength);
            }
            certificates.push(raw[offset..offset + len].to_vec());
            offset += len;
        }

        Ok(HandshakeMessageCertificate { certificates })
    }
}

/// CertificateRequest: the server demands the client prove possession of its
/// certificate key, which WebRTC needs for fingerprint verification of the
/// offerer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CertificateRequest {
    pub certificate_types: Vec<u8>,
    pub signature_hash_algorithms: Vec<SignatureHashAlgorithm>,
}

impl CertificateRequest {
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = vec![self.certificate_types.len() as u8];
        out.extend_from_slice(&self.certificate_types);
        out.extend_from_slice(
            &((self.signature_hash_algorithms.len() * 2) as u16).to_be_bytes(),
        );
        for a in &self.signature_hash_algorithms {
            out.push(a.hash);
            out.push(a.signature);
        }
        out.extend_from_slice(&0u16.to_be_bytes()); // no CA names
        out
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        let types_len = raw[0] as usize;
        if raw.len() < 1 + types_len + 2 {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        let certificate_types = raw[1..1 + types_len].to_vec();
        let mut offset = 1 + types_len;

        let algos_len = u16::from_be_bytes([raw[offset], raw[offset + 1]]) as usize;
        offset += 2;
        if raw.len() < offset + algos_len || algos_len % 2 != 0 {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        let mut signature_hash_algorithms = vec![];
        for i in 0..algos_len / 2 {
            signature_hash_algorithms.push(SignatureHashAlgorithm {
                hash: raw[offset + i * 2],
                signature: raw[offset + i * 2 + 1],
            });
        }

        Ok(CertificateRequest {
            certificate_types,
            signature_hash_algorithms,
        })
    }
}

/// CertificateVerify: a signature over the handshake transcript proving the
/// client owns the certificate key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerify {
    pub algorithm: SignatureHashAlgorithm,
    pub signature: Vec<u8>,
}

impl CertificateVerify {
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = vec![self.algorithm.hash, self.algorithm.signature];
        out.extend_from_slice(&(self.signature.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < 4 {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        let algorithm = SignatureHashAlgorithm {
            hash: raw[0],
            signature: raw[1],
        };
        let sig_len = u16::from_be_bytes([raw[2], raw[3]]) as usize;
        if raw.len() < 4 + sig_len {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        Ok(CertificateVerify {
            algorithm,
            signature: raw[4..4 + sig_len].to_vec(),
        })
    }
}

#[cfg(test)]
mod certificate_test {
    use super::*;
    use crate::crypto::{HASH_SHA256, SIGNATURE_ECDSA};

    #[test]
    fn test_certificate_roundtrip() {
        let m = HandshakeMessageCertificate {
            certificates: vec![vec![1, 2, 3], vec![4, 5]],
        };
        let raw = m.marshal();
        assert_eq!(HandshakeMessageCertificate::unmarshal(&raw).unwrap(), m);
    }

    #[test]
    fn test_certificate_request_roundtrip() {
        let m = CertificateRequest {
            certificate_types: vec![CERTIFICATE_TYPE_ECDSA_SIGN, CERTIFICATE_TYPE_RSA_SIGN],
            signature_hash_algorithms: vec![SignatureHashAlgorithm {
                hash: HASH_SHA256,
                signature: SIGNATURE_ECDSA,
            }],
        };
        let raw = m.marshal();
        assert_eq!(CertificateRequest::unmarshal(&raw).unwrap(), m);
    }

    #[test]
    fn test_certificate_verify_roundtrip() {
        let m = CertificateVerify {
            algorithm: SignatureHashAlgorithm {
                hash: HASH_SHA256,
                signature: SIGNATURE_ECDSA,
            },
            signature: vec![9u8; 70],
        };
        let raw = m.marshal();
        assert_eq!(CertificateVerify::unmarshal(&raw).unwrap(), m);
    }
}

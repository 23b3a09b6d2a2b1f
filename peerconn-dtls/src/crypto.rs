//! Certificate handling, ECDHE parameter signing and signature verification.

use hmac::{Hmac, Mac};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::DecodePrivateKey;
use sha2::{Digest, Sha256};
use shared::error::{Error, Result};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::curve::{NamedCurve, ELLIPTIC_CURVE_TYPE_NAMED_CURVE};

/// Hash and signature algorithm pair (RFC 5246 section 7.4.1.4.1).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SignatureHashAlgorithm {
    pub hash: u8,      // sha256 = 4
    pub signature: u8, // rsa = 1, ecdsa = 3
}

pub const HASH_SHA256: u8 = 4;
pub const SIGNATURE_RSA: u8 = 1;
pub const SIGNATURE_ECDSA: u8 = 3;

pub const SIGNATURE_HASH_ALGORITHMS: [SignatureHashAlgorithm; 2] = [
    SignatureHashAlgorithm {
        hash: HASH_SHA256,
        signature: SIGNATURE_ECDSA,
    },
    SignatureHashAlgorithm {
        hash: HASH_SHA256,
        signature: SIGNATURE_RSA,
    },
];

/// A DTLS identity: one X.509 certificate in DER form plus its ECDSA P-256
/// private key. WebRTC identities are self-signed throwaways, so a single
/// certificate (no chain) is carried.
#[derive(Clone)]
pub struct Certificate {
    pub certificate_der: Vec<u8>,
    pub private_key: SigningKey,
}

impl Certificate {
    /// Generates a fresh self-signed ECDSA P-256 certificate.
    pub fn generate_self_signed(common_name: &str) -> Result<Self> {
        let key_pair = rcgen::KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)
            .map_err(|e| Error::Other(e.to_string()))?;
        let params = rcgen::CertificateParams::new(vec![common_name.to_owned()])
            .map_err(|e| Error::Other(e.to_string()))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| Error::Other(e.to_string()))?;

        let private_key = SigningKey::from_pkcs8_der(&key_pair.serialize_der())
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Certificate {
            certificate_der: cert.der().to_vec(),
            private_key,
        })
    }

    /// The lowercase colon-separated SHA-256 fingerprint, as carried in the
    /// SDP `a=fingerprint` attribute.
    pub fn fingerprint(&self) -> String {
        fingerprint_of_der(&self.certificate_der)
    }
}

pub fn fingerprint_of_der(der: &[u8]) -> String {
    let digest = Sha256::digest(der);
    digest
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// The content covered by the ServerKeyExchange signature (RFC 8422
/// section 5.4): client random + server random + ECDH params.
pub fn signed_key_exchange_content(
    client_random: &[u8],
    server_random: &[u8],
    named_curve: NamedCurve,
    public_key: &[u8],
) -> Vec<u8> {
    let mut content =
        Vec::with_capacity(client_random.len() + server_random.len() + 4 + public_key.len());
    content.extend_from_slice(client_random);
    content.extend_from_slice(server_random);
    content.push(ELLIPTIC_CURVE_TYPE_NAMED_CURVE);
    content.extend_from_slice(&(named_curve as u16).to_be_bytes());
    content.push(public_key.len() as u8);
    content.extend_from_slice(public_key);
    content
}

/// Signs `content` with our ECDSA key, returning a DER-encoded signature.
pub fn sign_content(private_key: &SigningKey, content: &[u8]) -> Vec<u8> {
    let signature: Signature = private_key.sign(content);
    signature.to_der().as_bytes().to_vec()
}

/// Verifies a signature over `content` using the public key of the peer's
/// certificate. The expected key type follows from the signature algorithm.
pub fn verify_signature(
    certificate_der: &[u8],
    algorithm: SignatureHashAlgorithm,
    content: &[u8],
    signature: &[u8],
) -> Result<()> {
    if algorithm.hash != HASH_SHA256 {
        return Err(Error::ErrInvalidHashAlgorithm);
    }

    let (_, certificate) = X509Certificate::from_der(certificate_der)
        .map_err(|_| Error::ErrInvalidCertificate)?;
    let spki = certificate.public_key();
    let public_key = spki.subject_public_key.data.as_ref();

    match algorithm.signature {
        SIGNATURE_ECDSA => {
            let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
                .map_err(|_| Error::ErrInvalidCertificate)?;
            let signature =
                Signature::from_der(signature).map_err(|_| Error::ErrKeySignatureMismatch)?;
            verifying_key
                .verify(content, &signature)
                .map_err(|_| Error::ErrKeySignatureMismatch)
        }
        SIGNATURE_RSA => {
            let verifying_key = ring::signature::UnparsedPublicKey::new(
                &ring::signature::RSA_PKCS1_2048_8192_SHA256,
                public_key,
            );
            verifying_key
                .verify(content, signature)
                .map_err(|_| Error::ErrKeySignatureMismatch)
        }
        _ => Err(Error::ErrInvalidSignatureAlgorithm),
    }
}

/// The stateless HelloVerifyRequest cookie: HMAC-SHA256 over the client
/// random and the peer's address, truncated to 20 bytes (RFC 6347
/// section 4.2.1).
pub const COOKIE_LENGTH: usize = 20;

pub fn generate_cookie(secret: &[u8], client_random: &[u8], peer: &str) -> Result<Vec<u8>> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret).map_err(|e| Error::Hash(e.to_string()))?;
    mac.update(client_random);
    mac.update(peer.as_bytes());
    let tag = mac.finalize().into_bytes();
    Ok(tag[..COOKIE_LENGTH].to_vec())
}

#[cfg(test)]
mod crypto_test {
    use super::*;

    #[test]
    fn test_self_signed_certificate_and_fingerprint() {
        let cert = Certificate::generate_self_signed("peerconn").unwrap();
        let fp = cert.fingerprint();
        // 32 bytes = 32 hex pairs joined by colons
        assert_eq!(fp.len(), 32 * 3 - 1);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() || c == ':'));
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let cert = Certificate::generate_self_signed("peerconn").unwrap();
        let content = signed_key_exchange_content(
            &[1u8; 32],
            &[2u8; 32],
            NamedCurve::X25519,
            &[3u8; 32],
        );
        let sig = sign_content(&cert.private_key, &content);
        verify_signature(
            &cert.certificate_der,
            SignatureHashAlgorithm {
                hash: HASH_SHA256,
                signature: SIGNATURE_ECDSA,
            },
            &content,
            &sig,
        )
        .expect("verify");

        // altered content must fail
        let mut wrong = content.clone();
        wrong[0] ^= 1;
        assert!(verify_signature(
            &cert.certificate_der,
            SignatureHashAlgorithm {
                hash: HASH_SHA256,
                signature: SIGNATURE_ECDSA,
            },
            &wrong,
            &sig,
        )
        .is_err());
    }

    #[test]
    fn test_cookie_binds_peer_address() {
        let secret = [5u8; 32];
        let random = [6u8; 32];
        let a = generate_cookie(&secret, &random, "1.2.3.4:5000").unwrap();
        let b = generate_cookie(&secret, &random, "1.2.3.4:5001").unwrap();
        assert_eq!(a.len(), COOKIE_LENGTH);
        assert_ne!(a, b);
        assert_eq!(
            a,
            generate_cookie(&secret, &random, "1.2.3.4:5000").unwrap()
        );
    }
}

use p256::ecdh::EphemeralSecret;
use p256::EncodedPoint;
use rand_core::OsRng;
use shared::error::{Error, Result};
use x25519_dalek::StaticSecret;

/// Elliptic curve type byte in ServerKeyExchange; only named curves are
/// supported (RFC 8422 section 5.4).
pub const ELLIPTIC_CURVE_TYPE_NAMED_CURVE: u8 = 0x03;

/// Named curves this stack negotiates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum NamedCurve {
    #[default]
    Unsupported = 0x0000,
    P256 = 0x0017,
    X25519 = 0x001d,
}

impl NamedCurve {
    pub fn from_u16(v: u16) -> Self {
        match v {
            0x0017 => NamedCurve::P256,
            0x001d => NamedCurve::X25519,
            _ => NamedCurve::Unsupported,
        }
    }
}

pub const DEFAULT_NAMED_CURVE: NamedCurve = NamedCurve::X25519;

/// An ephemeral ECDHE keypair for one handshake.
pub enum NamedCurveKeypair {
    X25519 {
        secret: StaticSecret,
        public: [u8; 32],
    },
    P256 {
        secret: EphemeralSecret,
        public: EncodedPoint,
    },
}

impl NamedCurveKeypair {
    pub fn curve(&self) -> NamedCurve {
        match self {
            NamedCurveKeypair::X25519 { .. } => NamedCurve::X25519,
            NamedCurveKeypair::P256 { .. } => NamedCurve::P256,
        }
    }

    /// The public key bytes as sent on the wire: 32 bytes for X25519, the
    /// uncompressed SEC1 point for P-256.
    pub fn public_key(&self) -> Vec<u8> {
        match self {
            NamedCurveKeypair::X25519 { public, .. } => public.to_vec(),
            NamedCurveKeypair::P256 { public, .. } => public.as_bytes().to_vec(),
        }
    }

    /// Computes the ECDHE pre-master secret against the remote public key.
    pub fn shared_secret(&self, remote_public: &[u8]) -> Result<Vec<u8>> {
        match self {
            NamedCurveKeypair::X25519 { secret, .. } => {
                let remote: [u8; 32] = remote_public
                    .try_into()
                    .map_err(|_| Error::ErrInvalidNamedCurve)?;
                let their_public = x25519_dalek::PublicKey::from(remote);
                Ok(secret.diffie_hellman(&their_public).as_bytes().to_vec())
            }
            NamedCurveKeypair::P256 { secret, .. } => {
                let point = EncodedPoint::from_bytes(remote_public)
                    .map_err(|_| Error::ErrInvalidNamedCurve)?;
                let their_public = p256::PublicKey::from_sec1_bytes(point.as_bytes())
                    .map_err(|_| Error::ErrInvalidNamedCurve)?;
                Ok(secret
                    .diffie_hellman(&their_public)
                    .raw_secret_bytes()
                    .to_vec())
            }
        }
    }
}

impl NamedCurve {
    pub fn generate_keypair(&self) -> Result<NamedCurveKeypair> {
        match self {
            NamedCurve::X25519 => {
                let secret = StaticSecret::random_from_rng(OsRng);
                let public = *x25519_dalek::PublicKey::from(&secret).as_bytes();
                Ok(NamedCurveKeypair::X25519 { secret, public })
            }
            NamedCurve::P256 => {
                let secret = EphemeralSecret::random(&mut OsRng);
                let public = EncodedPoint::from(secret.public_key());
                Ok(NamedCurveKeypair::P256 { secret, public })
            }
            NamedCurve::Unsupported => Err(Error::ErrInvalidNamedCurve),
        }
    }
}

#[cfg(test)]
mod curve_test {
    use super::*;

    #[test]
    fn test_shared_secret_agreement() {
        for curve in [NamedCurve::X25519, NamedCurve::P256] {
            let a = curve.generate_keypair().unwrap();
            let b = curve.generate_keypair().unwrap();

            let s1 = a.shared_secret(&b.public_key()).unwrap();
            let s2 = b.shared_secret(&a.public_key()).unwrap();
            assert_eq!(s1, s2, "{curve:?}");
            assert!(!s1.is_empty());
        }
    }

    #[test]
    fn test_bad_remote_public_rejected() {
        let a = NamedCurve::P256.generate_keypair().unwrap();
        assert!(a.shared_secret(&[0u8; 7]).is_err());
    }
}

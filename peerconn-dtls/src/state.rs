use shared::crypto::KeyingMaterialExporter;
use shared::error::{Error, Result};

use crate::cipher_suite::{CipherSuite, CipherSuiteId};
use crate::crypto::fingerprint_of_der;
use crate::curve::{NamedCurve, NamedCurveKeypair};
use crate::handshake::handshake_random::HandshakeRandom;
use crate::prf::prf_p_hash;
use crate::SrtpProtectionProfile;

pub(crate) const INVALID_KEYING_LABELS: [&str; 4] = [
    "client finished",
    "server finished",
    "master secret",
    "key expansion",
];

/// The keying material export label of DTLS-SRTP (RFC 5764 section 4.2).
pub const EXTRACTOR_DTLS_SRTP_LABEL: &str = "EXTRACTOR-dtls_srtp";

/// State holds everything a DTLS connection has negotiated so far.
pub struct State {
    pub(crate) is_client: bool,

    pub(crate) local_epoch: u16,
    pub(crate) remote_epoch: u16,

    pub(crate) local_random: HandshakeRandom,
    pub(crate) remote_random: HandshakeRandom,

    pub(crate) pre_master_secret: Vec<u8>,
    pub(crate) master_secret: Vec<u8>,
    pub(crate) extended_master_secret: bool,

    pub(crate) cipher_suite_id: Option<CipherSuiteId>,
    pub(crate) cipher_suite: Option<CipherSuite>,
    pub(crate) srtp_protection_profile: SrtpProtectionProfile,

    pub(crate) named_curve: NamedCurve,
    pub(crate) local_keypair: Option<NamedCurveKeypair>,

    pub(crate) cookie: Vec<u8>,
    pub(crate) handshake_send_sequence: u16,

    pub peer_certificates: Vec<Vec<u8>>,
    pub(crate) peer_certificates_verified: bool,
}

impl State {
    pub(crate) fn new(is_client: bool) -> Self {
        State {
            is_client,
            local_epoch: 0,
            remote_epoch: 0,
            local_random: HandshakeRandom::default(),
            remote_random: HandshakeRandom::default(),
            pre_master_secret: vec![],
            master_secret: vec![],
            extended_master_secret: false,
            cipher_suite_id: None,
            cipher_suite: None,
            srtp_protection_profile: SrtpProtectionProfile::Unsupported,
            named_curve: NamedCurve::Unsupported,
            local_keypair: None,
            cookie: vec![],
            handshake_send_sequence: 0,
            peer_certificates: vec![],
            peer_certificates_verified: false,
        }
    }

    pub fn srtp_protection_profile(&self) -> SrtpProtectionProfile {
        self.srtp_protection_profile
    }

    pub fn is_client(&self) -> bool {
        self.is_client
    }

    /// The SHA-256 fingerprint of the peer's leaf certificate.
    pub fn peer_fingerprint(&self) -> Option<String> {
        self.peer_certificates
            .first()
            .map(|der| fingerprint_of_der(der))
    }
}

impl KeyingMaterialExporter for State {
    /// export_keying_material returns length bytes of exported key material
    /// as defined in RFC 5705. This lets protocols use DTLS for key
    /// establishment but derive their own secrets, which is how SRTP obtains
    /// its master keys.
    fn export_keying_material(
        &self,
        label: &str,
        context: &[u8],
        length: usize,
    ) -> Result<Vec<u8>> {
        if self.local_epoch == 0 {
            return Err(Error::HandshakeInProgress);
        } else if !context.is_empty() {
            return Err(Error::ContextUnsupported);
        } else if INVALID_KEYING_LABELS.contains(&label) {
            return Err(Error::ReservedExportKeyingMaterial);
        }

        let local_random = self.local_random.marshal();
        let remote_random = self.remote_random.marshal();

        let mut seed = label.as_bytes().to_vec();
        if self.is_client {
            seed.extend_from_slice(&local_random);
            seed.extend_from_slice(&remote_random);
        } else {
            seed.extend_from_slice(&remote_random);
            seed.extend_from_slice(&local_random);
        }

        prf_p_hash(&self.master_secret, &seed, length)
    }
}

/// The keying material exported for SRTP, already split by direction
/// (RFC 5764 section 4.2).
#[derive(Debug, Clone, Default)]
pub struct SrtpKeyingMaterial {
    pub client_key: Vec<u8>,
    pub server_key: Vec<u8>,
    pub client_salt: Vec<u8>,
    pub server_salt: Vec<u8>,
}

impl State {
    /// Exports and splits the SRTP keying material for the negotiated
    /// protection profile.
    pub fn export_srtp_keying_material(&self) -> Result<(SrtpProtectionProfile, SrtpKeyingMaterial)> {
        let profile = self.srtp_protection_profile;
        if profile == SrtpProtectionProfile::Unsupported {
            return Err(Error::ErrRequestedButNoSrtpExtension);
        }

        let key_len = profile.key_len();
        let salt_len = profile.salt_len();
        let material =
            self.export_keying_material(EXTRACTOR_DTLS_SRTP_LABEL, &[], 2 * (key_len + salt_len))?;

        let mut offset = 0usize;
        let client_key = material[offset..offset + key_len].to_vec();
        offset += key_len;
        let server_key = material[offset..offset + key_len].to_vec();
        offset += key_len;
        let client_salt = material[offset..offset + salt_len].to_vec();
        offset += salt_len;
        let server_salt = material[offset..offset + salt_len].to_vec();

        Ok((
            profile,
            SrtpKeyingMaterial {
                client_key,
                server_key,
                client_salt,
                server_salt,
            },
        ))
    }
}

use rand::Rng;
use std::time::Duration;

use crate::crypto::Certificate;
use crate::SrtpProtectionProfile;

/// Initial retransmit timer of RFC 6347 section 4.2.4.1.
pub const INITIAL_RETRANSMIT_INTERVAL: Duration = Duration::from_secs(1);
/// The retransmit timer doubles up to this ceiling.
pub const MAX_RETRANSMIT_INTERVAL: Duration = Duration::from_secs(60);
/// Give up after this many unanswered retransmissions.
pub const DEFAULT_MAX_RETRANSMITS: usize = 8;

/// Whether the extended master secret extension (RFC 7627) is offered,
/// required, or disabled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ExtendedMasterSecretType {
    #[default]
    Request,
    Require,
    Disable,
}

/// HandshakeConfig holds everything shared between handshakes: the identity,
/// the SRTP profiles offered, and the stateless cookie secret.
pub struct HandshakeConfig {
    pub certificate: Certificate,

    /// SRTP protection profiles offered/accepted via use_srtp, in preference
    /// order. Server preference wins over the intersection.
    pub local_srtp_protection_profiles: Vec<SrtpProtectionProfile>,

    pub extended_master_secret: ExtendedMasterSecretType,

    /// When set, the peer certificate's SHA-256 fingerprint must equal this
    /// lowercase colon-separated value (taken from the remote SDP).
    pub remote_fingerprint: Option<String>,

    pub retransmit_interval: Duration,
    pub max_retransmit_interval: Duration,
    pub maximum_retransmit_number: usize,

    pub(crate) cookie_secret: [u8; 32],
}

impl HandshakeConfig {
    pub fn new(certificate: Certificate) -> Self {
        let mut cookie_secret = [0u8; 32];
        rand::thread_rng().fill(&mut cookie_secret);

        HandshakeConfig {
            certificate,
            local_srtp_protection_profiles: vec![
                SrtpProtectionProfile::Srtp_Aes128CmHmacSha1_80,
                SrtpProtectionProfile::Srtp_Aes128CmHmacSha1_32,
                SrtpProtectionProfile::Srtp_Aead_Aes_128_Gcm,
            ],
            extended_master_secret: ExtendedMasterSecretType::Request,
            remote_fingerprint: None,
            retransmit_interval: INITIAL_RETRANSMIT_INTERVAL,
            max_retransmit_interval: MAX_RETRANSMIT_INTERVAL,
            maximum_retransmit_number: DEFAULT_MAX_RETRANSMITS,
            cookie_secret,
        }
    }
}

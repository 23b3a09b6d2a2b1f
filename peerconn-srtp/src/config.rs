use crate::protection_profile::ProtectionProfile;

/// Keying material for one direction of an SRTP session, as exported from the
/// DTLS handshake (RFC 5764 section 4.2).
#[derive(Debug, Clone, Default)]
pub struct SessionKeys {
    pub local_master_key: Vec<u8>,
    pub local_master_salt: Vec<u8>,
    pub remote_master_key: Vec<u8>,
    pub remote_master_salt: Vec<u8>,
}

/// Config is everything needed to build the two [crate::Context]s of a
/// session: one protecting outbound packets, one validating inbound ones.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub keys: SessionKeys,
    pub profile: ProtectionProfile,
}

/// ProtectionProfile specifies the SRTP encryption and authentication
/// transforms, negotiated through the DTLS use_srtp extension (RFC 5764).
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ProtectionProfile {
    #[default]
    Aes128CmHmacSha1_80 = 0x0001,
    Aes128CmHmacSha1_32 = 0x0002,
    AeadAes128Gcm = 0x0007,
}

impl ProtectionProfile {
    pub fn key_len(&self) -> usize {
        16
    }

    pub fn salt_len(&self) -> usize {
        match self {
            ProtectionProfile::Aes128CmHmacSha1_80 | ProtectionProfile::Aes128CmHmacSha1_32 => 14,
            ProtectionProfile::AeadAes128Gcm => 12,
        }
    }

    /// Length of the per-packet authentication tag appended to SRTP packets.
    pub fn rtp_auth_tag_len(&self) -> usize {
        match self {
            ProtectionProfile::Aes128CmHmacSha1_80 => 10,
            ProtectionProfile::Aes128CmHmacSha1_32 => 4,
            ProtectionProfile::AeadAes128Gcm => 16,
        }
    }

    /// SRTCP always authenticates with the full 80-bit tag for the SHA1
    /// profiles.
    pub fn rtcp_auth_tag_len(&self) -> usize {
        match self {
            ProtectionProfile::Aes128CmHmacSha1_80 | ProtectionProfile::Aes128CmHmacSha1_32 => 10,
            ProtectionProfile::AeadAes128Gcm => 16,
        }
    }

    pub fn auth_key_len(&self) -> usize {
        match self {
            ProtectionProfile::Aes128CmHmacSha1_80 | ProtectionProfile::Aes128CmHmacSha1_32 => 20,
            ProtectionProfile::AeadAes128Gcm => 0,
        }
    }

    /// Total keying material this profile consumes per direction.
    pub fn keying_material_len(&self) -> usize {
        self.key_len() + self.salt_len()
    }
}

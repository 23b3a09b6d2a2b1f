#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod alert;
pub mod cipher_suite;
pub mod config;
pub mod conn;
pub mod crypto;
pub mod curve;
pub mod endpoint;
pub mod extension;
pub mod flight;
pub mod fragment;
pub mod handshake;
pub mod prf;
pub mod record;
pub mod state;

pub use config::HandshakeConfig;
pub use conn::DTLSConn;
pub use endpoint::{Endpoint, EndpointEvent};

/// SRTP protection profile identifiers as negotiated by the use_srtp
/// extension (RFC 5764 section 4.1.2).
#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[repr(u16)]
pub enum SrtpProtectionProfile {
    #[default]
    Unsupported = 0x0000,
    Srtp_Aes128CmHmacSha1_80 = 0x0001,
    Srtp_Aes128CmHmacSha1_32 = 0x0002,
    Srtp_Aead_Aes_128_Gcm = 0x0007,
}

impl SrtpProtectionProfile {
    pub fn from_u16(v: u16) -> Self {
        match v {
            0x0001 => SrtpProtectionProfile::Srtp_Aes128CmHmacSha1_80,
            0x0002 => SrtpProtectionProfile::Srtp_Aes128CmHmacSha1_32,
            0x0007 => SrtpProtectionProfile::Srtp_Aead_Aes_128_Gcm,
            _ => SrtpProtectionProfile::Unsupported,
        }
    }

    /// Master key length this profile consumes from exported material.
    pub fn key_len(&self) -> usize {
        16
    }

    pub fn salt_len(&self) -> usize {
        match self {
            SrtpProtectionProfile::Srtp_Aead_Aes_128_Gcm => 12,
            _ => 14,
        }
    }
}

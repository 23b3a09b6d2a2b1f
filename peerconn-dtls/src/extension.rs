use shared::error::{Error, Result};

use crate::crypto::SignatureHashAlgorithm;
use crate::curve::NamedCurve;
use crate::SrtpProtectionProfile;

pub const EXTENSION_SUPPORTED_GROUPS: u16 = 10;
pub const EXTENSION_EC_POINT_FORMATS: u16 = 11;
pub const EXTENSION_SIGNATURE_ALGORITHMS: u16 = 13;
pub const EXTENSION_USE_SRTP: u16 = 14;
pub const EXTENSION_EXTENDED_MASTER_SECRET: u16 = 23;
pub const EXTENSION_RENEGOTIATION_INFO: u16 = 0xff01;

/// The hello extensions this stack produces and consumes; unknown extensions
/// are skipped on parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    SupportedEllipticCurves(Vec<NamedCurve>),
    SupportedPointFormats,
    SignatureAlgorithms(Vec<SignatureHashAlgorithm>),
    UseSrtp(Vec<SrtpProtectionProfile>),
    UseExtendedMasterSecret,
    RenegotiationInfo,
}

impl Extension {
    pub fn marshal(&self, out: &mut Vec<u8>) {
        match self {
            Extension::SupportedEllipticCurves(curves) => {
                out.extend_from_slice(&EXTENSION_SUPPORTED_GROUPS.to_be_bytes());
                out.extend_from_slice(&((curves.len() * 2 + 2) as u16).to_be_bytes());
                out.extend_from_slice(&((curves.len() * 2) as u16).to_be_bytes());
                for c in curves {
                    out.extend_from_slice(&(*c as u16).to_be_bytes());
                }
            }
            Extension::SupportedPointFormats => {
                out.extend_from_slice(&EXTENSION_EC_POINT_FORMATS.to_be_bytes());
                out.extend_from_slice(&2u16.to_be_bytes());
                out.push(1); // list length
                out.push(0); // uncompressed
            }
            Extension::SignatureAlgorithms(algorithms) => {
                out.extend_from_slice(&EXTENSION_SIGNATURE_ALGORITHMS.to_be_bytes());
                out.extend_from_slice(&((algorithms.len() * 2 + 2) as u16).to_be_bytes());
                out.extend_from_slice(&((algorithms.len() * 2) as u16).to_be_bytes());
                for a in algorithms {
                    out.push(a.hash);
                    out.push(a.signature);
                }
            }
            Extension::UseSrtp(profiles) => {
                out.extend_from_slice(&EXTENSION_USE_SRTP.to_be_bytes());
                out.extend_from_slice(&((profiles.len() * 2 + 3) as u16).to_be_bytes());
                out.extend_from_slice(&((profiles.len() * 2) as u16).to_be_bytes());
                for p in profiles {
                    out.extend_from_slice(&(*p as u16).to_be_bytes());
                }
                out.push(0); // srtp_mki length
            }
            Extension::UseExtendedMasterSecret => {
                out.extend_from_slice(&EXTENSION_EXTENDED_MASTER_SECRET.to_be_bytes());
                out.extend_from_slice(&0u16.to_be_bytes());
            }
            Extension::RenegotiationInfo => {
                out.extend_from_slice(&EXTENSION_RENEGOTIATION_INFO.to_be_bytes());
                out.extend_from_slice(&1u16.to_be_bytes());
                out.push(0);
            }
        }
    }

    fn unmarshal(typ: u16, data: &[u8]) -> Result<Option<Self>> {
        Ok(match typ {
            EXTENSION_SUPPORTED_GROUPS => {
                if data.len() < 2 {
                    return Err(Error::ErrDtlsPacketInvalidLength);
                }
                let n = u16::from_be_bytes([data[0], data[1]]) as usize;
                if data.len() < 2 + n || n % 2 != 0 {
                    return Err(Error::ErrDtlsPacketInvalidLength);
                }
                let mut curves = vec![];
                for i in 0..n / 2 {
                    curves.push(NamedCurve::from_u16(u16::from_be_bytes([
                        data[2 + i * 2],
                        data[3 + i * 2],
                    ])));
                }
                Some(Extension::SupportedEllipticCurves(curves))
            }
            EXTENSION_EC_POINT_FORMATS => Some(Extension::SupportedPointFormats),
            EXTENSION_SIGNATURE_ALGORITHMS => {
                if data.len() < 2 {
                    return Err(Error::ErrDtlsPacketInvalidLength);
                }
                let n = u16::from_be_bytes([data[0], data[1]]) as usize;
                if data.len() < 2 + n || n % 2 != 0 {
                    return Err(Error::ErrDtlsPacketInvalidLength);
                }
                let mut algorithms = vec![];
                for i in 0..n / 2 {
                    algorithms.push(SignatureHashAlgorithm {
                        hash: data[2 + i * 2],
                        signature: data[3 + i * 2],
                    });
                }
                Some(Extension::SignatureAlgorithms(algorithms))
            }
            EXTENSION_USE_SRTP => {
                if data.len() < 2 {
                    return Err(Error::ErrDtlsPacketInvalidLength);
                }
                let n = u16::from_be_bytes([data[0], data[1]]) as usize;
                if data.len() < 2 + n || n % 2 != 0 {
                    return Err(Error::ErrDtlsPacketInvalidLength);
                }
                let mut profiles = vec![];
                for i in 0..n / 2 {
                    profiles.push(SrtpProtectionProfile::from_u16(u16::from_be_bytes([
                        data[2 + i * 2],
                        data[3 + i * 2],
                    ])));
                }
                Some(Extension::UseSrtp(profiles))
            }
            EXTENSION_EXTENDED_MASTER_SECRET => Some(Extension::UseExtendedMasterSecret),
            EXTENSION_RENEGOTIATION_INFO => Some(Extension::RenegotiationInfo),
            _ => None,
        })
    }
}

/// Marshals an extension block: 2-byte total length then each extension.
pub fn marshal_extensions(extensions: &[Extension]) -> Vec<u8> {
    let mut body = vec![];
    for e in extensions {
        e.marshal(&mut body);
    }
    let mut out = Vec::with_capacity(2 + body.len());
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// Parses an extension block, returning the recognized extensions and the
/// number of bytes consumed.
pub fn unmarshal_extensions(raw: &[u8]) -> Result<(Vec<Extension>, usize)> {
    if raw.is_empty() {
        // hellos may omit the extension block entirely
        return Ok((vec![], 0));
    }
    if raw.len() < 2 {
        return Err(Error::ErrDtlsPacketInvalidLength);
    }
    let total = u16::from_be_bytes([raw[0], raw[1]]) as usize;
    if raw.len() < 2 + total {
        return Err(Error::ErrDtlsPacketInvalidLength);
    }

    let mut extensions = vec![];
    let mut offset = 2usize;
    let end = 2 + total;
    while offset + 4 <= end {
        let typ = u16::from_be_bytes([raw[offset], raw[offset + 1]]);
        let len = u16::from_be_bytes([raw[offset + 2], raw[offset + 3]]) as usize;
        offset += 4;
        if offset + len > end {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        if let Some(ext) = Extension::unmarshal(typ, &raw[offset..offset + len])? {
            extensions.push(ext);
        }
        offset += len;
    }

    Ok((extensions, end))
}

#[cfg(test)]
mod extension_test {
    use super::*;
    use crate::crypto::SIGNATURE_HASH_ALGORITHMS;

    #[test]
    fn test_extensions_roundtrip() {
        let extensions = vec![
            Extension::SupportedEllipticCurves(vec![NamedCurve::X25519, NamedCurve::P256]),
            Extension::SupportedPointFormats,
            Extension::SignatureAlgorithms(SIGNATURE_HASH_ALGORITHMS.to_vec()),
            Extension::UseSrtp(vec![
                SrtpProtectionProfile::Srtp_Aes128CmHmacSha1_80,
                SrtpProtectionProfile::Srtp_Aead_Aes_128_Gcm,
            ]),
            Extension::UseExtendedMasterSecret,
            Extension::RenegotiationInfo,
        ];

        let raw = marshal_extensions(&extensions);
        let (parsed, consumed) = unmarshal_extensions(&raw).expect("unmarshal");
        assert_eq!(consumed, raw.len());
        assert_eq!(parsed, extensions);
    }

    #[test]
    fn test_unknown_extension_skipped() {
        let mut raw = vec![0u8, 8]; // total length 8
        raw.extend_from_slice(&0xfafau16.to_be_bytes()); // grease
        raw.extend_from_slice(&0u16.to_be_bytes());
        raw.extend_from_slice(&EXTENSION_EXTENDED_MASTER_SECRET.to_be_bytes());
        raw.extend_from_slice(&0u16.to_be_bytes());

        let (parsed, _) = unmarshal_extensions(&raw).expect("unmarshal");
        assert_eq!(parsed, vec![Extension::UseExtendedMasterSecret]);
    }

    #[test]
    fn test_truncated_extension_block() {
        let raw = vec![0u8, 10, 0, 14, 0, 4, 0];
        assert!(unmarshal_extensions(&raw).is_err());
    }
}

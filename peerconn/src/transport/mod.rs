//! The integrated transport: one UDP flow multiplexing STUN, DTLS and
//! SRTP/SRTCP, holding the DTLS endpoint and the SRTP keying it produced.

use log::{debug, info};
use shared::error::{Error, Result};
use std::fmt;
use std::sync::Arc;

use dtls::state::SrtpKeyingMaterial;
use dtls::SrtpProtectionProfile;
use srtp::ProtectionProfile;

/// What an inbound datagram is, by its first byte (RFC 7983).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Classified {
    Stun,
    Dtls,
    Rtp,
    Rtcp,
    Unknown,
}

/// Classifies an inbound datagram.
pub fn classify(buf: &[u8]) -> Classified {
    if shared::util::match_stun(buf) {
        Classified::Stun
    } else if shared::util::match_dtls(buf) {
        Classified::Dtls
    } else if shared::util::match_srtcp(buf) {
        Classified::Rtcp
    } else if shared::util::match_srtp(buf) {
        Classified::Rtp
    } else {
        Classified::Unknown
    }
}

/// The DTLS role this side plays, negotiated via `a=setup`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum DtlsRole {
    /// Role not yet decided; the offerer announces actpass.
    #[default]
    Auto,
    /// We initiate the handshake (a=setup:active).
    Client,
    /// We await the handshake (a=setup:passive).
    Server,
}

impl fmt::Display for DtlsRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DtlsRole::Auto => "actpass",
            DtlsRole::Client => "active",
            DtlsRole::Server => "passive",
        };
        write!(f, "{s}")
    }
}

/// Composed transport state: (ICE state, DTLS state) folded into the W3C
/// transport lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportState::New => "new",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::Disconnected => "disconnected",
            TransportState::Failed => "failed",
            TransportState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Transport couples the DTLS endpoint with the SRTP sessions its keys
/// produced. SRTP/SRTCP bypasses DTLS framing on the wire; only the keying
/// flows from the handshake.
pub struct Transport {
    pub(crate) dtls_endpoint: dtls::Endpoint,
    pub(crate) dtls_role: DtlsRole,
    pub(crate) state: TransportState,

    /// Protects outbound RTP/RTCP.
    pub(crate) local_srtp_context: Option<srtp::Context>,
    /// Validates inbound SRTP/SRTCP.
    pub(crate) remote_srtp_context: Option<srtp::Context>,
}

impl Transport {
    pub fn new(server_config: Option<Arc<dtls::HandshakeConfig>>) -> Self {
        Transport {
            dtls_endpoint: dtls::Endpoint::new(server_config),
            dtls_role: DtlsRole::Auto,
            state: TransportState::New,
            local_srtp_context: None,
            remote_srtp_context: None,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Builds the paired SRTP contexts from the DTLS-exported keying
    /// material, assigning directions by handshake role (RFC 5764
    /// section 4.2): the client writes with the client key.
    pub fn install_srtp_keys(
        &mut self,
        profile: SrtpProtectionProfile,
        keys: &SrtpKeyingMaterial,
        is_client: bool,
    ) -> Result<()> {
        let profile = match profile {
            SrtpProtectionProfile::Srtp_Aes128CmHmacSha1_80 => {
                ProtectionProfile::Aes128CmHmacSha1_80
            }
            SrtpProtectionProfile::Srtp_Aes128CmHmacSha1_32 => {
                ProtectionProfile::Aes128CmHmacSha1_32
            }
            SrtpProtectionProfile::Srtp_Aead_Aes_128_Gcm => ProtectionProfile::AeadAes128Gcm,
            SrtpProtectionProfile::Unsupported => return Err(Error::ErrNoSuchSrtpProfile),
        };

        let (local_key, local_salt, remote_key, remote_salt) = if is_client {
            (
                &keys.client_key,
                &keys.client_salt,
                &keys.server_key,
                &keys.server_salt,
            )
        } else {
            (
                &keys.server_key,
                &keys.server_salt,
                &keys.client_key,
                &keys.client_salt,
            )
        };

        self.local_srtp_context = Some(srtp::Context::new(local_key, local_salt, profile)?);
        self.remote_srtp_context = Some(srtp::Context::new(remote_key, remote_salt, profile)?);

        info!("transport: SRTP sessions keyed with {profile:?}");
        Ok(())
    }

    pub fn has_srtp(&self) -> bool {
        self.local_srtp_context.is_some()
    }

    /// Protects an outbound plaintext RTP packet.
    pub fn encrypt_rtp(&mut self, plaintext: &[u8]) -> Result<bytes::Bytes> {
        self.local_srtp_context
            .as_mut()
            .ok_or(Error::ErrNoSuchSrtpProfile)?
            .encrypt_rtp(plaintext)
    }

    /// Protects an outbound compound RTCP packet.
    pub fn encrypt_rtcp(&mut self, plaintext: &[u8]) -> Result<bytes::Bytes> {
        self.local_srtp_context
            .as_mut()
            .ok_or(Error::ErrNoSuchSrtpProfile)?
            .encrypt_rtcp(plaintext)
    }

    /// Validates and decrypts an inbound SRTP packet. Replay and
    /// authentication failures are silent drops at this boundary: callers
    /// log at debug and never surface them.
    pub fn decrypt_rtp(&mut self, protected: &[u8]) -> Result<bytes::Bytes> {
        self.remote_srtp_context
            .as_mut()
            .ok_or(Error::ErrNoSuchSrtpProfile)?
            .decrypt_rtp(protected)
    }

    /// Validates and decrypts an inbound SRTCP packet.
    pub fn decrypt_rtcp(&mut self, protected: &[u8]) -> Result<bytes::Bytes> {
        self.remote_srtp_context
            .as_mut()
            .ok_or(Error::ErrNoSuchSrtpProfile)?
            .decrypt_rtcp(protected)
    }

    /// Folds the ICE and DTLS states into the composed transport state.
    pub fn compose_state(
        &mut self,
        ice_state: ice::ConnectionState,
        dtls_connected: bool,
        closed: bool,
    ) -> TransportState {
        let next = if closed {
            TransportState::Closed
        } else {
            match ice_state {
                ice::ConnectionState::Failed => TransportState::Failed,
                ice::ConnectionState::Disconnected => TransportState::Disconnected,
                ice::ConnectionState::Closed => TransportState::Closed,
                ice::ConnectionState::New | ice::ConnectionState::Unspecified => TransportState::New,
                ice::ConnectionState::Checking => TransportState::Connecting,
                ice::ConnectionState::Connected | ice::ConnectionState::Completed => {
                    if dtls_connected {
                        TransportState::Connected
                    } else {
                        TransportState::Connecting
                    }
                }
            }
        };

        if next != self.state {
            debug!("transport state {} -> {}", self.state, next);
            self.state = next;
        }
        next
    }
}

#[cfg(test)]
mod transport_test {
    use super::*;

    #[test]
    fn test_classify_first_byte() {
        assert_eq!(classify(&[0x00, 0x01, 0x00, 0x00]), Classified::Stun);
        assert_eq!(classify(&[0x16, 0xfe, 0xfd]), Classified::Dtls);
        assert_eq!(classify(&[0x80, 0x60, 0x00, 0x01]), Classified::Rtp);
        assert_eq!(classify(&[0x80, 0xc8, 0x00, 0x06]), Classified::Rtcp);
        assert_eq!(classify(&[0xff, 0x00]), Classified::Unknown);
        assert_eq!(classify(&[]), Classified::Unknown);
    }

    #[test]
    fn test_rtcp_payload_type_range() {
        // PT 64..95 within the RTP range disambiguates RTCP
        for pt in [192u8, 200, 206, 223] {
            assert_eq!(classify(&[0x80, pt, 0, 0]), Classified::Rtcp, "pt {pt}");
        }
        for pt in [0u8, 96, 111, 127] {
            assert_eq!(
                classify(&[0x80, 0x80 | pt, 0, 0]),
                Classified::Rtp,
                "pt {pt}"
            );
        }
    }

    #[test]
    fn test_state_composition() {
        let mut t = Transport::new(None);
        assert_eq!(
            t.compose_state(ice::ConnectionState::Checking, false, false),
            TransportState::Connecting
        );
        assert_eq!(
            t.compose_state(ice::ConnectionState::Connected, false, false),
            TransportState::Connecting
        );
        assert_eq!(
            t.compose_state(ice::ConnectionState::Connected, true, false),
            TransportState::Connected
        );
        assert_eq!(
            t.compose_state(ice::ConnectionState::Disconnected, true, false),
            TransportState::Disconnected
        );
        assert_eq!(
            t.compose_state(ice::ConnectionState::Failed, true, false),
            TransportState::Failed
        );
        assert_eq!(
            t.compose_state(ice::ConnectionState::Connected, true, true),
            TransportState::Closed
        );
    }

    #[test]
    fn test_srtp_keying_by_role() {
        let keys = SrtpKeyingMaterial {
            client_key: vec![1u8; 16],
            server_key: vec![2u8; 16],
            client_salt: vec![3u8; 14],
            server_salt: vec![4u8; 14],
        };

        let mut client = Transport::new(None);
        client
            .install_srtp_keys(
                SrtpProtectionProfile::Srtp_Aes128CmHmacSha1_80,
                &keys,
                true,
            )
            .unwrap();
        let mut server = Transport::new(None);
        server
            .install_srtp_keys(
                SrtpProtectionProfile::Srtp_Aes128CmHmacSha1_80,
                &keys,
                false,
            )
            .unwrap();

        // client-protected packets must decrypt on the server side
        let packet = rtp::Packet {
            header: rtp::Header {
                version: 2,
                payload_type: 96,
                sequence_number: 9,
                ssrc: 0x42,
                ..Default::default()
            },
            payload: bytes::Bytes::from_static(b"media"),
            padding_size: 0,
        }
        .marshal()
        .unwrap();

        let protected = client.encrypt_rtp(&packet).unwrap();
        let decrypted = server.decrypt_rtp(&protected).unwrap();
        assert_eq!(decrypted.as_ref(), packet.as_ref());
    }
}

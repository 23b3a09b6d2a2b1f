pub mod certificate;
pub mod client_hello;
pub mod finished;
pub mod handshake_random;
pub mod key_exchange;
pub mod server_hello;

use shared::error::{Error, Result};
use std::fmt;

use certificate::*;
use client_hello::ClientHello;
use finished::Finished;
use key_exchange::*;
use server_hello::*;

/// The 12-byte DTLS handshake header (RFC 6347 section 4.2.2).
pub const HANDSHAKE_HEADER_LENGTH: usize = 12;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HandshakeType {
    HelloRequest = 0,
    ClientHello = 1,
    ServerHello = 2,
    HelloVerifyRequest = 3,
    Certificate = 11,
    ServerKeyExchange = 12,
    CertificateRequest = 13,
    ServerHelloDone = 14,
    CertificateVerify = 15,
    ClientKeyExchange = 16,
    Finished = 20,
}

impl fmt::Display for HandshakeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl TryFrom<u8> for HandshakeType {
    type Error = Error;

    fn try_from(b: u8) -> Result<Self> {
        match b {
            0 => Ok(HandshakeType::HelloRequest),
            1 => Ok(HandshakeType::ClientHello),
            2 => Ok(HandshakeType::ServerHello),
            3 => Ok(HandshakeType::HelloVerifyRequest),
            11 => Ok(HandshakeType::Certificate),
            12 => Ok(HandshakeType::ServerKeyExchange),
            13 => Ok(HandshakeType::CertificateRequest),
            14 => Ok(HandshakeType::ServerHelloDone),
            15 => Ok(HandshakeType::CertificateVerify),
            16 => Ok(HandshakeType::ClientKeyExchange),
            20 => Ok(HandshakeType::Finished),
            _ => Err(Error::ErrUnhandledContentType),
        }
    }
}

/// The header in front of every handshake message fragment.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct HandshakeHeader {
    pub handshake_type: HandshakeType,
    pub length: u32,          // uint24, length of the whole message body
    pub message_sequence: u16,
    pub fragment_offset: u32, // uint24
    pub fragment_length: u32, // uint24
}

pub(crate) fn put_u24(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes()[1..4]);
}

pub(crate) fn read_u24(raw: &[u8]) -> u32 {
    (raw[0] as u32) << 16 | (raw[1] as u32) << 8 | raw[2] as u32
}

impl HandshakeHeader {
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HANDSHAKE_HEADER_LENGTH);
        out.push(self.handshake_type as u8);
        put_u24(&mut out, self.length);
        out.extend_from_slice(&self.message_sequence.to_be_bytes());
        put_u24(&mut out, self.fragment_offset);
        put_u24(&mut out, self.fragment_length);
        out
    }

    pub fn unmarshal(raw: &[u8]) -> Result<Self> {
        if raw.len() < HANDSHAKE_HEADER_LENGTH {
            return Err(Error::ErrDtlsPacketInvalidLength);
        }
        Ok(HandshakeHeader {
            handshake_type: HandshakeType::try_from(raw[0])?,
            length: read_u24(&raw[1..4]),
            message_sequence: u16::from_be_bytes([raw[4], raw[5]]),
            fragment_offset: read_u24(&raw[6..9]),
            fragment_length: read_u24(&raw[9..12]),
        })
    }
}

/// A fully reassembled handshake message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    HelloVerifyRequest(HelloVerifyRequest),
    Certificate(HandshakeMessageCertificate),
    ServerKeyExchange(ServerKeyExchange),
    CertificateRequest(CertificateRequest),
    ServerHelloDone,
    CertificateVerify(CertificateVerify),
    ClientKeyExchange(ClientKeyExchange),
    Finished(Finished),
}

impl HandshakeMessage {
    pub fn handshake_type(&self) -> HandshakeType {
        match self {
            HandshakeMessage::ClientHello(_) => HandshakeType::ClientHello,
            HandshakeMessage::ServerHello(_) => HandshakeType::ServerHello,
            HandshakeMessage::HelloVerifyRequest(_) => HandshakeType::HelloVerifyRequest,
            HandshakeMessage::Certificate(_) => HandshakeType::Certificate,
            HandshakeMessage::ServerKeyExchange(_) => HandshakeType::ServerKeyExchange,
            HandshakeMessage::CertificateRequest(_) => HandshakeType::CertificateRequest,
            HandshakeMessage::ServerHelloDone => HandshakeType::ServerHelloDone,
            HandshakeMessage::CertificateVerify(_) => HandshakeType::CertificateVerify,
            HandshakeMessage::ClientKeyExchange(_) => HandshakeType::ClientKeyExchange,
            HandshakeMessage::Finished(_) => HandshakeType::Finished,
        }
    }

    pub fn marshal_body(&self) -> Result<Vec<u8>> {
        Ok(match self {
            HandshakeMessage::ClientHello(m) => m.marshal(),
            HandshakeMessage::ServerHello(m) => m.marshal(),
            HandshakeMessage::HelloVerifyRequest(m) => m.marshal(),
            HandshakeMessage::Certificate(m) => m.marshal(),
            HandshakeMessage::ServerKeyExchange(m) => m.marshal(),
            HandshakeMessage::CertificateRequest(m) => m.marshal(),
            HandshakeMessage::ServerHelloDone => vec![],
            HandshakeMessage::CertificateVerify(m) => m.marshal(),
            HandshakeMessage::ClientKeyExchange(m) => m.marshal(),
            HandshakeMessage::Finished(m) => m.marshal(),
        })
    }

    pub fn unmarshal_body(typ: HandshakeType, body: &[u8]) -> Result<Self> {
        Ok(match typ {
            HandshakeType::ClientHello => {
                HandshakeMessage::ClientHello(ClientHello::unmarshal(body)?)
            }
            HandshakeType::ServerHello => {
                HandshakeMessage::ServerHello(ServerHello::unmarshal(body)?)
            }
            HandshakeType::HelloVerifyRequest => {
                HandshakeMessage::HelloVerifyRequest(HelloVerifyRequest::unmarshal(body)?)
            }
            HandshakeType::Certificate => {
                HandshakeMessage::Certificate(HandshakeMessageCertificate::unmarshal(body)?)
            }
            HandshakeType::ServerKeyExchange => {
                HandshakeMessage::ServerKeyExchange(ServerKeyExchange::unmarshal(body)?)
            }
            HandshakeType::CertificateRequest => {
                HandshakeMessage::CertificateRequest(CertificateRequest::unmarshal(body)?)
            }
            HandshakeType::ServerHelloDone => HandshakeMessage::ServerHelloDone,
            HandshakeType::CertificateVerify => {
                HandshakeMessage::CertificateVerify(CertificateVerify::unmarshal(body)?)
            }
            HandshakeType::ClientKeyExchange => {
                HandshakeMessage::ClientKeyExchange(ClientKeyExchange::unmarshal(body)?)
            }
            HandshakeType::Finished => HandshakeMessage::Finished(Finished::unmarshal(body)?),
            HandshakeType::HelloRequest => {
                return Err(Error::ErrUnhandledContentType);
            }
        })
    }

    /// Serializes the message with its handshake header, unfragmented.
    pub fn marshal_with_header(&self, message_sequence: u16) -> Result<Vec<u8>> {
        let body = self.marshal_body()?;
        let header = HandshakeHeader {
            handshake_type: self.handshake_type(),
            length: body.len() as u32,
            message_sequence,
            fragment_offset: 0,
            fragment_length: body.len() as u32,
        };
        let mut out = header.marshal();
        out.extend_from_slice(&body);
        Ok(out)
    }
}

#[cfg(test)]
mod handshake_test {
    use super::*;

    #[test]
    fn test_handshake_header_roundtrip() {
        let h = HandshakeHeader {
            handshake_type: HandshakeType::ClientHello,
            length: 0x012345,
            message_sequence: 7,
            fragment_offset: 0x10,
            fragment_length: 0x35,
        };
        let raw = h.marshal();
        assert_eq!(raw.len(), HANDSHAKE_HEADER_LENGTH);
        assert_eq!(HandshakeHeader::unmarshal(&raw).unwrap(), h);
    }

    #[test]
    fn test_server_hello_done_empty_body() {
        let m = HandshakeMessage::ServerHelloDone;
        let raw = m.marshal_with_header(3).unwrap();
        let header = HandshakeHeader::unmarshal(&raw).unwrap();
        assert_eq!(header.length, 0);
        assert_eq!(header.message_sequence, 3);
        assert_eq!(
            HandshakeMessage::unmarshal_body(HandshakeType::ServerHelloDone, &[]).unwrap(),
            m
        );
    }
}

use rand::Rng;
use shared::error::{Error, Result};
use std::fmt;

use crate::attributes::{AttrType, RawAttribute};

/// Magic cookie of RFC 5389 section 6.
pub const MAGIC_COOKIE: u32 = 0x2112_A442;
pub const TRANSACTION_ID_SIZE: usize = 12;
pub const MESSAGE_HEADER_SIZE: usize = 20;
pub const ATTRIBUTE_HEADER_SIZE: usize = 4;

/// STUN message class, the two C bits of the message type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MessageClass {
    #[default]
    Request = 0b00,
    Indication = 0b01,
    SuccessResponse = 0b10,
    ErrorResponse = 0b11,
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageClass::Request => "request",
            MessageClass::Indication => "indication",
            MessageClass::SuccessResponse => "success response",
            MessageClass::ErrorResponse => "error response",
        };
        write!(f, "{s}")
    }
}

/// STUN method; only BINDING is used by ICE.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Binding = 0x001,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Binding")
    }
}

/// MessageType is the combined method and class field.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct MessageType {
    pub method: Method,
    pub class: MessageClass,
}

pub const BINDING_REQUEST: MessageType = MessageType {
    method: Method::Binding,
    class: MessageClass::Request,
};
pub const BINDING_SUCCESS: MessageType = MessageType {
    method: Method::Binding,
    class: MessageClass::SuccessResponse,
};
pub const BINDING_ERROR: MessageType = MessageType {
    method: Method::Binding,
    class: MessageClass::ErrorResponse,
};
pub const BINDING_INDICATION: MessageType = MessageType {
    method: Method::Binding,
    class: MessageClass::Indication,
};

impl MessageType {
    /// Packs method and class into the 14-bit wire value of RFC 5389
    /// section 6.
    pub fn value(&self) -> u16 {
        let m = Method::Binding as u16;
        let c = self.class as u16;
        // M11..M7 | C1 | M6..M4 | C0 | M3..M0
        let m_low = m & 0xf;
        let m_mid = (m >> 4) & 0x7;
        let m_high = (m >> 7) & 0x1f;
        (m_high << 9) | ((c >> 1) << 8) | (m_mid << 5) | ((c & 0x1) << 4) | m_low
    }

    pub fn from_value(v: u16) -> Result<Self> {
        let c = ((v >> 8) & 0x1) << 1 | (v >> 4) & 0x1;
        let m = ((v >> 9) & 0x1f) << 7 | ((v >> 5) & 0x7) << 4 | v & 0xf;
        if m != Method::Binding as u16 {
            return Err(Error::ErrUnhandledStunPacket);
        }
        let class = match c {
            0b00 => MessageClass::Request,
            0b01 => MessageClass::Indication,
            0b10 => MessageClass::SuccessResponse,
            _ => MessageClass::ErrorResponse,
        };
        Ok(MessageType {
            method: Method::Binding,
            class,
        })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.class)
    }
}

/// The 96-bit transaction identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct TransactionId(pub [u8; TRANSACTION_ID_SIZE]);

impl TransactionId {
    /// Generates a cryptographically random transaction id.
    pub fn new() -> Self {
        let mut id = [0u8; TRANSACTION_ID_SIZE];
        rand::thread_rng().fill(&mut id);
        TransactionId(id)
    }
}

/// Setter appends an attribute (or mutates the header) of a message being
/// built.
pub trait Setter {
    fn add_to(&self, m: &mut Message) -> Result<()>;
}

/// Getter extracts typed information from a decoded message.
pub trait Getter {
    fn get_from(&mut self, m: &Message) -> Result<()>;
}

impl Setter for MessageType {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.set_type(*self);
        Ok(())
    }
}

impl Setter for TransactionId {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.transaction_id = *self;
        m.write_transaction_id();
        Ok(())
    }
}

impl Setter for Message {
    /// Copies the transaction id of another message, the usual way to answer
    /// a request.
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.transaction_id = self.transaction_id;
        m.write_transaction_id();
        Ok(())
    }
}

/// Returns true if `buf` looks like a STUN message: correct size, zero top
/// bits and the magic cookie in place (RFC 7983 first-byte range [0..3]).
pub fn is_message(buf: &[u8]) -> bool {
    buf.len() >= MESSAGE_HEADER_SIZE
        && u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) == MAGIC_COOKIE
        && buf[0] & 0xC0 == 0
}

/// Message represents a single STUN message. `raw` always holds the encoded
/// form; attribute mutation rewrites it in place.
#[derive(Default, Clone)]
pub struct Message {
    pub typ: MessageType,
    pub transaction_id: TransactionId,
    pub attributes: Vec<RawAttribute>,
    pub raw: Vec<u8>,
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} l={} attrs={} id={:02x?}",
            self.typ,
            self.raw.len().saturating_sub(MESSAGE_HEADER_SIZE),
            self.attributes.len(),
            self.transaction_id.0
        )
    }
}

impl Message {
    pub fn new() -> Self {
        let mut m = Message {
            raw: vec![0u8; MESSAGE_HEADER_SIZE],
            ..Default::default()
        };
        m.write_header();
        m
    }

    /// Resets the message to an empty request, then applies each setter.
    pub fn build(&mut self, setters: &[&dyn Setter]) -> Result<()> {
        self.reset();
        self.write_header();
        for s in setters {
            s.add_to(self)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.typ = MessageType::default();
        self.transaction_id = TransactionId::default();
        self.attributes.clear();
        self.raw.clear();
        self.raw.resize(MESSAGE_HEADER_SIZE, 0);
    }

    fn attrs_len(&self) -> usize {
        self.raw.len() - MESSAGE_HEADER_SIZE
    }

    pub(crate) fn write_header(&mut self) {
        let len = self.attrs_len() as u16;
        self.raw[0..2].copy_from_slice(&self.typ.value().to_be_bytes());
        self.raw[2..4].copy_from_slice(&len.to_be_bytes());
        self.raw[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
        self.raw[8..20].copy_from_slice(&self.transaction_id.0);
    }

    pub(crate) fn write_transaction_id(&mut self) {
        self.raw[8..20].copy_from_slice(&self.transaction_id.0);
    }

    pub fn set_type(&mut self, t: MessageType) {
        self.typ = t;
        self.raw[0..2].copy_from_slice(&t.value().to_be_bytes());
    }

    /// Appends a raw attribute, with padding, and fixes up the length field.
    pub fn add(&mut self, typ: AttrType, value: &[u8]) {
        self.attributes.push(RawAttribute {
            typ,
            value: value.to_vec(),
        });
        self.raw.extend_from_slice(&typ.0.to_be_bytes());
        self.raw.extend_from_slice(&(value.len() as u16).to_be_bytes());
        self.raw.extend_from_slice(value);
        while self.raw.len() % 4 != 0 {
            self.raw.push(0);
        }
        let len = self.attrs_len() as u16;
        self.raw[2..4].copy_from_slice(&len.to_be_bytes());
    }

    /// Returns the value of the first attribute of `typ`.
    pub fn get(&self, typ: AttrType) -> Result<&[u8]> {
        self.attributes
            .iter()
            .find(|a| a.typ == typ)
            .map(|a| a.value.as_slice())
            .ok_or(Error::ErrAttributeNotFound)
    }

    pub fn contains(&self, typ: AttrType) -> bool {
        self.attributes.iter().any(|a| a.typ == typ)
    }

    /// The byte offset where the attribute of `typ` starts in `raw`, used by
    /// integrity and fingerprint checks.
    pub(crate) fn attr_offset(&self, typ: AttrType) -> Result<usize> {
        let mut offset = MESSAGE_HEADER_SIZE;
        for a in &self.attributes {
            if a.typ == typ {
                return Ok(offset);
            }
            offset += ATTRIBUTE_HEADER_SIZE + (a.value.len() + 3) / 4 * 4;
        }
        Err(Error::ErrAttributeNotFound)
    }

    /// Parses `raw` into typed fields. Call after filling `raw` from the wire.
    pub fn decode(&mut self) -> Result<()> {
        if self.raw.len() < MESSAGE_HEADER_SIZE {
            return Err(Error::ErrUnexpectedHeaderEof);
        }

        let cookie = u32::from_be_bytes([self.raw[4], self.raw[5], self.raw[6], self.raw[7]]);
        if cookie != MAGIC_COOKIE {
            return Err(Error::Other(format!(
                "{cookie:x} is invalid magic cookie (should be {MAGIC_COOKIE:x})"
            )));
        }

        self.typ = MessageType::from_value(u16::from_be_bytes([self.raw[0], self.raw[1]]))?;
        let declared = u16::from_be_bytes([self.raw[2], self.raw[3]]) as usize;
        if declared + MESSAGE_HEADER_SIZE != self.raw.len() {
            return Err(Error::ErrAttributeSizeInvalid);
        }
        self.transaction_id
            .0
            .copy_from_slice(&self.raw[8..MESSAGE_HEADER_SIZE]);

        self.attributes.clear();
        let mut offset = MESSAGE_HEADER_SIZE;
        while offset < self.raw.len() {
            if offset + ATTRIBUTE_HEADER_SIZE > self.raw.len() {
                return Err(Error::ErrUnexpectedEof);
            }
            let typ = AttrType(u16::from_be_bytes([self.raw[offset], self.raw[offset + 1]]));
            let len =
                u16::from_be_bytes([self.raw[offset + 2], self.raw[offset + 3]]) as usize;
            offset += ATTRIBUTE_HEADER_SIZE;
            if offset + len > self.raw.len() {
                return Err(Error::ErrAttributeSizeInvalid);
            }
            self.attributes.push(RawAttribute {
                typ,
                value: self.raw[offset..offset + len].to_vec(),
            });
            offset += (len + 3) / 4 * 4;
        }
        Ok(())
    }
}

#[cfg(test)]
mod message_test {
    use super::*;
    use crate::attributes::ATTR_USERNAME;

    #[test]
    fn test_message_type_wire_values() {
        // RFC 5389: Binding Request = 0x0001, Binding Success = 0x0101
        assert_eq!(BINDING_REQUEST.value(), 0x0001);
        assert_eq!(BINDING_SUCCESS.value(), 0x0101);
        assert_eq!(BINDING_ERROR.value(), 0x0111);
        assert_eq!(BINDING_INDICATION.value(), 0x0011);
        for t in [BINDING_REQUEST, BINDING_SUCCESS, BINDING_ERROR, BINDING_INDICATION] {
            assert_eq!(MessageType::from_value(t.value()).unwrap(), t);
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut m = Message::new();
        m.build(&[&BINDING_REQUEST, &TransactionId::new()])
            .expect("build");
        m.add(ATTR_USERNAME, b"user:frag");

        let mut decoded = Message {
            raw: m.raw.clone(),
            ..Default::default()
        };
        decoded.decode().expect("decode");
        assert_eq!(decoded.typ, BINDING_REQUEST);
        assert_eq!(decoded.transaction_id, m.transaction_id);
        assert_eq!(decoded.get(ATTR_USERNAME).unwrap(), b"user:frag");
    }

    #[test]
    fn test_is_message() {
        let mut m = Message::new();
        m.build(&[&BINDING_REQUEST, &TransactionId::new()]).unwrap();
        assert!(is_message(&m.raw));
        assert!(!is_message(&[0x80, 0x01, 0x00, 0x00]));
        assert!(!is_message(&m.raw[..10]));
    }

    #[test]
    fn test_decode_truncated_attribute() {
        let mut m = Message::new();
        m.build(&[&BINDING_REQUEST, &TransactionId::new()]).unwrap();
        m.add(ATTR_USERNAME, b"abcd");
        let mut raw = m.raw.clone();
        // declare a longer attribute than present
        let off = MESSAGE_HEADER_SIZE + 2;
        raw[off..off + 2].copy_from_slice(&100u16.to_be_bytes());
        let mut decoded = Message {
            raw,
            ..Default::default()
        };
        assert!(decoded.decode().is_err());
    }
}

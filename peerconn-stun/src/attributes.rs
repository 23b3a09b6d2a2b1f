use shared::error::Result;
use std::fmt;

use crate::message::{Message, Setter};

/// A STUN attribute type code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AttrType(pub u16);

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

// Comprehension-required range (0x0000-0x7FFF)
pub const ATTR_USERNAME: AttrType = AttrType(0x0006);
pub const ATTR_MESSAGE_INTEGRITY: AttrType = AttrType(0x0008);
pub const ATTR_ERROR_CODE: AttrType = AttrType(0x0009);
pub const ATTR_XORMAPPED_ADDRESS: AttrType = AttrType(0x0020);
pub const ATTR_PRIORITY: AttrType = AttrType(0x0024);
pub const ATTR_USE_CANDIDATE: AttrType = AttrType(0x0025);

// Comprehension-optional range (0x8000-0xFFFF)
pub const ATTR_FINGERPRINT: AttrType = AttrType(0x8028);
pub const ATTR_ICE_CONTROLLED: AttrType = AttrType(0x8029);
pub const ATTR_ICE_CONTROLLING: AttrType = AttrType(0x802A);

/// An attribute as it sits on the wire: type plus unpadded value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawAttribute {
    pub typ: AttrType,
    pub value: Vec<u8>,
}

impl Default for AttrType {
    fn default() -> Self {
        AttrType(0)
    }
}

/// PRIORITY attribute (RFC 8445 section 7.1.1).
#[derive(Debug, Copy, Clone, Default)]
pub struct PriorityAttr(pub u32);

impl Setter for PriorityAttr {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add(ATTR_PRIORITY, &self.0.to_be_bytes());
        Ok(())
    }
}

/// USE-CANDIDATE attribute (RFC 8445 section 7.1.2), an empty flag.
#[derive(Debug, Copy, Clone, Default)]
pub struct UseCandidateAttr;

impl Setter for UseCandidateAttr {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add(ATTR_USE_CANDIDATE, &[]);
        Ok(())
    }
}

/// ICE-CONTROLLING attribute carrying the agent's tie-breaker.
#[derive(Debug, Copy, Clone, Default)]
pub struct AttrControlling(pub u64);

impl Setter for AttrControlling {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add(ATTR_ICE_CONTROLLING, &self.0.to_be_bytes());
        Ok(())
    }
}

/// ICE-CONTROLLED attribute carrying the agent's tie-breaker.
#[derive(Debug, Copy, Clone, Default)]
pub struct AttrControlled(pub u64);

impl Setter for AttrControlled {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add(ATTR_ICE_CONTROLLED, &self.0.to_be_bytes());
        Ok(())
    }
}

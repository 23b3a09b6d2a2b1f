use shared::error::{Error, Result};
use std::fmt;
use std::net::IpAddr;

use crate::attributes::ATTR_XORMAPPED_ADDRESS;
use crate::message::{Getter, Message, Setter, MAGIC_COOKIE};

/// XOR-MAPPED-ADDRESS (RFC 5389 section 15.2).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct XorMappedAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl Default for XorMappedAddress {
    fn default() -> Self {
        XorMappedAddress {
            ip: IpAddr::from([0, 0, 0, 0]),
            port: 0,
        }
    }
}

impl fmt::Display for XorMappedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

impl Setter for XorMappedAddress {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let xport = self.port ^ (MAGIC_COOKIE >> 16) as u16;
        let mut value = vec![0u8, 0, 0, 0];
        value[2..4].copy_from_slice(&xport.to_be_bytes());

        match self.ip {
            IpAddr::V4(v4) => {
                value[1] = FAMILY_IPV4;
                let xored = u32::from(v4) ^ MAGIC_COOKIE;
                value.extend_from_slice(&xored.to_be_bytes());
            }
            IpAddr::V6(v6) => {
                value[1] = FAMILY_IPV6;
                let mut xor_key = [0u8; 16];
                xor_key[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
                xor_key[4..].copy_from_slice(&m.transaction_id.0);
                let octets = v6.octets();
                for i in 0..16 {
                    value.push(octets[i] ^ xor_key[i]);
                }
            }
        }

        m.add(ATTR_XORMAPPED_ADDRESS, &value);
        Ok(())
    }
}

impl Getter for XorMappedAddress {
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let value = m.get(ATTR_XORMAPPED_ADDRESS)?;
        if value.len() < 8 {
            return Err(Error::ErrBadIpLength);
        }

        self.port = u16::from_be_bytes([value[2], value[3]]) ^ (MAGIC_COOKIE >> 16) as u16;
        match value[1] {
            FAMILY_IPV4 => {
                let xored = u32::from_be_bytes([value[4], value[5], value[6], value[7]]);
                self.ip = IpAddr::from((xored ^ MAGIC_COOKIE).to_be_bytes());
            }
            FAMILY_IPV6 => {
                if value.len() < 20 {
                    return Err(Error::ErrBadIpLength);
                }
                let mut xor_key = [0u8; 16];
                xor_key[..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
                xor_key[4..].copy_from_slice(&m.transaction_id.0);
                let mut octets = [0u8; 16];
                for i in 0..16 {
                    octets[i] = value[4 + i] ^ xor_key[i];
                }
                self.ip = IpAddr::from(octets);
            }
            _ => return Err(Error::ErrBadIpLength),
        }
        Ok(())
    }
}

#[cfg(test)]
mod xoraddr_test {
    use super::*;
    use crate::message::{TransactionId, BINDING_SUCCESS};

    #[test]
    fn test_xor_mapped_address_v4_roundtrip() {
        let mut m = Message::new();
        m.build(&[&BINDING_SUCCESS, &TransactionId::new()]).unwrap();
        let addr = XorMappedAddress {
            ip: IpAddr::from([192, 168, 1, 7]),
            port: 51234,
        };
        addr.add_to(&mut m).unwrap();

        let mut got = XorMappedAddress::default();
        got.get_from(&m).unwrap();
        assert_eq!(got, addr);
    }

    #[test]
    fn test_xor_mapped_address_v6_roundtrip() {
        let mut m = Message::new();
        m.build(&[&BINDING_SUCCESS, &TransactionId::new()]).unwrap();
        let addr = XorMappedAddress {
            ip: "2001:db8::9".parse().unwrap(),
            port: 443,
        };
        addr.add_to(&mut m).unwrap();

        let mut got = XorMappedAddress::default();
        got.get_from(&m).unwrap();
        assert_eq!(got, addr);
    }
}

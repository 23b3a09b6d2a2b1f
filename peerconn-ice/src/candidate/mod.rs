#[cfg(test)]
mod candidate_test;

use serde::Serialize;
use shared::error::{Error, Result};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use crate::network_type::NetworkType;
use crate::rand::generate_cand_id;

pub(crate) const DEFAULT_LOCAL_PREFERENCE: u16 = 65535;

/// Indicates that the candidate is used for RTP.
pub const COMPONENT_RTP: u16 = 1;
/// Indicates that the candidate is used for RTCP.
pub const COMPONENT_RTCP: u16 = 2;

/// Represents the type of candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub enum CandidateType {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,
    #[serde(rename = "host")]
    Host,
    #[serde(rename = "srflx")]
    ServerReflexive,
    #[serde(rename = "prflx")]
    PeerReflexive,
    #[serde(rename = "relay")]
    Relay,
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relay => "relay",
            CandidateType::Unspecified => "Unknown candidate type",
        };
        write!(f, "{s}")
    }
}

impl CandidateType {
    /// Returns the preference weight of a candidate type.
    ///
    /// RFC 8445 section 5.1.2.2 recommends 126 for host candidates, 110 for
    /// peer-reflexive, 100 for server-reflexive and 0 for relayed candidates.
    #[must_use]
    pub const fn preference(self) -> u16 {
        match self {
            Self::Host => 126,
            Self::PeerReflexive => 110,
            Self::ServerReflexive => 100,
            Self::Relay | CandidateType::Unspecified => 0,
        }
    }
}

/// Transport addresses related to the candidate, for diagnostics and SDP.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct CandidateRelatedAddress {
    pub address: String,
    pub port: u16,
}

impl fmt::Display for CandidateRelatedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, " related {}:{}", self.address, self.port)
    }
}

/// Candidate represents an ICE candidate of any type.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub network_type: NetworkType,
    pub candidate_type: CandidateType,
    pub address: String,
    pub port: u16,
    pub component: u16,
    pub related_address: Option<CandidateRelatedAddress>,
    pub generation: u32,
    pub(crate) foundation_override: String,
    pub(crate) priority_override: u32,
    pub(crate) last_sent: Instant,
    pub(crate) last_received: Instant,
}

/// Common configuration used when constructing candidates of any type.
#[derive(Debug, Clone, Default)]
pub struct CandidateConfig {
    pub network_type: NetworkType,
    pub address: String,
    pub port: u16,
    pub component: u16,
    pub related_address: Option<CandidateRelatedAddress>,
    pub generation: u32,
    pub foundation: String,
    pub priority: u32,
}

impl CandidateConfig {
    fn build(self, candidate_type: CandidateType) -> Candidate {
        Candidate {
            id: generate_cand_id(),
            network_type: self.network_type,
            candidate_type,
            address: self.address,
            port: self.port,
            component: if self.component == 0 {
                COMPONENT_RTP
            } else {
                self.component
            },
            related_address: self.related_address,
            generation: self.generation,
            foundation_override: self.foundation,
            priority_override: self.priority,
            last_sent: Instant::now(),
            last_received: Instant::now(),
        }
    }

    pub fn new_candidate_host(self) -> Candidate {
        self.build(CandidateType::Host)
    }

    pub fn new_candidate_server_reflexive(self) -> Candidate {
        self.build(CandidateType::ServerReflexive)
    }

    pub fn new_candidate_peer_reflexive(self) -> Candidate {
        self.build(CandidateType::PeerReflexive)
    }

    pub fn new_candidate_relay(self) -> Candidate {
        self.build(CandidateType::Relay)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{}{}",
            self.network_type,
            self.candidate_type,
            self.address,
            self.port,
            self.related_address
                .as_ref()
                .map(|r| r.to_string())
                .unwrap_or_default(),
        )
    }
}

impl Candidate {
    /// An arbitrary string used in the freezing algorithm to group similar
    /// candidates: same for two candidates with the same type, base address
    /// and protocol.
    pub fn foundation(&self) -> String {
        if !self.foundation_override.is_empty() {
            return self.foundation_override.clone();
        }
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(self.candidate_type.to_string().as_bytes());
        hasher.update(self.address.as_bytes());
        hasher.update(self.network_type.to_string().as_bytes());
        hasher.finalize().to_string()
    }

    /// Computes the candidate priority per RFC 8445 section 5.1.2.1.
    pub fn priority(&self) -> u32 {
        if self.priority_override != 0 {
            return self.priority_override;
        }
        (1 << 24) * u32::from(self.candidate_type.preference())
            + (1 << 8) * u32::from(DEFAULT_LOCAL_PREFERENCE)
            + (256 - u32::from(self.component))
    }

    pub fn addr(&self) -> SocketAddr {
        let ip: IpAddr = self
            .address
            .parse()
            .unwrap_or_else(|_| IpAddr::from([0, 0, 0, 0]));
        SocketAddr::new(ip, self.port)
    }

    pub fn last_received(&self) -> Instant {
        self.last_received
    }

    pub fn last_sent(&self) -> Instant {
        self.last_sent
    }

    /// Records traffic on this candidate.
    pub fn seen(&mut self, outbound: bool) {
        if outbound {
            self.last_sent = Instant::now();
        } else {
            self.last_received = Instant::now();
        }
    }

    pub fn equal(&self, other: &Candidate) -> bool {
        self.network_type == other.network_type
            && self.candidate_type == other.candidate_type
            && self.address == other.address
            && self.port == other.port
            && self.related_address == other.related_address
    }

    /// Serializes the candidate into the SDP `candidate` attribute value.
    pub fn marshal(&self) -> String {
        let mut out = format!(
            "{} {} {} {} {} {} typ {}",
            self.foundation(),
            self.component,
            self.network_type.transport(),
            self.priority(),
            self.address,
            self.port,
            self.candidate_type,
        );

        if let Some(related) = &self.related_address {
            out += format!(" raddr {} rport {}", related.address, related.port).as_str();
        }

        out += format!(" generation {}", self.generation).as_str();
        out
    }
}

/// Parses a `candidate:` attribute value into a candidate.
pub fn unmarshal_candidate(raw: &str) -> Result<Candidate> {
    let split: Vec<&str> = raw.split_whitespace().collect();
    if split.len() < 8 {
        return Err(Error::ErrAttributeTooShortIceCandidate);
    }

    // foundation
    let foundation = split[0].trim_start_matches("candidate:").to_owned();

    // component
    let component: u16 = split[1].parse().map_err(|_| Error::ErrParseComponent)?;

    // transport; only UDP candidates are paired by this agent
    let transport = split[2].to_lowercase();
    let network_type = match transport.as_str() {
        "udp" => NetworkType::Udp4,
        "tcp" => NetworkType::Tcp4,
        _ => return Err(Error::ErrProtoType),
    };

    // priority
    let priority: u32 = split[3].parse().map_err(|_| Error::ErrParsePriority)?;

    // address
    let address = split[4].to_owned();

    // port
    let port: u16 = split[5].parse().map_err(|_| Error::ErrParsePort)?;

    if split[6] != "typ" {
        return Err(Error::ErrParseType);
    }
    let candidate_type = match split[7] {
        "host" => CandidateType::Host,
        "srflx" => CandidateType::ServerReflexive,
        "prflx" => CandidateType::PeerReflexive,
        "relay" => CandidateType::Relay,
        _ => return Err(Error::ErrUnknownCandidateType),
    };

    let mut related_address = None;
    let mut generation = 0u32;
    let mut i = 8;
    while i < split.len() {
        match split[i] {
            "raddr" => {
                if i + 3 >= split.len() || split[i + 2] != "rport" {
                    return Err(Error::ErrParseRelatedAddr);
                }
                let rport: u16 = split[i + 3].parse().map_err(|_| Error::ErrParsePort)?;
                related_address = Some(CandidateRelatedAddress {
                    address: split[i + 1].to_owned(),
                    port: rport,
                });
                i += 4;
            }
            "generation" => {
                if i + 1 >= split.len() {
                    return Err(Error::ErrAttributeTooShortIceCandidate);
                }
                generation = split[i + 1].parse().unwrap_or(0);
                i += 2;
            }
            _ => {
                i += 2;
            }
        }
    }

    let config = CandidateConfig {
        network_type,
        address,
        port,
        component,
        related_address,
        generation,
        foundation,
        priority,
    };

    Ok(config.build(candidate_type))
}

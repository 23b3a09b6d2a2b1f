#[cfg(test)]
mod session_test;

use shared::error::{Error, Result};
use std::fmt;

use crate::description::common::{Attribute, ConnectionInformation, Origin};
use crate::description::media::{MediaDescription, MediaName};

/// SessionDescription is a parsed SDP session (RFC 4566 section 5).
///
/// Only the lines this stack produces and consumes are modeled; unknown line
/// types are skipped on parse. Parsing then re-serializing is structurally
/// idempotent for accepted attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub version: u8,
    pub origin: Origin,
    pub session_name: String,
    pub timing: String,
    pub attributes: Vec<Attribute>,
    pub media_descriptions: Vec<MediaDescription>,
}

impl Default for SessionDescription {
    fn default() -> Self {
        SessionDescription {
            version: 0,
            origin: Origin::default(),
            session_name: "-".to_owned(),
            timing: "0 0".to_owned(),
            attributes: vec![],
            media_descriptions: vec![],
        }
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.marshal())
    }
}

impl SessionDescription {
    /// Returns the value of the first session-level attribute with `key`.
    pub fn attribute(&self, key: &str) -> Option<Option<&str>> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_deref())
    }

    pub fn with_value_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.push(Attribute::new(key, Some(value)));
        self
    }

    pub fn with_media(mut self, md: MediaDescription) -> Self {
        self.media_descriptions.push(md);
        self
    }

    /// Serializes into SDP text with CRLF line endings.
    pub fn marshal(&self) -> String {
        let mut out = String::new();
        out += &format!("v={}\r\n", self.version);
        out += &format!("o={}\r\n", self.origin);
        out += &format!("s={}\r\n", self.session_name);
        out += &format!("t={}\r\n", self.timing);
        for a in &self.attributes {
            out += &format!("a={a}\r\n");
        }
        for md in &self.media_descriptions {
            out += &format!("m={}\r\n", md.media_name);
            if let Some(ci) = &md.connection_information {
                out += &format!("c={ci}\r\n");
            }
            for a in &md.attributes {
                out += &format!("a={a}\r\n");
            }
        }
        out
    }

    /// Parses SDP text; accepts both CRLF and bare LF line endings.
    pub fn unmarshal(raw: &str) -> Result<Self> {
        let mut sd = SessionDescription {
            session_name: String::new(),
            timing: String::new(),
            ..Default::default()
        };
        let mut saw_version = false;
        let mut current_media: Option<MediaDescription> = None;

        for line in raw.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (typ, value) = line
                .split_once('=')
                .ok_or_else(|| Error::SdpInvalidSyntax(line.to_owned()))?;

            match typ {
                "v" => {
                    sd.version = value
                        .parse()
                        .map_err(|_| Error::SdpInvalidValue(value.to_owned()))?;
                    saw_version = true;
                }
                "o" => {
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() != 6 {
                        return Err(Error::SdpInvalidValue(value.to_owned()));
                    }
                    sd.origin = Origin {
                        username: parts[0].to_owned(),
                        session_id: parts[1]
                            .parse()
                            .map_err(|_| Error::SdpInvalidValue(value.to_owned()))?,
                        session_version: parts[2]
                            .parse()
                            .map_err(|_| Error::SdpInvalidValue(value.to_owned()))?,
                        network_type: parts[3].to_owned(),
                        address_type: parts[4].to_owned(),
                        unicast_address: parts[5].to_owned(),
                    };
                }
                "s" => sd.session_name = value.to_owned(),
                "t" => sd.timing = value.to_owned(),
                "c" => {
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() != 3 {
                        return Err(Error::SdpInvalidValue(value.to_owned()));
                    }
                    let ci = ConnectionInformation {
                        network_type: parts[0].to_owned(),
                        address_type: parts[1].to_owned(),
                        address: parts[2].to_owned(),
                    };
                    if let Some(md) = &mut current_media {
                        md.connection_information = Some(ci);
                    }
                }
                "m" => {
                    if let Some(md) = current_media.take() {
                        sd.media_descriptions.push(md);
                    }
                    let parts: Vec<&str> = value.split_whitespace().collect();
                    if parts.len() < 3 {
                        return Err(Error::SdpInvalidValue(value.to_owned()));
                    }
                    current_media = Some(MediaDescription {
                        media_name: MediaName {
                            media: parts[0].to_owned(),
                            port: parts[1]
                                .parse()
                                .map_err(|_| Error::SdpInvalidValue(value.to_owned()))?,
                            protos: parts[2].split('/').map(|s| s.to_owned()).collect(),
                            formats: parts[3..].iter().map(|s| (*s).to_owned()).collect(),
                        },
                        connection_information: None,
                        attributes: vec![],
                    });
                }
                "a" => {
                    let attr = Attribute::parse(value);
                    if let Some(md) = &mut current_media {
                        md.attributes.push(attr);
                    } else {
                        sd.attributes.push(attr);
                    }
                }
                // i, u, e, p, b, z, k, r are tolerated and dropped
                "i" | "u" | "e" | "p" | "b" | "z" | "k" | "r" => {}
                _ => return Err(Error::SdpInvalidSyntax(line.to_owned())),
            }
        }

        if let Some(md) = current_media.take() {
            sd.media_descriptions.push(md);
        }
        if !saw_version {
            return Err(Error::SdpInvalidSyntax("missing v= line".to_owned()));
        }
        if sd.timing.is_empty() {
            sd.timing = "0 0".to_owned();
        }

        Ok(sd)
    }
}

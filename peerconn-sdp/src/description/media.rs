use std::fmt;

use crate::description::common::{Attribute, ConnectionInformation};

/// The `m=` line: media kind, port, transport protocols and format list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaName {
    pub media: String,
    pub port: u16,
    pub protos: Vec<String>,
    pub formats: Vec<String>,
}

impl fmt::Display for MediaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.media,
            self.port,
            self.protos.join("/"),
            self.formats.join(" "),
        )
    }
}

/// One media section of a session description.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MediaDescription {
    pub media_name: MediaName,
    pub connection_information: Option<ConnectionInformation>,
    pub attributes: Vec<Attribute>,
}

impl MediaDescription {
    /// Returns the value of the first attribute with `key`:
    /// `Some(Some(v))` for `a=key:v`, `Some(None)` for a property `a=key`,
    /// `None` when absent.
    pub fn attribute(&self, key: &str) -> Option<Option<&str>> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_deref())
    }

    /// All values of attributes with `key`, in order.
    pub fn attributes_by_key<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.attributes
            .iter()
            .filter(move |a| a.key == key)
            .filter_map(|a| a.value.as_deref())
    }

    /// Adds a property attribute `a=key`.
    pub fn with_property_attribute(mut self, key: &str) -> Self {
        self.attributes.push(Attribute::new(key, None));
        self
    }

    /// Adds a value attribute `a=key:value`.
    pub fn with_value_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.push(Attribute::new(key, Some(value)));
        self
    }

    /// Adds a codec: rtpmap, optional fmtp and rtcp-fb lines plus the format
    /// entry of the m= line.
    pub fn with_codec(
        mut self,
        payload_type: u8,
        name: &str,
        clock_rate: u32,
        channels: u16,
        fmtp: &str,
    ) -> Self {
        self.media_name.formats.push(payload_type.to_string());
        let rtpmap = if channels > 0 {
            format!("{payload_type} {name}/{clock_rate}/{channels}")
        } else {
            format!("{payload_type} {name}/{clock_rate}")
        };
        self = self.with_value_attribute("rtpmap", &rtpmap);
        if !fmtp.is_empty() {
            self = self.with_value_attribute("fmtp", &format!("{payload_type} {fmtp}"));
        }
        self
    }
}

use std::fmt;

/// A single `a=` attribute: a key with an optional value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attribute {
    pub key: String,
    pub value: Option<String>,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}:{}", self.key, value),
            None => write!(f, "{}", self.key),
        }
    }
}

impl Attribute {
    pub fn new(key: &str, value: Option<&str>) -> Self {
        Attribute {
            key: key.to_owned(),
            value: value.map(|v| v.to_owned()),
        }
    }

    /// Parses the text after `a=`.
    pub fn parse(line: &str) -> Self {
        match line.split_once(':') {
            Some((key, value)) => Attribute {
                key: key.to_owned(),
                value: Some(value.to_owned()),
            },
            None => Attribute {
                key: line.to_owned(),
                value: None,
            },
        }
    }
}

/// The `o=` origin line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: String,
    pub session_id: u64,
    pub session_version: u64,
    pub network_type: String,
    pub address_type: String,
    pub unicast_address: String,
}

impl Default for Origin {
    fn default() -> Self {
        Origin {
            username: "-".to_owned(),
            session_id: 0,
            session_version: 0,
            network_type: "IN".to_owned(),
            address_type: "IP4".to_owned(),
            unicast_address: "0.0.0.0".to_owned(),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            self.username,
            self.session_id,
            self.session_version,
            self.network_type,
            self.address_type,
            self.unicast_address,
        )
    }
}

/// The `c=` connection line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInformation {
    pub network_type: String,
    pub address_type: String,
    pub address: String,
}

impl Default for ConnectionInformation {
    fn default() -> Self {
        ConnectionInformation {
            network_type: "IN".to_owned(),
            address_type: "IP4".to_owned(),
            address: "0.0.0.0".to_owned(),
        }
    }
}

impl fmt::Display for ConnectionInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.network_type, self.address_type, self.address
        )
    }
}

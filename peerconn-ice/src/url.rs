use shared::error::{Error, Result};
use std::fmt;

/// The scheme of an ICE server URL.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SchemeType {
    #[default]
    Stun,
    Stuns,
    Turn,
    Turns,
}

impl fmt::Display for SchemeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchemeType::Stun => "stun",
            SchemeType::Stuns => "stuns",
            SchemeType::Turn => "turn",
            SchemeType::Turns => "turns",
        };
        write!(f, "{s}")
    }
}

/// A parsed `stun:`/`turn:` server URL (RFC 7064 / RFC 7065, host and port
/// only; query parameters are rejected).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Url {
    pub scheme: SchemeType,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.scheme, self.host, self.port)
    }
}

impl Url {
    pub fn is_turn(&self) -> bool {
        matches!(self.scheme, SchemeType::Turn | SchemeType::Turns)
    }

    /// Parses `stun:host[:port]` and `turn:host[:port]` forms.
    pub fn parse(raw: &str) -> Result<Self> {
        let (scheme_str, rest) = raw.split_once(':').ok_or(Error::ErrSchemeType)?;
        let scheme = match scheme_str {
            "stun" => SchemeType::Stun,
            "stuns" => SchemeType::Stuns,
            "turn" => SchemeType::Turn,
            "turns" => SchemeType::Turns,
            _ => return Err(Error::ErrSchemeType),
        };

        let rest = rest.split_once('?').map(|(h, _)| h).unwrap_or(rest);
        let default_port = match scheme {
            SchemeType::Stun | SchemeType::Turn => stun::DEFAULT_PORT,
            SchemeType::Stuns | SchemeType::Turns => stun::DEFAULT_TLS_PORT,
        };

        let (host, port) = if let Some(stripped) = rest.strip_prefix('[') {
            // bracketed IPv6 literal
            let end = stripped.find(']').ok_or(Error::ErrHost)?;
            let host = &stripped[..end];
            match stripped[end + 1..].strip_prefix(':') {
                Some(p) => (host, p.parse::<u16>().map_err(|_| Error::ErrPort)?),
                None => (host, default_port),
            }
        } else if let Some((host, port_str)) = rest.rsplit_once(':') {
            (host, port_str.parse::<u16>().map_err(|_| Error::ErrPort)?)
        } else {
            (rest, default_port)
        };

        if host.is_empty() {
            return Err(Error::ErrHost);
        }

        Ok(Url {
            scheme,
            host: host.to_owned(),
            port,
            username: String::new(),
            password: String::new(),
        })
    }
}

#[cfg(test)]
mod url_test {
    use super::*;

    #[test]
    fn test_parse_stun_url() {
        let url = Url::parse("stun:stun.l.google.com:19302").expect("parse");
        assert_eq!(url.scheme, SchemeType::Stun);
        assert_eq!(url.host, "stun.l.google.com");
        assert_eq!(url.port, 19302);
        assert!(!url.is_turn());
    }

    #[test]
    fn test_parse_default_ports() {
        assert_eq!(Url::parse("stun:example.org").unwrap().port, 3478);
        assert_eq!(Url::parse("turns:example.org").unwrap().port, 5349);
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        assert_eq!(Url::parse("http://example.org"), Err(Error::ErrSchemeType));
        assert_eq!(Url::parse("no-colon"), Err(Error::ErrSchemeType));
    }

    #[test]
    fn test_parse_bad_port() {
        assert_eq!(Url::parse("stun:host:port"), Err(Error::ErrPort));
    }
}

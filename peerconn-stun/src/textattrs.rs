use shared::error::Result;
use std::fmt;

use crate::attributes::AttrType;
use crate::message::{Getter, Message, Setter};

/// A text attribute such as USERNAME.
#[derive(Debug, Clone, Default)]
pub struct TextAttribute {
    pub attr: AttrType,
    pub text: String,
}

/// USERNAME (RFC 5389 section 15.3); ICE uses "remote-ufrag:local-ufrag".
pub type Username = TextAttribute;

impl TextAttribute {
    pub fn new(attr: AttrType, text: String) -> Self {
        TextAttribute { attr, text }
    }
}

impl fmt::Display for TextAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl Setter for TextAttribute {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add(self.attr, self.text.as_bytes());
        Ok(())
    }
}

impl Getter for TextAttribute {
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let value = m.get(self.attr)?;
        self.text = String::from_utf8_lossy(value).into_owned();
        Ok(())
    }
}

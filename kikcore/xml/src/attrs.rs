use std::str::FromStr;

use crate::error::{Result, XmlError};
use crate::jid::Jid;
use crate::node::{Attrs, Node};

/// Collects attribute parsing failures instead of bailing on the first one,
/// so a typed constructor can read every field and report all problems at once.
pub struct AttrParser<'a> {
    pub attrs: &'a Attrs,
    pub errors: Vec<XmlError>,
}

impl<'a> AttrParser<'a> {
    pub fn new(node: &'a Node) -> Self {
        Self {
            attrs: &node.attrs,
            errors: Vec::new(),
        }
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(&self) -> Result<()> {
        if self.ok() {
            Ok(())
        } else {
            Err(XmlError::AttrList(self.errors.clone()))
        }
    }

    fn get_raw(&mut self, key: &str, require: bool) -> Option<&'a str> {
        let val = self.attrs.get(key);
        if require && val.is_none() {
            self.errors.push(XmlError::AttrParse(format!(
                "Required attribute '{key}' not found"
            )));
        }
        val
    }

    pub fn optional_string(&mut self, key: &str) -> Option<&'a str> {
        self.get_raw(key, false)
    }

    /// Get a required string attribute, returning an error if missing.
    pub fn required_string(&mut self, key: &str) -> Result<&'a str> {
        self.optional_string(key)
            .ok_or_else(|| XmlError::MissingAttr(key.to_string()))
    }

    pub fn optional_jid(&mut self, key: &str) -> Option<Jid> {
        let raw = self.get_raw(key, false)?;
        match Jid::from_str(raw) {
            Ok(jid) => Some(jid),
            Err(e) => {
                self.errors.push(XmlError::Jid(e));
                None
            }
        }
    }

    pub fn jid(&mut self, key: &str) -> Jid {
        self.get_raw(key, true);
        self.optional_jid(key).unwrap_or_default()
    }

    /// Booleans appear as both `true`/`false` and `1`/`0` on the wire.
    pub fn optional_bool(&mut self, key: &str) -> bool {
        match self.get_raw(key, false) {
            None => false,
            Some("1") | Some("true") => true,
            Some("0") | Some("false") => false,
            Some(other) => {
                self.errors.push(XmlError::AttrParse(format!(
                    "Failed to parse bool from '{other}' for key '{key}'"
                )));
                false
            }
        }
    }

    pub fn optional_u64(&mut self, key: &str) -> Option<u64> {
        self.get_raw(key, false)
            .and_then(|s| match s.parse::<u64>() {
                Ok(val) => Some(val),
                Err(e) => {
                    self.errors.push(XmlError::AttrParse(format!(
                        "Failed to parse u64 from '{s}' for key '{key}': {e}"
                    )));
                    None
                }
            })
    }

    pub fn optional_i64(&mut self, key: &str) -> Option<i64> {
        self.get_raw(key, false)
            .and_then(|s| match s.parse::<i64>() {
                Ok(val) => Some(val),
                Err(e) => {
                    self.errors.push(XmlError::AttrParse(format!(
                        "Failed to parse i64 from '{s}' for key '{key}': {e}"
                    )));
                    None
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::NodeBuilder;

    #[test]
    fn collects_errors_without_stopping() {
        let node = NodeBuilder::new("message")
            .attr("from", "not-a-jid")
            .attr("cts", "abc")
            .attr("qos", "true")
            .build();
        let mut parser = node.attrs();
        assert!(parser.optional_jid("from").is_none());
        assert!(parser.optional_u64("cts").is_none());
        assert!(parser.optional_bool("qos"));
        assert_eq!(parser.errors.len(), 2);
        assert!(parser.finish().is_err());
    }

    #[test]
    fn required_string_reports_missing_key() {
        let node = NodeBuilder::new("ack").build();
        let mut parser = node.attrs();
        assert_eq!(
            parser.required_string("id"),
            Err(XmlError::MissingAttr("id".to_string()))
        );
    }
}

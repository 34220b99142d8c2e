use std::fmt;

use crate::jid::JidError;

#[derive(Debug, Clone, PartialEq)]
pub enum XmlError {
    Malformed(String),
    InvalidUtf8(String),
    UnexpectedEof,
    EmptyDocument,
    AttrParse(String),
    MissingAttr(String),
    MissingChild(String),
    Jid(JidError),
    AttrList(Vec<XmlError>),
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XmlError::Malformed(s) => write!(f, "Malformed XML: {s}"),
            XmlError::InvalidUtf8(s) => write!(f, "Data is not valid UTF-8: {s}"),
            XmlError::UnexpectedEof => write!(f, "Unexpected end of stanza data"),
            XmlError::EmptyDocument => write!(f, "No element found in stanza data"),
            XmlError::AttrParse(s) => write!(f, "Attribute parsing failed: {s}"),
            XmlError::MissingAttr(s) => write!(f, "Missing required attribute: {s}"),
            XmlError::MissingChild(s) => write!(f, "Missing required child element: <{s}>"),
            XmlError::Jid(e) => write!(f, "JID parsing error: {e}"),
            XmlError::AttrList(list) => write!(f, "Multiple attribute parsing errors: {list:?}"),
        }
    }
}

impl std::error::Error for XmlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            XmlError::Jid(e) => Some(e),
            _ => None,
        }
    }
}

impl From<JidError> for XmlError {
    fn from(err: JidError) -> Self {
        XmlError::Jid(err)
    }
}

impl From<std::str::Utf8Error> for XmlError {
    fn from(err: std::str::Utf8Error) -> Self {
        XmlError::InvalidUtf8(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, XmlError>;

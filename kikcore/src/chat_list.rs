use base64::Engine as _;
use base64::prelude::{BASE64_STANDARD, BASE64_URL_SAFE};
use thiserror::Error;

/// Each entry starts with a fixed header whose last byte is the JID length.
pub const ENTRY_HEADER_LEN: usize = 6;
const LENGTH_OFFSET: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatListError {
    #[error("chat list entry at offset {offset} needs {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("chat list entry at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },
    #[error("chat list is not valid base64: {0}")]
    Base64(String),
    #[error("chat list entry is longer than 255 bytes: {0}")]
    EntryTooLong(String),
}

/// Decodes the packed chat list carried in a login result.
pub fn decode_chat_list(data: &[u8]) -> Result<Vec<String>, ChatListError> {
    let mut entries = Vec::new();
    let mut cursor = 0;
    while cursor < data.len() {
        let available = data.len() - cursor;
        if available < ENTRY_HEADER_LEN {
            return Err(ChatListError::Truncated {
                offset: cursor,
                needed: ENTRY_HEADER_LEN,
                available,
            });
        }
        let len = data[cursor + LENGTH_OFFSET] as usize;
        let start = cursor + ENTRY_HEADER_LEN;
        let end = start + len;
        if end > data.len() {
            return Err(ChatListError::Truncated {
                offset: cursor,
                needed: ENTRY_HEADER_LEN + len,
                available,
            });
        }
        let jid = std::str::from_utf8(&data[start..end])
            .map_err(|_| ChatListError::InvalidUtf8 { offset: cursor })?;
        entries.push(jid.to_string());
        cursor = end;
    }
    Ok(entries)
}

/// The base64 form as it appears in `<record pk="chat_list_bins">`. Both the
/// standard and URL-safe alphabets show up in practice.
pub fn decode_chat_list_base64(text: &str) -> Result<Vec<String>, ChatListError> {
    let text = text.trim();
    let raw = BASE64_STANDARD
        .decode(text)
        .or_else(|_| BASE64_URL_SAFE.decode(text))
        .map_err(|e| ChatListError::Base64(e.to_string()))?;
    decode_chat_list(&raw)
}

/// Packs JIDs in the layout [`decode_chat_list`] reads. Header bytes other
/// than the length are zero.
pub fn encode_chat_list<S: AsRef<str>>(jids: &[S]) -> Result<Vec<u8>, ChatListError> {
    let mut out = Vec::new();
    for jid in jids {
        let jid = jid.as_ref();
        let len = u8::try_from(jid.len()).map_err(|_| ChatListError::EntryTooLong(jid.to_string()))?;
        let mut header = [0u8; ENTRY_HEADER_LEN];
        header[LENGTH_OFFSET] = len;
        out.extend_from_slice(&header);
        out.extend_from_slice(jid.as_bytes());
    }
    Ok(out)
}

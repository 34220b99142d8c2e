//! Incremental stanza framing.
//!
//! The wire carries one long-lived `<k ...>` element whose children are the
//! stanzas. Reads from the socket split those arbitrarily, so the framer keeps a
//! small tag scanner running across calls and only hands out balanced elements.

use bytes::{Bytes, BytesMut};
use log::{trace, warn};
use std::fmt;

use crate::marshal::STREAM_ROOT;

/// Largest stanza the framer will buffer before giving up on it.
pub const MAX_STANZA_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// The server's unclosed `<k ...>` handshake reply.
    StreamOpen(Bytes),
    /// One complete top-level element.
    Stanza(Bytes),
    /// `</k>` at the top level.
    StreamEnd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    MismatchedClose { expected: String, found: String },
    UnexpectedClose(String),
    Oversized(usize),
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::MismatchedClose { expected, found } => {
                write!(f, "closing tag </{found}> does not match <{expected}>")
            }
            FramingError::UnexpectedClose(name) => {
                write!(f, "closing tag </{name}> outside of any stanza")
            }
            FramingError::Oversized(len) => {
                write!(f, "stanza exceeds {MAX_STANZA_SIZE} bytes (buffered {len})")
            }
        }
    }
}

impl std::error::Error for FramingError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Text,
    TagOpen,
    Name { closing: bool },
    Attrs,
    Quoted(u8),
    Slash,
    CloseTail,
    /// `<?...?>` or `<!DOCTYPE ...>`, up to the first `>`.
    Markup,
    Comment,
    CData,
}

const COMMENT_OPEN: &[u8] = b"<!--";
const COMMENT_CLOSE: &[u8] = b"-->";
const CDATA_OPEN: &[u8] = b"<![CDATA[";
const CDATA_CLOSE: &[u8] = b"]]>";

enum TagEnd {
    Open,
    SelfClosing,
    Close,
}

pub struct StanzaFramer {
    buffer: BytesMut,
    cursor: usize,
    scan: Scan,
    depth: usize,
    tag_start: usize,
    stanza_start: usize,
    name: Vec<u8>,
    root: Vec<u8>,
}

impl StanzaFramer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
            cursor: 0,
            scan: Scan::Text,
            depth: 0,
            tag_start: 0,
            stanza_start: 0,
            name: Vec::new(),
            root: Vec::new(),
        }
    }

    /// Feeds raw data into the framer.
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes held but not yet emitted.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Attempts to extract the next complete frame from the buffer.
    ///
    /// Returns `Ok(None)` when more data is needed. After a framing error only
    /// the bytes up to the offending tag are dropped; stanzas already buffered
    /// behind it are returned by the next call.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, FramingError> {
        match self.scan_frame() {
            Ok(Some(frame)) => Ok(Some(frame)),
            Ok(None) => {
                if self.depth == 0 && self.scan == Scan::Text && !self.buffer.is_empty() {
                    trace!("Dropping {} bytes of inter-stanza noise", self.buffer.len());
                    self.reset();
                } else if self.buffer.len() > MAX_STANZA_SIZE {
                    let len = self.buffer.len();
                    warn!("Stanza buffer overflow ({len} bytes), resetting framer");
                    self.reset();
                    return Err(FramingError::Oversized(len));
                }
                Ok(None)
            }
            Err(e) => {
                self.skip_scanned();
                Err(e)
            }
        }
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.skip_scanned();
    }

    /// Discards everything scanned so far and resumes at the cursor.
    fn skip_scanned(&mut self) {
        let _ = self.buffer.split_to(self.cursor);
        self.cursor = 0;
        self.scan = Scan::Text;
        self.depth = 0;
        self.name.clear();
        self.root.clear();
    }

    fn scan_frame(&mut self) -> Result<Option<Frame>, FramingError> {
        while self.cursor < self.buffer.len() {
            let pos = self.cursor;
            let byte = self.buffer[pos];
            self.cursor += 1;

            let ended = match self.scan {
                Scan::Text => {
                    if byte == b'<' {
                        self.tag_start = pos;
                        self.scan = Scan::TagOpen;
                    }
                    None
                }
                Scan::TagOpen => {
                    self.name.clear();
                    match byte {
                        b'/' => self.scan = Scan::Name { closing: true },
                        b'?' | b'!' => self.scan = Scan::Markup,
                        _ => {
                            self.name.push(byte);
                            self.scan = Scan::Name { closing: false };
                        }
                    }
                    None
                }
                Scan::Name { closing } => match byte {
                    b'>' if closing => Some(TagEnd::Close),
                    b'>' => Some(TagEnd::Open),
                    b'/' if !closing => {
                        self.scan = Scan::Slash;
                        None
                    }
                    b if b.is_ascii_whitespace() => {
                        self.scan = if closing { Scan::CloseTail } else { Scan::Attrs };
                        None
                    }
                    b => {
                        self.name.push(b);
                        None
                    }
                },
                Scan::Attrs => match byte {
                    b'"' | b'\'' => {
                        self.scan = Scan::Quoted(byte);
                        None
                    }
                    b'/' => {
                        self.scan = Scan::Slash;
                        None
                    }
                    b'>' => Some(TagEnd::Open),
                    _ => None,
                },
                Scan::Quoted(quote) => {
                    if byte == quote {
                        self.scan = Scan::Attrs;
                    }
                    None
                }
                Scan::Slash => {
                    if byte == b'>' {
                        Some(TagEnd::SelfClosing)
                    } else {
                        self.scan = Scan::Attrs;
                        None
                    }
                }
                Scan::CloseTail => (byte == b'>').then_some(TagEnd::Close),
                Scan::Markup => {
                    let seen = &self.buffer[self.tag_start..self.cursor];
                    if seen == COMMENT_OPEN {
                        self.scan = Scan::Comment;
                    } else if seen == CDATA_OPEN {
                        self.scan = Scan::CData;
                    } else if byte == b'>' {
                        self.scan = Scan::Text;
                    }
                    None
                }
                Scan::Comment => {
                    if self.markup_closed(COMMENT_OPEN, COMMENT_CLOSE) {
                        self.scan = Scan::Text;
                    }
                    None
                }
                Scan::CData => {
                    if self.markup_closed(CDATA_OPEN, CDATA_CLOSE) {
                        self.scan = Scan::Text;
                    }
                    None
                }
            };

            if let Some(end) = ended {
                self.scan = Scan::Text;
                if let Some(frame) = self.on_tag(end, pos)? {
                    return Ok(Some(frame));
                }
            }
        }
        Ok(None)
    }

    fn on_tag(&mut self, end: TagEnd, pos: usize) -> Result<Option<Frame>, FramingError> {
        match end {
            TagEnd::Open if self.depth == 0 => {
                if self.name == STREAM_ROOT.as_bytes() {
                    let tag = self.take_through(self.tag_start, pos);
                    return Ok(Some(Frame::StreamOpen(tag)));
                }
                self.root = std::mem::take(&mut self.name);
                self.stanza_start = self.tag_start;
                self.depth = 1;
            }
            TagEnd::Open => self.depth += 1,
            TagEnd::SelfClosing if self.depth == 0 => {
                let stanza = self.take_through(self.tag_start, pos);
                return Ok(Some(Frame::Stanza(stanza)));
            }
            TagEnd::SelfClosing => {}
            TagEnd::Close if self.depth == 0 => {
                if self.name == STREAM_ROOT.as_bytes() {
                    self.take_through(self.tag_start, pos);
                    return Ok(Some(Frame::StreamEnd));
                }
                return Err(FramingError::UnexpectedClose(lossy(&self.name)));
            }
            TagEnd::Close if self.depth == 1 => {
                if self.name != self.root {
                    return Err(FramingError::MismatchedClose {
                        expected: lossy(&self.root),
                        found: lossy(&self.name),
                    });
                }
                self.depth = 0;
                self.root.clear();
                let stanza = self.take_through(self.stanza_start, pos);
                return Ok(Some(Frame::Stanza(stanza)));
            }
            TagEnd::Close => self.depth -= 1,
        }
        Ok(None)
    }

    /// Whether the section opened at `tag_start` ends at the cursor. The
    /// opener and the closer may not overlap (`<!-->` is not a comment).
    fn markup_closed(&self, open: &[u8], close: &[u8]) -> bool {
        self.cursor >= self.tag_start + open.len() + close.len()
            && self.buffer[..self.cursor].ends_with(close)
    }

    /// Removes everything up to and including `end` from the buffer and
    /// returns the `start..=end` part of it.
    fn take_through(&mut self, start: usize, end: usize) -> Bytes {
        let consumed = self.buffer.split_to(end + 1).freeze();
        self.cursor = 0;
        consumed.slice(start..)
    }
}

impl Default for StanzaFramer {
    fn default() -> Self {
        Self::new()
    }
}

fn lossy(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

pub mod attrs;
pub mod builder;
pub mod error;
pub mod framer;
pub mod jid;
pub mod marshal;
pub mod node;
mod parse;

pub use attrs::AttrParser;
pub use builder::{NodeBuilder, text_node};
pub use error::{Result, XmlError};
pub use framer::{Frame, FramingError, MAX_STANZA_SIZE, StanzaFramer};
pub use jid::{GROUP_SERVER, Jid, JidError, USER_SERVER};
pub use marshal::{STREAM_CLOSE, STREAM_ROOT, marshal, marshal_to, stream_open};
pub use node::{Attrs, Node, NodeContent};
pub use parse::{unmarshal, unmarshal_open_tag};

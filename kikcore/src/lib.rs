pub use kikcore_xml as xml;

pub mod bits;
pub mod chat_list;
pub mod credentials;
pub mod dispatch;
pub mod handshake;
pub mod id;
pub mod net;
pub mod request;
pub mod shuffle;
pub mod stanza;
pub mod types;
pub mod upload;
pub mod verification;
pub mod version;

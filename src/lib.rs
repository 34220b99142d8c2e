// Re-export the protocol core so callers need a single dependency
pub use kikcore;
pub use kikcore::credentials::Credentials;
pub use kikcore::handshake::HandshakeSigner;
pub use kikcore::xml::Jid;

// Events (with EventBus) live here, the event types themselves in kikcore
pub mod types {
    pub mod events;
}

pub mod client;
pub mod config;
pub mod contact;
pub mod error;
pub mod groups;
pub mod handlers;
pub mod handshake;
pub mod history;
pub mod http;
pub mod login;
pub mod peer_cache;
pub mod qos;
pub mod request;
pub mod send;
pub mod session;
pub mod transport;
pub mod upload;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, SendError};
pub use login::Registration;
pub use send::DeliveryStatus;
pub use session::SessionState;

#[cfg(test)]
mod test_utils;

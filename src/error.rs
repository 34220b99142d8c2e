use kikcore::dispatch::DispatchError;
use kikcore::stanza::LoginFailure;
use thiserror::Error;

use crate::config::ConfigError;
use crate::handshake::HandshakeError;
use crate::request::IqError;
use crate::session::{InvalidTransition, SessionState};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is not connected")]
    NotConnected,
    #[error("client is already connected or connecting")]
    AlreadyConnected,
    #[error("session was not established within the timeout (state {0})")]
    SessionTimeout(SessionState),
    #[error("no captcha challenge is pending")]
    NoPendingChallenge,
    #[error("transport error: {0}")]
    Transport(#[source] anyhow::Error),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Login(#[from] LoginFailure),
    #[error(transparent)]
    Iq(#[from] IqError),
    #[error("unexpected response: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("response did not match the request: {0}")]
    UnexpectedResponse(String),
    #[error(transparent)]
    State(#[from] InvalidTransition),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Per-message failure of [`crate::client::Client::send_chat_message`].
/// None of these tear down the session.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("session is not established")]
    NotConnected,
    #[error("server did not acknowledge message {id}")]
    Unacknowledged { id: String },
    #[error("connection closed before message {id} was confirmed")]
    ConnectionClosed { id: String },
    #[error("failed to write message: {0}")]
    Transport(#[source] ClientError),
}

use std::sync::{Arc, RwLock};

use crate::stanza::{
    ChatMessage, GroupAdminResult, LoginFailure, LoginResult, Peer, Receipt, Roster,
    TypingIndicator,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connected {
    /// True when the stream was accepted as already authenticated.
    pub authenticated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionLost {
    pub reason: String,
}

/// Everything a consumer can observe. Variants a consumer does not care
/// about are ignored explicitly in its `match`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected(Connected),
    LoginSuccess(LoginResult),
    LoginError(LoginFailure),
    /// The session is live for `node`.
    Authenticated { node: String },
    RosterReceived(Roster),
    PeerInfo(Vec<Peer>),
    GroupAdmin(GroupAdminResult),

    ChatMessage(ChatMessage),
    GroupMessage(ChatMessage),
    IsTyping(TypingIndicator),
    GroupIsTyping(TypingIndicator),
    DeliveredReceipt(Receipt),
    ReadReceipt(Receipt),
    MessageAcknowledged { id: String },

    StreamEnded,
    ConnectionLost(ConnectionLost),
}

pub trait EventHandler: Send + Sync {
    fn handle_event(&self, event: &Event);
}

#[derive(Default, Clone)]
pub struct CoreEventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl CoreEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(handler);
    }

    /// Returns true if there are any event handlers registered.
    pub fn has_handlers(&self) -> bool {
        !self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    pub fn dispatch(&self, event: &Event) {
        for handler in self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
        {
            handler.handle_event(event);
        }
    }
}

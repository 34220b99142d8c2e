use super::traits::StanzaHandler;
use crate::client::Client;
use kikcore::xml::Node;
use std::collections::HashMap;
use std::sync::Arc;

/// Central router for dispatching stanzas to their handlers by tag.
pub struct StanzaRouter {
    handlers: HashMap<&'static str, Arc<dyn StanzaHandler>>,
}

impl StanzaRouter {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for its tag.
    ///
    /// # Panics
    /// Panics if a handler is already registered for the same tag to prevent
    /// accidental overwrites during initialization.
    pub fn register(&mut self, handler: Arc<dyn StanzaHandler>) {
        let tag = handler.tag();
        if self.handlers.insert(tag, handler).is_some() {
            panic!("Handler for tag '{}' already registered", tag);
        }
    }

    /// Returns `false` if no handler is registered for the node's tag or the
    /// handler could not process it.
    pub async fn dispatch(&self, client: Arc<Client>, node: &Node) -> bool {
        match self.handlers.get(node.tag.as_str()) {
            Some(handler) => handler.handle(client, node).await,
            None => false,
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl Default for StanzaRouter {
    fn default() -> Self {
        Self::new()
    }
}

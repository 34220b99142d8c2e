use crate::client::Client;
use async_trait::async_trait;
use kikcore::xml::Node;
use std::sync::Arc;

/// Trait for handling one top-level stanza tag received from the server.
///
/// Handlers run on the connection's reader task, one stanza at a time and in
/// arrival order. A handler must never await a server response itself (that
/// response could only be read by the task it is blocking); spawn such work
/// instead.
#[async_trait]
pub trait StanzaHandler: Send + Sync {
    /// Returns the XML tag this handler is responsible for (e.g., "message", "iq").
    fn tag(&self) -> &'static str;

    /// Returns `true` if the node was handled, `false` if it should be
    /// logged as unhandled.
    async fn handle(&self, client: Arc<Client>, node: &Node) -> bool;
}

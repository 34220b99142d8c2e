use super::traits::StanzaHandler;
use crate::client::Client;
use crate::types::events::Event;
use async_trait::async_trait;
use kikcore::xml::Node;
use log::{debug, warn};
use std::sync::Arc;

/// Handler for the server's `<ack id="..."/>` of a sent message.
#[derive(Default)]
pub struct AckHandler;

impl AckHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StanzaHandler for AckHandler {
    fn tag(&self) -> &'static str {
        "ack"
    }

    async fn handle(&self, client: Arc<Client>, node: &Node) -> bool {
        let Some(id) = node.get_attr("id") else {
            warn!(target: "Client/QoS", "Dropping <ack> without id");
            return true;
        };
        if !client.qos.on_ack(id) {
            debug!(target: "Client/QoS", "Ack for untracked message {id}");
        }
        client.event_bus.dispatch(Event::MessageAcknowledged { id: id.to_string() });
        true
    }
}

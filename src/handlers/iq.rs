use super::traits::StanzaHandler;
use crate::client::Client;
use crate::types::events::Event;
use async_trait::async_trait;
use kikcore::dispatch::{DispatchError, Incoming, IqResponse, classify};
use kikcore::xml::{Node, marshal};
use log::{debug, error, warn};
use std::sync::Arc;

/// Handler for `<iq>` stanzas nobody is waiting on.
///
/// Replies to our own requests are taken by the IQ waiters before the
/// router runs. What reaches this handler is pushed by the server (roster
/// updates, lookups answered after the waiter timed out) and is published
/// as an event.
#[derive(Default)]
pub struct IqHandler;

impl IqHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StanzaHandler for IqHandler {
    fn tag(&self) -> &'static str {
        "iq"
    }

    async fn handle(&self, client: Arc<Client>, node: &Node) -> bool {
        let iq = match classify(node) {
            Ok(Incoming::Iq(iq)) => iq,
            Ok(_) => return false,
            Err(DispatchError::UnimplementedNamespace(ns)) => {
                error!(target: "Client/IQ", "Unimplemented iq namespace {ns}: {}", marshal(node));
                return true;
            }
            Err(e) => {
                warn!(target: "Client/IQ", "Dropping iq: {e}");
                return true;
            }
        };

        match iq.response {
            IqResponse::Roster(roster) => {
                client.peer_cache.extend(roster.peers.iter().cloned());
                client.event_bus.dispatch(Event::RosterReceived(roster));
            }
            IqResponse::FriendLookup(peers) => {
                client.peer_cache.extend(peers.iter().cloned());
                client.event_bus.dispatch(Event::PeerInfo(peers));
            }
            IqResponse::GroupAdmin(result) => {
                client.event_bus.dispatch(Event::GroupAdmin(result));
            }
            IqResponse::Login(_) | IqResponse::History(_) | IqResponse::Empty => {
                debug!(target: "Client/IQ", "Ignoring unsolicited iq {}", iq.id);
            }
            IqResponse::Error { code, text } => {
                warn!(target: "Client/IQ", "Unsolicited iq error {code}: {text}");
            }
        }
        true
    }
}

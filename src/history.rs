use crate::client::Client;
use crate::error::ClientError;
use crate::handlers::message::publish_message;
use kikcore::dispatch::{DispatchError, Incoming, IqResponse, classify};
use kikcore::stanza::qos::{ack_query, history_query};
use kikcore::stanza::AckEntry;
use kikcore::xml::Node;
use log::{debug, info, warn};
use std::sync::Arc;

impl Client {
    /// Replays messages the server kept while the account was offline.
    ///
    /// Every replayed message is published like a live one and acknowledged.
    /// Pages are requested until the server stops setting `more`; each
    /// follow-up request carries the acks of the previous page. Returns the
    /// number of messages replayed.
    pub async fn replay_history(self: &Arc<Self>) -> Result<usize, ClientError> {
        if !self.is_established() {
            return Err(ClientError::NotConnected);
        }
        let mut query = history_query();
        let mut total = 0;
        loop {
            let response = self.send_iq(query).await?;
            let batch = match classify(&response)? {
                Incoming::Iq(iq) => match iq.response {
                    IqResponse::History(batch) => batch,
                    IqResponse::Empty => Default::default(),
                    other => {
                        return Err(ClientError::UnexpectedResponse(format!("{other:?}")));
                    }
                },
                other => return Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
            };

            let acks: Vec<AckEntry> = batch
                .messages
                .iter()
                .filter_map(|message| self.replay_one(message))
                .collect();
            total += batch.messages.len();
            debug!(
                target: "Client/QoS",
                "History page with {} message(s), more={}",
                batch.messages.len(),
                batch.more
            );

            if batch.more {
                query = ack_query(&acks, true);
                continue;
            }
            if !acks.is_empty() {
                self.send_iq(ack_query(&acks, false)).await?;
            }
            break;
        }
        info!(target: "Client/QoS", "Replayed {total} message(s) from history");
        Ok(total)
    }

    fn replay_one(&self, message: &Node) -> Option<AckEntry> {
        match classify(message) {
            Ok(Incoming::Message(event)) => publish_message(self, event),
            Ok(_) => None,
            Err(e) => {
                warn!(target: "Client/QoS", "Unreadable history message: {e}");
                // Still ack it, or the server keeps replaying it.
                raw_ack(message, &e)
            }
        }
    }
}

fn raw_ack(message: &Node, error: &DispatchError) -> Option<AckEntry> {
    let id = message.get_attr("id")?;
    let sender = message.get_attr("from")?.parse().ok()?;
    debug!(target: "Client/QoS", "Acking {id} despite: {error}");
    Some(AckEntry {
        sender,
        group: message
            .get_optional_child("g")
            .and_then(|g| g.get_attr("jid"))
            .and_then(|g| g.parse().ok()),
        message_id: id.to_string(),
        is_receipt: message.get_attr("type") == Some("receipt"),
    })
}

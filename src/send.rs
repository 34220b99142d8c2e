use crate::client::Client;
use crate::error::{ClientError, SendError};
use kikcore::stanza::message::{chat_message, is_typing, receipt};
use kikcore::stanza::qos::ack_query;
use kikcore::stanza::{AckEntry, ChatMessage, Receipt, ReceiptKind};
use kikcore::xml::Jid;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::time::timeout;

/// Outcome of a message the server accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The peer's device confirmed delivery, with a delivered receipt or a
    /// read receipt that arrived first.
    Delivered { id: String, receipt: Receipt },
    /// The server acked the message but no delivered receipt arrived in time.
    SentUndelivered { id: String },
}

impl DeliveryStatus {
    pub fn id(&self) -> &str {
        match self {
            DeliveryStatus::Delivered { id, .. } | DeliveryStatus::SentUndelivered { id } => id,
        }
    }
}

impl Client {
    /// Sends a text message and follows it through the server ack and the
    /// delivered receipt. A group JID sends a group message.
    ///
    /// Waits up to the login timeout for the session to be established.
    /// Several sends may be in flight at once.
    pub async fn send_chat_message(
        self: &Arc<Self>,
        to: &Jid,
        body: &str,
    ) -> Result<DeliveryStatus, SendError> {
        if self
            .wait_for_session(self.config.login_timeout())
            .await
            .is_err()
        {
            return Err(SendError::NotConnected);
        }

        let to = if to.is_group() { to.clone() } else { to.to_bare() };
        let id = self.ids.next_id();
        let node = chat_message(&id, &to, body, chrono::Utc::now().timestamp_millis());

        // Registered before the write so an ack racing the send is not lost.
        let handle = self.qos.register(&id, to.clone());
        let _tracked = scopeguard::guard(id.clone(), |id| {
            self.qos.remove(&id);
        });

        self.send_node(node).await.map_err(SendError::Transport)?;

        match timeout(self.config.ack_timeout(), handle.ack).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(SendError::ConnectionClosed { id }),
            Err(_) => {
                warn!(target: "Client/QoS", "No ack for message {id} to {to}");
                return Err(SendError::Unacknowledged { id });
            }
        }

        match timeout(self.config.receipt_timeout(), handle.delivered).await {
            Ok(Ok(receipt)) => {
                debug!(target: "Client/QoS", "Message {id} delivered to {to}");
                self.spawn_qos_ack(vec![AckEntry {
                    sender: receipt.from.clone(),
                    group: receipt.group.clone(),
                    message_id: receipt.id.clone(),
                    is_receipt: true,
                }]);
                Ok(DeliveryStatus::Delivered { id, receipt })
            }
            Ok(Err(_)) => Err(SendError::ConnectionClosed { id }),
            Err(_) => {
                info!(target: "Client/QoS", "Message {id} to {to} was sent but not delivered yet");
                Ok(DeliveryStatus::SentUndelivered { id })
            }
        }
    }

    /// Tells the server which incoming stanzas were seen. Fire-and-forget:
    /// a failed ack is only logged.
    pub(crate) fn spawn_qos_ack(self: &Arc<Self>, entries: Vec<AckEntry>) {
        if entries.is_empty() {
            return;
        }
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.send_iq(ack_query(&entries, false)).await {
                debug!(target: "Client/QoS", "QoS ack for {} stanza(s) failed: {e}", entries.len());
            }
        });
    }

    /// Starts or stops the typing indicator in a chat or group.
    pub async fn send_is_typing(&self, to: &Jid, typing: bool) -> Result<(), ClientError> {
        if !self.is_established() {
            return Err(ClientError::NotConnected);
        }
        let id = self.ids.next_id();
        self.send_node(is_typing(&id, to, typing, chrono::Utc::now().timestamp_millis()))
            .await
    }

    pub async fn send_receipt(
        &self,
        to: &Jid,
        kind: ReceiptKind,
        message_ids: &[String],
        group: Option<&Jid>,
    ) -> Result<(), ClientError> {
        if !self.is_established() {
            return Err(ClientError::NotConnected);
        }
        let id = self.ids.next_id();
        self.send_node(receipt(&id, &to.to_bare(), kind, message_ids, group))
            .await
    }

    /// Marks a received message as read.
    pub async fn send_read_receipt(&self, message: &ChatMessage) -> Result<(), ClientError> {
        self.send_receipt(
            &message.from,
            ReceiptKind::Read,
            std::slice::from_ref(&message.id),
            message.group.as_ref(),
        )
        .await
    }

    pub async fn send_delivered_receipt(&self, message: &ChatMessage) -> Result<(), ClientError> {
        self.send_receipt(
            &message.from,
            ReceiptKind::Delivered,
            std::slice::from_ref(&message.id),
            message.group.as_ref(),
        )
        .await
    }
}

use super::traits::StanzaHandler;
use crate::client::Client;
use crate::types::events::Event;
use async_trait::async_trait;
use kikcore::dispatch::{Incoming, classify};
use kikcore::stanza::{AckEntry, MessageEvent, ReceiptKind};
use kikcore::xml::Node;
use log::{debug, warn};
use std::sync::Arc;

/// Handler for `<message>` stanzas: chat, group chat, receipts and typing.
///
/// Delivered and read receipts resolve tracked sends. With `auto_ack_incoming` set,
/// everything else that carries an id is acknowledged to the server so it
/// is not replayed as history.
#[derive(Default)]
pub struct MessageHandler;

impl MessageHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StanzaHandler for MessageHandler {
    fn tag(&self) -> &'static str {
        "message"
    }

    async fn handle(&self, client: Arc<Client>, node: &Node) -> bool {
        let event = match classify(node) {
            Ok(Incoming::Message(event)) => event,
            Ok(_) => return false,
            Err(e) => {
                warn!(target: "Client/Recv", "Dropping message: {e}");
                return true;
            }
        };
        if let Some(ack) = publish_message(&client, event)
            && client.config.auto_ack_incoming
        {
            client.spawn_qos_ack(vec![ack]);
        }
        true
    }
}

/// Publishes `event` and returns the QoS ack it still needs, if any.
/// Typing indicators and receipts for our own tracked sends need none.
pub(crate) fn publish_message(client: &Client, event: MessageEvent) -> Option<AckEntry> {
    match event {
        MessageEvent::Chat(message) => {
            let ack = AckEntry {
                sender: message.from.clone(),
                group: None,
                message_id: message.id.clone(),
                is_receipt: false,
            };
            client.event_bus.dispatch(Event::ChatMessage(message));
            Some(ack)
        }
        MessageEvent::Group(message) => {
            let ack = AckEntry {
                sender: message.from.clone(),
                group: message.group.clone(),
                message_id: message.id.clone(),
                is_receipt: false,
            };
            client.event_bus.dispatch(Event::GroupMessage(message));
            Some(ack)
        }
        MessageEvent::Receipt(receipt) => {
            let mut resolved = false;
            for id in &receipt.message_ids {
                resolved |= client.qos.on_receipt(id, &receipt);
            }
            let ack = (!resolved).then(|| AckEntry {
                sender: receipt.from.clone(),
                group: receipt.group.clone(),
                message_id: receipt.id.clone(),
                is_receipt: true,
            });
            debug!(
                target: "Client/QoS",
                "{:?} receipt {} for {:?}",
                receipt.kind, receipt.id, receipt.message_ids
            );
            client.event_bus.dispatch(match receipt.kind {
                ReceiptKind::Delivered => Event::DeliveredReceipt(receipt),
                ReceiptKind::Read => Event::ReadReceipt(receipt),
            });
            ack
        }
        MessageEvent::Typing(typing) => {
            client.event_bus.dispatch(if typing.group.is_some() {
                Event::GroupIsTyping(typing)
            } else {
                Event::IsTyping(typing)
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{connect_established, create_test_client, server_send, wait_for_sent};

    #[tokio::test]
    async fn chat_message_is_published_and_acknowledged() {
        let (client, factory) = create_test_client();
        connect_established(&client, &factory).await;
        let mut events = client.subscribe_to_all_events();

        server_send(
            &factory,
            0,
            r#"<message type="chat" from="bob_x1@talk.kik.com/CANabc" to="alice_a1@talk.kik.com" id="m1"><body>hello</body><kik timestamp="1700000000000"/></message>"#,
        )
        .await;

        match &*events.recv().await.unwrap() {
            Event::ChatMessage(message) => {
                assert_eq!(message.id, "m1");
                assert_eq!(message.body.as_deref(), Some("hello"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let ack = wait_for_sent(&factory, 0, |s| s.contains("kik:iq:QoS")).await;
        assert!(ack.contains(r#"<sender jid="bob_x1@talk.kik.com"><ack-id receipt="false">m1</ack-id></sender>"#));
    }

    #[tokio::test]
    async fn group_typing_is_not_acknowledged() {
        let (client, factory) = create_test_client();
        connect_established(&client, &factory).await;
        let mut events = client.subscribe_to_all_events();

        server_send(
            &factory,
            0,
            r#"<message type="groupchat" from="bob_x1@talk.kik.com" id="t1"><g jid="1100_club@groups.kik.com"/><is-typing val="true"/></message>"#,
        )
        .await;
        assert!(matches!(
            &*events.recv().await.unwrap(),
            Event::GroupIsTyping(t) if t.typing
        ));
        let sent = factory.transports.lock().unwrap()[0].0.sent_strings();
        assert!(sent.iter().all(|s| !s.contains("kik:iq:QoS")));
    }

    #[tokio::test]
    async fn read_receipt_is_published() {
        let (client, _factory) = create_test_client();
        let mut events = client.subscribe_to_all_events();
        let node = kikcore::xml::unmarshal(
            br#"<message type="receipt" from="bob_x1@talk.kik.com" id="r2"><receipt xmlns="kik:message:receipt" type="read"><msgid id="m1"/></receipt></message>"#,
        )
        .unwrap();
        assert!(MessageHandler::new().handle(client.clone(), &node).await);
        assert!(matches!(&*events.recv().await.unwrap(), Event::ReadReceipt(r) if r.message_ids == ["m1"]));
    }
}

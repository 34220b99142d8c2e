//! Chat, group chat, receipt and typing stanzas.

use kikcore_xml::{Jid, Node, NodeBuilder, XmlError, text_node};

use crate::request::{NS_GROUPS, NS_RECEIPT};

const PREVIEW_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptKind {
    Delivered,
    Read,
}

impl ReceiptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReceiptKind::Delivered => "delivered",
            ReceiptKind::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delivered" => Some(ReceiptKind::Delivered),
            "read" => Some(ReceiptKind::Read),
            _ => None,
        }
    }
}

/// Builds an outgoing chat message requesting delivered and read receipts.
/// Group JIDs produce a `groupchat` message.
pub fn chat_message(id: &str, to: &Jid, body: &str, timestamp_ms: i64) -> Node {
    let timestamp = timestamp_ms.to_string();
    let preview: String = body.chars().take(PREVIEW_LEN).collect();
    let mut children = vec![
        text_node("body", body),
        text_node("preview", preview),
        NodeBuilder::new("kik")
            .attr("push", "true")
            .attr("qos", "true")
            .attr("timestamp", timestamp.clone())
            .build(),
        NodeBuilder::new("request")
            .attr("xmlns", NS_RECEIPT)
            .attr("r", "true")
            .attr("d", "true")
            .build(),
        Node::new("ri", Default::default(), None),
    ];
    let (kind, xmlns) = if to.is_group() {
        children.insert(0, NodeBuilder::new("g").attr("jid", to.to_string()).build());
        ("groupchat", Some(NS_GROUPS))
    } else {
        ("chat", None)
    };
    NodeBuilder::new("message")
        .attr("type", kind)
        .attr("to", to.to_string())
        .attr("id", id)
        .attr("cts", timestamp)
        .optional_attr("xmlns", xmlns)
        .children(children)
        .build()
}

/// Outgoing receipt for messages received from `to`.
pub fn receipt(id: &str, to: &Jid, kind: ReceiptKind, message_ids: &[String], group: Option<&Jid>) -> Node {
    let mut children = Vec::with_capacity(2);
    if let Some(group) = group {
        children.push(NodeBuilder::new("g").attr("jid", group.to_string()).build());
    }
    children.push(
        NodeBuilder::new("receipt")
            .attr("xmlns", NS_RECEIPT)
            .attr("type", kind.as_str())
            .children(
                message_ids
                    .iter()
                    .map(|m| NodeBuilder::new("msgid").attr("id", m.as_str()).build()),
            )
            .build(),
    );
    NodeBuilder::new("message")
        .attr("type", "receipt")
        .attr("id", id)
        .attr("to", to.to_string())
        .attr("cts", chrono::Utc::now().timestamp_millis().to_string())
        .children(children)
        .build()
}

/// Typing indicator. For groups `to` is the group JID.
pub fn is_typing(id: &str, to: &Jid, typing: bool, timestamp_ms: i64) -> Node {
    let timestamp = timestamp_ms.to_string();
    let mut children = vec![
        NodeBuilder::new("kik")
            .attr("push", "false")
            .attr("qos", "false")
            .attr("timestamp", timestamp.clone())
            .build(),
        NodeBuilder::new("is-typing")
            .attr("val", if typing { "true" } else { "false" })
            .build(),
    ];
    let kind = if to.is_group() {
        children.insert(0, NodeBuilder::new("g").attr("jid", to.to_string()).build());
        "groupchat"
    } else {
        "is-typing"
    };
    NodeBuilder::new("message")
        .attr("type", kind)
        .attr("to", to.to_string())
        .attr("id", id)
        .attr("cts", timestamp)
        .children(children)
        .build()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub from: Jid,
    /// Set for messages sent to a group.
    pub group: Option<Jid>,
    pub body: Option<String>,
    /// Rich content (`<content>`) when the message is not plain text.
    pub content: Option<Node>,
    pub timestamp: Option<i64>,
    pub request_delivered: bool,
    pub request_read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub id: String,
    pub from: Jid,
    pub group: Option<Jid>,
    pub kind: ReceiptKind,
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingIndicator {
    pub from: Jid,
    pub group: Option<Jid>,
    pub typing: bool,
}

/// A classified inbound `message` stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageEvent {
    Chat(ChatMessage),
    Group(ChatMessage),
    Receipt(Receipt),
    Typing(TypingIndicator),
}

/// Message types the dispatcher knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Chat,
    GroupChat,
    Receipt,
    IsTyping,
}

impl MessageType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "chat" => Some(MessageType::Chat),
            "groupchat" => Some(MessageType::GroupChat),
            "receipt" => Some(MessageType::Receipt),
            "is-typing" => Some(MessageType::IsTyping),
            _ => None,
        }
    }
}

fn group_of(node: &Node) -> Result<Option<Jid>, XmlError> {
    node.get_optional_child("g")
        .and_then(|g| g.get_attr("jid"))
        .map(|jid| jid.parse::<Jid>())
        .transpose()
        .map_err(XmlError::from)
}

/// Parses a `message` of a known type into its event.
pub fn parse_message(node: &Node, kind: MessageType) -> Result<MessageEvent, XmlError> {
    let mut attrs = node.attrs();
    let id = attrs.optional_string("id").unwrap_or_default().to_string();
    let from = attrs.jid("from");
    attrs.finish()?;
    let group = group_of(node)?;

    match kind {
        MessageType::Chat | MessageType::GroupChat => {
            if let Some(typing) = node.get_optional_child("is-typing") {
                return Ok(MessageEvent::Typing(TypingIndicator {
                    from,
                    group,
                    typing: typing.get_attr("val") == Some("true"),
                }));
            }
            let request = node.get_optional_child("request");
            let flag = |key: &str| request.and_then(|r| r.get_attr(key)) == Some("true");
            let message = ChatMessage {
                id,
                from,
                group: group.clone(),
                body: node.child_text("body").map(str::to_string),
                content: node.get_optional_child("content").cloned(),
                timestamp: node
                    .get_optional_child("kik")
                    .and_then(|k| k.get_attr("timestamp"))
                    .and_then(|t| t.parse().ok()),
                request_delivered: flag("d"),
                request_read: flag("r"),
            };
            if kind == MessageType::GroupChat || group.is_some() {
                Ok(MessageEvent::Group(message))
            } else {
                Ok(MessageEvent::Chat(message))
            }
        }
        MessageType::Receipt => {
            let receipt = node
                .get_optional_child("receipt")
                .ok_or_else(|| XmlError::MissingChild("receipt".into()))?;
            let kind_attr = receipt
                .get_attr("type")
                .ok_or_else(|| XmlError::MissingAttr("type".into()))?;
            let kind = ReceiptKind::parse(kind_attr)
                .ok_or_else(|| XmlError::AttrParse(format!("unknown receipt type '{kind_attr}'")))?;
            let message_ids = receipt
                .get_children_by_tag("msgid")
                .filter_map(|m| m.get_attr("id"))
                .map(str::to_string)
                .collect();
            Ok(MessageEvent::Receipt(Receipt {
                id,
                from,
                group,
                kind,
                message_ids,
            }))
        }
        MessageType::IsTyping => {
            let typing = node
                .get_optional_child("is-typing")
                .ok_or_else(|| XmlError::MissingChild("is-typing".into()))?;
            Ok(MessageEvent::Typing(TypingIndicator {
                from,
                group,
                typing: typing.get_attr("val") == Some("true"),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kikcore_xml::{marshal, unmarshal};

    fn jid(s: &str) -> Jid {
        s.parse().unwrap()
    }

    #[test]
    fn chat_message_requests_receipts() {
        let node = chat_message("m1", &jid("bob_x1@talk.kik.com"), "hello", 1_700_000_000_000);
        assert_eq!(node.get_attr("type"), Some("chat"));
        let request = node.get_optional_child("request").unwrap();
        assert_eq!(request.get_attr("xmlns"), Some(NS_RECEIPT));
        assert_eq!(request.get_attr("d"), Some("true"));
        assert_eq!(request.get_attr("r"), Some("true"));
        assert_eq!(
            node.get_optional_child("kik").and_then(|k| k.get_attr("qos")),
            Some("true")
        );
    }

    #[test]
    fn group_message_carries_g() {
        let group = jid("1100123_g@groups.kik.com");
        let node = chat_message("m2", &group, "hi all", 1);
        assert_eq!(node.get_attr("type"), Some("groupchat"));
        assert_eq!(node.get_attr("xmlns"), Some(NS_GROUPS));
        assert_eq!(
            node.get_optional_child("g").and_then(|g| g.get_attr("jid")),
            Some("1100123_g@groups.kik.com")
        );
    }

    #[test]
    fn receipt_lists_message_ids() {
        let node = receipt(
            "r1",
            &jid("bob_x1@talk.kik.com"),
            ReceiptKind::Read,
            &["a".to_string(), "b".to_string()],
            None,
        );
        let xml = marshal(&node);
        assert!(xml.contains(r#"<receipt xmlns="kik:message:receipt" type="read"><msgid id="a"/><msgid id="b"/></receipt>"#));
    }

    #[test]
    fn parses_rich_content_without_body() {
        let node = unmarshal(
            br#"<message type="chat" from="bob_x1@talk.kik.com/CAN1" id="m9"><content id="c1" app-id="com.kik.ext.gallery"/><kik timestamp="42" qos="true"/></message>"#,
        )
        .unwrap();
        match parse_message(&node, MessageType::Chat).unwrap() {
            MessageEvent::Chat(msg) => {
                assert!(msg.body.is_none());
                assert!(msg.content.is_some());
                assert_eq!(msg.timestamp, Some(42));
                assert_eq!(msg.from.to_bare().to_string(), "bob_x1@talk.kik.com");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn group_typing_is_typing_event() {
        let node = unmarshal(
            br#"<message type="groupchat" from="bob_x1@talk.kik.com" id="t1"><g jid="1100123_g@groups.kik.com"/><is-typing val="true"/></message>"#,
        )
        .unwrap();
        match parse_message(&node, MessageType::GroupChat).unwrap() {
            MessageEvent::Typing(t) => {
                assert!(t.typing);
                assert!(t.group.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn receipt_without_body_is_parse_error() {
        let node = unmarshal(br#"<message type="receipt" from="bob_x1@talk.kik.com" id="r"/>"#).unwrap();
        assert_eq!(
            parse_message(&node, MessageType::Receipt),
            Err(XmlError::MissingChild("receipt".into()))
        );
    }
}

//! `kik:iq:QoS`: message acknowledgement and history replay.

use kikcore_xml::{Jid, Node, NodeBuilder, XmlError};

use crate::request::{InfoQuery, NS_QOS};

/// One message the client confirms having seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckEntry {
    pub sender: Jid,
    pub group: Option<Jid>,
    pub message_id: String,
    /// Whether the acknowledged stanza was itself a receipt.
    pub is_receipt: bool,
}

/// Builds the `msg-acks` query. Entries from the same sender and group share
/// one `<sender>` element, in first-seen order.
pub fn ack_query(entries: &[AckEntry], attach_history: bool) -> InfoQuery<'static> {
    let mut senders: Vec<((String, Option<String>), Vec<Node>)> = Vec::new();
    for entry in entries {
        let key = (
            entry.sender.to_bare().to_string(),
            entry.group.as_ref().map(Jid::to_string),
        );
        let ack = NodeBuilder::new("ack-id")
            .attr("receipt", if entry.is_receipt { "true" } else { "false" })
            .text(entry.message_id.clone())
            .build();
        match senders.iter_mut().find(|(k, _)| *k == key) {
            Some((_, acks)) => acks.push(ack),
            None => senders.push((key, vec![ack])),
        }
    }
    let msg_acks = NodeBuilder::new("msg-acks")
        .children(senders.into_iter().map(|((jid, group), acks)| {
            NodeBuilder::new("sender")
                .attr("jid", jid)
                .optional_attr("g", group)
                .children(acks)
                .build()
        }))
        .build();
    InfoQuery::set(NS_QOS, vec![msg_acks, history_node(attach_history)])
}

/// Requests the next page of undelivered history.
pub fn history_query() -> InfoQuery<'static> {
    ack_query(&[], true)
}

fn history_node(attach: bool) -> Node {
    NodeBuilder::new("history")
        .attr("attach", if attach { "true" } else { "false" })
        .build()
}

/// A page of history returned by a QoS query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HistoryBatch {
    pub more: bool,
    pub messages: Vec<Node>,
}

pub fn parse_history(query: &Node) -> Result<HistoryBatch, XmlError> {
    let Some(msgs) = query.get_optional_child("msgs") else {
        return Ok(HistoryBatch::default());
    };
    let mut attrs = msgs.attrs();
    let more = attrs.optional_bool("more");
    attrs.finish()?;
    Ok(HistoryBatch {
        more,
        messages: msgs.get_children_by_tag("message").cloned().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kikcore_xml::{marshal, unmarshal};

    #[test]
    fn ack_groups_by_sender() {
        let bob: Jid = "bob_x1@talk.kik.com/CAN1".parse().unwrap();
        let group: Jid = "1100_g@groups.kik.com".parse().unwrap();
        let entries = vec![
            AckEntry { sender: bob.clone(), group: None, message_id: "a".into(), is_receipt: false },
            AckEntry { sender: bob.clone(), group: Some(group), message_id: "b".into(), is_receipt: false },
            AckEntry { sender: bob, group: None, message_id: "c".into(), is_receipt: true },
        ];
        let iq = ack_query(&entries, false).build("q1");
        assert_eq!(
            marshal(&iq),
            concat!(
                r#"<iq type="set" id="q1"><query xmlns="kik:iq:QoS"><msg-acks>"#,
                r#"<sender jid="bob_x1@talk.kik.com"><ack-id receipt="false">a</ack-id><ack-id receipt="true">c</ack-id></sender>"#,
                r#"<sender jid="bob_x1@talk.kik.com" g="1100_g@groups.kik.com"><ack-id receipt="false">b</ack-id></sender>"#,
                r#"</msg-acks><history attach="false"/></query></iq>"#
            )
        );
    }

    #[test]
    fn history_request_is_empty_acks() {
        let iq = history_query().build("h");
        assert_eq!(
            marshal(&iq),
            r#"<iq type="set" id="h"><query xmlns="kik:iq:QoS"><msg-acks/><history attach="true"/></query></iq>"#
        );
    }

    #[test]
    fn parses_more_flag() {
        let iq = unmarshal(
            br#"<iq type="result" id="h"><query xmlns="kik:iq:QoS"><msgs more="1"><message type="chat" id="x"/><message type="chat" id="y"/></msgs></query></iq>"#,
        )
        .unwrap();
        let batch = parse_history(iq.get_optional_child("query").unwrap()).unwrap();
        assert!(batch.more);
        assert_eq!(batch.messages.len(), 2);

        let empty = unmarshal(br#"<query xmlns="kik:iq:QoS"><msgs/></query>"#).unwrap();
        assert!(!parse_history(&empty).unwrap().more);
    }
}

//! Classification of inbound stanzas into typed values.
//!
//! This is a pure function of the node. The client layer decides what to do
//! with each [`Incoming`] variant.

use thiserror::Error;

use kikcore_xml::{Node, XmlError, marshal};

use crate::handshake::ConnectionResult;
use crate::request::{
    IqError, NS_FRIEND, NS_GROUP_ADMIN, NS_QOS, NS_REGISTER, NS_ROSTER, check_iq_response,
};
use crate::stanza::group::parse_group_admin;
use crate::stanza::login::parse_register_result;
use crate::stanza::message::{MessageType, parse_message};
use crate::stanza::qos::parse_history;
use crate::stanza::roster::{parse_friend_lookup, parse_roster};
use crate::stanza::{
    GroupAdminResult, HistoryBatch, LoginFailure, LoginResult, MessageEvent, Peer, Roster,
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no handler for iq namespace '{0}'")]
    UnimplementedNamespace(String),
    #[error("unsupported message type '{0}'")]
    UnsupportedMessageType(String),
    #[error("unknown stanza <{0}>")]
    UnknownStanza(String),
    #[error("failed to parse <{tag}>: {source}")]
    Parse {
        tag: String,
        #[source]
        source: XmlError,
    },
}

impl DispatchError {
    fn parse(tag: &str, source: XmlError) -> Self {
        DispatchError::Parse {
            tag: tag.to_string(),
            source,
        }
    }
}

/// Typed payload of an `iq` reply, keyed by the namespace of its query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IqResponse {
    Login(Result<LoginResult, LoginFailure>),
    Roster(Roster),
    FriendLookup(Vec<Peer>),
    GroupAdmin(GroupAdminResult),
    History(HistoryBatch),
    /// A result with no namespaced payload.
    Empty,
    Error { code: u16, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IqStanza {
    pub id: String,
    pub iq_type: String,
    pub response: IqResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Connection(ConnectionResult),
    Ack { id: String },
    Iq(IqStanza),
    Message(MessageEvent),
}

pub fn classify(node: &Node) -> Result<Incoming, DispatchError> {
    match node.tag.as_str() {
        "k" => Ok(Incoming::Connection(ConnectionResult::from_node(
            node,
            marshal(node),
        ))),
        "ack" => {
            let id = node
                .attrs()
                .required_string("id")
                .map_err(|e| DispatchError::parse("ack", e))?;
            Ok(Incoming::Ack { id: id.to_string() })
        }
        "iq" => classify_iq(node).map(Incoming::Iq),
        "message" => {
            let kind = node.get_attr("type").unwrap_or_default();
            let message_type = MessageType::parse(kind)
                .ok_or_else(|| DispatchError::UnsupportedMessageType(kind.to_string()))?;
            parse_message(node, message_type)
                .map(Incoming::Message)
                .map_err(|e| DispatchError::parse("message", e))
        }
        other => Err(DispatchError::UnknownStanza(other.to_string())),
    }
}

fn classify_iq(node: &Node) -> Result<IqStanza, DispatchError> {
    let mut attrs = node.attrs();
    let id = attrs
        .required_string("id")
        .map_err(|e| DispatchError::parse("iq", e))?
        .to_string();
    let iq_type = attrs.optional_string("type").unwrap_or("result").to_string();

    let namespace = node.namespaced_child().map(|(_, ns)| ns);
    let response = match namespace {
        Some(NS_REGISTER) => {
            let result = parse_register_result(node).ok_or_else(|| {
                DispatchError::parse("iq", XmlError::MissingChild("node".into()))
            })?;
            IqResponse::Login(result)
        }
        _ if iq_type == "error" => match check_iq_response(node) {
            Err(IqError::ServerError { code, text }) => IqResponse::Error { code, text },
            _ => IqResponse::Error {
                code: 0,
                text: String::new(),
            },
        },
        None => IqResponse::Empty,
        Some(ns) => {
            let query = node
                .namespaced_child()
                .map(|(q, _)| q)
                .ok_or_else(|| DispatchError::parse("iq", XmlError::MissingChild("query".into())))?;
            let parsed = match ns {
                NS_ROSTER => parse_roster(query).map(IqResponse::Roster),
                NS_FRIEND => parse_friend_lookup(query).map(IqResponse::FriendLookup),
                NS_GROUP_ADMIN => Ok(IqResponse::GroupAdmin(parse_group_admin(query))),
                NS_QOS => parse_history(query).map(IqResponse::History),
                other => return Err(DispatchError::UnimplementedNamespace(other.to_string())),
            };
            parsed.map_err(|e| DispatchError::parse("iq", e))?
        }
    };

    Ok(IqStanza {
        id,
        iq_type,
        response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stanza::ReceiptKind;
    use kikcore_xml::unmarshal;

    fn classify_str(xml: &str) -> Result<Incoming, DispatchError> {
        classify(&unmarshal(xml.as_bytes()).unwrap())
    }

    #[test]
    fn connection_and_ack() {
        match classify_str(r#"<k ok="1" ts="5"/>"#).unwrap() {
            Incoming::Connection(c) => {
                assert!(c.accepted);
                assert_eq!(c.server_timestamp.as_deref(), Some("5"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            classify_str(r#"<ack id="m1"/>"#).unwrap(),
            Incoming::Ack { id: "m1".into() }
        );
    }

    #[test]
    fn receipts_split_by_nested_type() {
        let incoming = classify_str(
            r#"<message type="receipt" from="bob_x1@talk.kik.com" id="r1"><receipt xmlns="kik:message:receipt" type="delivered"><msgid id="m1"/></receipt></message>"#,
        )
        .unwrap();
        match incoming {
            Incoming::Message(MessageEvent::Receipt(r)) => {
                assert_eq!(r.kind, ReceiptKind::Delivered);
                assert_eq!(r.message_ids, vec!["m1"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_namespace_is_distinct_from_parse_error() {
        let err = classify_str(
            r#"<iq type="result" id="1"><query xmlns="kik:iq:xiphias:bulk"/></iq>"#,
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::UnimplementedNamespace(ref ns) if ns == "kik:iq:xiphias:bulk"));

        let err = classify_str(
            r#"<iq type="result" id="1"><query xmlns="jabber:iq:roster"><item/></query></iq>"#,
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::Parse { .. }));
    }

    #[test]
    fn unsupported_message_and_unknown_root() {
        assert!(matches!(
            classify_str(r#"<message type="headline" id="1"/>"#),
            Err(DispatchError::UnsupportedMessageType(_))
        ));
        assert!(matches!(
            classify_str(r#"<presence/>"#),
            Err(DispatchError::UnknownStanza(_))
        ));
    }

    #[test]
    fn error_iq_without_namespace() {
        match classify_str(r#"<iq type="error" id="9"><error code="503"><service-unavailable/></error></iq>"#)
            .unwrap()
        {
            Incoming::Iq(iq) => assert_eq!(
                iq.response,
                IqResponse::Error {
                    code: 503,
                    text: "service-unavailable".into()
                }
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_result() {
        match classify_str(r#"<iq type="result" id="7"/>"#).unwrap() {
            Incoming::Iq(iq) => {
                assert_eq!(iq.id, "7");
                assert_eq!(iq.response, IqResponse::Empty);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

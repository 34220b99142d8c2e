use std::time::Duration;

use thiserror::Error;

use kikcore_xml::{Jid, Node, NodeBuilder};

pub const NS_REGISTER: &str = "jabber:iq:register";
pub const NS_ROSTER: &str = "jabber:iq:roster";
pub const NS_FRIEND: &str = "kik:iq:friend";
pub const NS_GROUP_ADMIN: &str = "kik:groups:admin";
pub const NS_QOS: &str = "kik:iq:QoS";
pub const NS_RECEIPT: &str = "kik:message:receipt";
pub const NS_GROUPS: &str = "kik:groups";

/// IQ request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoQueryType {
    Set,
    Get,
}

impl InfoQueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            InfoQueryType::Set => "set",
            InfoQueryType::Get => "get",
        }
    }
}

/// An outgoing `iq` whose payload is a single `<query xmlns=...>` element.
#[derive(Debug, Clone)]
pub struct InfoQuery<'a> {
    pub namespace: &'a str,
    pub query_type: InfoQueryType,
    pub to: Option<Jid>,
    pub query_attrs: Vec<(&'a str, String)>,
    pub content: Vec<Node>,
    pub timeout: Option<Duration>,
}

impl<'a> InfoQuery<'a> {
    pub fn get(namespace: &'a str, content: Vec<Node>) -> Self {
        Self {
            namespace,
            query_type: InfoQueryType::Get,
            to: None,
            query_attrs: Vec::new(),
            content,
            timeout: None,
        }
    }

    pub fn set(namespace: &'a str, content: Vec<Node>) -> Self {
        Self {
            query_type: InfoQueryType::Set,
            ..Self::get(namespace, content)
        }
    }

    pub fn with_to(mut self, to: Jid) -> Self {
        self.to = Some(to);
        self
    }

    pub fn with_query_attr(mut self, key: &'a str, value: impl Into<String>) -> Self {
        self.query_attrs.push((key, value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(&self, id: &str) -> Node {
        let query = NodeBuilder::new("query")
            .attr("xmlns", self.namespace)
            .attrs(self.query_attrs.iter().map(|(k, v)| (*k, v.clone())))
            .children(self.content.iter().cloned())
            .build();
        NodeBuilder::new("iq")
            .attr("type", self.query_type.as_str())
            .attr("id", id)
            .optional_attr("to", self.to.as_ref().map(Jid::to_string))
            .children([query])
            .build()
    }
}

#[derive(Debug, Error)]
pub enum IqError {
    #[error("IQ request timed out")]
    Timeout,
    #[error("Client is not connected")]
    NotConnected,
    #[error("Connection closed while waiting for the IQ response")]
    ConnectionClosed,
    #[error("Received a server error response: code={code}, text='{text}'")]
    ServerError { code: u16, text: String },
    #[error("Internal channel closed unexpectedly")]
    InternalChannelClosed,
    #[error("Network error: {0}")]
    Network(String),
}

/// Splits an `iq` reply into success or a server error.
pub fn check_iq_response(response: &Node) -> Result<(), IqError> {
    if response.get_attr("type") != Some("error") {
        return Ok(());
    }
    let error_node = response
        .get_optional_child("error")
        .or_else(|| response.get_optional_child_by_tag(&["query", "error"]));
    match error_node {
        Some(error_node) => {
            let mut parser = error_node.attrs();
            let code = parser.optional_u64("code").unwrap_or(0) as u16;
            let text = error_node
                .child_text("text")
                .or_else(|| error_node.children().and_then(|c| c.first()).map(|c| c.tag.as_str()))
                .unwrap_or_default()
                .to_string();
            Err(IqError::ServerError { code, text })
        }
        None => Err(IqError::ServerError {
            code: 0,
            text: "Malformed error response".to_string(),
        }),
    }
}

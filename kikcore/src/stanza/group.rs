//! Group admin requests (`kik:groups:admin`).
//!
//! Joining by public code builds the request the official client sends, but the
//! server has not been observed to accept it; treat joins as unverified.

use kikcore_xml::{Jid, Node, NodeBuilder, text_node};

use crate::request::{InfoQuery, NS_GROUP_ADMIN};

/// Join a public group using the code and token from a group search result.
pub fn join_group_query(group: &Jid, code: &str, token: &str) -> InfoQuery<'static> {
    InfoQuery::set(
        NS_GROUP_ADMIN,
        vec![
            NodeBuilder::new("g")
                .attr("jid", group.to_string())
                .attr("action", "join")
                .children([text_node("code", code), text_node("token", token)])
                .build(),
        ],
    )
}

/// Leave a group.
pub fn leave_group_query(group: &Jid) -> InfoQuery<'static> {
    InfoQuery::set(
        NS_GROUP_ADMIN,
        vec![
            NodeBuilder::new("g")
                .attr("jid", group.to_string())
                .children([NodeBuilder::new("l").build()])
                .build(),
        ],
    )
}

/// Result of a group admin query: the affected group, if the server named one.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupAdminResult {
    pub group: Option<Jid>,
    pub code: Option<String>,
}

pub fn parse_group_admin(query: &Node) -> GroupAdminResult {
    let g = query.get_optional_child("g");
    GroupAdminResult {
        group: g
            .and_then(|g| g.get_attr("jid"))
            .and_then(|j| j.parse().ok()),
        code: g.and_then(|g| g.child_text("code")).map(str::to_string),
    }
}

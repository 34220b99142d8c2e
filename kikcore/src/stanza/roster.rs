//! Roster (`jabber:iq:roster`) and username lookup (`kik:iq:friend`).

use kikcore_xml::{Jid, Node, NodeBuilder, XmlError};

use crate::request::{InfoQuery, NS_FRIEND, NS_ROSTER};

/// A user as described by the roster or a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub jid: Jid,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
}

/// A group as it appears in the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub jid: Jid,
    pub code: Option<String>,
    pub name: Option<String>,
    pub members: Vec<Jid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Roster {
    pub peers: Vec<Peer>,
    pub groups: Vec<GroupSummary>,
}

pub fn roster_query() -> InfoQuery<'static> {
    InfoQuery::get(NS_ROSTER, vec![]).with_query_attr("p", "8")
}

pub fn friend_lookup_query(username: &str) -> InfoQuery<'static> {
    InfoQuery::get(
        NS_FRIEND,
        vec![NodeBuilder::new("item").attr("username", username).build()],
    )
}

fn parse_peer(item: &Node) -> Result<Peer, XmlError> {
    let mut attrs = item.attrs();
    let jid = attrs.jid("jid");
    attrs.finish()?;
    Ok(Peer {
        jid,
        username: item.child_text("username").map(str::to_string),
        display_name: item.child_text("display-name").map(str::to_string),
        picture_url: item.child_text("pic").map(str::to_string),
    })
}

fn parse_group(g: &Node) -> Result<GroupSummary, XmlError> {
    let mut attrs = g.attrs();
    let jid = attrs.jid("jid");
    attrs.finish()?;
    let members = g
        .get_children_by_tag("m")
        .filter_map(Node::text)
        .map(|m| m.parse::<Jid>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(GroupSummary {
        jid,
        code: g.child_text("code").map(str::to_string),
        name: g.child_text("n").map(str::to_string),
        members,
    })
}

/// Reads a roster `<query>`.
pub fn parse_roster(query: &Node) -> Result<Roster, XmlError> {
    let peers = query
        .get_children_by_tag("item")
        .map(parse_peer)
        .collect::<Result<Vec<_>, _>>()?;
    let groups = query
        .get_children_by_tag("g")
        .map(parse_group)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Roster { peers, groups })
}

/// Reads a friend lookup `<query>`. Unknown usernames yield an empty list.
pub fn parse_friend_lookup(query: &Node) -> Result<Vec<Peer>, XmlError> {
    query
        .get_children_by_tag("item")
        .map(parse_peer)
        .collect()
}

use crate::client::Client;
use crate::error::ClientError;
use crate::types::events::Event;
use kikcore::dispatch::{Incoming, IqResponse, classify};
use kikcore::stanza::roster::{friend_lookup_query, roster_query};
use kikcore::stanza::{Peer, Roster};
use kikcore::xml::Node;
use log::debug;

impl Client {
    /// Fetches the roster, stores its peers in the peer cache and publishes
    /// [`Event::RosterReceived`].
    pub async fn get_roster(&self) -> Result<Roster, ClientError> {
        let response = self.send_iq(roster_query()).await?;
        let roster = match typed_response(&response)? {
            IqResponse::Roster(roster) => roster,
            other => return Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        };
        debug!(
            target: "Client",
            "Roster has {} peer(s) and {} group(s)",
            roster.peers.len(),
            roster.groups.len()
        );
        self.peer_cache.extend(roster.peers.iter().cloned());
        self.event_bus.dispatch(Event::RosterReceived(roster.clone()));
        Ok(roster)
    }

    /// Resolves a username to a peer. Answered from the peer cache when
    /// possible; `None` means the server does not know the username.
    pub async fn lookup_username(&self, username: &str) -> Result<Option<Peer>, ClientError> {
        if let Some(peer) = self.peer_cache.by_username(username) {
            return Ok(Some(peer));
        }
        let response = self.send_iq(friend_lookup_query(username)).await?;
        let peers = match typed_response(&response)? {
            IqResponse::FriendLookup(peers) => peers,
            IqResponse::Empty => Vec::new(),
            other => return Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        };
        self.peer_cache.extend(peers.iter().cloned());
        self.event_bus.dispatch(Event::PeerInfo(peers.clone()));
        Ok(peers.into_iter().find(|p| {
            p.username
                .as_deref()
                .is_some_and(|u| u.eq_ignore_ascii_case(username))
        }))
    }
}

pub(crate) fn typed_response(response: &Node) -> Result<IqResponse, ClientError> {
    match classify(response)? {
        Incoming::Iq(iq) => Ok(iq.response),
        other => Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        attr_value, connect_established, create_test_client, server_send, wait_for_sent,
    };

    #[tokio::test]
    async fn lookup_goes_to_the_server_once() {
        let (client, factory) = create_test_client();
        connect_established(&client, &factory).await;

        let lookup = tokio::spawn({
            let client = client.clone();
            async move { client.lookup_username("Bob").await }
        });
        let sent = wait_for_sent(&factory, 0, |s| s.contains("kik:iq:friend")).await;
        assert!(sent.contains(r#"<item username="Bob"/>"#));
        server_send(
            &factory,
            0,
            &format!(
                r#"<iq type="result" id="{}"><query xmlns="kik:iq:friend"><item jid="bob_x1@talk.kik.com"><username>bob</username></item></query></iq>"#,
                attr_value(&sent, "id").unwrap()
            ),
        )
        .await;
        let peer = lookup.await.unwrap().unwrap().unwrap();
        assert_eq!(peer.jid.to_string(), "bob_x1@talk.kik.com");

        let again = client.lookup_username("BOB").await.unwrap().unwrap();
        assert_eq!(again, peer);
        let lookups = factory.transports.lock().unwrap()[0]
            .0
            .sent_strings()
            .iter()
            .filter(|s| s.contains("kik:iq:friend"))
            .count();
        assert_eq!(lookups, 1);
    }

    #[tokio::test]
    async fn roster_fills_the_cache() {
        let (client, factory) = create_test_client();
        connect_established(&client, &factory).await;

        let roster = tokio::spawn({
            let client = client.clone();
            async move { client.get_roster().await }
        });
        let sent = wait_for_sent(&factory, 0, |s| s.contains("jabber:iq:roster")).await;
        server_send(
            &factory,
            0,
            &format!(
                r#"<iq type="result" id="{}"><query xmlns="jabber:iq:roster"><item jid="carl_x2@talk.kik.com"><username>carl</username></item><g jid="1100_club@groups.kik.com"><n>Club</n></g></query></iq>"#,
                attr_value(&sent, "id").unwrap()
            ),
        )
        .await;
        let roster = roster.await.unwrap().unwrap();
        assert_eq!(roster.peers.len(), 1);
        assert_eq!(roster.groups[0].name.as_deref(), Some("Club"));
        assert!(client.peer_cache().by_username("carl").is_some());
    }
}

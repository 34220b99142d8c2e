use dashmap::DashMap;
use kikcore::stanza::Peer;
use kikcore::xml::Jid;

/// Username to peer resolution shared by whoever holds the `Arc`.
///
/// Each client gets its own cache unless one is passed in explicitly, so
/// nothing leaks between accounts by accident.
#[derive(Debug, Default)]
pub struct PeerCache {
    by_username: DashMap<String, Peer>,
    by_jid: DashMap<Jid, Peer>,
}

impl PeerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, peer: Peer) {
        if let Some(username) = &peer.username {
            self.by_username
                .insert(username.to_lowercase(), peer.clone());
        }
        self.by_jid.insert(peer.jid.to_bare(), peer);
    }

    pub fn extend(&self, peers: impl IntoIterator<Item = Peer>) {
        for peer in peers {
            self.insert(peer);
        }
    }

    pub fn by_username(&self, username: &str) -> Option<Peer> {
        self.by_username
            .get(&username.to_lowercase())
            .map(|p| p.clone())
    }

    pub fn by_jid(&self, jid: &Jid) -> Option<Peer> {
        self.by_jid.get(&jid.to_bare()).map(|p| p.clone())
    }

    pub fn len(&self) -> usize {
        self.by_jid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_jid.is_empty()
    }

    pub fn clear(&self) {
        self.by_username.clear();
        self.by_jid.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case_and_resource() {
        let cache = PeerCache::new();
        cache.insert(Peer {
            jid: Jid::for_node("bob_x1"),
            username: Some("Bob".into()),
            display_name: Some("Bob B".into()),
            picture_url: None,
        });
        assert_eq!(cache.by_username("bob").unwrap().jid, Jid::for_node("bob_x1"));
        let with_resource = Jid::for_node("bob_x1").with_resource("CANdev");
        assert!(cache.by_jid(&with_resource).is_some());
        assert!(cache.by_username("alice").is_none());
        cache.clear();
        assert!(cache.is_empty());
    }
}

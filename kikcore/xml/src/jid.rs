use std::fmt;
use std::str::FromStr;

pub const USER_SERVER: &str = "talk.kik.com";
pub const GROUP_SERVER: &str = "groups.kik.com";
/// Resource prefix the Android client uses when binding a session.
pub const RESOURCE_PREFIX: &str = "CAN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JidError {
    InvalidFormat(String),
}

impl fmt::Display for JidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JidError::InvalidFormat(s) => write!(f, "Invalid JID format: {s}"),
        }
    }
}

impl std::error::Error for JidError {}

/// A user or group address, e.g. `alice_x1y@talk.kik.com` or
/// `1100123_g@groups.kik.com`, optionally carrying a `/resource`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Jid {
    pub user: String,
    pub server: String,
    pub resource: Option<String>,
}

impl Jid {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
            resource: None,
        }
    }

    /// An individual account JID for a server-assigned node.
    pub fn for_node(node: impl Into<String>) -> Self {
        Self::new(node, USER_SERVER)
    }

    pub fn group(local: impl Into<String>) -> Self {
        Self::new(local, GROUP_SERVER)
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.server.is_empty()
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn to_bare(&self) -> Jid {
        Self::new(self.user.clone(), self.server.clone())
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.server)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{resource}")?;
        }
        Ok(())
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, resource) = match s.split_once('/') {
            Some((address, resource)) => (address, Some(resource.to_string())),
            None => (s, None),
        };
        let (user, server) = address
            .split_once('@')
            .ok_or_else(|| JidError::InvalidFormat(s.to_string()))?;
        if user.is_empty() || server.is_empty() {
            return Err(JidError::InvalidFormat(s.to_string()));
        }
        Ok(Self {
            user: user.to_string(),
            server: server.to_string(),
            resource,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_and_group_jids() {
        let user: Jid = "alice_x1y@talk.kik.com".parse().unwrap();
        assert_eq!(user.user, "alice_x1y");
        assert!(!user.is_group());

        let group: Jid = "1100221067977_g@groups.kik.com".parse().unwrap();
        assert!(group.is_group());
    }

    #[test]
    fn resource_round_trips_through_display() {
        let jid: Jid = "foo_ab1@talk.kik.com/CAN167da124".parse().unwrap();
        assert_eq!(jid.resource.as_deref(), Some("CAN167da124"));
        assert_eq!(jid.to_string(), "foo_ab1@talk.kik.com/CAN167da124");
        assert_eq!(jid.to_bare().to_string(), "foo_ab1@talk.kik.com");
    }

    #[test]
    fn rejects_missing_parts() {
        assert!("nobody".parse::<Jid>().is_err());
        assert!("@talk.kik.com".parse::<Jid>().is_err());
        assert!("user@".parse::<Jid>().is_err());
    }
}

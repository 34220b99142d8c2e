use once_cell::sync::Lazy;

/// An emulated Android client build together with the digest of its classes
/// the server expects inside the device token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientVersion {
    pub version: String,
    pub classes_digest: String,
}

impl ClientVersion {
    pub fn new(version: impl Into<String>, classes_digest: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            classes_digest: classes_digest.into(),
        }
    }
}

/// Known-good version/digest pairs, newest first. The first entry is the default.
pub static KNOWN_VERSIONS: Lazy<Vec<ClientVersion>> = Lazy::new(|| {
    vec![
        ClientVersion::new("15.25.0.22493", "LuYEjtvBu4mG2kBBG0wA3Ki1PSE="),
        ClientVersion::new("14.0.0.11130", "9nPRnohIOTbby7wU1+IVDqDmQiQ="),
        ClientVersion::new("11.1.1.12218", "aCDhFLsmALSyhwi007tvowZkUd0="),
    ]
});

pub fn default_version() -> ClientVersion {
    KNOWN_VERSIONS[0].clone()
}

/// Looks up a known build by its version string.
pub fn find_version(version: &str) -> Option<ClientVersion> {
    KNOWN_VERSIONS.iter().find(|v| v.version == version).cloned()
}

/// Resolves the version to emulate: an explicit digest override wins, then the
/// table entry for `version`, then the default build.
pub fn resolve_version(version: Option<&str>, digest_override: Option<&str>) -> Option<ClientVersion> {
    match (version, digest_override) {
        (Some(v), Some(d)) => Some(ClientVersion::new(v, d)),
        (Some(v), None) => find_version(v),
        (None, Some(d)) => Some(ClientVersion::new(default_version().version, d)),
        (None, None) => Some(default_version()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_newest() {
        assert_eq!(default_version().version, "15.25.0.22493");
    }

    #[test]
    fn unknown_version_without_digest_is_rejected() {
        assert!(resolve_version(Some("1.0.0"), None).is_none());
        assert_eq!(
            resolve_version(Some("1.0.0"), Some("abc=")),
            Some(ClientVersion::new("1.0.0", "abc="))
        );
        assert_eq!(
            resolve_version(Some("14.0.0.11130"), None)
                .map(|v| v.classes_digest),
            Some("9nPRnohIOTbby7wU1+IVDqDmQiQ=".to_string())
        );
    }
}

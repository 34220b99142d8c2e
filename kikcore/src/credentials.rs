use hex::ToHex;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use kikcore_xml::Jid;

/// Fixed suffix appended to the lower-cased username to form the PBKDF2 salt.
pub const PASSKEY_SALT_SUFFIX: &str = "niCRwL7isZHny24qgLvy";
pub const PASSKEY_ITERATIONS: u32 = 8192;
const PASSKEY_LEN: usize = 16;

/// Account and device identity for one client.
///
/// `node` is unknown until the first successful login. Callers may persist the
/// whole struct and pass it back in to skip straight to an authenticated connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub device_id: String,
    pub android_id: String,
    #[serde(default)]
    pub node: Option<String>,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        device_id: impl Into<String>,
        android_id: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            device_id: device_id.into(),
            android_id: android_id.into(),
            node: None,
        }
    }

    /// Credentials with freshly generated device and android ids.
    pub fn with_random_device(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(username, password, random_device_id(), random_android_id())
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Whether the login identifier is an email address rather than a username.
    pub fn is_email(&self) -> bool {
        self.username.contains('@')
    }

    pub fn password_key(&self) -> String {
        password_key(&self.username, &self.password)
    }

    pub fn jid(&self) -> Option<Jid> {
        self.node.as_deref().map(Jid::for_node)
    }
}

/// Derives the login password key: PBKDF2-HMAC-SHA1 over the hex SHA-1 of the
/// password, salted with the lower-cased username and a fixed suffix.
pub fn password_key(username: &str, password: &str) -> String {
    let password_sha1: String = Sha1::digest(password.as_bytes()).encode_hex();
    let salt = format!("{}{}", username.to_lowercase(), PASSKEY_SALT_SUFFIX);

    let mut key = [0u8; PASSKEY_LEN];
    pbkdf2_hmac::<Sha1>(
        password_sha1.as_bytes(),
        salt.as_bytes(),
        PASSKEY_ITERATIONS,
        &mut key,
    );
    hex::encode(key)
}

/// 32 lowercase hex characters.
pub fn random_device_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// 16 lowercase hex characters.
pub fn random_android_id() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

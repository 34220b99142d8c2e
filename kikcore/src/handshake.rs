//! Stream-open attribute sets and their signatures.

use base64::Engine as _;
use base64::prelude::BASE64_URL_SAFE_NO_PAD;
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use sha2::Sha256;
use thiserror::Error;

use kikcore_xml::{Node, USER_SERVER, stream_open};

use crate::credentials::Credentials;
use crate::shuffle::{ShuffleMode, shuffle};
use crate::verification::DeviceVerifier;

pub const DEVICE_PREFIX: &str = "CAN";
pub const CONNECTION_TYPE: &str = "WIFI";

#[derive(Debug, Error)]
pub enum SignError {
    #[error("handshake key is neither PKCS#1 nor PKCS#8 PEM: {0}")]
    InvalidKey(String),
}

/// RSA PKCS#1 v1.5 / SHA-256 signer for the `signed` handshake attribute.
#[derive(Clone)]
pub struct HandshakeSigner {
    key: SigningKey<Sha256>,
}

impl std::fmt::Debug for HandshakeSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeSigner").finish_non_exhaustive()
    }
}

impl HandshakeSigner {
    pub fn new(key: RsaPrivateKey) -> Self {
        Self {
            key: SigningKey::<Sha256>::new(key),
        }
    }

    pub fn from_pem(pem: &str) -> Result<Self, SignError> {
        let key = match RsaPrivateKey::from_pkcs1_pem(pem) {
            Ok(key) => key,
            Err(_) => RsaPrivateKey::from_pkcs8_pem(pem)
                .map_err(|e| SignError::InvalidKey(e.to_string()))?,
        };
        Ok(Self::new(key))
    }

    /// Signature over `message`, base64url without padding.
    pub fn sign(&self, message: &str) -> String {
        let signature = self.key.sign(message.as_bytes());
        BASE64_URL_SAFE_NO_PAD.encode(signature.to_bytes())
    }
}

/// Re-mixes the low byte of an epoch-millisecond clock the way the server
/// expects to see it in `ts`.
pub fn kik_timestamp(millis: i64) -> i64 {
    let i1 = millis >> 24;
    let i2 = (0xFF_0000 & millis) >> 16;
    let i3 = (0xFF00 & millis) >> 8;
    let j2 = (30 & i1) ^ i2 ^ i3;
    let mut j3 = (224 & millis) >> 5;
    let j4 = -255 & millis;
    if j2 % 4 == 0 {
        j3 = j3 / 3 * 3;
    } else {
        j3 = j3 / 2 * 2;
    }
    j4 | (j3 << 5) | j2
}

pub fn now_timestamp() -> String {
    kik_timestamp(chrono::Utc::now().timestamp_millis()).to_string()
}

/// Everything a stream-open needs besides the account.
pub struct HandshakeContext<'a> {
    pub verifier: &'a DeviceVerifier,
    pub signer: &'a HandshakeSigner,
    pub lang: &'a str,
    pub session_id: &'a str,
    pub timestamp: &'a str,
}

impl HandshakeContext<'_> {
    fn version(&self) -> &str {
        &self.verifier.version().version
    }
}

/// Attributes for a connection without an account. Already in wire order.
pub fn anonymous_attributes(ctx: &HandshakeContext<'_>, device_id: &str) -> Vec<(String, String)> {
    let device = format!("{DEVICE_PREFIX}{device_id}");
    let signed = ctx.signer.sign(&format!(
        "{device}:{}:{}:{}",
        ctx.version(),
        ctx.timestamp,
        ctx.session_id
    ));
    shuffle(
        [
            ("signed", signed),
            ("lang", ctx.lang.to_string()),
            ("sid", ctx.session_id.to_string()),
            ("anon", "1".to_string()),
            ("ts", ctx.timestamp.to_string()),
            ("v", ctx.version().to_string()),
            ("cv", ctx.verifier.cv(ctx.timestamp, &device)),
            ("conn", CONNECTION_TYPE.to_string()),
            ("dev", device),
        ],
        ShuffleMode::Anonymous,
    )
}

/// Attributes for a connection bound to a known `node`. Already in wire order.
pub fn authenticated_attributes(
    ctx: &HandshakeContext<'_>,
    credentials: &Credentials,
    node: &str,
) -> Vec<(String, String)> {
    let jid = format!("{node}@{USER_SERVER}");
    let from = format!("{jid}/{DEVICE_PREFIX}{}", credentials.device_id);
    let signed = ctx.signer.sign(&format!(
        "{jid}:{}:{}:{}",
        ctx.version(),
        ctx.timestamp,
        ctx.session_id
    ));
    shuffle(
        [
            ("from", from),
            ("to", USER_SERVER.to_string()),
            ("p", credentials.password_key()),
            ("cv", ctx.verifier.cv(ctx.timestamp, &jid)),
            ("v", ctx.version().to_string()),
            ("sid", ctx.session_id.to_string()),
            ("n", "1".to_string()),
            ("conn", CONNECTION_TYPE.to_string()),
            ("ts", ctx.timestamp.to_string()),
            ("lang", ctx.lang.to_string()),
            ("signed", signed),
        ],
        ShuffleMode::Authenticated,
    )
}

/// Renders ordered attributes as the stream-open tag.
pub fn render_stream_open(attrs: &[(String, String)]) -> String {
    stream_open(attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

/// The server's answer to a stream-open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionResult {
    pub accepted: bool,
    /// Present when the server considers the stream already authenticated.
    pub server_timestamp: Option<String>,
    pub raw: String,
}

impl ConnectionResult {
    pub fn from_node(node: &Node, raw: impl Into<String>) -> Self {
        Self {
            accepted: node.get_attr("ok") == Some("1"),
            server_timestamp: node.get_attr("ts").map(str::to_string),
            raw: raw.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::default_version;

    const KEY: &str = include_str!("../tests/fixtures/handshake_key.pem");
    const KEY_PKCS8: &str = include_str!("../tests/fixtures/handshake_key_pkcs8.pem");

    #[test]
    fn both_pem_flavours_load_to_the_same_key() {
        let a = HandshakeSigner::from_pem(KEY).unwrap();
        let b = HandshakeSigner::from_pem(KEY_PKCS8).unwrap();
        // PKCS#1 v1.5 is deterministic.
        assert_eq!(a.sign("x"), b.sign("x"));
        assert!(HandshakeSigner::from_pem("garbage").is_err());
    }

    #[test]
    fn timestamp_keeps_high_bits() {
        let ts = kik_timestamp(1_700_000_000_000);
        assert_eq!(ts >> 8, 1_700_000_000_000 >> 8);
    }

    #[test]
    fn anonymous_set_is_complete() {
        let verifier = DeviceVerifier::new(default_version());
        let signer = HandshakeSigner::from_pem(KEY).unwrap();
        let ctx = HandshakeContext {
            verifier: &verifier,
            signer: &signer,
            lang: "en_US",
            session_id: "sid-1",
            timestamp: "1700000000000",
        };
        let attrs = anonymous_attributes(&ctx, "0123");
        let mut keys: Vec<&str> = attrs.iter().map(|(k, _)| k.as_str()).collect();
        keys.sort();
        assert_eq!(keys, ["anon", "conn", "cv", "dev", "lang", "signed", "sid", "ts", "v"]);
        let tag = render_stream_open(&attrs);
        assert!(tag.starts_with("<k ") && tag.ends_with('>') && !tag.ends_with("/>"));
        assert!(tag.contains("dev=\"CAN0123\""));
    }

    #[test]
    fn authenticated_set_binds_jid() {
        let verifier = DeviceVerifier::new(default_version());
        let signer = HandshakeSigner::from_pem(KEY).unwrap();
        let ctx = HandshakeContext {
            verifier: &verifier,
            signer: &signer,
            lang: "en_US",
            session_id: "sid-2",
            timestamp: "1700000000000",
        };
        let creds = Credentials::new("alice", "pw", "dev1", "and1");
        let attrs = authenticated_attributes(&ctx, &creds, "alice_x1y");
        let get = |key: &str| attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        assert_eq!(get("from"), Some("alice_x1y@talk.kik.com/CANdev1"));
        assert_eq!(get("p"), Some(creds.password_key().as_str()));
        assert_eq!(
            get("cv"),
            Some(verifier.cv("1700000000000", "alice_x1y@talk.kik.com").as_str())
        );
        assert_eq!(attrs.len(), 11);
    }
}

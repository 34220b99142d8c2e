use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};

use crate::version::ClientVersion;

type HmacSha1 = Hmac<Sha1>;

/// DER certificate of the APK signing key, hashed into the device token.
pub static APK_SIGNING_CERT: &[u8] = include_bytes!("../assets/apk_signing_cert.der");

/// Produces the device verification token and the `cv` values derived from it.
#[derive(Debug, Clone)]
pub struct DeviceVerifier {
    version: ClientVersion,
    token: String,
}

impl DeviceVerifier {
    pub fn new(version: ClientVersion) -> Self {
        Self::with_certificate(version, APK_SIGNING_CERT)
    }

    pub fn with_certificate(version: ClientVersion, certificate: &[u8]) -> Self {
        let token = device_verification_token(certificate, &version);
        Self { version, token }
    }

    pub fn version(&self) -> &ClientVersion {
        &self.version
    }

    /// base64(SHA-1("hello" + cert + version + digest + "bar")).
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The handshake `cv` attribute for a timestamp and a device id or JID.
    pub fn cv(&self, timestamp: &str, subject: &str) -> String {
        signed_hmac(format!("{timestamp}:{subject}").as_bytes(), self.token.as_bytes())
    }
}

pub fn device_verification_token(certificate: &[u8], version: &ClientVersion) -> String {
    let mut hasher = Sha1::new();
    hasher.update(b"hello");
    hasher.update(certificate);
    hasher.update(version.version.as_bytes());
    hasher.update(version.classes_digest.as_bytes());
    hasher.update(b"bar");
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Hex-encoded HMAC-SHA1 of `data` under `key`.
pub fn signed_hmac(data: &[u8], key: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

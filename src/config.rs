use kikcore::verification::DeviceVerifier;
use kikcore::version::resolve_version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::transport::{DEFAULT_HOST, DEFAULT_PORT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown client version '{0}' and no classes digest override given")]
    UnknownVersion(String),
    #[error("APK signing certificate override is not valid hex: {0}")]
    InvalidCertificate(#[from] hex::FromHexError),
}

/// Runtime settings. Every field has a default, so a config file only needs
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// Wait for `<k ok="1">` after sending the stream open tag.
    pub handshake_timeout_ms: u64,
    pub login_timeout_ms: u64,
    pub iq_timeout_ms: u64,
    /// Wait for the server `<ack>` of a sent message.
    pub ack_timeout_ms: u64,
    /// Wait for the peer's delivered receipt once the message was acked.
    pub receipt_timeout_ms: u64,
    pub lang: String,
    /// Client version to impersonate. `None` selects the newest known one.
    pub version: Option<String>,
    pub version_digest: Option<String>,
    pub apk_signature_hex: Option<String>,
    pub auto_ack_incoming: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 10_000,
            handshake_timeout_ms: 10_000,
            login_timeout_ms: 10_000,
            iq_timeout_ms: 20_000,
            ack_timeout_ms: 10_000,
            receipt_timeout_ms: 30_000,
            lang: "en_US".to_string(),
            version: None,
            version_digest: None,
            apk_signature_hex: None,
            auto_ack_incoming: true,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    pub fn iq_timeout(&self) -> Duration {
        Duration::from_millis(self.iq_timeout_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    /// Builds the device verifier for the configured version and certificate.
    pub fn device_verifier(&self) -> Result<DeviceVerifier, ConfigError> {
        let version = resolve_version(self.version.as_deref(), self.version_digest.as_deref())
            .ok_or_else(|| ConfigError::UnknownVersion(self.version.clone().unwrap_or_default()))?;
        Ok(match &self.apk_signature_hex {
            Some(cert_hex) => DeviceVerifier::with_certificate(version, &hex::decode(cert_hex.trim())?),
            None => DeviceVerifier::new(version),
        })
    }
}

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What the socket owner reports to the session.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connected,
    /// Bytes as read from the socket, not aligned to stanza boundaries.
    DataReceived(Bytes),
    /// The socket closed or failed. Nothing follows this event.
    Disconnected,
}

/// Write side of one connection to the chat server.
///
/// Implementations serialize writes; callers may send from any task.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, data: &[u8]) -> Result<()>;

    /// Closes the socket. Later sends fail.
    async fn disconnect(&self);
}

/// Opens connections to the chat server.
///
/// Every call must open a fresh connection; session establishment depends
/// on the login socket being replaced by a new one.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create_transport(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>)>;
}

/// A content upload: one `PUT` whose headers carry the account and the
/// content hashes.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn put(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            body,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// The upload host's answer. Error statuses may come without a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn status_only(status_code: u16) -> Self {
        Self {
            status_code,
            body: Bytes::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Performs uploads. Kept behind a trait so the core stays free of any
/// particular HTTP stack.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

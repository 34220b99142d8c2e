pub use kikcore::net::{Transport, TransportEvent, TransportFactory};

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, trace, warn};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

pub const DEFAULT_HOST: &str = "talk1110an.kik.com";
pub const DEFAULT_PORT: u16 = 5223;

const EVENT_CHANNEL_CAPACITY: usize = 100;
const OUTBOUND_CHANNEL_CAPACITY: usize = 32;
const READ_BUFFER_SIZE: usize = 16 * 1024;

enum Outbound {
    Data(Vec<u8>, oneshot::Sender<std::io::Result<()>>),
    Close,
}

/// A TLS connection driven by a single socket task.
///
/// The task is the only owner of the stream: reads are forwarded as
/// [`TransportEvent::DataReceived`] and writes arrive over a channel, so two
/// callers can never interleave bytes on the wire.
pub struct TlsTransport {
    outbound: mpsc::Sender<Outbound>,
    is_connected: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for TlsTransport {
    async fn send(&self, data: &[u8]) -> Result<(), anyhow::Error> {
        if !self.is_connected.load(Ordering::Relaxed) {
            return Err(anyhow!("Transport is not connected"));
        }
        let (done_tx, done_rx) = oneshot::channel();
        self.outbound
            .send(Outbound::Data(data.to_vec(), done_tx))
            .await
            .map_err(|_| anyhow!("Socket task has exited"))?;
        done_rx
            .await
            .map_err(|_| anyhow!("Socket task dropped the write"))?
            .context("Failed to write to socket")
    }

    async fn disconnect(&self) {
        if self.is_connected.swap(false, Ordering::SeqCst) {
            let _ = self.outbound.send(Outbound::Close).await;
        }
    }
}

/// Opens a fresh TLS connection per call.
pub struct TlsTransportFactory {
    host: String,
    port: u16,
    connect_timeout: Duration,
    tls_config: OnceCell<Arc<ClientConfig>>,
}

impl TlsTransportFactory {
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
            tls_config: OnceCell::new(),
        }
    }

    fn tls_config(&self) -> Result<Arc<ClientConfig>, anyhow::Error> {
        self.tls_config
            .get_or_try_init(|| {
                let mut roots = RootCertStore::empty();
                roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
                let config = ClientConfig::builder_with_provider(provider)
                    .with_safe_default_protocol_versions()
                    .context("TLS provider rejected the default protocol versions")?
                    .with_root_certificates(roots)
                    .with_no_client_auth();
                Ok::<_, anyhow::Error>(Arc::new(config))
            })
            .cloned()
    }
}

impl Default for TlsTransportFactory {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT, Duration::from_secs(10))
    }
}

#[async_trait]
impl TransportFactory for TlsTransportFactory {
    async fn create_transport(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        info!(target: "Transport", "Connecting to {}:{}", self.host, self.port);
        let tcp = timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| anyhow!("TCP connect to {} timed out", self.host))?
        .with_context(|| format!("TCP connect to {}:{} failed", self.host, self.port))?;

        let server_name = ServerName::try_from(self.host.clone())
            .with_context(|| format!("Invalid server name '{}'", self.host))?;
        let connector = TlsConnector::from(self.tls_config()?);
        let stream = timeout(self.connect_timeout, connector.connect(server_name, tcp))
            .await
            .map_err(|_| anyhow!("TLS handshake with {} timed out", self.host))?
            .context("TLS handshake failed")?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let is_connected = Arc::new(AtomicBool::new(true));

        tokio::spawn(socket_task(
            stream,
            outbound_rx,
            event_tx.clone(),
            is_connected.clone(),
        ));

        // The receiver is returned below, so this cannot fail.
        let _ = event_tx.send(TransportEvent::Connected).await;
        info!(target: "Transport", "TLS connection established");

        let transport = TlsTransport {
            outbound: outbound_tx,
            is_connected,
        };
        Ok((Arc::new(transport), event_rx))
    }
}

async fn socket_task<S>(
    mut stream: S,
    mut outbound: mpsc::Receiver<Outbound>,
    event_tx: mpsc::Sender<TransportEvent>,
    is_connected: Arc<AtomicBool>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            read = stream.read(&mut buf) => match read {
                Ok(0) => {
                    debug!(target: "Transport", "Peer closed the connection");
                    break;
                }
                Ok(n) => {
                    trace!(target: "Transport", "<-- {n} bytes");
                    let data = Bytes::copy_from_slice(&buf[..n]);
                    if event_tx.send(TransportEvent::DataReceived(data)).await.is_err() {
                        debug!(target: "Transport", "Event receiver dropped, closing socket");
                        break;
                    }
                }
                Err(e) => {
                    warn!(target: "Transport", "Socket read failed: {e}");
                    break;
                }
            },
            command = outbound.recv() => match command {
                Some(Outbound::Data(data, done)) => {
                    let result = async {
                        stream.write_all(&data).await?;
                        stream.flush().await
                    }
                    .await;
                    let failed = result.is_err();
                    let _ = done.send(result);
                    if failed {
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = stream.shutdown().await;
                    break;
                }
            },
        }
    }
    is_connected.store(false, Ordering::SeqCst);
    let _ = event_tx.send(TransportEvent::Disconnected).await;
}

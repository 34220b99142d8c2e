use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::handlers::router::StanzaRouter;
use crate::handshake;
use crate::http::{HttpClient, UreqHttpClient};
use crate::login::AuthRequest;
use crate::peer_cache::PeerCache;
use crate::qos::QosTracker;
use crate::session::{SessionState, SessionStateMachine};
use crate::transport::{Transport, TransportEvent, TransportFactory, TlsTransportFactory};
use crate::types::events::{ConnectionLost, Event, EventBus, EventHandler};
use kikcore::credentials::Credentials;
use kikcore::handshake::{
    ConnectionResult, HandshakeContext, HandshakeSigner, anonymous_attributes,
    authenticated_attributes, now_timestamp, render_stream_open,
};
use kikcore::id::IdGenerator;
use kikcore::stanza::DeviceProfile;
use kikcore::verification::DeviceVerifier;
use kikcore::xml::{Frame, Node, STREAM_CLOSE, StanzaFramer, marshal, unmarshal};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, oneshot};

/// Which handshake attribute set opens a stream.
#[derive(Debug, Clone, Copy)]
pub(crate) enum StreamKind<'a> {
    Anonymous,
    Authenticated { node: &'a str },
}

pub struct Client {
    pub(crate) config: ClientConfig,
    pub(crate) credentials: RwLock<Credentials>,
    pub(crate) verifier: DeviceVerifier,
    pub(crate) signer: HandshakeSigner,
    pub(crate) device: DeviceProfile,

    pub(crate) session: SessionStateMachine,
    pub(crate) transport: Mutex<Option<Arc<dyn Transport>>>,
    pub(crate) transport_factory: Arc<dyn TransportFactory>,
    /// Stops the reader task of the current connection.
    pub(crate) reader_stop: Mutex<Option<oneshot::Sender<()>>>,
    /// Bumped for every installed transport so a reader that outlives its
    /// connection cannot tear down the next one.
    pub(crate) connection_generation: AtomicU64,

    pub(crate) response_waiters: Mutex<HashMap<String, oneshot::Sender<Node>>>,
    pub(crate) ids: IdGenerator,
    pub(crate) qos: QosTracker,
    /// Login or registration parked on a captcha.
    pub(crate) pending_challenge: Mutex<Option<AuthRequest>>,

    pub(crate) peer_cache: Arc<PeerCache>,
    pub(crate) stanza_router: StanzaRouter,
    pub(crate) event_bus: EventBus,

    /// HTTP client for content uploads.
    pub http_client: Arc<dyn HttpClient>,
}

impl Client {
    /// Creates a client that connects over TLS to the configured endpoint.
    pub fn new(
        config: ClientConfig,
        credentials: Credentials,
        signer: HandshakeSigner,
    ) -> Result<Arc<Self>, ClientError> {
        let factory = Arc::new(TlsTransportFactory::new(
            config.host.clone(),
            config.port,
            config.connect_timeout(),
        ));
        Self::with_parts(
            config,
            credentials,
            signer,
            factory,
            Arc::new(UreqHttpClient::new()),
            Arc::new(PeerCache::new()),
        )
    }

    /// Creates a client from explicit collaborators. Passing the same
    /// `peer_cache` to several clients shares username resolution between them.
    pub fn with_parts(
        config: ClientConfig,
        credentials: Credentials,
        signer: HandshakeSigner,
        transport_factory: Arc<dyn TransportFactory>,
        http_client: Arc<dyn HttpClient>,
        peer_cache: Arc<PeerCache>,
    ) -> Result<Arc<Self>, ClientError> {
        let verifier = config.device_verifier()?;
        info!(
            target: "Client",
            "Emulating client version {}",
            verifier.version().version
        );
        Ok(Arc::new(Self {
            config,
            credentials: RwLock::new(credentials),
            verifier,
            signer,
            device: DeviceProfile::default(),
            session: SessionStateMachine::new(),
            transport: Mutex::new(None),
            transport_factory,
            reader_stop: Mutex::new(None),
            connection_generation: AtomicU64::new(0),
            response_waiters: Mutex::new(HashMap::new()),
            ids: IdGenerator::new(),
            qos: QosTracker::new(),
            pending_challenge: Mutex::new(None),
            peer_cache,
            stanza_router: crate::handlers::default_router(),
            event_bus: EventBus::new(),
            http_client,
        }))
    }

    pub fn subscribe_to_all_events(&self) -> broadcast::Receiver<Arc<Event>> {
        self.event_bus.subscribe()
    }

    /// Registers a synchronous handler. It runs on the reader task, so it
    /// must return quickly.
    pub fn add_event_handler(&self, handler: Arc<dyn EventHandler>) {
        self.event_bus.core.add_handler(handler);
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.session.current()
    }

    pub fn is_connected(&self) -> bool {
        self.session.current().is_connected()
    }

    pub fn is_established(&self) -> bool {
        self.session.current() == SessionState::SessionEstablished
    }

    /// Waits until the session is established.
    pub async fn wait_for_session(&self, limit: Duration) -> Result<(), ClientError> {
        if self
            .session
            .wait_for(SessionState::SessionEstablished, limit)
            .await
        {
            Ok(())
        } else {
            Err(ClientError::SessionTimeout(self.session.current()))
        }
    }

    /// A snapshot of the credentials, including the `node` captured at login.
    pub async fn credentials(&self) -> Credentials {
        self.credentials.read().await.clone()
    }

    pub async fn node(&self) -> Option<String> {
        self.credentials.read().await.node.clone()
    }

    pub fn peer_cache(&self) -> &Arc<PeerCache> {
        &self.peer_cache
    }

    /// Messages sent but not yet confirmed by a delivered receipt.
    pub fn pending_ack_count(&self) -> usize {
        self.qos.len()
    }

    pub async fn send_node(&self, node: Node) -> Result<(), ClientError> {
        let transport = self
            .transport
            .lock()
            .await
            .clone()
            .ok_or(ClientError::NotConnected)?;
        let xml = marshal(&node);
        debug!(target: "Client/Send", "--> {xml}");
        transport
            .send(xml.as_bytes())
            .await
            .map_err(ClientError::Transport)
    }

    /// Opens a new transport and performs the stream handshake. On success
    /// the transport is installed and a reader task owns its events.
    ///
    /// A `disconnect` while the handshake is in flight abandons it: the new
    /// socket is closed and `NotConnected` is returned.
    pub(crate) async fn open_stream(
        self: &Arc<Self>,
        kind: StreamKind<'_>,
    ) -> Result<ConnectionResult, ClientError> {
        self.session.transition(SessionState::TransportConnecting)?;
        let epoch = self.connection_generation.load(Ordering::SeqCst);
        let (transport, mut events) = match self.transport_factory.create_transport().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(target: "Client", "Failed to open transport: {e:#}");
                if self.connection_generation.load(Ordering::SeqCst) == epoch {
                    self.cleanup_connection_state().await;
                }
                return Err(ClientError::Transport(e));
            }
        };
        if let Err(e) = self.session.transition(SessionState::AwaitingHandshakeAck) {
            transport.disconnect().await;
            return Err(e.into());
        }

        let session_id = self.ids.next_id();
        let timestamp = now_timestamp();
        let open_tag = {
            let credentials = self.credentials.read().await;
            let ctx = HandshakeContext {
                verifier: &self.verifier,
                signer: &self.signer,
                lang: &self.config.lang,
                session_id: &session_id,
                timestamp: &timestamp,
            };
            let attrs = match kind {
                StreamKind::Anonymous => anonymous_attributes(&ctx, &credentials.device_id),
                StreamKind::Authenticated { node } => {
                    authenticated_attributes(&ctx, &credentials, node)
                }
            };
            render_stream_open(&attrs)
        };

        let mut framer = StanzaFramer::new();
        let handshake = handshake::do_handshake(
            transport.as_ref(),
            &mut events,
            &mut framer,
            &open_tag,
            self.config.handshake_timeout(),
        );
        let result = tokio::select! {
            result = handshake => result,
            _ = self.session.left(SessionState::AwaitingHandshakeAck) => {
                info!(target: "Client", "Handshake abandoned, connection was closed");
                transport.disconnect().await;
                return Err(ClientError::NotConnected);
            }
        };
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                warn!(target: "Client", "Handshake failed: {e}");
                transport.disconnect().await;
                if self.connection_generation.load(Ordering::SeqCst) == epoch {
                    self.cleanup_connection_state().await;
                }
                return Err(e.into());
            }
        };

        // Checked under the transport lock: a `disconnect` either sees the
        // installed transport or this sees its state change.
        let mut slot = self.transport.lock().await;
        if self.session.current() != SessionState::AwaitingHandshakeAck
            || self.connection_generation.load(Ordering::SeqCst) != epoch
        {
            drop(slot);
            info!(target: "Client", "Connection closed during handshake, dropping new socket");
            transport.disconnect().await;
            return Err(ClientError::NotConnected);
        }
        let generation = self.connection_generation.fetch_add(1, Ordering::SeqCst) + 1;
        *slot = Some(transport);
        let (stop_tx, stop_rx) = oneshot::channel();
        *self.reader_stop.lock().await = Some(stop_tx);
        drop(slot);

        let client = self.clone();
        tokio::spawn(async move {
            client
                .read_messages_loop(generation, events, framer, stop_rx)
                .await
        });
        Ok(result)
    }

    /// Stops the reader and closes the transport without touching session
    /// state. Used when the login socket is swapped for a new one.
    pub(crate) async fn close_transport(&self) {
        if let Some(stop) = self.reader_stop.lock().await.take() {
            let _ = stop.send(());
        }
        if let Some(transport) = self.transport.lock().await.take() {
            transport.disconnect().await;
        }
    }

    /// Gracefully closes the session: `</k>` is written before the socket
    /// is closed. Pending sends and IQs fail with a closed-connection error.
    pub async fn disconnect(&self) {
        if self.session.current() == SessionState::Disconnected {
            return;
        }
        info!(target: "Client", "Disconnecting client intentionally.");
        let _ = self.session.transition(SessionState::Closing);
        if let Some(stop) = self.reader_stop.lock().await.take() {
            let _ = stop.send(());
        }
        if let Some(transport) = self.transport.lock().await.take() {
            debug!(target: "Client/Send", "--> {STREAM_CLOSE}");
            if let Err(e) = transport.send(STREAM_CLOSE.as_bytes()).await {
                debug!(target: "Client", "Could not send stream close: {e:#}");
            }
            transport.disconnect().await;
        }
        self.cleanup_connection_state().await;
    }

    async fn cleanup_connection_state(&self) {
        // Invalidates readers and handshakes that belong to this connection.
        self.connection_generation.fetch_add(1, Ordering::SeqCst);
        self.session.reset();
        self.qos.fail_all();
        // Dropping the senders wakes every IQ waiter with a closed channel.
        self.response_waiters.lock().await.clear();
        self.pending_challenge.lock().await.take();
        self.ids.reset();
    }

    async fn read_messages_loop(
        self: Arc<Self>,
        generation: u64,
        mut transport_events: mpsc::Receiver<TransportEvent>,
        mut framer: StanzaFramer,
        mut stop: oneshot::Receiver<()>,
    ) {
        info!(target: "Client", "Starting message processing loop...");

        if self.drain_frames(&mut framer).await.is_break() {
            self.handle_stream_end(generation).await;
            return;
        }

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => {
                    debug!(target: "Client", "Reader stopped.");
                    return;
                }
                event = transport_events.recv() => match event {
                    Some(TransportEvent::DataReceived(data)) => {
                        framer.feed(&data);
                        if self.drain_frames(&mut framer).await.is_break() {
                            self.handle_stream_end(generation).await;
                            return;
                        }
                    }
                    Some(TransportEvent::Connected) => {
                        debug!(target: "Client", "Transport connected event received");
                    }
                    Some(TransportEvent::Disconnected) | None => {
                        self.handle_connection_lost(generation, "Transport disconnected unexpectedly")
                            .await;
                        return;
                    }
                }
            }
        }
    }

    /// Processes every complete stanza in `framer`, in order. Breaks when the
    /// server closed the stream.
    async fn drain_frames(self: &Arc<Self>, framer: &mut StanzaFramer) -> ControlFlow<()> {
        loop {
            match framer.decode_frame() {
                Ok(Some(Frame::Stanza(raw))) => match unmarshal(&raw) {
                    Ok(node) => {
                        debug!(target: "Client/Recv", "<-- {}", String::from_utf8_lossy(&raw));
                        self.process_node(node).await;
                    }
                    Err(e) => {
                        warn!(target: "Client/Recv", "Dropping unparsable stanza: {e}");
                    }
                },
                Ok(Some(Frame::StreamOpen(raw))) => {
                    warn!(
                        target: "Client/Recv",
                        "Ignoring unexpected stream open {}",
                        String::from_utf8_lossy(&raw)
                    );
                }
                Ok(Some(Frame::StreamEnd)) => return ControlFlow::Break(()),
                Ok(None) => return ControlFlow::Continue(()),
                Err(e) => {
                    warn!(target: "Client/Recv", "Dropping malformed stanza: {e}");
                }
            }
        }
    }

    pub(crate) async fn process_node(self: &Arc<Self>, node: Node) {
        if node.tag == "iq" && self.handle_iq_response(&node).await {
            return;
        }
        if !self.stanza_router.dispatch(self.clone(), &node).await {
            warn!(target: "Client", "Received unknown top-level node <{}>", node.tag);
        }
    }

    async fn handle_stream_end(&self, generation: u64) {
        info!(target: "Client", "Server closed the stream.");
        self.event_bus.dispatch(Event::StreamEnded);
        self.handle_connection_lost(generation, "Stream closed by server")
            .await;
    }

    async fn handle_connection_lost(&self, generation: u64, reason: &str) {
        if self.connection_generation.load(Ordering::SeqCst) != generation {
            debug!(target: "Client", "Ignoring loss of a replaced connection.");
            return;
        }
        if self.session.current() == SessionState::Disconnected {
            return;
        }
        warn!(target: "Client", "{reason}");
        self.reader_stop.lock().await.take();
        if let Some(transport) = self.transport.lock().await.take() {
            transport.disconnect().await;
        }
        self.cleanup_connection_state().await;
        self.event_bus
            .dispatch(Event::ConnectionLost(ConnectionLost {
                reason: reason.to_string(),
            }));
    }
}

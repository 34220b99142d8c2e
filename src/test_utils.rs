use crate::client::Client;
use crate::config::ClientConfig;
use crate::http::UreqHttpClient;
use crate::peer_cache::PeerCache;
use crate::transport::TransportEvent;
use crate::transport::mock::{MockTransport, MockTransportFactory};
use bytes::Bytes;
use kikcore::credentials::Credentials;
use kikcore::handshake::HandshakeSigner;
use std::sync::Arc;
use std::time::Duration;

const TEST_KEY: &str = include_str!("../kikcore/tests/fixtures/handshake_key.pem");

pub fn test_config() -> ClientConfig {
    ClientConfig {
        handshake_timeout_ms: 2_000,
        login_timeout_ms: 2_000,
        iq_timeout_ms: 2_000,
        ack_timeout_ms: 200,
        receipt_timeout_ms: 200,
        ..ClientConfig::default()
    }
}

pub fn create_test_client() -> (Arc<Client>, Arc<MockTransportFactory>) {
    create_test_client_with(test_config(), Credentials::with_random_device("alice", "secret"))
}

pub fn create_test_client_with(
    config: ClientConfig,
    credentials: Credentials,
) -> (Arc<Client>, Arc<MockTransportFactory>) {
    let factory = Arc::new(MockTransportFactory::new());
    let signer = HandshakeSigner::from_pem(TEST_KEY).expect("test key parses");
    let client = Client::with_parts(
        config,
        credentials,
        signer,
        factory.clone(),
        Arc::new(UreqHttpClient::new()),
        Arc::new(PeerCache::new()),
    )
    .expect("test client builds");
    (client, factory)
}

async fn wait_for_transport(
    factory: &MockTransportFactory,
    index: usize,
) -> (Arc<MockTransport>, tokio::sync::mpsc::Sender<TransportEvent>) {
    for _ in 0..400 {
        if let Some(entry) = factory.transports.lock().unwrap().get(index).cloned() {
            return entry;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("transport {index} was never created");
}

/// Plays the server: delivers `xml` on the `index`-th connection.
pub async fn server_send(factory: &MockTransportFactory, index: usize, xml: &str) {
    let (_, tx) = wait_for_transport(factory, index).await;
    tx.send(TransportEvent::DataReceived(Bytes::copy_from_slice(
        xml.as_bytes(),
    )))
    .await
    .expect("reader is alive");
}

/// Waits until the client wrote something matching `pred` on the `index`-th
/// connection and returns it.
pub async fn wait_for_sent(
    factory: &MockTransportFactory,
    index: usize,
    pred: impl Fn(&str) -> bool,
) -> String {
    let (transport, _) = wait_for_transport(factory, index).await;
    for _ in 0..400 {
        if let Some(found) = transport.sent_strings().into_iter().find(|s| pred(s)) {
            return found;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("nothing matching was sent on transport {index}");
}

/// Extracts an attribute value from serialized XML.
pub fn attr_value(xml: &str, name: &str) -> Option<String> {
    let marker = format!(" {name}=\"");
    let start = xml.find(&marker)? + marker.len();
    let end = xml[start..].find('"')? + start;
    Some(xml[start..end].to_string())
}

/// Connects a client whose server accepts the stream as already authenticated.
pub async fn connect_established(client: &Arc<Client>, factory: &Arc<MockTransportFactory>) {
    let server = tokio::spawn({
        let factory = factory.clone();
        async move { server_send(&factory, 0, "<k ok=\"1\" ts=\"1\">").await }
    });
    client.connect().await.expect("connects");
    server.await.expect("server task");
}

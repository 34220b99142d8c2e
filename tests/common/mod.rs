// tests/common/mod.rs
//
// A scripted in-memory server. Every connection the client opens gets its
// own index; each write is answered by the script with zero or more replies.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use kik_rust::transport::{Transport, TransportEvent, TransportFactory};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const TEST_KEY: &str = include_str!("../../kikcore/tests/fixtures/handshake_key.pem");

pub type Script = dyn Fn(usize, &str) -> Vec<String> + Send + Sync;

pub struct FakeServer {
    script: Arc<Script>,
    log: Arc<Mutex<Vec<(usize, String)>>>,
    connections: AtomicUsize,
}

impl FakeServer {
    pub fn new(script: impl Fn(usize, &str) -> Vec<String> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Arc::new(script),
            log: Arc::new(Mutex::new(Vec::new())),
            connections: AtomicUsize::new(0),
        })
    }

    /// Everything the client wrote, with the connection it was written on.
    pub fn received(&self) -> Vec<(usize, String)> {
        self.log.lock().unwrap().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportFactory for FakeServer {
    async fn create_transport(
        &self,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        let index = self.connections.fetch_add(1, Ordering::SeqCst);
        let (events, rx) = mpsc::channel(64);
        events.send(TransportEvent::Connected).await?;
        let connection = FakeConnection {
            index,
            script: self.script.clone(),
            log: self.log.clone(),
            events,
            closed: AtomicBool::new(false),
        };
        Ok((Arc::new(connection), rx))
    }
}

struct FakeConnection {
    index: usize,
    script: Arc<Script>,
    log: Arc<Mutex<Vec<(usize, String)>>>,
    events: mpsc::Sender<TransportEvent>,
    closed: AtomicBool,
}

#[async_trait]
impl Transport for FakeConnection {
    async fn send(&self, data: &[u8]) -> Result<(), anyhow::Error> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("connection {} is closed", self.index);
        }
        let text = String::from_utf8_lossy(data).into_owned();
        self.log.lock().unwrap().push((self.index, text.clone()));
        for reply in (self.script)(self.index, &text) {
            let _ = self
                .events
                .send(TransportEvent::DataReceived(Bytes::from(reply)))
                .await;
        }
        Ok(())
    }

    async fn disconnect(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::Disconnected).await;
        }
    }
}

/// Reads an attribute from serialized XML.
pub fn attr(xml: &str, name: &str) -> Option<String> {
    let marker = format!(" {name}=\"");
    let start = xml.find(&marker)? + marker.len();
    let end = xml[start..].find('"')? + start;
    Some(xml[start..end].to_string())
}

pub fn register_reply(request: &str, query_body: &str) -> String {
    format!(
        r#"<iq type="result" id="{}"><query xmlns="jabber:iq:register">{query_body}</query></iq>"#,
        attr(request, "id").unwrap_or_default()
    )
}

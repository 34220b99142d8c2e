use crate::transport::{Transport, TransportEvent};
use kikcore::handshake::ConnectionResult;
use kikcore::xml::{
    Frame, FramingError, STREAM_CLOSE, StanzaFramer, XmlError, unmarshal, unmarshal_open_tag,
};
use log::{debug, info, warn};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),
    #[error("Timed out waiting for handshake response")]
    Timeout,
    #[error("Unexpected event during handshake: {0}")]
    UnexpectedEvent(String),
    #[error("Server rejected the handshake: {raw}")]
    Rejected { raw: String },
    #[error("Malformed handshake response: {0}")]
    Malformed(#[from] XmlError),
    #[error("Framing error during handshake: {0}")]
    Framing(#[from] FramingError),
}

type Result<T> = std::result::Result<T, HandshakeError>;

/// How long a rejected stream may keep sending its error payload.
const REJECTION_GRACE: Duration = Duration::from_millis(500);

/// Sends the stream open tag and waits for the server's `<k>` verdict.
///
/// Bytes that follow the verdict stay buffered in `framer` for the reader
/// that takes over the connection.
pub async fn do_handshake(
    transport: &dyn Transport,
    transport_events: &mut mpsc::Receiver<TransportEvent>,
    framer: &mut StanzaFramer,
    open_tag: &str,
    response_timeout: Duration,
) -> Result<ConnectionResult> {
    debug!(target: "Handshake", "--> {open_tag}");
    transport.send(open_tag.as_bytes()).await?;

    let deadline = Instant::now() + response_timeout;
    loop {
        while let Some(frame) = framer.decode_frame()? {
            match frame {
                Frame::StreamOpen(raw) => {
                    let node = unmarshal_open_tag(&raw)?;
                    let mut result =
                        ConnectionResult::from_node(&node, String::from_utf8_lossy(&raw));
                    if !result.accepted {
                        let grace = deadline.min(Instant::now() + REJECTION_GRACE);
                        collect_rejection(transport_events, framer, &mut result.raw, grace)
                            .await;
                    }
                    return accept(result);
                }
                Frame::Stanza(raw) => {
                    let node = unmarshal(&raw)?;
                    if node.tag == "k" {
                        return accept(ConnectionResult::from_node(
                            &node,
                            String::from_utf8_lossy(&raw),
                        ));
                    }
                    warn!(target: "Handshake", "Ignoring <{}> received before the stream was accepted", node.tag);
                }
                Frame::StreamEnd => {
                    return Err(HandshakeError::UnexpectedEvent(
                        "Stream closed during handshake".to_string(),
                    ));
                }
            }
        }

        match timeout_at(deadline, transport_events.recv()).await {
            Ok(Some(TransportEvent::DataReceived(data))) => framer.feed(&data),
            Ok(Some(TransportEvent::Connected)) => continue,
            Ok(Some(TransportEvent::Disconnected)) | Ok(None) => {
                return Err(HandshakeError::UnexpectedEvent(
                    "Disconnected during handshake".to_string(),
                ));
            }
            Err(_) => return Err(HandshakeError::Timeout),
        }
    }
}

/// Appends the children of a rejecting `<k ok="0">` to `raw` until the
/// server closes the stream, the socket drops or `until` passes.
async fn collect_rejection(
    transport_events: &mut mpsc::Receiver<TransportEvent>,
    framer: &mut StanzaFramer,
    raw: &mut String,
    until: Instant,
) {
    loop {
        loop {
            match framer.decode_frame() {
                Ok(Some(Frame::Stanza(child))) => raw.push_str(&String::from_utf8_lossy(&child)),
                Ok(Some(Frame::StreamEnd)) => {
                    raw.push_str(STREAM_CLOSE);
                    return;
                }
                Ok(Some(Frame::StreamOpen(_))) => {}
                Ok(None) => break,
                Err(e) => debug!(target: "Handshake", "Unreadable rejection payload: {e}"),
            }
        }
        match timeout_at(until, transport_events.recv()).await {
            Ok(Some(TransportEvent::DataReceived(data))) => framer.feed(&data),
            Ok(Some(TransportEvent::Connected)) => {}
            Ok(Some(TransportEvent::Disconnected)) | Ok(None) | Err(_) => return,
        }
    }
}

fn accept(result: ConnectionResult) -> Result<ConnectionResult> {
    debug!(target: "Handshake", "<-- {}", result.raw);
    if result.accepted {
        info!(
            target: "Handshake",
            "Stream accepted{}",
            if result.server_timestamp.is_some() { " (authenticated)" } else { "" }
        );
        Ok(result)
    } else {
        Err(HandshakeError::Rejected { raw: result.raw })
    }
}

use dashmap::DashMap;
use kikcore::stanza::{Receipt, ReceiptKind};
use kikcore::xml::Jid;
use log::{debug, warn};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// A sent message waiting for its server ack and receipts.
#[derive(Debug)]
struct PendingAcknowledgement {
    to: Jid,
    requires_delivery_receipt: bool,
    requires_read_receipt: bool,
    sent_at: Instant,
    ack: Option<oneshot::Sender<()>>,
    delivered: Option<oneshot::Sender<Receipt>>,
}

impl PendingAcknowledgement {
    /// Whether every receipt the message asked for has been seen.
    fn settled(&self, read_seen: bool) -> bool {
        let delivered_open = self.requires_delivery_receipt && self.delivered.is_some();
        let read_open = self.requires_read_receipt && !read_seen;
        !delivered_open && !read_open
    }
}

/// Receivers for one tracked message. Both resolve with `Err` if the
/// connection goes away first.
#[derive(Debug)]
pub struct PendingHandle {
    pub ack: oneshot::Receiver<()>,
    /// Resolved by a delivered receipt, or by a read receipt arriving first.
    pub delivered: oneshot::Receiver<Receipt>,
}

/// Correlates outgoing message ids with `<ack>` and receipts.
/// Keyed by id, so any number of sends may be in flight.
#[derive(Debug, Default)]
pub struct QosTracker {
    pending: DashMap<String, PendingAcknowledgement>,
}

impl QosTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a message that requested both delivered and read receipts.
    pub fn register(&self, id: &str, to: Jid) -> PendingHandle {
        let (ack_tx, ack_rx) = oneshot::channel();
        let (delivered_tx, delivered_rx) = oneshot::channel();
        let previous = self.pending.insert(
            id.to_string(),
            PendingAcknowledgement {
                to,
                requires_delivery_receipt: true,
                requires_read_receipt: true,
                sent_at: Instant::now(),
                ack: Some(ack_tx),
                delivered: Some(delivered_tx),
            },
        );
        if previous.is_some() {
            warn!(target: "Client/QoS", "Replaced a pending entry for reused id {id}");
        }
        PendingHandle {
            ack: ack_rx,
            delivered: delivered_rx,
        }
    }

    /// Resolves the ack half. Returns `false` for ids nobody waits on.
    pub fn on_ack(&self, id: &str) -> bool {
        let Some(mut entry) = self.pending.get_mut(id) else {
            return false;
        };
        match entry.ack.take() {
            Some(tx) => {
                debug!(target: "Client/QoS", "Ack for {id} to {}", entry.to);
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Applies a delivered or read receipt to message `id`.
    ///
    /// A read receipt implies delivery, so either kind completes the
    /// delivered half; the ack half is released first if the server ack never
    /// showed up. The entry is forgotten once every requested receipt was
    /// seen. Returns `true` only if a waiting send received `receipt`.
    pub fn on_receipt(&self, id: &str, receipt: &Receipt) -> bool {
        let Some(mut entry) = self.pending.get_mut(id) else {
            return false;
        };
        if let Some(tx) = entry.ack.take() {
            let _ = tx.send(());
        }
        let handed_over = match entry.delivered.take() {
            Some(tx) => {
                debug!(
                    target: "Client/QoS",
                    "{:?} receipt for {id} to {} after {:?}",
                    receipt.kind,
                    entry.to,
                    entry.sent_at.elapsed()
                );
                tx.send(receipt.clone()).is_ok()
            }
            None => false,
        };
        let settled = entry.settled(receipt.kind == ReceiptKind::Read);
        drop(entry);
        if settled {
            self.pending.remove(id);
        }
        handed_over
    }

    pub fn remove(&self, id: &str) -> bool {
        self.pending.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops every entry so their waiters observe a closed connection.
    pub fn fail_all(&self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        if count > 0 {
            warn!(target: "Client/QoS", "Failing {count} unconfirmed message(s)");
        }
        count
    }
}

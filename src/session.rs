use log::{debug, warn};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Connection lifecycle as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    TransportConnecting,
    AwaitingHandshakeAck,
    AwaitingAuthResult,
    SessionEstablished,
    Closing,
}

impl SessionState {
    /// Whether `next` is a legal successor of `self`.
    ///
    /// `AwaitingAuthResult -> TransportConnecting` is the establish-session
    /// reconnect: the login socket is dropped and a new one is opened.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Disconnected, TransportConnecting) => true,
            (Disconnected, _) => false,
            (_, Disconnected) => true,
            (Closing, _) => false,
            (_, Closing) => true,
            (TransportConnecting, AwaitingHandshakeAck) => true,
            (AwaitingHandshakeAck, AwaitingAuthResult | SessionEstablished) => true,
            (AwaitingAuthResult, SessionEstablished | TransportConnecting) => true,
            _ => false,
        }
    }

    pub fn is_connected(self) -> bool {
        !matches!(self, SessionState::Disconnected | SessionState::Closing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal session transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Owns the current [`SessionState`] and lets any task observe it.
#[derive(Debug)]
pub struct SessionStateMachine {
    state: watch::Sender<SessionState>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(SessionState::Disconnected),
        }
    }

    pub fn current(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn transition(&self, next: SessionState) -> Result<(), InvalidTransition> {
        let mut result = Ok(());
        self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                debug!(target: "Session", "{state} -> {next}");
                *state = next;
                true
            } else {
                result = Err(InvalidTransition {
                    from: *state,
                    to: next,
                });
                false
            }
        });
        if let Err(e) = &result {
            warn!(target: "Session", "Rejected {e}");
        }
        result
    }

    /// Moves to `Disconnected` from wherever the session is. Returns the
    /// previous state.
    pub fn reset(&self) -> SessionState {
        let previous = self.state.send_replace(SessionState::Disconnected);
        if previous != SessionState::Disconnected {
            debug!(target: "Session", "{previous} -> Disconnected");
        }
        previous
    }

    /// Resolves once the state is no longer `state`.
    pub async fn left(&self, state: SessionState) {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|s| *s != state).await;
    }

    /// Waits until the state equals `target`. Returns `false` on timeout.
    pub async fn wait_for(&self, target: SessionState, limit: Duration) -> bool {
        let mut rx = self.subscribe();
        matches!(
            tokio::time::timeout(limit, rx.wait_for(|s| *s == target)).await,
            Ok(Ok(_))
        )
    }
}

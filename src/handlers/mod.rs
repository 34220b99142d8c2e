pub mod ack;
pub mod iq;
pub mod message;
pub mod router;
pub mod traits;

use router::StanzaRouter;
use std::sync::Arc;

/// The router every client starts with.
pub(crate) fn default_router() -> StanzaRouter {
    let mut router = StanzaRouter::new();
    router.register(Arc::new(ack::AckHandler::new()));
    router.register(Arc::new(iq::IqHandler::new()));
    router.register(Arc::new(message::MessageHandler::new()));
    router
}

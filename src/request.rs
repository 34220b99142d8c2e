pub use kikcore::request::{InfoQuery, InfoQueryType, IqError};

use crate::client::Client;
use crate::error::ClientError;
use kikcore::request::check_iq_response;
use kikcore::xml::Node;
use log::{debug, warn};
use tokio::sync::oneshot;
use tokio::time::timeout;

impl Client {
    /// Sends an IQ and waits for the reply with the same id, without
    /// interpreting `type="error"`. Login needs the raw reply because its
    /// failures (captcha, wrong password) arrive as error-typed IQs.
    pub(crate) async fn send_iq_raw(&self, query: InfoQuery<'_>) -> Result<Node, IqError> {
        let req_id = self.ids.next_id();
        let (tx, rx) = oneshot::channel();
        self.response_waiters
            .lock()
            .await
            .insert(req_id.clone(), tx);

        let node = query.build(&req_id);
        if let Err(e) = self.send_node(node).await {
            self.response_waiters.lock().await.remove(&req_id);
            return Err(match e {
                ClientError::NotConnected => IqError::NotConnected,
                other => IqError::Network(other.to_string()),
            });
        }

        let limit = query.timeout.unwrap_or_else(|| self.config.iq_timeout());
        match timeout(limit, rx).await {
            Ok(Ok(response)) => Ok(response),
            // The waiter map is cleared when the connection goes away.
            Ok(Err(_)) => Err(IqError::ConnectionClosed),
            Err(_) => {
                self.response_waiters.lock().await.remove(&req_id);
                debug!(target: "Client/IQ", "IQ {req_id} ({}) timed out", query.namespace);
                Err(IqError::Timeout)
            }
        }
    }

    /// Sends an IQ (Info/Query) stanza and asynchronously waits for a response.
    ///
    /// Error replies are returned as [`IqError::ServerError`].
    pub async fn send_iq(&self, query: InfoQuery<'_>) -> Result<Node, IqError> {
        let response = self.send_iq_raw(query).await?;
        check_iq_response(&response)?;
        Ok(response)
    }

    /// Handles an incoming IQ response by forwarding it to the waiting task.
    pub(crate) async fn handle_iq_response(&self, node: &Node) -> bool {
        let Some(id) = node.get_attr("id") else {
            return false;
        };
        let Some(waiter) = self.response_waiters.lock().await.remove(id) else {
            return false;
        };
        if waiter.send(node.clone()).is_err() {
            warn!(target: "Client/IQ", "Failed to send IQ response to waiter for ID {id}. Receiver was likely dropped.");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        attr_value, connect_established, create_test_client, server_send, wait_for_sent,
    };
    use kikcore::stanza::roster::roster_query;
    use std::time::Duration;

    #[tokio::test]
    async fn reply_is_routed_by_id() {
        let (client, factory) = create_test_client();
        connect_established(&client, &factory).await;

        let request = tokio::spawn({
            let client = client.clone();
            async move { client.send_iq(roster_query()).await }
        });
        let sent = wait_for_sent(&factory, 0, |s| s.starts_with("<iq")).await;
        let id = attr_value(&sent, "id").unwrap();
        server_send(
            &factory,
            0,
            &format!(r#"<iq type="error" id="{id}"><error code="404"><text>nope</text></error></iq>"#),
        )
        .await;
        match request.await.unwrap() {
            Err(IqError::ServerError { code, text }) => {
                assert_eq!(code, 404);
                assert_eq!(text, "nope");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(client.response_waiters.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unanswered_iq_times_out_and_forgets_waiter() {
        let (client, factory) = create_test_client();
        connect_established(&client, &factory).await;
        let err = client
            .send_iq(roster_query().with_timeout(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, IqError::Timeout));
        assert!(client.response_waiters.lock().await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_releases_waiters() {
        let (client, factory) = create_test_client();
        connect_established(&client, &factory).await;
        let request = tokio::spawn({
            let client = client.clone();
            async move { client.send_iq(roster_query()).await }
        });
        wait_for_sent(&factory, 0, |s| s.starts_with("<iq")).await;
        client.disconnect().await;
        assert!(matches!(
            request.await.unwrap(),
            Err(IqError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn iq_without_connection_fails_fast() {
        let (client, _factory) = create_test_client();
        assert!(matches!(
            client.send_iq(roster_query()).await,
            Err(IqError::NotConnected)
        ));
    }
}

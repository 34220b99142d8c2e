use crate::client::{Client, StreamKind};
use crate::error::ClientError;
use crate::session::SessionState;
use crate::types::events::{Connected, Event};
use kikcore::stanza::login::parse_register_result;
use kikcore::stanza::{LoginFailure, LoginRequest, LoginResult, RegisterRequest};
use kikcore::xml::marshal;
use log::{info, warn};
use std::sync::Arc;

/// Account details for [`Client::register`]. The login identifier and
/// password come from the client's credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// `YYYY-MM-DD`.
    pub birthday: String,
}

/// What the anonymous connection was opened for. Kept while a captcha is
/// outstanding so the same request can be resubmitted with the answer.
#[derive(Debug, Clone)]
pub(crate) enum AuthRequest {
    Login,
    Register(Registration),
}

impl Client {
    /// Connects and brings the session to `SessionEstablished`.
    ///
    /// With a known `node` the stream is opened authenticated right away.
    /// Otherwise the client logs in over an anonymous stream first and then
    /// reconnects on a new socket.
    ///
    /// A [`LoginFailure::CaptchaRequired`] error leaves the anonymous stream
    /// open; answer it with [`Client::submit_captcha`].
    pub async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        self.ensure_disconnected()?;
        let node = self.credentials.read().await.node.clone();
        match node {
            Some(node) => self.connect_authenticated(&node).await,
            None => {
                if self.open_anonymous().await? {
                    return Ok(());
                }
                self.authenticate(AuthRequest::Login, None).await.map(|_| ())
            }
        }
    }

    /// Logs in over a fresh anonymous stream even if a `node` is stored.
    pub async fn login(self: &Arc<Self>) -> Result<LoginResult, ClientError> {
        self.ensure_disconnected()?;
        self.open_anonymous_for_auth().await?;
        self.authenticate(AuthRequest::Login, None).await
    }

    /// Creates an account over an anonymous stream, then establishes the
    /// session like a login does.
    pub async fn register(
        self: &Arc<Self>,
        registration: Registration,
    ) -> Result<LoginResult, ClientError> {
        self.ensure_disconnected()?;
        self.open_anonymous_for_auth().await?;
        self.authenticate(AuthRequest::Register(registration), None)
            .await
    }

    /// Resubmits the login or registration that was answered with a captcha.
    pub async fn submit_captcha(
        self: &Arc<Self>,
        response: &str,
    ) -> Result<LoginResult, ClientError> {
        if self.session.current() != SessionState::AwaitingAuthResult {
            return Err(ClientError::NoPendingChallenge);
        }
        let request = self
            .pending_challenge
            .lock()
            .await
            .take()
            .ok_or(ClientError::NoPendingChallenge)?;
        self.authenticate(request, Some(response)).await
    }

    fn ensure_disconnected(&self) -> Result<(), ClientError> {
        if self.session.current() == SessionState::Disconnected {
            Ok(())
        } else {
            Err(ClientError::AlreadyConnected)
        }
    }

    async fn connect_authenticated(self: &Arc<Self>, node: &str) -> Result<(), ClientError> {
        self.open_stream(StreamKind::Authenticated { node }).await?;
        self.session_established(node).await
    }

    /// Opens an anonymous stream. Returns `true` if the server already
    /// treats it as authenticated.
    async fn open_anonymous(self: &Arc<Self>) -> Result<bool, ClientError> {
        let result = self.open_stream(StreamKind::Anonymous).await?;
        if result.server_timestamp.is_some() {
            self.session.transition(SessionState::SessionEstablished)?;
            info!(target: "Client", "Anonymous stream accepted as authenticated");
            self.event_bus
                .dispatch(Event::Connected(Connected { authenticated: true }));
            return Ok(true);
        }
        self.session.transition(SessionState::AwaitingAuthResult)?;
        self.event_bus
            .dispatch(Event::Connected(Connected { authenticated: false }));
        Ok(false)
    }

    async fn open_anonymous_for_auth(self: &Arc<Self>) -> Result<(), ClientError> {
        if self.open_anonymous().await? {
            self.disconnect().await;
            return Err(ClientError::UnexpectedResponse(
                "anonymous stream was accepted as authenticated".to_string(),
            ));
        }
        Ok(())
    }

    async fn authenticate(
        self: &Arc<Self>,
        request: AuthRequest,
        captcha_response: Option<&str>,
    ) -> Result<LoginResult, ClientError> {
        let query = {
            let credentials = self.credentials.read().await;
            let version = self.verifier.version().version.as_str();
            match &request {
                AuthRequest::Login => LoginRequest {
                    credentials: &credentials,
                    version,
                    lang: &self.config.lang,
                    device: &self.device,
                    captcha_response,
                }
                .to_query(),
                AuthRequest::Register(registration) => RegisterRequest {
                    credentials: &credentials,
                    email: &registration.email,
                    first_name: &registration.first_name,
                    last_name: &registration.last_name,
                    birthday: &registration.birthday,
                    version,
                    lang: &self.config.lang,
                    device: &self.device,
                    captcha_response,
                }
                .to_query(),
            }
        }
        .with_timeout(self.config.login_timeout());

        let response = match self.send_iq_raw(query).await {
            Ok(response) => response,
            Err(e) => {
                warn!(target: "Client", "Login request failed: {e}");
                self.disconnect().await;
                return Err(e.into());
            }
        };
        let Some(outcome) = parse_register_result(&response) else {
            self.disconnect().await;
            return Err(ClientError::UnexpectedResponse(marshal(&response)));
        };

        match outcome {
            Ok(result) => {
                info!(target: "Client", "Logged in as node {}", result.node);
                self.credentials.write().await.node = Some(result.node.clone());
                self.event_bus.dispatch(Event::LoginSuccess(result.clone()));
                self.establish_session(&result.node).await?;
                Ok(result)
            }
            Err(failure @ LoginFailure::CaptchaRequired { .. }) => {
                warn!(target: "Client", "Login needs a captcha: {failure}");
                *self.pending_challenge.lock().await = Some(request);
                self.event_bus.dispatch(Event::LoginError(failure.clone()));
                Err(failure.into())
            }
            Err(failure) => {
                warn!(target: "Client", "Login rejected: {failure}");
                self.event_bus.dispatch(Event::LoginError(failure.clone()));
                self.disconnect().await;
                Err(failure.into())
            }
        }
    }

    /// Drops the login socket and opens a new, authenticated one. The
    /// server does not accept the session on the socket the login ran on.
    async fn establish_session(self: &Arc<Self>, node: &str) -> Result<(), ClientError> {
        self.close_transport().await;
        self.open_stream(StreamKind::Authenticated { node }).await?;
        self.session_established(node).await
    }

    async fn session_established(&self, node: &str) -> Result<(), ClientError> {
        self.session.transition(SessionState::SessionEstablished)?;
        info!(target: "Client", "Session established for {node}");
        self.event_bus
            .dispatch(Event::Connected(Connected { authenticated: true }));
        self.event_bus.dispatch(Event::Authenticated {
            node: node.to_string(),
        });
        Ok(())
    }
}

//! Connection manager.
//!
//! Owns the one live connection to the job server. Defines the `Connector`
//! and `Session` traits the transport implements, and a state machine
//! {Disconnected, Connecting, Connected} with at most one pending reconnect
//! timer. The timer is armed on every close while a token is held, fires
//! after a fixed delay (no backoff), and is dropped on logout or once a
//! connection succeeds.

pub mod ws;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::Sleep;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::protocol::{self, ClientCommand};

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// One open, bidirectional text-frame connection.
#[async_trait]
pub trait Session: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next inbound text frame. `None` once the peer has closed;
    /// `Some(Err(_))` on a transport error.
    async fn next_text(&mut self) -> Option<Result<String>>;

    /// Close the connection. Errors are ignored.
    async fn close(&mut self);
}

/// Opens sessions to a URL.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    async fn open(&self, url: &Url) -> Result<Self::Session>;
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// What happened on the link since the last call to `next_event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A (re)connection succeeded and the bootstrap commands were sent.
    Connected,
    /// An inbound text frame.
    Frame(String),
    /// The connection dropped or a reconnect attempt failed.
    Disconnected,
}

pub struct ConnectionManager<C: Connector> {
    connector: C,
    endpoint: Url,
    reconnect_delay: Duration,
    token: Option<SecretString>,
    state: ConnectionState,
    session: Option<C::Session>,
    session_id: Option<Uuid>,
    retry: Option<Pin<Box<Sleep>>>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, endpoint: Url, reconnect_delay: Duration) -> Self {
        Self {
            connector,
            endpoint,
            reconnect_delay,
            token: None,
            state: ConnectionState::Disconnected,
            session: None,
            session_id: None,
            retry: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Whether a reconnect attempt is scheduled.
    pub fn retry_pending(&self) -> bool {
        self.retry.is_some()
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Open the connection with `token`. No-op while a connection is open.
    ///
    /// Returns whether the client is connected afterwards. A failed attempt
    /// arms the reconnect timer.
    pub async fn connect(&mut self, token: SecretString) -> bool {
        if self.is_connected() {
            debug!("Already connected, ignoring connect request");
            return true;
        }
        self.token = Some(token);
        self.open_session().await
    }

    /// Forget the token and tear the connection down. Cancels any pending
    /// reconnect.
    pub async fn logout(&mut self) {
        self.token = None;
        self.retry = None;
        if let Some(mut session) = self.session.take() {
            session.close().await;
            info!(session = ?self.session_id, "Connection closed on logout");
        }
        self.session_id = None;
        self.state = ConnectionState::Disconnected;
    }

    /// Send a command. A silent no-op while disconnected: nothing is queued.
    pub async fn send_command(&mut self, command: &ClientCommand) {
        let Some(session) = self.session.as_mut() else {
            debug!(command = %command, "Not connected, dropping command");
            return;
        };
        let frame = match protocol::encode(command) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(command = %command, error = %e, "Failed to encode command");
                return;
            }
        };
        if let Err(e) = session.send_text(frame).await {
            warn!(command = %command, error = %e, "Send failed, treating as disconnect");
            self.handle_close();
        }
    }

    /// Wait for the next link event.
    ///
    /// Returns `None` when there is nothing to wait for: no open connection
    /// and no reconnect scheduled (logged out, or never authenticated).
    pub async fn next_event(&mut self) -> Option<LinkEvent> {
        if let Some(session) = self.session.as_mut() {
            return match session.next_text().await {
                Some(Ok(text)) => Some(LinkEvent::Frame(text)),
                Some(Err(e)) => {
                    warn!(session = ?self.session_id, error = %e, "Transport error");
                    self.handle_close();
                    Some(LinkEvent::Disconnected)
                }
                None => {
                    info!(session = ?self.session_id, "Connection closed by server");
                    self.handle_close();
                    Some(LinkEvent::Disconnected)
                }
            };
        }

        let timer = self.retry.as_mut()?;
        timer.as_mut().await;
        self.retry = None;
        info!("Attempting to reconnect");
        if self.open_session().await {
            Some(LinkEvent::Connected)
        } else {
            Some(LinkEvent::Disconnected)
        }
    }

    async fn open_session(&mut self) -> bool {
        let Some(url) = self.authenticated_url() else {
            debug!("No token, not connecting");
            return false;
        };
        self.state = ConnectionState::Connecting;

        let mut session = match self.connector.open(&url).await {
            Ok(session) => session,
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Connection attempt failed");
                self.handle_close();
                return false;
            }
        };

        for command in ClientCommand::BOOTSTRAP {
            let sent = match protocol::encode(&command) {
                Ok(frame) => session.send_text(frame).await,
                Err(e) => Err(e.into()),
            };
            if let Err(e) = sent {
                warn!(command = %command, error = %e, "Bootstrap send failed");
                session.close().await;
                self.handle_close();
                return false;
            }
        }

        let id = Uuid::new_v4();
        self.session = Some(session);
        self.session_id = Some(id);
        self.state = ConnectionState::Connected;
        self.retry = None;
        info!(session = %id, endpoint = %self.endpoint, "Connected");
        true
    }

    /// Drop the session and, if still authenticated, arm the single
    /// reconnect timer (replacing any pending one).
    fn handle_close(&mut self) {
        self.session = None;
        self.session_id = None;
        self.state = ConnectionState::Disconnected;
        if self.token.is_some() {
            self.retry = Some(Box::pin(tokio::time::sleep(self.reconnect_delay)));
            info!(delay_secs = self.reconnect_delay.as_secs_f64(), "Reconnect scheduled");
        } else {
            self.retry = None;
        }
    }

    /// Endpoint with the token as the `token` query parameter.
    fn authenticated_url(&self) -> Option<Url> {
        let token = self.token.as_ref()?;
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("token", token.expose_secret());
        Some(url)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

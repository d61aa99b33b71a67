//! Live client: connection → decode → reconcile → effects.

use secrecy::SecretString;
use std::future::Future;
use tracing::{debug, info, warn};

use super::notifier::Notifier;
use crate::connection::{ConnectionManager, Connector, LinkEvent};
use crate::protocol::{self, ClientCommand};
use crate::reconciler::{Effect, RunState};
use crate::types::FluxError;

/// Counters over every frame seen by the dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub frames: u64,
    pub applied: u64,
    pub malformed: u64,
    pub rejected: u64,
    pub unknown: u64,
}

/// Drives one live connection and the run state it feeds.
///
/// All mutation of the run state happens on the task that calls `step` /
/// `run_until`; other components only read it through [`LiveClient::state`].
pub struct LiveClient<C: Connector, N: Notifier> {
    connection: ConnectionManager<C>,
    state: RunState,
    notifier: N,
    notifications_allowed: bool,
    stats: DispatchStats,
}

impl<C: Connector, N: Notifier> LiveClient<C, N> {
    /// Build the client. Notification permission is requested here, once,
    /// independent of connection state.
    pub fn new(connection: ConnectionManager<C>, notifier: N) -> Self {
        let notifications_allowed = notifier.request_permission();
        Self {
            connection,
            state: RunState::new(),
            notifier,
            notifications_allowed,
            stats: DispatchStats::default(),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub async fn login(&mut self, token: SecretString) -> bool {
        self.connection.connect(token).await
    }

    pub async fn logout(&mut self) {
        self.connection.logout().await;
    }

    pub async fn send_command(&mut self, command: ClientCommand) {
        self.connection.send_command(&command).await;
    }

    /// Decode one frame and apply it. Bad frames are logged and dropped;
    /// they never reach the run state.
    pub fn dispatch(&mut self, frame: &str) -> Vec<Effect> {
        self.stats.frames += 1;
        match protocol::decode(frame) {
            Ok(msg) => {
                self.stats.applied += 1;
                self.state.apply(msg)
            }
            Err(FluxError::UnknownMessage(kind)) => {
                self.stats.unknown += 1;
                debug!(kind = %kind, "Ignoring unrecognised message type");
                Vec::new()
            }
            Err(e @ FluxError::Validation { .. }) => {
                self.stats.rejected += 1;
                warn!(error = %e, "Discarding invalid payload");
                Vec::new()
            }
            Err(e) => {
                self.stats.malformed += 1;
                warn!(error = %e, "Failed to parse message");
                Vec::new()
            }
        }
    }

    async fn perform(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Send(command) => self.connection.send_command(&command).await,
                Effect::Notify(notification) if self.notifications_allowed => {
                    self.notifier.notify(&notification)
                }
                Effect::Notify(notification) => {
                    debug!(title = %notification.title, "Notifications not permitted, skipping")
                }
            }
        }
    }

    /// Process the next link event. `None` once there is nothing left to
    /// wait for (no connection, no reconnect pending).
    pub async fn step(&mut self) -> Option<LinkEvent> {
        let event = self.connection.next_event().await?;
        match &event {
            LinkEvent::Frame(text) => {
                let effects = self.dispatch(text);
                self.perform(effects).await;
            }
            LinkEvent::Connected => info!("Live connection re-established, awaiting snapshot"),
            LinkEvent::Disconnected => debug!("Live connection down"),
        }
        Some(event)
    }

    /// Run until `shutdown` resolves, then log out (closing the socket and
    /// cancelling any pending reconnect).
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                event = self.step() => {
                    if event.is_none() {
                        info!("No live connection to maintain; idling until shutdown");
                        (&mut shutdown).await;
                        break;
                    }
                }
                _ = &mut shutdown => break,
            }
        }
        self.connection.logout().await;
        info!(
            frames = self.stats.frames,
            applied = self.stats.applied,
            malformed = self.stats.malformed,
            rejected = self.stats.rejected,
            "Live client stopped"
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

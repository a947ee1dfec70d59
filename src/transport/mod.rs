// Streaming transport: one WebSocket connection with automatic reconnect.
// A single driver task owns the socket and the state machine; `TransportHandle`
// is the cloneable control/observer surface used by consumers.

mod connector;
mod driver;
mod error;
mod observers;
mod policy;

pub use connector::{BoxSocket, Connector, Socket, TungsteniteConnector};
pub use error::TransportError;
pub use observers::SubscriptionId;
pub use policy::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, ReconnectPolicy};

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use crate::models::StreamMessage;
use crate::scheduler::{Scheduler, TokioScheduler};
use driver::{Command, Driver};
use observers::ObserverRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Control and observation handle for a running transport. Cheap to clone;
/// all clones drive the same connection.
#[derive(Clone)]
pub struct TransportHandle {
    url: Arc<str>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    observers: Arc<ObserverRegistry>,
}

/// Spawns the driver task in the `Disconnected` state. Nothing is opened until `connect()`.
pub fn spawn(
    url: impl Into<String>,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    scheduler: Arc<dyn Scheduler>,
) -> (TransportHandle, tokio::task::JoinHandle<()>) {
    let url: Arc<str> = Arc::from(url.into());
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let observers = Arc::new(ObserverRegistry::default());

    let driver = Driver::new(
        url.clone(),
        policy,
        connector,
        scheduler,
        state_tx,
        observers.clone(),
        cmd_rx,
    );
    let span = tracing::debug_span!("transport", url = %url);
    let handle = tokio::spawn(driver.run().instrument(span));

    (
        TransportHandle {
            url,
            cmd_tx,
            state_rx,
            observers,
        },
        handle,
    )
}

/// `spawn` with the tokio-tungstenite connector and wall-clock timers.
pub fn spawn_websocket(
    url: impl Into<String>,
    policy: ReconnectPolicy,
) -> (TransportHandle, tokio::task::JoinHandle<()>) {
    spawn(
        url,
        policy,
        Arc::new(TungsteniteConnector),
        Arc::new(TokioScheduler),
    )
}

impl TransportHandle {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the connection. No-op while connecting or connected; during a reconnect
    /// wait it cancels the timer and starts over with a fresh attempt counter.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close intentionally: cancels any pending reconnect and never schedules another.
    /// Resolves once the driver has applied it.
    pub async fn disconnect(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.command(Command::Disconnect(ack_tx)) {
            let _ = ack_rx.await;
        }
    }

    /// Disconnect and stop the driver task. Other clones become inert.
    pub async fn shutdown(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.command(Command::Shutdown(ack_tx)) {
            let _ = ack_rx.await;
        }
    }

    /// Serialize `payload` as JSON and queue it on the open socket. Returns false
    /// (and logs) when not connected or when serialization fails; nothing is buffered.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        if !self.is_connected() {
            tracing::warn!(operation = "send", "WebSocket is not connected; payload dropped");
            return false;
        }
        match serde_json::to_string(payload) {
            Ok(text) => self.command(Command::Send(text)),
            Err(e) => {
                let err = TransportError::from(e);
                tracing::warn!(error = %err, operation = "send", "payload dropped");
                false
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn on_message<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StreamMessage) + Send + Sync + 'static,
    {
        self.observers.add_message(handler)
    }

    pub fn on_error<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TransportError) + Send + Sync + 'static,
    {
        self.observers.add_error(handler)
    }

    pub fn on_connect<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.observers.add_connect(handler)
    }

    pub fn on_disconnect<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.observers.add_disconnect(handler)
    }

    /// Returns false if `id` was not (or no longer) subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.remove(id)
    }

    /// Number of live subscriptions across all event kinds.
    pub fn subscription_count(&self) -> usize {
        self.observers.len()
    }

    fn command(&self, cmd: Command) -> bool {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::debug!(url = %self.url, "transport driver has stopped; command ignored");
            return false;
        }
        true
    }
}

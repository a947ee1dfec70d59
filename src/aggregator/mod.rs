// Telemetry aggregator: seeds from the bulk-fetch collaborator, then folds
// streamed messages into bounded history/anomaly buffers.

mod state;

pub use state::{LoadError, LoadStatus, ServerNotice, TelemetryView};

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api_client::BulkFetch;
use crate::models::{AnomalyEvent, Snapshot, StreamMessage};
use crate::transport::{SubscriptionId, TransportHandle};
use state::TelemetryState;

pub const DEFAULT_HISTORY_CAPACITY: usize = 60;
pub const DEFAULT_ANOMALY_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Snapshots kept and requested from the backend on load.
    pub history_capacity: usize,
    /// Anomalies kept and requested from the backend on load.
    pub anomaly_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            anomaly_capacity: DEFAULT_ANOMALY_CAPACITY,
        }
    }
}

/// State shared with the transport observers. Observers run on the transport
/// driver task; each update is applied atomically under the lock.
struct Shared {
    state: Mutex<TelemetryState>,
    changes: watch::Sender<u64>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TelemetryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update<R>(&self, f: impl FnOnce(&mut TelemetryState) -> R) -> R {
        let (result, revision) = {
            let mut state = self.lock();
            let result = f(&mut state);
            (result, state.revision())
        };
        self.changes.send_if_modified(|seen| {
            if revision > *seen {
                *seen = revision;
                true
            } else {
                false
            }
        });
        result
    }

    fn apply(&self, message: &StreamMessage) {
        match message {
            StreamMessage::Connected(greeting) => {
                debug!(greeting = %greeting, "backend greeting");
            }
            StreamMessage::Error(data) => {
                warn!(detail = data.message(), "backend reported an error");
            }
            _ => {}
        }
        self.update(|s| s.apply(message));
    }
}

pub struct TelemetryAggregator<S: BulkFetch> {
    source: Arc<S>,
    transport: TransportHandle,
    config: AggregatorConfig,
    shared: Arc<Shared>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl<S: BulkFetch> TelemetryAggregator<S> {
    /// Builds the aggregator in the `Loading` state. Nothing is fetched or subscribed
    /// until `start()`.
    pub fn new(source: Arc<S>, transport: TransportHandle, config: AggregatorConfig) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            source,
            transport,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(TelemetryState::new(&config)),
                changes,
            }),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Subscribe to the transport, ask it to connect, then run the initial load.
    /// Messages streamed while the load is in flight are applied on arrival and
    /// replaced by the load result if it completes later.
    pub async fn start(&self) -> Result<(), LoadError> {
        self.subscribe();
        self.transport.connect();
        self.load().await
    }

    /// Re-run the initial load and replace current state wholesale on success.
    /// On failure the existing data stays visible and the status becomes `Failed`.
    pub async fn refresh(&self) -> Result<(), LoadError> {
        self.load().await
    }

    /// Remove every transport subscription and disconnect the transport.
    pub async fn stop(&self) {
        let ids = std::mem::take(&mut *self.subscriptions_lock());
        for id in ids {
            self.transport.unsubscribe(id);
        }
        self.transport.disconnect().await;
        self.shared.update(|s| s.set_connected(false));
        debug!("aggregator stopped");
    }

    fn subscribe(&self) {
        let mut subs = self.subscriptions_lock();
        if !subs.is_empty() {
            return;
        }
        let shared = self.shared.clone();
        subs.push(self.transport.on_message(move |m| shared.apply(m)));
        let shared = self.shared.clone();
        subs.push(
            self.transport
                .on_connect(move || shared.update(|s| s.set_connected(true))),
        );
        let shared = self.shared.clone();
        subs.push(
            self.transport
                .on_disconnect(move || shared.update(|s| s.set_connected(false))),
        );
        let connected = self.transport.is_connected();
        self.shared.update(|s| s.set_connected(connected));
    }

    async fn load(&self) -> Result<(), LoadError> {
        self.shared.update(|s| s.set_status(LoadStatus::Loading));
        let result = tokio::try_join!(
            self.source.current_snapshot(),
            self.source.snapshot_history(self.config.history_capacity),
            self.source.recent_anomalies(self.config.anomaly_capacity),
        );
        match result {
            Ok((current, history, anomalies)) => {
                info!(
                    history_count = history.len(),
                    anomalies_count = anomalies.len(),
                    "telemetry loaded"
                );
                self.shared.update(|s| s.seed(current, history, anomalies));
                Ok(())
            }
            Err(e) => {
                let err = LoadError::new(e);
                warn!(error = %err, operation = "load", "Failed to fetch initial data");
                self.shared
                    .update(|s| s.set_status(LoadStatus::Failed(err.clone())));
                Err(err)
            }
        }
    }

    fn subscriptions_lock(&self) -> MutexGuard<'_, Vec<SubscriptionId>> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn view(&self) -> TelemetryView {
        self.shared.lock().view()
    }

    pub fn current(&self) -> Option<Snapshot> {
        self.shared.lock().current().cloned()
    }

    /// Oldest to newest.
    pub fn history(&self) -> Vec<Snapshot> {
        self.shared.lock().history().to_vec()
    }

    /// Newest to oldest.
    pub fn anomalies(&self) -> Vec<AnomalyEvent> {
        self.shared.lock().anomalies().to_vec()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected()
    }

    pub fn status(&self) -> LoadStatus {
        self.shared.lock().status().clone()
    }

    /// Receiver that yields the latest revision after every mutation.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }
}

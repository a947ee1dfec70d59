// Aggregated telemetry state and the per-message fold

use std::sync::Arc;

use crate::buffer::{HistoryBuffer, Order};
use crate::models::{AnomalyEvent, AnomalyFilter, ErrorData, Snapshot, StreamMessage};

use super::AggregatorConfig;

/// Failure of the initial load or a refresh. Cloneable so it can live in `LoadStatus`;
/// the full cause chain is kept.
#[derive(Debug, Clone, thiserror::Error)]
#[error("bulk fetch failed: {cause:#}")]
pub struct LoadError {
    cause: Arc<anyhow::Error>,
}

impl LoadError {
    pub(crate) fn new(cause: anyhow::Error) -> Self {
        Self {
            cause: Arc::new(cause),
        }
    }

    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}

#[derive(Debug, Clone)]
pub enum LoadStatus {
    Loading,
    Ready,
    Failed(LoadError),
}

impl LoadStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadStatus::Loading)
    }

    pub fn error(&self) -> Option<&LoadError> {
        match self {
            LoadStatus::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Latest `connected` / `error` frame from the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerNotice {
    Connected(String),
    Error(ErrorData),
}

/// Consistent, owned copy of the aggregated state for presentation layers.
#[derive(Debug, Clone)]
pub struct TelemetryView {
    pub current: Option<Snapshot>,
    /// Oldest to newest.
    pub history: Vec<Snapshot>,
    /// Newest to oldest.
    pub anomalies: Vec<AnomalyEvent>,
    pub connected: bool,
    pub status: LoadStatus,
    pub last_notice: Option<ServerNotice>,
    /// Bumped on every mutation.
    pub revision: u64,
}

impl TelemetryView {
    pub fn filtered_anomalies<'a>(&'a self, filter: &AnomalyFilter) -> Vec<&'a AnomalyEvent> {
        self.anomalies.iter().filter(|a| filter.matches(a)).collect()
    }
}

pub(crate) struct TelemetryState {
    current: Option<Snapshot>,
    history: HistoryBuffer<Snapshot>,
    anomalies: HistoryBuffer<AnomalyEvent>,
    connected: bool,
    status: LoadStatus,
    last_notice: Option<ServerNotice>,
    revision: u64,
}

impl TelemetryState {
    pub(crate) fn new(config: &AggregatorConfig) -> Self {
        Self {
            current: None,
            history: HistoryBuffer::new(config.history_capacity, Order::OldestFirst),
            anomalies: HistoryBuffer::new(config.anomaly_capacity, Order::NewestFirst),
            connected: false,
            status: LoadStatus::Loading,
            last_notice: None,
            revision: 0,
        }
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn apply(&mut self, message: &StreamMessage) {
        match message {
            StreamMessage::Metrics(snapshot) => {
                self.current = Some(snapshot.clone());
                self.history.push(snapshot.clone());
            }
            StreamMessage::Anomaly(event) => {
                self.anomalies.push(event.clone());
            }
            StreamMessage::Connected(greeting) => {
                self.last_notice = Some(ServerNotice::Connected(greeting.clone()));
            }
            StreamMessage::Error(data) => {
                self.last_notice = Some(ServerNotice::Error(data.clone()));
            }
        }
        self.revision += 1;
    }

    /// Replace current, history and anomalies wholesale. The backend returns both
    /// lists newest first, so they are re-sorted into buffer order here.
    pub(crate) fn seed(
        &mut self,
        current: Snapshot,
        mut history: Vec<Snapshot>,
        mut anomalies: Vec<AnomalyEvent>,
    ) {
        history.sort_by_key(|s| s.timestamp);
        anomalies.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.current = Some(current);
        self.history.replace(history);
        self.anomalies.replace(anomalies);
        self.status = LoadStatus::Ready;
        self.revision += 1;
    }

    pub(crate) fn set_status(&mut self, status: LoadStatus) {
        self.status = status;
        self.revision += 1;
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        if self.connected != connected {
            self.connected = connected;
            self.revision += 1;
        }
    }

    pub(crate) fn current(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    pub(crate) fn history(&self) -> &HistoryBuffer<Snapshot> {
        &self.history
    }

    pub(crate) fn anomalies(&self) -> &HistoryBuffer<AnomalyEvent> {
        &self.anomalies
    }

    pub(crate) fn connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub(crate) fn view(&self) -> TelemetryView {
        TelemetryView {
            current: self.current.clone(),
            history: self.history.to_vec(),
            anomalies: self.anomalies.to_vec(),
            connected: self.connected,
            status: self.status.clone(),
            last_notice: self.last_notice.clone(),
            revision: self.revision,
        }
    }
}

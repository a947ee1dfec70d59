// Shared test helpers: builders, an in-memory socket, a scripted connector,
// a recording scheduler and a fake bulk-fetch source.
#![allow(dead_code)]

pub mod backend;

use chrono::{DateTime, TimeZone, Utc};
use futures_util::future::BoxFuture;
use futures_util::{Sink, Stream};
use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use telemetry_feed::api_client::BulkFetch;
use telemetry_feed::models::*;
use telemetry_feed::scheduler::Scheduler;
use telemetry_feed::transport::{BoxSocket, Connector, TransportError};
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::{self, Message};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub fn snapshot(secs: i64) -> Snapshot {
    Snapshot {
        timestamp: at(secs),
        cpu: CpuMetrics {
            global_usage: (secs % 100) as f32,
            per_core: vec![1.0, 2.0],
            load_avg_1: 0.5,
            load_avg_5: 0.4,
            load_avg_15: 0.3,
        },
        memory: MemoryMetrics {
            total: 16_000,
            used: 8_000,
            available: 8_000,
            usage_percent: 50.0,
            swap_total: 0,
            swap_used: 0,
        },
        temperatures: vec![],
        disks: vec![],
        usb_devices: vec![],
        network: NetworkMetrics {
            rx_bytes: 0,
            tx_bytes: 0,
            rx_packets: 0,
            tx_packets: 0,
        },
        gpu: None,
    }
}

pub fn anomaly(id: &str, secs: i64) -> AnomalyEvent {
    AnomalyEvent {
        id: id.to_string(),
        timestamp: at(secs),
        severity: Severity::Warning,
        category: Category::Cpu,
        message: format!("cpu usage high ({id})"),
        metrics: BTreeMap::new(),
    }
}

pub fn metrics_frame(secs: i64) -> String {
    serde_json::to_string(&StreamMessage::Metrics(snapshot(secs))).unwrap()
}

pub fn anomaly_frame(id: &str, secs: i64) -> String {
    serde_json::to_string(&StreamMessage::Anomaly(anomaly(id, secs))).unwrap()
}

/// Poll `cond` until it holds; panics after a generous bound.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..5_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

/// In-memory socket: the transport reads what the peer pushes and writes into the peer's outbox.
pub struct ChannelSocket {
    inbound: mpsc::UnboundedReceiver<Result<Message, tungstenite::Error>>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl Stream for ChannelSocket {
    type Item = Result<Message, tungstenite::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inbound.poll_recv(cx)
    }
}

impl Sink<Message> for ChannelSocket {
    type Error = tungstenite::Error;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        self.outbound
            .send(item)
            .map_err(|_| tungstenite::Error::ConnectionClosed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Server side of a `ChannelSocket`. Dropping it closes the stream.
pub struct SocketPeer {
    inbound: mpsc::UnboundedSender<Result<Message, tungstenite::Error>>,
    outbound: mpsc::UnboundedReceiver<Message>,
}

impl SocketPeer {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.inbound.send(Ok(Message::text(text.into())));
    }

    pub fn send_error(&self) {
        let _ = self.inbound.send(Err(tungstenite::Error::ConnectionClosed));
    }

    pub async fn next_outbound(&mut self) -> Option<Message> {
        tokio::time::timeout(Duration::from_secs(5), self.outbound.recv())
            .await
            .ok()
            .flatten()
    }
}

pub fn socket_pair() -> (BoxSocket, SocketPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    (
        Box::new(ChannelSocket {
            inbound: in_rx,
            outbound: out_tx,
        }),
        SocketPeer {
            inbound: in_tx,
            outbound: out_rx,
        },
    )
}

pub enum Outcome {
    Refused,
    Open(BoxSocket),
}

/// Hands out scripted outcomes in order; once the script is empty every attempt is refused.
#[derive(Default)]
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Outcome>>,
    calls: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(script: Vec<Outcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn push(&self, outcome: Outcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub async fn wait_for_calls(&self, n: usize) {
        eventually(|| self.calls() >= n).await;
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, _url: &str) -> BoxFuture<'static, Result<BoxSocket, TransportError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        Box::pin(async move {
            match next {
                Some(Outcome::Open(socket)) => Ok(socket),
                _ => Err(TransportError::Connect(tungstenite::Error::Io(
                    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
                ))),
            }
        })
    }
}

/// Records every requested delay and fires immediately.
#[derive(Default)]
pub struct RecordingScheduler {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingScheduler {
    pub fn delays_ms(&self) -> Vec<u128> {
        self.delays
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.as_millis())
            .collect()
    }
}

impl Scheduler for RecordingScheduler {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        self.delays.lock().unwrap().push(delay);
        Box::pin(async {})
    }
}

/// In-memory bulk-fetch source. History and anomalies are stored in arrival
/// order and returned newest first, as the backend does.
#[derive(Default)]
pub struct FakeSource {
    pub current: Mutex<Option<Snapshot>>,
    pub history: Mutex<Vec<Snapshot>>,
    pub anomalies: Mutex<Vec<AnomalyEvent>>,
    pub fail_anomalies: AtomicBool,
    /// When set, `recent_anomalies` waits for a permit before answering.
    pub gate: Mutex<Option<Arc<Notify>>>,
    pub loads: AtomicUsize,
}

impl FakeSource {
    pub fn seeded(current: Snapshot, history: Vec<Snapshot>, anomalies: Vec<AnomalyEvent>) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(Some(current)),
            history: Mutex::new(history),
            anomalies: Mutex::new(anomalies),
            ..Default::default()
        })
    }
}

impl BulkFetch for FakeSource {
    async fn current_snapshot(&self) -> anyhow::Result<Snapshot> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no metrics collected yet"))
    }

    async fn snapshot_history(&self, limit: usize) -> anyhow::Result<Vec<Snapshot>> {
        let history = self.history.lock().unwrap().clone();
        Ok(history.into_iter().rev().take(limit).collect())
    }

    async fn recent_anomalies(&self, limit: usize) -> anyhow::Result<Vec<AnomalyEvent>> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_anomalies.load(Ordering::SeqCst) {
            anyhow::bail!("anomalies endpoint returned HTTP 503");
        }
        let anomalies = self.anomalies.lock().unwrap().clone();
        Ok(anomalies.into_iter().rev().take(limit).collect())
    }
}

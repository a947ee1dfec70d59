// Transport driver task: the only writer of connection state. Commands, socket
// frames and the reconnect timer are all handled here, one event at a time.

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::observers::ObserverRegistry;
use super::{BoxSocket, ConnectionState, Connector, ReconnectPolicy, TransportError};
use crate::models::StreamMessage;
use crate::scheduler::Scheduler;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

pub(super) enum Command {
    Connect,
    Disconnect(oneshot::Sender<()>),
    Send(String),
    Shutdown(oneshot::Sender<()>),
}

enum Phase {
    Idle,
    Connecting,
    Open(BoxSocket),
    Backoff(BoxFuture<'static, ()>),
    Stopped,
}

pub(super) struct Driver {
    url: Arc<str>,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    scheduler: Arc<dyn Scheduler>,
    state_tx: watch::Sender<ConnectionState>,
    observers: Arc<ObserverRegistry>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    /// Reconnect attempts scheduled since the last successful open.
    attempts: u32,
}

impl Driver {
    pub(super) fn new(
        url: Arc<str>,
        policy: ReconnectPolicy,
        connector: Arc<dyn Connector>,
        scheduler: Arc<dyn Scheduler>,
        state_tx: watch::Sender<ConnectionState>,
        observers: Arc<ObserverRegistry>,
        cmd_rx: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            url,
            policy,
            connector,
            scheduler,
            state_tx,
            observers,
            cmd_rx,
            attempts: 0,
        }
    }

    pub(super) async fn run(mut self) {
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::Connecting => self.connecting().await,
                Phase::Open(socket) => self.open(socket).await,
                Phase::Backoff(timer) => self.backoff(timer).await,
                Phase::Stopped => break,
            };
        }
        self.set_state(ConnectionState::Disconnected);
        debug!("transport driver stopped");
    }

    async fn idle(&mut self) -> Phase {
        match self.cmd_rx.recv().await {
            Some(Command::Connect) => {
                self.attempts = 0;
                Phase::Connecting
            }
            Some(Command::Disconnect(ack)) => {
                let _ = ack.send(());
                Phase::Idle
            }
            Some(Command::Send(_)) => {
                self.drop_outbound();
                Phase::Idle
            }
            Some(Command::Shutdown(ack)) => {
                let _ = ack.send(());
                Phase::Stopped
            }
            None => Phase::Stopped,
        }
    }

    async fn connecting(&mut self) -> Phase {
        self.set_state(ConnectionState::Connecting);
        debug!(attempt = self.attempts, "opening socket");
        let mut pending = self.connector.connect(&self.url);

        loop {
            tokio::select! {
                result = &mut pending => {
                    return match result {
                        Ok(socket) => {
                            self.attempts = 0;
                            self.set_state(ConnectionState::Connected);
                            info!("WebSocket connected");
                            self.observers.notify_connect();
                            Phase::Open(socket)
                        }
                        Err(e) => {
                            warn!(error = %e, operation = "connect", "WebSocket connect failed");
                            self.observers.notify_error(&e);
                            self.closed()
                        }
                    };
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Connect) => debug!("connect already in progress"),
                    Some(Command::Send(_)) => self.drop_outbound(),
                    Some(Command::Disconnect(ack)) => {
                        self.closed_by_caller();
                        let _ = ack.send(());
                        return Phase::Idle;
                    }
                    Some(Command::Shutdown(ack)) => {
                        self.closed_by_caller();
                        let _ = ack.send(());
                        return Phase::Stopped;
                    }
                    None => return Phase::Stopped,
                },
            }
        }
    }

    async fn open(&mut self, mut socket: BoxSocket) -> Phase {
        loop {
            tokio::select! {
                frame = socket.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(text.as_str().as_bytes()),
                    Some(Ok(Message::Binary(bytes))) => self.dispatch(&bytes),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "close frame received");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let err = TransportError::Socket(e);
                        warn!(error = %err, operation = "receive", "WebSocket error");
                        self.observers.notify_error(&err);
                        return self.closed();
                    }
                    None => {
                        info!("WebSocket disconnected");
                        return self.closed();
                    }
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Connect) => debug!("WebSocket already connected"),
                    Some(Command::Send(text)) => {
                        let r = timeout(SEND_TIMEOUT, socket.send(Message::text(text))).await;
                        let failure = match r {
                            Ok(Ok(())) => None,
                            Ok(Err(e)) => Some(TransportError::Socket(e)),
                            Err(_) => Some(TransportError::Socket(
                                std::io::Error::new(std::io::ErrorKind::TimedOut, "send timed out").into(),
                            )),
                        };
                        if let Some(err) = failure {
                            warn!(error = %err, operation = "send", "WebSocket send failed");
                            self.observers.notify_error(&err);
                            return self.closed();
                        }
                    }
                    Some(Command::Disconnect(ack)) => {
                        close_socket(socket).await;
                        self.closed_by_caller();
                        let _ = ack.send(());
                        return Phase::Idle;
                    }
                    Some(Command::Shutdown(ack)) => {
                        close_socket(socket).await;
                        self.closed_by_caller();
                        let _ = ack.send(());
                        return Phase::Stopped;
                    }
                    None => {
                        close_socket(socket).await;
                        return Phase::Stopped;
                    }
                },
            }
        }
    }

    async fn backoff(&mut self, mut timer: BoxFuture<'static, ()>) -> Phase {
        loop {
            tokio::select! {
                _ = &mut timer => return Phase::Connecting,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Connect) => {
                        info!("explicit connect; skipping reconnect wait");
                        self.attempts = 0;
                        return Phase::Connecting;
                    }
                    Some(Command::Send(_)) => self.drop_outbound(),
                    Some(Command::Disconnect(ack)) => {
                        debug!("pending reconnect cancelled");
                        let _ = ack.send(());
                        return Phase::Idle;
                    }
                    Some(Command::Shutdown(ack)) => {
                        let _ = ack.send(());
                        return Phase::Stopped;
                    }
                    None => return Phase::Stopped,
                },
            }
        }
    }

    /// Decode one frame and fan it out. Malformed frames are dropped; no state change.
    fn dispatch(&self, frame: &[u8]) {
        match StreamMessage::decode(frame) {
            Ok(message) => {
                debug!(kind = message.kind(), "message received");
                self.observers.notify_message(&message);
            }
            Err(e) => {
                warn!(error = %e, operation = "decode_frame", "Failed to parse WebSocket message");
            }
        }
    }

    /// Unrequested close: notify and schedule the next attempt.
    fn closed(&mut self) -> Phase {
        self.set_state(ConnectionState::Disconnected);
        self.observers.notify_disconnect();
        self.schedule_reconnect()
    }

    fn closed_by_caller(&mut self) {
        if self.set_state(ConnectionState::Disconnected) {
            self.observers.notify_disconnect();
        }
    }

    fn schedule_reconnect(&mut self) -> Phase {
        if self.attempts >= self.policy.max_attempts {
            error!(
                attempts = self.attempts,
                "Max reconnection attempts reached; staying disconnected"
            );
            return Phase::Idle;
        }
        self.attempts += 1;
        let delay = self.policy.delay_for(self.attempts);
        info!(
            delay_ms = delay.as_millis() as u64,
            attempt = self.attempts,
            max = self.policy.max_attempts,
            "Reconnect scheduled"
        );
        Phase::Backoff(self.scheduler.sleep(delay))
    }

    fn drop_outbound(&self) {
        warn!(operation = "send", "WebSocket is not connected; payload dropped");
    }

    /// Returns true if the state actually changed.
    fn set_state(&self, next: ConnectionState) -> bool {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        })
    }
}

async fn close_socket(mut socket: BoxSocket) {
    match timeout(CLOSE_TIMEOUT, socket.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "socket close returned error"),
        Err(_) => debug!("socket close timed out"),
    }
}

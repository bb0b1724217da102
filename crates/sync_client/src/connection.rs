use std::sync::Arc;

use tokio::{
    sync::{broadcast, mpsc, Mutex, Notify},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{backoff::BackoffPolicy, error::SyncError, transport::Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Reconnecting,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub phase: ConnectionPhase,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Opened,
    Message(String),
    Closed { reason: String },
    Error { detail: String },
}

struct ConnState {
    status: ConnectionStatus,
    started: bool,
    disposed: bool,
    outbound: Option<mpsc::UnboundedSender<String>>,
    run_task: Option<JoinHandle<()>>,
}

/// Owns the single transport connection for a dashboard session and drives
/// the reconnect state machine:
///
/// `Connecting -> Open -> Reconnecting -> Connecting -> ...`, with
/// `disconnect()` moving any state to the terminal `Closed`. Reconnects are
/// retried indefinitely with capped, jittered exponential backoff.
pub struct ConnectionManager {
    url: Url,
    transport: Arc<dyn Transport>,
    backoff: BackoffPolicy,
    inner: Mutex<ConnState>,
    events: broadcast::Sender<ConnectionEvent>,
    shutdown: Notify,
}

impl ConnectionManager {
    pub fn new(url: Url, transport: Arc<dyn Transport>, backoff: BackoffPolicy) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            url,
            transport,
            backoff,
            inner: Mutex::new(ConnState {
                status: ConnectionStatus {
                    phase: ConnectionPhase::Connecting,
                    retry_count: 0,
                    last_error: None,
                },
                started: false,
                disposed: false,
                outbound: None,
                run_task: None,
            }),
            events,
            shutdown: Notify::new(),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.inner.lock().await.status.clone()
    }

    /// Starts the connection loop. Idempotent while running; an error is
    /// returned after `disconnect()`, which is terminal for this session.
    pub async fn connect(self: &Arc<Self>) -> Result<(), SyncError> {
        let mut inner = self.inner.lock().await;
        if inner.disposed {
            return Err(SyncError::Disposed);
        }
        if inner.started {
            return Ok(());
        }
        inner.started = true;
        inner.status.phase = ConnectionPhase::Connecting;
        let manager = Arc::clone(self);
        inner.run_task = Some(tokio::spawn(async move { manager.run().await }));
        Ok(())
    }

    /// Sends a text frame when `Open`; otherwise the frame is dropped. The
    /// full subscription set is resent on every open, so dropped frames are
    /// recovered by the next flush.
    pub async fn send(&self, text: String) {
        let inner = self.inner.lock().await;
        if inner.status.phase == ConnectionPhase::Open {
            if let Some(outbound) = &inner.outbound {
                let _ = outbound.send(text);
                return;
            }
        }
        debug!("dropping outbound frame while not open");
    }

    /// Terminal teardown: cancels any pending backoff timer and stops
    /// reconnecting. Safe to call more than once.
    pub async fn disconnect(&self) {
        let run_task = {
            let mut inner = self.inner.lock().await;
            if inner.disposed {
                return;
            }
            inner.disposed = true;
            inner.status.phase = ConnectionPhase::Closed;
            inner.outbound = None;
            inner.run_task.take()
        };
        self.shutdown.notify_waiters();
        if let Some(task) = run_task {
            task.abort();
        }
        info!(url = %self.url, "event source disconnected");
        let _ = self.events.send(ConnectionEvent::Closed {
            reason: "disconnected".to_string(),
        });
    }

    async fn run(self: Arc<Self>) {
        loop {
            match self.transport.connect(&self.url).await {
                Ok((sink, stream)) => {
                    if self.serve_connection(sink, stream).await.is_break() {
                        return;
                    }
                }
                Err(err) => {
                    let detail = err.to_string();
                    {
                        let mut inner = self.inner.lock().await;
                        if inner.disposed {
                            return;
                        }
                        inner.status.phase = ConnectionPhase::Reconnecting;
                        inner.status.retry_count = inner.status.retry_count.saturating_add(1);
                        inner.status.last_error = Some(detail.clone());
                    }
                    warn!(url = %self.url, error = %detail, "connect attempt failed");
                    let _ = self.events.send(ConnectionEvent::Error { detail });
                }
            }

            if self.backoff_pause().await.is_break() {
                return;
            }
        }
    }

    /// Pumps one established connection until it drops. Break means the
    /// session was torn down and the loop must exit.
    async fn serve_connection(
        &self,
        mut sink: Box<dyn crate::transport::TransportSink>,
        mut stream: Box<dyn crate::transport::TransportStream>,
    ) -> std::ops::ControlFlow<()> {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        {
            let mut inner = self.inner.lock().await;
            if inner.disposed {
                sink.close().await;
                return std::ops::ControlFlow::Break(());
            }
            inner.status.phase = ConnectionPhase::Open;
            inner.status.retry_count = 0;
            inner.status.last_error = None;
            inner.outbound = Some(outbound_tx);
        }
        info!(url = %self.url, "event source connected");
        let _ = self.events.send(ConnectionEvent::Opened);

        let writer = tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(err) = sink.send(text).await {
                    warn!(error = %err, "outbound send failed");
                    break;
                }
            }
            sink.close().await;
        });

        let reason = loop {
            tokio::select! {
                inbound = stream.next_message() => match inbound {
                    Some(Ok(text)) => {
                        let _ = self.events.send(ConnectionEvent::Message(text));
                    }
                    Some(Err(err)) => break format!("receive failed: {err}"),
                    None => break "connection closed by server".to_string(),
                },
                _ = self.shutdown.notified() => {
                    self.inner.lock().await.outbound = None;
                    writer.abort();
                    return std::ops::ControlFlow::Break(());
                }
            }
        };

        {
            let mut inner = self.inner.lock().await;
            inner.outbound = None;
            if inner.disposed {
                writer.abort();
                return std::ops::ControlFlow::Break(());
            }
            inner.status.phase = ConnectionPhase::Reconnecting;
            inner.status.last_error = Some(reason.clone());
        }
        // Dropping the outbound sender lets the writer finish and close the sink.
        writer.abort();
        warn!(url = %self.url, reason = %reason, "event source dropped; scheduling reconnect");
        let _ = self.events.send(ConnectionEvent::Closed { reason });
        std::ops::ControlFlow::Continue(())
    }

    /// Sleeps for the backoff delay; the sleep races the shutdown signal so
    /// `disconnect()` cancels a pending reconnect. Firing after a disconnect
    /// is guarded by re-checking the disposed flag.
    async fn backoff_pause(&self) -> std::ops::ControlFlow<()> {
        let delay = {
            let inner = self.inner.lock().await;
            if inner.disposed {
                return std::ops::ControlFlow::Break(());
            }
            self.backoff.delay(inner.status.retry_count)
        };
        debug!(delay_ms = delay.as_millis() as u64, "waiting before reconnect");
        tokio::select! {
            _ = sleep(delay) => {}
            _ = self.shutdown.notified() => return std::ops::ControlFlow::Break(()),
        }
        let mut inner = self.inner.lock().await;
        if inner.disposed {
            return std::ops::ControlFlow::Break(());
        }
        inner.status.phase = ConnectionPhase::Connecting;
        std::ops::ControlFlow::Continue(())
    }
}

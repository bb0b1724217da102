//! Real-time operation-status synchronization client for the assessment
//! administration dashboards.
//!
//! One [`OperationSyncClient`] is created per dashboard session and torn
//! down on navigation away. It owns a single event-source connection,
//! multiplexes operation subscriptions over it, keeps a monotonic status
//! store and a bounded notification queue, and projects all three into an
//! immutable [`DashboardSnapshot`] for presentation code. All mutations are
//! serialized through one event task; readers only ever see owned copies.

use std::sync::Arc;

use chrono::Utc;
use shared::{
    domain::{NotificationEvent, OperationId, OperationStatus, OperationStatusSnapshot, Severity},
    protocol::ServerMessage,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, warn};
use uuid::Uuid;

pub mod backoff;
pub mod config;
pub mod connection;
pub mod error;
pub mod facade;
pub mod notifications;
pub mod rest;
pub mod status;
pub mod subscriptions;
pub mod transport;

pub use config::SyncConfig;
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionPhase, ConnectionStatus};
pub use error::SyncError;
pub use facade::DashboardSnapshot;

use connection::ConnectionEvent as ConnEvent;
use notifications::NotificationQueue;
use rest::{MissingSnapshotApi, RestSnapshotApi, SnapshotApi};
use status::{StatusStore, StatusTransition, UpdateOutcome};
use subscriptions::SubscriptionRegistry;
use transport::{Transport, WebSocketTransport};

/// Typed change events republished to UI consumers. Any event means the
/// facade snapshot is out of date and should be re-read.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    ConnectionChanged(ConnectionStatus),
    /// Snapshot replaced without a status change (progress counters moved).
    OperationProgressed(OperationId),
    OperationTransitioned {
        operation_id: OperationId,
        previous: Option<OperationStatus>,
        new: OperationStatus,
    },
    NotificationPushed(NotificationEvent),
}

pub struct OperationSyncClient {
    config: SyncConfig,
    connection: Arc<ConnectionManager>,
    snapshot_api: Arc<dyn SnapshotApi>,
    subscriptions: Mutex<SubscriptionRegistry>,
    status: Mutex<StatusStore>,
    notifications: Mutex<NotificationQueue>,
    events: broadcast::Sender<SyncEvent>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl OperationSyncClient {
    /// Production wiring: websocket transport plus the REST seeder when an
    /// API url is configured.
    pub fn create(config: SyncConfig) -> Arc<Self> {
        let snapshot_api: Arc<dyn SnapshotApi> = match &config.api_url {
            Some(api_url) => Arc::new(RestSnapshotApi::new(api_url.clone())),
            None => Arc::new(MissingSnapshotApi),
        };
        Self::create_with_dependencies(config, Arc::new(WebSocketTransport), snapshot_api)
    }

    pub fn create_with_dependencies(
        config: SyncConfig,
        transport: Arc<dyn Transport>,
        snapshot_api: Arc<dyn SnapshotApi>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        let connection = ConnectionManager::new(config.url.clone(), transport, config.backoff());
        Arc::new(Self {
            connection,
            snapshot_api,
            subscriptions: Mutex::new(SubscriptionRegistry::new()),
            status: Mutex::new(StatusStore::new()),
            notifications: Mutex::new(NotificationQueue::new(config.max_notifications)),
            events,
            event_task: Mutex::new(None),
            config,
        })
    }

    /// Starts the event task and the connection loop. Idempotent while the
    /// session is alive; fails after `dispose()`.
    pub async fn connect(self: &Arc<Self>) -> Result<(), SyncError> {
        let mut task = self.event_task.lock().await;
        if task.is_some() {
            return self.connection.connect().await;
        }
        // The receiver must exist before the loop starts so the first
        // Opened event is not missed.
        let mut events = self.connection.subscribe_events();
        self.connection.connect().await?;
        let client = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => client.handle_connection_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "connection event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
        Ok(())
    }

    /// Terminal teardown for the session: stops reconnecting, cancels the
    /// pending backoff timer and the event task.
    pub async fn dispose(&self) {
        self.connection.disconnect().await;
        if let Some(task) = self.event_task.lock().await.take() {
            task.abort();
        }
    }

    /// Declares interest in an operation. The status store is seeded from
    /// the REST API (best effort) before the subscription goes on the wire;
    /// if the connection is not open, the full set is flushed on next open.
    pub async fn subscribe_operation(&self, operation_id: OperationId) {
        let added = {
            let mut registry = self.subscriptions.lock().await;
            registry.add(operation_id.clone())
        };
        if !added {
            return;
        }

        match self.snapshot_api.fetch_snapshot(&operation_id).await {
            Ok(snapshot) => {
                // Seeds silently: no transition events or notifications are
                // derived from the initial snapshot.
                let _ = self.status.lock().await.apply_update(snapshot);
            }
            Err(err) => {
                debug!(%operation_id, error = %err, "initial snapshot unavailable");
            }
        }

        self.flush_subscriptions().await;
    }

    /// Withdraws interest: the desired set and the status store both drop
    /// the operation, and the replacement set is resent if currently open.
    /// Updates still in transit for this id will be ignored.
    pub async fn unsubscribe_operation(&self, operation_id: &OperationId) {
        let removed = {
            let mut registry = self.subscriptions.lock().await;
            registry.remove(operation_id)
        };
        if !removed {
            return;
        }
        self.status.lock().await.remove(operation_id);
        self.flush_subscriptions().await;
    }

    pub async fn retry_operation(&self, operation_id: &OperationId) -> anyhow::Result<()> {
        self.snapshot_api.retry_operation(operation_id).await
    }

    pub async fn cancel_operation(&self, operation_id: &OperationId) -> anyhow::Result<()> {
        self.snapshot_api.cancel_operation(operation_id).await
    }

    /// Read model for presentation code. Pure: never mutates client state.
    pub async fn snapshot(&self) -> DashboardSnapshot {
        let status = self.connection.status().await;
        let operations = self.status.lock().await.operations();
        let notifications = self.notifications.lock().await.list(None);
        facade::project(&status, operations, notifications)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    async fn handle_connection_event(&self, event: ConnEvent) {
        match event {
            ConnEvent::Opened => {
                self.flush_subscriptions().await;
                self.emit_connection_changed().await;
            }
            ConnEvent::Message(text) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) => self.handle_server_message(message).await,
                Err(err) => {
                    warn!(error = %err, "dropping malformed server frame");
                }
            },
            ConnEvent::Closed { .. } | ConnEvent::Error { .. } => {
                self.emit_connection_changed().await;
            }
        }
    }

    async fn handle_server_message(&self, message: ServerMessage) {
        match message {
            update @ ServerMessage::StatusUpdate { .. } => {
                if let Some(snapshot) = update.into_snapshot() {
                    self.apply_status_update(snapshot).await;
                }
            }
            pushed @ ServerMessage::Notification { .. } => {
                if let Some(event) = pushed.into_notification() {
                    self.push_notification(event).await;
                }
            }
            ServerMessage::SubscriptionRejected {
                operation_id,
                reason,
            } => {
                warn!(%operation_id, %reason, "server rejected subscription");
                // Drop the id from the desired set so reconnects do not
                // re-request a subscription the server will refuse again.
                self.subscriptions.lock().await.remove(&operation_id);
                self.status.lock().await.remove(&operation_id);
                self.push_notification(NotificationEvent {
                    id: Uuid::new_v4().to_string(),
                    timestamp: Utc::now(),
                    severity: Severity::Error,
                    description: format!(
                        "Subscription to operation {operation_id} was rejected: {reason}"
                    ),
                    source_operation_id: Some(operation_id),
                })
                .await;
            }
        }
    }

    async fn apply_status_update(&self, snapshot: OperationStatusSnapshot) {
        let subscribed = {
            let registry = self.subscriptions.lock().await;
            registry.contains(&snapshot.operation_id)
        };
        if !subscribed {
            debug!(operation_id = %snapshot.operation_id, "update for unsubscribed operation ignored");
            return;
        }

        let outcome = {
            let mut store = self.status.lock().await;
            let outcome = store.apply_update(snapshot.clone());
            store.prune_terminal(self.config.terminal_retention);
            outcome
        };

        match outcome {
            UpdateOutcome::Applied(Some(transition)) => {
                let _ = self.events.send(SyncEvent::OperationTransitioned {
                    operation_id: transition.operation_id.clone(),
                    previous: transition.previous,
                    new: transition.new,
                });
                if let Some(event) = transition_notification(&transition, &snapshot) {
                    self.push_notification(event).await;
                }
            }
            UpdateOutcome::Applied(None) => {
                let _ = self
                    .events
                    .send(SyncEvent::OperationProgressed(snapshot.operation_id));
            }
            UpdateOutcome::Stale { stored_sequence } => {
                debug!(
                    operation_id = %snapshot.operation_id,
                    sequence = snapshot.sequence,
                    stored_sequence,
                    "stale update discarded"
                );
            }
        }
    }

    async fn push_notification(&self, event: NotificationEvent) {
        self.notifications.lock().await.push(event.clone());
        let _ = self.events.send(SyncEvent::NotificationPushed(event));
    }

    /// Sends the entire desired set as one replacing subscribe frame. Sent
    /// even when empty so a reconnect clears server-side session state left
    /// over from before the disconnect.
    async fn flush_subscriptions(&self) {
        let message = {
            let registry = self.subscriptions.lock().await;
            registry.subscribe_message()
        };
        match serde_json::to_string(&message) {
            Ok(text) => self.connection.send(text).await,
            Err(err) => warn!(error = %err, "failed to encode subscribe frame"),
        }
    }

    async fn emit_connection_changed(&self) {
        let status = self.connection.status().await;
        let _ = self.events.send(SyncEvent::ConnectionChanged(status));
    }
}

/// Derives the human-facing notification for a status transition. Only
/// arrivals into `completed` and `failed` synthesize one.
fn transition_notification(
    transition: &StatusTransition,
    snapshot: &OperationStatusSnapshot,
) -> Option<NotificationEvent> {
    let (severity, description) = match transition.new {
        OperationStatus::Completed => (
            Severity::Info,
            format!(
                "Sync operation {} completed: {} of {} records processed",
                transition.operation_id, snapshot.processed_records, snapshot.total_records
            ),
        ),
        OperationStatus::Failed => (
            Severity::Error,
            format!(
                "Sync operation {} failed: {} of {} records errored",
                transition.operation_id, snapshot.failed_records, snapshot.total_records
            ),
        ),
        _ => return None,
    };
    Some(NotificationEvent {
        id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        severity,
        description,
        source_operation_id: Some(transition.operation_id.clone()),
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

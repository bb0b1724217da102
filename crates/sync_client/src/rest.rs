use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::{OperationId, OperationStatusSnapshot},
    error::ApiError,
};
use url::Url;

/// REST collaborator used to seed the status store with an initial snapshot
/// before subscribing, and to trigger retry/cancel actions. Kept separate
/// from the event-stream client; it only ever refreshes the store.
#[async_trait]
pub trait SnapshotApi: Send + Sync {
    /// Latest snapshot for one operation. The REST body is the snake_case
    /// serde form of [`OperationStatusSnapshot`], not the camelCase frame
    /// layout used on the event-source connection.
    async fn fetch_snapshot(&self, operation_id: &OperationId) -> Result<OperationStatusSnapshot>;
    async fn retry_operation(&self, operation_id: &OperationId) -> Result<()>;
    async fn cancel_operation(&self, operation_id: &OperationId) -> Result<()>;
}

/// Fallback when no REST endpoint is configured; the client then relies on
/// pushed updates alone.
pub struct MissingSnapshotApi;

#[async_trait]
impl SnapshotApi for MissingSnapshotApi {
    async fn fetch_snapshot(&self, operation_id: &OperationId) -> Result<OperationStatusSnapshot> {
        Err(anyhow!(
            "operations API unavailable; no snapshot for operation {operation_id}"
        ))
    }

    async fn retry_operation(&self, operation_id: &OperationId) -> Result<()> {
        Err(anyhow!(
            "operations API unavailable; cannot retry operation {operation_id}"
        ))
    }

    async fn cancel_operation(&self, operation_id: &OperationId) -> Result<()> {
        Err(anyhow!(
            "operations API unavailable; cannot cancel operation {operation_id}"
        ))
    }
}

pub struct RestSnapshotApi {
    http: Client,
    base_url: Url,
}

impl RestSnapshotApi {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    async fn post_action(&self, operation_id: &OperationId, action: &str) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint(&format!("operations/{operation_id}/{action}")))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            if let Ok(api_error) = response.json::<ApiError>().await {
                return Err(anyhow!(
                    "{action} for operation {operation_id} failed ({status}): {}",
                    api_error.message
                ));
            }
            return Err(anyhow!(
                "{action} for operation {operation_id} failed with status {status}"
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotApi for RestSnapshotApi {
    async fn fetch_snapshot(&self, operation_id: &OperationId) -> Result<OperationStatusSnapshot> {
        let response = self
            .http
            .get(self.endpoint(&format!("operations/{operation_id}")))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            if let Ok(api_error) = response.json::<ApiError>().await {
                return Err(anyhow!(
                    "snapshot fetch for operation {operation_id} failed ({status}): {}",
                    api_error.message
                ));
            }
            return Err(anyhow!(
                "snapshot fetch for operation {operation_id} failed with status {status}"
            ));
        }
        Ok(response.json().await?)
    }

    async fn retry_operation(&self, operation_id: &OperationId) -> Result<()> {
        self.post_action(operation_id, "retry").await
    }

    async fn cancel_operation(&self, operation_id: &OperationId) -> Result<()> {
        self.post_action(operation_id, "cancel").await
    }
}

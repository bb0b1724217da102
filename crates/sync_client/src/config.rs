use std::time::Duration;

use url::Url;

use crate::backoff::BackoffPolicy;

/// Construction-time configuration for one dashboard session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Event-source websocket endpoint.
    pub url: Url,
    /// Base url of the operations REST API, used to seed initial snapshots
    /// and to issue retry/cancel actions. Without it the client runs on
    /// pushed updates alone.
    pub api_url: Option<Url>,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_fraction: f64,
    pub max_notifications: usize,
    /// How long a terminal operation stays in the status store before it is
    /// pruned. Keeps the store bounded across long dashboard sessions.
    pub terminal_retention: Duration,
}

impl SyncConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            api_url: None,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_fraction: 0.25,
            max_notifications: 100,
            terminal_retention: Duration::from_secs(300),
        }
    }

    pub fn with_api_url(mut self, api_url: Url) -> Self {
        self.api_url = Some(api_url);
        self
    }

    pub(crate) fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            jitter_fraction: self.jitter_fraction,
        }
    }
}

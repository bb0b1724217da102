use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("client was disposed; create a new session to reconnect")]
    Disposed,
}

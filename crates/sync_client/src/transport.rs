use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::SyncError;

/// Transport seam between the connection manager and the wire. Production
/// code uses [`WebSocketTransport`]; tests substitute an in-memory pair.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        url: &Url,
    ) -> Result<(Box<dyn TransportSink>, Box<dyn TransportStream>), SyncError>;
}

#[async_trait]
pub trait TransportSink: Send {
    async fn send(&mut self, text: String) -> Result<(), SyncError>;
    async fn close(&mut self);
}

#[async_trait]
pub trait TransportStream: Send {
    /// Next text frame. `None` means the peer closed the connection.
    async fn next_message(&mut self) -> Option<Result<String, SyncError>>;
}

pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(
        &self,
        url: &Url,
    ) -> Result<(Box<dyn TransportSink>, Box<dyn TransportStream>), SyncError> {
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| SyncError::Transport(err.to_string()))?;
        let (sink, stream) = stream.split();
        Ok((Box::new(WsSink { sink }), Box::new(WsStream { stream })))
    }
}

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsSink {
    sink: SplitSink<Ws, Message>,
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send(&mut self, text: String) -> Result<(), SyncError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|err| SyncError::Transport(err.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
    }
}

struct WsStream {
    stream: SplitStream<Ws>,
}

#[async_trait]
impl TransportStream for WsStream {
    async fn next_message(&mut self) -> Option<Result<String, SyncError>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text)),
                // Control and binary frames carry nothing for us.
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => continue,
                Some(Err(err)) => return Some(Err(SyncError::Transport(err.to_string()))),
            }
        }
    }
}

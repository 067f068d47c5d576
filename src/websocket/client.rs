//! WebSocket client for the streaming API
//!
//! Handles connection, the credentials handshake, message reception and the
//! keep-alive sender.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::error::{Result, StreamError};
use crate::parser::Credentials;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of a connection
pub type WsSink = SplitSink<WsStream, Message>;

/// Read half of a connection
pub struct WebSocketClient {
    stream: SplitStream<WsStream>,
    read_timeout: Option<Duration>,
}

impl WebSocketClient {
    /// Connect to `url`, returning the read half and the write half
    pub async fn connect(url: &str, read_timeout: Option<Duration>) -> Result<(Self, WsSink)> {
        info!(url = %url, "Connecting to streaming API");

        let (ws_stream, response) = connect_async(url).await.map_err(|e| {
            StreamError::WebSocketConnection(format!("Failed to connect: {}", e))
        })?;

        debug!(status = ?response.status(), "WebSocket connected");
        let (sink, stream) = ws_stream.split();

        Ok((
            Self {
                stream,
                read_timeout,
            },
            sink,
        ))
    }

    /// Receive the next text frame, honouring the read timeout if set
    pub async fn next_frame(&mut self) -> Result<Option<String>> {
        match self.read_timeout {
            Some(limit) => timeout(limit, self.recv())
                .await
                .map_err(|_| StreamError::ConnectionTimeout)?,
            None => self.recv().await,
        }
    }

    /// Receive the next message. `Ok(None)` for control frames.
    async fn recv(&mut self) -> Result<Option<String>> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(text)),
            Some(Ok(Message::Binary(data))) => {
                let text = String::from_utf8_lossy(&data).to_string();
                Ok(Some(text))
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => Ok(None),
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                Err(StreamError::WebSocketConnection(
                    "Connection closed".to_string(),
                ))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                Err(StreamError::WebSocketMessage(e.to_string()))
            }
            None => Err(StreamError::WebSocketConnection(
                "Stream ended".to_string(),
            )),
        }
    }
}

/// Send the credentials message that must open every connection
pub async fn send_credentials(sink: &mut WsSink, credentials: &Credentials) -> Result<()> {
    let payload = serde_json::to_string(credentials)?;
    sink.send(Message::Text(payload))
        .await
        .map_err(|e| StreamError::WebSocketMessage(e.to_string()))
}

/// Background task sending an empty frame once per interval
pub struct KeepAlive {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl KeepAlive {
    /// Start pinging on `sink`. The first ping goes out immediately.
    pub fn spawn(mut sink: WsSink, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            loop {
                if let Err(e) = sink.send(Message::Text(String::new())).await {
                    debug!(error = %e, "Keep-alive send failed");
                    break;
                }
                tokio::select! {
                    _ = sleep(interval) => {}
                    _ = &mut stop_rx => break,
                }
            }
            let _ = sink.close().await;
        });

        Self {
            stop: Some(stop_tx),
            task,
        }
    }

    /// Stop pinging and close the write half
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = self.task.await {
            warn!(error = %e, "Keep-alive task failed");
        }
    }
}

use anyhow::{Context, Result};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{ClientMessage, ServerMessage, Transport, TransportEvent};

/// Timeout for the pre-connect health probe
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Agent channel over a WebSocket carrying JSON `{event, data}` text frames
pub struct WebSocketTransport {
    url: String,
    /// `GET` endpoint that must answer `{"status":"ok"}` before connecting
    health_url: Option<String>,
    write: Option<WsSink>,
    reader: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            health_url: None,
            write: None,
            reader: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_health_check(mut self, health_url: impl Into<String>) -> Self {
        self.health_url = Some(health_url.into());
        self
    }

    async fn check_health(health_url: &str) -> Result<()> {
        let response = reqwest::Client::new()
            .get(health_url)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
            .context("Voice agent health check failed")?;

        let health: HealthResponse = response
            .error_for_status()
            .context("Voice agent health check failed")?
            .json()
            .await
            .context("Voice agent health response was not JSON")?;

        if health.status != "ok" {
            anyhow::bail!("Voice agent reports status '{}'", health.status);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        if self.write.is_some() {
            anyhow::bail!("Already connected to {}", self.url);
        }

        if let Some(health_url) = &self.health_url {
            Self::check_health(health_url).await?;
            debug!("Voice agent healthy at {}", health_url);
        }

        info!("Connecting to voice agent at {}", self.url);

        let (ws_stream, _response) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {}", self.url))?;

        let (write, mut read) = ws_stream.split();
        let (tx, rx) = mpsc::channel(100);
        let connected = Arc::clone(&self.connected);
        connected.store(true, Ordering::SeqCst);

        let reader = tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) => {
                                if tx.send(TransportEvent::Message(msg)).await.is_err() {
                                    debug!("Event receiver dropped");
                                    return;
                                }
                            }
                            Err(e) => warn!("Failed to parse agent message: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|f| format!("closed by agent: {}", f.reason))
                            .unwrap_or_else(|| "closed by agent".to_string());
                    }
                    Some(Ok(_)) => {} // Ignore ping/pong/binary
                    Some(Err(e)) => break format!("websocket error: {}", e),
                    None => break "stream ended".to_string(),
                }
            };

            connected.store(false, Ordering::SeqCst);
            info!("Voice agent channel closed: {}", reason);
            let _ = tx.send(TransportEvent::Disconnected { reason }).await;
        });

        self.write = Some(write);
        self.reader = Some(reader);
        info!("Connected to voice agent");

        Ok(rx)
    }

    async fn send(&mut self, message: ClientMessage) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            anyhow::bail!("Not connected to voice agent");
        }
        let write = self.write.as_mut().context("Not connected to voice agent")?;

        let payload = serde_json::to_string(&message)?;
        write
            .send(Message::Text(payload))
            .await
            .with_context(|| format!("Failed to send {}", message.event_name()))?;

        if message.is_control() {
            info!("Sent {} to voice agent", message.event_name());
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut write) = self.write.take() {
            info!("Closing voice agent channel");
            if let Err(e) = write.send(Message::Close(None)).await {
                debug!("Close frame not delivered: {}", e);
            }
            let _ = write.close().await;
        }

        if let Some(reader) = self.reader.take() {
            reader.abort();
            let _ = reader.await;
        }

        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

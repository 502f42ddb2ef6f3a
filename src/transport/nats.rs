use anyhow::{Context, Result};
use async_nats::{Client, ConnectOptions, Event};
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ClientMessage, ServerMessage, Transport, TransportEvent};

/// Reports the disconnect once, whichever side notices first
#[derive(Clone)]
struct DisconnectSignal {
    tx: mpsc::Sender<TransportEvent>,
    fired: Arc<AtomicBool>,
}

impl DisconnectSignal {
    async fn fire(&self, reason: &str) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            info!("Voice agent channel closed: {}", reason);
            let _ = self
                .tx
                .send(TransportEvent::Disconnected {
                    reason: reason.to_string(),
                })
                .await;
        }
    }
}

/// Agent channel over NATS.
///
/// Client messages are published on `<prefix>.<session>.client`; the agent
/// answers on `<prefix>.<session>.agent`.
pub struct NatsTransport {
    url: String,
    subject_prefix: String,
    session_id: String,
    client: Option<Client>,
    reader: Option<JoinHandle<()>>,
    disconnected: Arc<AtomicBool>,
}

impl NatsTransport {
    pub fn new(url: impl Into<String>, subject_prefix: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject_prefix: subject_prefix.into(),
            session_id: uuid::Uuid::new_v4().to_string(),
            client: None,
            reader: None,
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn client_subject(&self) -> String {
        format!("{}.{}.client", self.subject_prefix, self.session_id)
    }

    pub fn agent_subject(&self) -> String {
        format!("{}.{}.agent", self.subject_prefix, self.session_id)
    }
}

#[async_trait::async_trait]
impl Transport for NatsTransport {
    async fn connect(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        if self.client.is_some() {
            anyhow::bail!("Already connected to {}", self.url);
        }

        info!("Connecting to NATS at {}", self.url);

        let (tx, rx) = mpsc::channel(100);
        self.disconnected.store(false, Ordering::SeqCst);
        let signal = DisconnectSignal {
            tx: tx.clone(),
            fired: Arc::clone(&self.disconnected),
        };

        let callback_signal = signal.clone();
        let client = ConnectOptions::new()
            .event_callback(move |event| {
                let signal = callback_signal.clone();
                async move {
                    match event {
                        Event::Disconnected => signal.fire("NATS connection lost").await,
                        other => debug!("NATS event: {}", other),
                    }
                }
            })
            .connect(self.url.as_str())
            .await
            .context("Failed to connect to NATS")?;

        let subject = self.agent_subject();
        let mut subscriber = client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to agent messages")?;

        info!("Subscribed to {}", subject);

        let reader = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<ServerMessage>(&msg.payload) {
                    Ok(message) => {
                        if tx.send(TransportEvent::Message(message)).await.is_err() {
                            debug!("Event receiver dropped");
                            return;
                        }
                    }
                    Err(e) => warn!("Failed to parse agent message: {}", e),
                }
            }
            signal.fire("agent subscription ended").await;
        });

        self.client = Some(client);
        self.reader = Some(reader);
        info!("Connected to NATS successfully");

        Ok(rx)
    }

    async fn send(&mut self, message: ClientMessage) -> Result<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            anyhow::bail!("NATS connection lost");
        }
        let client = self.client.as_ref().context("Not connected to NATS")?;

        let payload = serde_json::to_vec(&message)?;
        client
            .publish(self.client_subject(), payload.into())
            .await
            .with_context(|| format!("Failed to publish {}", message.event_name()))?;

        if message.is_control() {
            info!("Published {} to {}", message.event_name(), self.client_subject());
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(reader) = self.reader.take() {
            reader.abort();
            let _ = reader.await;
        }

        if let Some(client) = self.client.take() {
            info!("Closing NATS connection");
            // Pending publishes (end-session) must leave before the client drops
            if let Err(e) = client.flush().await {
                debug!("NATS flush on close failed: {}", e);
            }
        }

        self.disconnected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_some() && !self.disconnected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "nats"
    }
}

//! Duplex channel to the remote conversational agent
//!
//! Backends:
//! - `WebSocketTransport`: JSON `{event, data}` frames over a WebSocket
//! - `NatsTransport`: the same messages on per-session NATS subjects
//!
//! A transport delivers inbound agent events and a single `Disconnected`
//! notification; it never reconnects on its own.

pub mod messages;
mod nats;
mod websocket;

pub use messages::{
    AgentError, AgentMessage, AgentMessageKind, AudioChunkMessage, ClientMessage, ServerMessage,
    SessionEnded, StartSession, TranscriptType, TranscriptUpdate,
};
pub use nats::NatsTransport;
pub use websocket::WebSocketTransport;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::audio::AudioChunk;
use crate::session::SessionConfig;

/// What a connected transport reports
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(ServerMessage),
    /// The channel is gone, voluntarily or not. Sent at most once.
    Disconnected { reason: String },
}

#[async_trait::async_trait]
pub trait Transport: Send {
    /// Open the channel. The receiver yields inbound events until the channel closes.
    async fn connect(&mut self) -> Result<mpsc::Receiver<TransportEvent>>;

    /// Fire-and-forget send; no acknowledgement is awaited
    async fn send(&mut self, message: ClientMessage) -> Result<()>;

    /// Close the channel. Safe to call when not connected.
    async fn close(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;

    async fn start_session(&mut self, config: &SessionConfig) -> Result<()> {
        self.send(ClientMessage::StartSession(StartSession::from(config)))
            .await
    }

    async fn send_audio(&mut self, chunk: &AudioChunk) -> Result<()> {
        self.send(ClientMessage::AudioChunk(AudioChunkMessage::from(chunk)))
            .await
    }

    async fn end_session(&mut self) -> Result<()> {
        self.send(ClientMessage::EndSession).await
    }
}

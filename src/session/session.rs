use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::SessionConfig;
use super::state::CallState;
use super::stats::SessionStats;
use super::transcript::{Role, TranscriptAssembler, TranscriptEntry};
use crate::audio::{AudioBackend, AudioChunk, CapturePipeline, CaptureState, MicrophoneConstraints};
use crate::completion::{CompletionHandler, Evaluator, Outcome};
use crate::error::SessionError;
use crate::speech::{SpeechEngine, SpeechEvent, SpeechOutput, VoicePreference};
use crate::transport::{ServerMessage, SessionEnded, Transport, TransportEvent, TranscriptUpdate};

/// The collaborators one session drives. Each session owns its own set.
pub struct SessionBackends {
    pub transport: Box<dyn Transport>,
    pub microphone: Box<dyn AudioBackend>,
    pub speech: Arc<dyn SpeechEngine>,
    pub evaluator: Arc<dyn Evaluator>,
}

/// Tuning that is not part of the session identity
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub microphone: MicrophoneConstraints,
    /// Length of each audio chunk sent to the agent
    pub chunk_interval: Duration,
    pub voice: VoicePreference,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            microphone: MicrophoneConstraints::default(),
            chunk_interval: Duration::from_millis(1000), // 1 second chunks
            voice: VoicePreference {
                preferred: Vec::new(),
                language: "en-US".to_string(),
            },
        }
    }
}

/// Requests other tasks can make of a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    End,
    PauseCapture,
    ResumeCapture,
}

/// Clonable handle for requesting end/pause/resume from anywhere
#[derive(Debug, Clone)]
pub struct SessionControl {
    tx: mpsc::UnboundedSender<UserAction>,
}

impl SessionControl {
    pub fn end(&self) {
        let _ = self.tx.send(UserAction::End);
    }

    pub fn pause_capture(&self) {
        let _ = self.tx.send(UserAction::PauseCapture);
    }

    pub fn resume_capture(&self) {
        let _ = self.tx.send(UserAction::ResumeCapture);
    }
}

/// Something the caller (UI) should know about
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    StateChanged(CallState),
    AgentSpeaking(bool),
    TranscriptAppended(TranscriptEntry),
    /// Interim remote transcript, not recorded
    Caption(TranscriptUpdate),
    /// Non-fatal problem; the call goes on
    Notice(SessionError),
    Finished(Outcome),
}

enum FinishReason {
    UserEnded,
    RemoteEnded(SessionEnded),
    Dropped(String),
}

/// Agent traffic and speech signals share one queue so the transcript follows
/// the order in which they actually happened.
#[derive(Debug)]
enum SessionEvent {
    Transport(TransportEvent),
    /// The transport's event stream ended
    TransportClosed,
    Speech(SpeechEvent),
}

impl From<SpeechEvent> for SessionEvent {
    fn from(event: SpeechEvent) -> Self {
        SessionEvent::Speech(event)
    }
}

enum Input {
    Action(UserAction),
    Event(SessionEvent),
    Chunk(Option<AudioChunk>),
}

/// One live voice call with the remote agent.
///
/// All inputs (user actions, agent events, speech signals, audio chunks) are
/// consumed by a single loop in `next_update`. Agent events and speech signals
/// arrive through one ordered channel, so the transcript is appended in the
/// order they happened. A finished session cannot be restarted.
pub struct VoiceSession {
    id: Uuid,
    config: SessionConfig,
    options: SessionOptions,
    state: CallState,
    transport: Box<dyn Transport>,
    capture: CapturePipeline,
    speech: SpeechOutput<SessionEvent>,
    completion: CompletionHandler,
    transcript: TranscriptAssembler,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    /// Moves transport events into `events_tx` while connected
    forwarder: Option<JoinHandle<()>>,
    chunks: Option<mpsc::UnboundedReceiver<AudioChunk>>,
    actions_tx: mpsc::UnboundedSender<UserAction>,
    actions_rx: mpsc::UnboundedReceiver<UserAction>,
    pending: VecDeque<SessionUpdate>,
    agent_speaking: bool,
    chunks_sent: u64,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    outcome: Option<Outcome>,
    last_error: Option<SessionError>,
}

impl VoiceSession {
    pub fn new(config: SessionConfig, backends: SessionBackends, options: SessionOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let speech =
            SpeechOutput::with_sender(backends.speech, options.voice.clone(), events_tx.clone());
        let capture = CapturePipeline::new(backends.microphone, options.microphone.clone());
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();

        info!(
            "Creating voice session {} ({:?} for {}, transport={})",
            id,
            config.mode,
            config.user_id,
            backends.transport.name()
        );

        Self {
            id,
            config,
            options,
            state: CallState::Inactive,
            transport: backends.transport,
            capture,
            speech,
            completion: CompletionHandler::new(backends.evaluator),
            transcript: TranscriptAssembler::new(),
            events_tx,
            events_rx,
            forwarder: None,
            chunks: None,
            actions_tx,
            actions_rx,
            pending: VecDeque::new(),
            agent_speaking: false,
            chunks_sent: 0,
            started_at: None,
            finished_at: None,
            outcome: None,
            last_error: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn is_agent_speaking(&self) -> bool {
        self.agent_speaking
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        self.transcript.entries()
    }

    /// Outcome, once finished
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Most recent error, fatal or not
    pub fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    pub fn control(&self) -> SessionControl {
        SessionControl {
            tx: self.actions_tx.clone(),
        }
    }

    pub fn stats(&self) -> SessionStats {
        let until = self.finished_at.unwrap_or_else(Utc::now);
        let duration_secs = self
            .started_at
            .map(|t| until.signed_duration_since(t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            session_id: self.id.to_string(),
            state: self.state,
            started_at: self.started_at,
            duration_secs,
            chunks_sent: self.chunks_sent,
            transcript_entries: self.transcript.len(),
            agent_speaking: self.agent_speaking,
            capture_paused: self.capture.state() == CaptureState::Paused,
        }
    }

    /// Inactive -> Connecting -> Active.
    ///
    /// On failure the session is back in `Inactive` with nothing held, and the
    /// error says whether the microphone or the channel was the problem.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if !self.state.can_start() {
            return Err(SessionError::AlreadyStarted);
        }
        self.config.validate().map_err(|e| self.report(e))?;

        if !self.capture.probe().await {
            return Err(self.report(SessionError::DeviceUnavailable(format!(
                "no usable microphone ({})",
                self.capture.backend_name()
            ))));
        }
        if !self.speech.probe().await {
            return Err(self.report(SessionError::SpeechUnavailable(
                "speech synthesis is not available".to_string(),
            )));
        }

        self.set_state(CallState::Connecting);

        if let Err(e) = self.capture.initialize().await {
            self.abort_connect().await;
            return Err(self.report(SessionError::DeviceUnavailable(format!("{:#}", e))));
        }

        match self.transport.connect().await {
            Ok(inbound) => {
                self.forwarder = Some(tokio::spawn(forward_transport(
                    inbound,
                    self.events_tx.clone(),
                )))
            }
            Err(e) => {
                self.abort_connect().await;
                return Err(self.report(SessionError::ChannelUnreachable(format!("{:#}", e))));
            }
        }

        if let Err(e) = self.transport.start_session(&self.config).await {
            self.abort_connect().await;
            return Err(self.report(SessionError::ChannelUnreachable(format!("{:#}", e))));
        }

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        if let Err(e) = self.capture.start(self.options.chunk_interval, chunk_tx) {
            self.abort_connect().await;
            return Err(self.report(SessionError::DeviceUnavailable(format!("{:#}", e))));
        }
        self.chunks = Some(chunk_rx);

        self.last_error = None;
        self.started_at = Some(Utc::now());
        self.set_state(CallState::Active);
        Ok(())
    }

    /// End the call from any state. Idempotent.
    ///
    /// From `Active` this tears everything down and runs the completion handler
    /// exactly once. From `Connecting` it releases what was acquired and goes back
    /// to `Inactive` without completion.
    pub async fn end(&mut self) -> Option<Outcome> {
        match self.state {
            CallState::Inactive => None,
            CallState::Connecting => {
                info!("Call cancelled while connecting");
                self.abort_connect().await;
                None
            }
            CallState::Active => Some(self.finish(FinishReason::UserEnded).await),
            CallState::Finished => self.outcome.clone(),
        }
    }

    pub fn pause_capture(&mut self) {
        self.capture.pause();
    }

    pub fn resume_capture(&mut self) {
        self.capture.resume();
    }

    /// Wait for the next thing worth telling the caller.
    ///
    /// Returns `None` once there is nothing left to drive (not active and no
    /// updates queued). The last update of a call is `Finished`.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            if let Some(update) = self.pending.pop_front() {
                return Some(update);
            }
            if self.state != CallState::Active {
                return None;
            }

            let input = tokio::select! {
                biased;

                Some(action) = self.actions_rx.recv() => Input::Action(action),
                Some(event) = self.events_rx.recv() => Input::Event(event),
                chunk = recv_chunk(&mut self.chunks) => Input::Chunk(chunk),
            };

            self.handle(input).await;
        }
    }

    async fn handle(&mut self, input: Input) {
        match input {
            Input::Action(UserAction::End) => {
                self.finish(FinishReason::UserEnded).await;
            }
            Input::Action(UserAction::PauseCapture) => self.capture.pause(),
            Input::Action(UserAction::ResumeCapture) => self.capture.resume(),

            Input::Event(SessionEvent::Transport(TransportEvent::Message(message))) => {
                self.handle_message(message).await
            }
            Input::Event(SessionEvent::Transport(TransportEvent::Disconnected { reason })) => {
                self.finish(FinishReason::Dropped(reason)).await;
            }
            Input::Event(SessionEvent::TransportClosed) => {
                self.finish(FinishReason::Dropped("event stream closed".to_string()))
                    .await;
            }

            Input::Event(SessionEvent::Speech(event)) => self.handle_speech(event),

            Input::Chunk(Some(chunk)) => self.forward_chunk(chunk).await,
            Input::Chunk(None) => {
                self.chunks = None;
                self.notice(SessionError::DeviceUnavailable(
                    "microphone stream ended".to_string(),
                ));
            }
        }
    }

    async fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::AgentMessage(msg) => {
                debug!("Agent {:?}: {}", msg.kind, msg.text);
                self.speech.speak(&msg.text, msg.voice.as_deref()).await;
            }
            ServerMessage::TranscriptUpdate(update) => self.handle_transcript(update),
            ServerMessage::SessionEnded(ended) => {
                info!("Agent ended the session");
                self.finish(FinishReason::RemoteEnded(ended)).await;
            }
            ServerMessage::Error(err) => {
                warn!("Agent error: {}", err.describe());
                self.notice(SessionError::AgentReported(err.describe()));
            }
        }
    }

    fn handle_speech(&mut self, event: SpeechEvent) {
        let is_latest = self.speech.latest() == Some(event.id());

        match event {
            SpeechEvent::Started { .. } => {
                if is_latest {
                    self.set_speaking(true);
                }
            }
            SpeechEvent::Ended { text, .. } => {
                if is_latest {
                    self.set_speaking(false);
                }
                self.record_utterance(text);
            }
            SpeechEvent::Failed { id, error, .. } => {
                if is_latest {
                    self.set_speaking(false);
                }
                self.notice(SessionError::SpeechPlaybackFailed(format!(
                    "utterance {}: {}",
                    id, error
                )));
            }
        }
    }

    fn handle_transcript(&mut self, update: TranscriptUpdate) {
        if update.is_final() {
            self.record(update.into_entry());
        } else {
            self.pending.push_back(SessionUpdate::Caption(update));
        }
    }

    fn record_utterance(&mut self, text: String) {
        self.record(TranscriptEntry::new(Role::Assistant, text));
    }

    fn record(&mut self, entry: TranscriptEntry) {
        if self.transcript.push(entry.clone()) {
            self.pending.push_back(SessionUpdate::TranscriptAppended(entry));
        }
    }

    async fn forward_chunk(&mut self, chunk: AudioChunk) {
        match self.transport.send_audio(&chunk).await {
            Ok(()) => self.chunks_sent += 1,
            Err(e) => debug!("Dropping audio chunk {}: {:#}", chunk.sequence, e),
        }
    }

    /// Active -> Finished. Teardown happens before the state changes.
    async fn finish(&mut self, reason: FinishReason) -> Outcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        info!("Finishing voice session {}", self.id);

        if let Err(e) = self.capture.stop().await {
            error!("Capture teardown failed: {:#}", e);
        }
        self.stop_forwarder().await;
        self.speech.stop().await;
        self.set_speaking(false);

        // Completed utterances and final lines still queued belong to the conversation
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                SessionEvent::Speech(SpeechEvent::Ended { text, .. }) => {
                    self.record_utterance(text)
                }
                SessionEvent::Transport(TransportEvent::Message(
                    ServerMessage::TranscriptUpdate(update),
                )) if update.is_final() => self.record(update.into_entry()),
                _ => {}
            }
        }

        let mut created_interview_id = None;
        match reason {
            FinishReason::UserEnded => {
                self.flush_chunks().await;
                if let Err(e) = self.transport.end_session().await {
                    warn!("Could not notify agent of session end: {:#}", e);
                }
            }
            FinishReason::RemoteEnded(ended) => {
                if let Some(transcript) = ended.transcript.filter(|t| !t.is_empty()) {
                    self.transcript.replace(transcript);
                }
                created_interview_id = ended.interview_id;
            }
            FinishReason::Dropped(reason) => {
                warn!("Voice agent channel dropped: {}", reason);
                self.notice(SessionError::ChannelDropped(reason));
            }
        }

        if let Err(e) = self.transport.close().await {
            warn!("Failed to close voice agent channel: {:#}", e);
        }
        self.chunks = None;

        self.transcript.freeze();
        self.finished_at = Some(Utc::now());
        self.set_state(CallState::Finished);

        let outcome = self
            .completion
            .complete(&self.config, created_interview_id, self.transcript.entries())
            .await;
        if let Outcome::Fallback { error } = &outcome {
            self.last_error = Some(error.clone());
        }

        self.outcome = Some(outcome.clone());
        self.pending.push_back(SessionUpdate::Finished(outcome.clone()));
        outcome
    }

    /// Send chunks flushed by the capture stop before the end-session message
    async fn flush_chunks(&mut self) {
        let Some(mut chunks) = self.chunks.take() else {
            return;
        };
        while let Ok(chunk) = chunks.try_recv() {
            self.forward_chunk(chunk).await;
        }
    }

    /// Connecting -> Inactive, releasing the device and channel
    async fn abort_connect(&mut self) {
        if let Err(e) = self.capture.stop().await {
            error!("Capture teardown failed: {:#}", e);
        }
        self.stop_forwarder().await;
        if let Err(e) = self.transport.close().await {
            warn!("Failed to close voice agent channel: {:#}", e);
        }
        self.chunks = None;

        // Nothing from the abandoned attempt may leak into the next one
        while self.events_rx.try_recv().is_ok() {}
        self.set_state(CallState::Inactive);
    }

    async fn stop_forwarder(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
            let _ = forwarder.await;
        }
    }

    fn set_state(&mut self, state: CallState) {
        if self.state == state {
            return;
        }
        info!("Call state: {} -> {}", self.state, state);
        self.state = state;
        self.pending.push_back(SessionUpdate::StateChanged(state));
    }

    fn set_speaking(&mut self, speaking: bool) {
        if self.agent_speaking != speaking {
            self.agent_speaking = speaking;
            self.pending.push_back(SessionUpdate::AgentSpeaking(speaking));
        }
    }

    fn notice(&mut self, error: SessionError) {
        warn!("{}", error);
        self.last_error = Some(error.clone());
        self.pending.push_back(SessionUpdate::Notice(error));
    }

    fn report(&mut self, error: SessionError) -> SessionError {
        error!("Cannot start call: {}", error);
        self.last_error = Some(error.clone());
        error
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

async fn forward_transport(
    mut inbound: mpsc::Receiver<TransportEvent>,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    while let Some(event) = inbound.recv().await {
        if events.send(SessionEvent::Transport(event)).is_err() {
            return;
        }
    }
    debug!("Transport event stream closed");
    let _ = events.send(SessionEvent::TransportClosed);
}

async fn recv_chunk(rx: &mut Option<mpsc::UnboundedReceiver<AudioChunk>>) -> Option<AudioChunk> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

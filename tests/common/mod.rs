// Scriptable stand-ins for the session's collaborators
//
// Each fake hands out a cloneable handle so a test can script inbound events
// and inspect what the session did after the fake was moved into it.

#![allow(dead_code)]

use anyhow::Result;
use interview_agent::audio::{AudioBackend, AudioFrame, MicrophoneConstraints};
use interview_agent::completion::{EvaluationRequest, EvaluationResult, Evaluator};
use interview_agent::session::{
    Role, SessionBackends, SessionConfig, SessionMode, SessionOptions, SessionUpdate,
    VoiceSession,
};
use interview_agent::speech::{SpeechEngine, Voice};
use interview_agent::transport::{
    AgentMessage, AgentMessageKind, ClientMessage, ServerMessage, SessionEnded, Transport,
    TransportEvent, TranscriptType, TranscriptUpdate,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ---------------------------------------------------------------- transport

#[derive(Clone, Default)]
pub struct TransportHandle {
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    inbound: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
    pub connects: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl TransportHandle {
    pub async fn push(&self, event: TransportEvent) {
        let tx = self.inbound.lock().unwrap().clone();
        tx.expect("transport not connected").send(event).await.unwrap();
    }

    pub async fn push_message(&self, message: ServerMessage) {
        self.push(TransportEvent::Message(message)).await;
    }

    pub async fn agent_says(&self, text: &str) {
        self.push_message(ServerMessage::AgentMessage(AgentMessage {
            kind: AgentMessageKind::Response,
            text: text.to_string(),
            voice: None,
            timestamp: chrono::Utc::now(),
        }))
        .await;
    }

    pub async fn transcript(&self, role: Role, content: &str, kind: Option<TranscriptType>) {
        self.push_message(ServerMessage::TranscriptUpdate(TranscriptUpdate {
            role,
            content: content.to_string(),
            transcript_type: kind,
            timestamp: chrono::Utc::now(),
        }))
        .await;
    }

    pub async fn end_session(&self, ended: SessionEnded) {
        self.push_message(ServerMessage::SessionEnded(ended)).await;
    }

    pub async fn disconnect(&self, reason: &str) {
        self.push(TransportEvent::Disconnected {
            reason: reason.to_string(),
        })
        .await;
    }

    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Event names of everything sent, in order
    pub fn sent_events(&self) -> Vec<&'static str> {
        self.sent().iter().map(|m| m.event_name()).collect()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehaviour {
    Succeed,
    Fail,
    /// Never completes, for cancelling a start midway
    Hang,
}

pub struct FakeTransport {
    handle: TransportHandle,
    behaviour: ConnectBehaviour,
    connected: bool,
}

impl FakeTransport {
    pub fn new(behaviour: ConnectBehaviour) -> (Self, TransportHandle) {
        let handle = TransportHandle::default();
        (
            Self {
                handle: handle.clone(),
                behaviour,
                connected: false,
            },
            handle,
        )
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn connect(&mut self) -> Result<mpsc::Receiver<TransportEvent>> {
        self.handle.connects.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            ConnectBehaviour::Succeed => {}
            ConnectBehaviour::Fail => anyhow::bail!("connection refused"),
            ConnectBehaviour::Hang => std::future::pending::<()>().await,
        }
        let (tx, rx) = mpsc::channel(64);
        *self.handle.inbound.lock().unwrap() = Some(tx);
        self.connected = true;
        Ok(rx)
    }

    async fn send(&mut self, message: ClientMessage) -> Result<()> {
        if !self.connected {
            anyhow::bail!("not connected");
        }
        self.handle.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.handle.closes.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
        self.handle.inbound.lock().unwrap().take();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn name(&self) -> &str {
        "fake"
    }
}

// --------------------------------------------------------------- microphone

#[derive(Clone, Default)]
pub struct MicrophoneHandle {
    frames: Arc<Mutex<Option<mpsc::Sender<AudioFrame>>>>,
    pub opens: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
}

impl MicrophoneHandle {
    /// Feed `count` frames of 100ms, 16kHz mono
    pub async fn speak_frames(&self, count: usize) {
        self.send_frames(count, 100).await;
    }

    /// Feed `count` frames of digital silence
    pub async fn silent_frames(&self, count: usize) {
        self.send_frames(count, 0).await;
    }

    async fn send_frames(&self, count: usize, level: i16) {
        let tx = self.frames.lock().unwrap().clone();
        let tx = tx.expect("microphone not open");
        for i in 0..count {
            tx.send(AudioFrame {
                samples: vec![level; 1600],
                sample_rate: 16000,
                channels: 1,
                timestamp_ms: i as u64 * 100,
            })
            .await
            .unwrap();
        }
    }

    pub fn is_held(&self) -> bool {
        self.frames.lock().unwrap().is_some()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

pub struct FakeMicrophone {
    handle: MicrophoneHandle,
    present: bool,
    deny_open: bool,
}

impl FakeMicrophone {
    pub fn new() -> (Self, MicrophoneHandle) {
        let handle = MicrophoneHandle::default();
        (
            Self {
                handle: handle.clone(),
                present: true,
                deny_open: false,
            },
            handle,
        )
    }

    /// No device at all
    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }

    /// Device exists but permission is refused
    pub fn denied(mut self) -> Self {
        self.deny_open = true;
        self
    }
}

#[async_trait::async_trait]
impl AudioBackend for FakeMicrophone {
    async fn probe(&self) -> bool {
        self.present
    }

    async fn open(&mut self, _constraints: &MicrophoneConstraints) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.deny_open {
            anyhow::bail!("permission denied");
        }
        self.handle.opens.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(256);
        *self.handle.frames.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn release(&mut self) -> Result<()> {
        self.handle.releases.fetch_add(1, Ordering::SeqCst);
        self.handle.frames.lock().unwrap().take();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.handle.is_held()
    }

    fn name(&self) -> &str {
        "fake-mic"
    }
}

// ------------------------------------------------------------------- speech

#[derive(Clone, Default)]
pub struct SpeechHandle {
    pub started: Arc<Mutex<Vec<String>>>,
    pub completed: Arc<Mutex<Vec<String>>>,
    pub cancelled: Arc<Mutex<Vec<String>>>,
}

impl SpeechHandle {
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

/// Records an utterance as cancelled if its playback future is dropped early
struct PlaybackGuard {
    text: String,
    cancelled: Arc<Mutex<Vec<String>>>,
    done: bool,
}

impl Drop for PlaybackGuard {
    fn drop(&mut self) {
        if !self.done {
            self.cancelled.lock().unwrap().push(self.text.clone());
        }
    }
}

pub struct FakeSpeech {
    handle: SpeechHandle,
    available: bool,
    duration: Duration,
    /// Utterances containing this text fail
    fail_on: Option<String>,
}

impl FakeSpeech {
    pub fn new(duration: Duration) -> (Self, SpeechHandle) {
        let handle = SpeechHandle::default();
        (
            Self {
                handle: handle.clone(),
                available: true,
                duration,
                fail_on: None,
            },
            handle,
        )
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }
}

#[async_trait::async_trait]
impl SpeechEngine for FakeSpeech {
    async fn probe(&self) -> bool {
        self.available
    }

    async fn voices(&self) -> Vec<Voice> {
        vec![Voice::new("test-voice", "en-US")]
    }

    async fn speak(&self, text: &str, _voice: Option<&Voice>) -> Result<()> {
        self.handle.started.lock().unwrap().push(text.to_string());
        let mut guard = PlaybackGuard {
            text: text.to_string(),
            cancelled: Arc::clone(&self.handle.cancelled),
            done: false,
        };

        tokio::time::sleep(self.duration).await;
        guard.done = true;

        if self.fail_on.as_deref().is_some_and(|f| text.contains(f)) {
            anyhow::bail!("audio output device busy");
        }
        self.handle.completed.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "fake-speech"
    }
}

// --------------------------------------------------------------- evaluation

#[derive(Default)]
pub struct CountingEvaluator {
    pub requests: Mutex<Vec<EvaluationRequest>>,
    pub succeed: bool,
}

impl CountingEvaluator {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            succeed: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<EvaluationRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl Evaluator for CountingEvaluator {
    async fn evaluate(&self, request: EvaluationRequest) -> Result<EvaluationResult> {
        self.requests.lock().unwrap().push(request);
        Ok(EvaluationResult {
            success: self.succeed,
            feedback_id: self.succeed.then(|| "fb_1".to_string()),
            message: None,
        })
    }
}

// ------------------------------------------------------------------ harness

pub struct Harness {
    pub session: VoiceSession,
    pub transport: TransportHandle,
    pub mic: MicrophoneHandle,
    pub speech: SpeechHandle,
    pub evaluator: Arc<CountingEvaluator>,
}

pub struct HarnessBuilder {
    config: SessionConfig,
    connect: ConnectBehaviour,
    mic: FakeMicrophone,
    mic_handle: MicrophoneHandle,
    speech: FakeSpeech,
    speech_handle: SpeechHandle,
}

impl HarnessBuilder {
    pub fn interview(interview_id: &str) -> Self {
        let config = SessionConfig::new("user-1", "Ada", SessionMode::Interview)
            .with_interview_id(interview_id)
            .with_questions(vec![
                "Tell me about yourself".to_string(),
                "Why Rust?".to_string(),
            ]);
        Self::with_config(config)
    }

    pub fn generate() -> Self {
        Self::with_config(SessionConfig::new("user-1", "Ada", SessionMode::Generate))
    }

    pub fn with_config(config: SessionConfig) -> Self {
        let (mic, mic_handle) = FakeMicrophone::new();
        let (speech, speech_handle) = FakeSpeech::new(Duration::from_millis(200));
        Self {
            config,
            connect: ConnectBehaviour::Succeed,
            mic,
            mic_handle,
            speech,
            speech_handle,
        }
    }

    pub fn connect(mut self, behaviour: ConnectBehaviour) -> Self {
        self.connect = behaviour;
        self
    }

    pub fn mic(mut self, f: impl FnOnce(FakeMicrophone) -> FakeMicrophone) -> Self {
        self.mic = f(self.mic);
        self
    }

    pub fn speech(mut self, f: impl FnOnce(FakeSpeech) -> FakeSpeech) -> Self {
        self.speech = f(self.speech);
        self
    }

    pub fn build(self) -> Harness {
        let (transport, transport_handle) = FakeTransport::new(self.connect);
        let evaluator = CountingEvaluator::succeeding();

        let backends = SessionBackends {
            transport: Box::new(transport),
            microphone: Box::new(self.mic),
            speech: Arc::new(self.speech),
            evaluator: evaluator.clone(),
        };

        Harness {
            session: VoiceSession::new(self.config, backends, SessionOptions::default()),
            transport: transport_handle,
            mic: self.mic_handle,
            speech: self.speech_handle,
            evaluator,
        }
    }
}

impl Harness {
    /// Pull updates until one matches, giving up after 30s of (virtual) time
    pub async fn until(&mut self, mut pred: impl FnMut(&SessionUpdate) -> bool) -> Vec<SessionUpdate> {
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
        loop {
            let update = tokio::time::timeout_at(deadline, self.session.next_update())
                .await
                .expect("timed out waiting for session update")
                .expect("session stopped producing updates");
            let done = pred(&update);
            seen.push(update);
            if done {
                return seen;
            }
        }
    }

    pub async fn until_finished(&mut self) -> Vec<SessionUpdate> {
        self.until(|u| matches!(u, SessionUpdate::Finished(_))).await
    }

    /// Let the session run for `duration` without expecting anything
    pub async fn idle_for(&mut self, duration: Duration) -> Vec<SessionUpdate> {
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + duration;
        while let Ok(Some(update)) = tokio::time::timeout_at(deadline, self.session.next_update()).await {
            seen.push(update);
        }
        seen
    }
}

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{SpeechEngine, VoicePreference};

pub type UtteranceId = u64;

/// Playback signals, tagged with the utterance they belong to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Started { id: UtteranceId, text: String },
    /// Playback ran to completion
    Ended { id: UtteranceId, text: String },
    /// Playback failed; the utterance is abandoned
    Failed { id: UtteranceId, text: String, error: String },
}

impl SpeechEvent {
    pub fn id(&self) -> UtteranceId {
        match self {
            SpeechEvent::Started { id, .. }
            | SpeechEvent::Ended { id, .. }
            | SpeechEvent::Failed { id, .. } => *id,
        }
    }
}

/// Plays agent text one utterance at a time.
///
/// A new `speak` cancels the utterance in flight and waits for it to be gone
/// before the next one begins. Cancelled utterances emit no `Ended`.
///
/// Events are delivered as `E`, so a caller can route them into a channel it
/// shares with other producers and observe one arrival order.
pub struct SpeechOutput<E = SpeechEvent> {
    engine: Arc<dyn SpeechEngine>,
    preference: VoicePreference,
    events: mpsc::UnboundedSender<E>,
    current: Option<JoinHandle<()>>,
    latest: Option<UtteranceId>,
    next_id: UtteranceId,
}

impl SpeechOutput<SpeechEvent> {
    pub fn new(
        engine: Arc<dyn SpeechEngine>,
        preference: VoicePreference,
    ) -> (Self, mpsc::UnboundedReceiver<SpeechEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        (Self::with_sender(engine, preference, events), events_rx)
    }
}

impl<E> SpeechOutput<E>
where
    E: From<SpeechEvent> + Send + 'static,
{
    /// Deliver events into an existing channel
    pub fn with_sender(
        engine: Arc<dyn SpeechEngine>,
        preference: VoicePreference,
        events: mpsc::UnboundedSender<E>,
    ) -> Self {
        Self {
            engine,
            preference,
            events,
            current: None,
            latest: None,
            next_id: 0,
        }
    }

    pub async fn probe(&self) -> bool {
        self.engine.probe().await
    }

    /// Id of the most recently requested utterance
    pub fn latest(&self) -> Option<UtteranceId> {
        self.latest
    }

    pub fn is_speaking(&self) -> bool {
        self.current.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Speak `text`, replacing whatever is playing. `voice` is a preferred voice name.
    pub async fn speak(&mut self, text: &str, voice: Option<&str>) -> UtteranceId {
        self.cancel_current().await;

        let id = self.next_id;
        self.next_id += 1;
        self.latest = Some(id);

        let mut preference = self.preference.clone();
        if let Some(name) = voice {
            preference.preferred.insert(0, name.to_string());
        }

        let engine = Arc::clone(&self.engine);
        let events = self.events.clone();
        let text = text.to_string();

        self.current = Some(tokio::spawn(async move {
            let voices = engine.voices().await;
            let voice = preference.resolve(&voices);
            if voice.is_none() {
                debug!("No voices listed by {}, using engine default", engine.name());
            }

            let _ = events.send(E::from(SpeechEvent::Started {
                id,
                text: text.clone(),
            }));

            let event = match engine.speak(&text, voice.as_ref()).await {
                Ok(()) => SpeechEvent::Ended { id, text },
                Err(e) => {
                    warn!("Utterance {} failed: {:#}", id, e);
                    SpeechEvent::Failed {
                        id,
                        text,
                        error: format!("{:#}", e),
                    }
                }
            };
            let _ = events.send(E::from(event));
        }));

        id
    }

    /// Cancel any utterance in flight. Always safe to call.
    pub async fn stop(&mut self) {
        self.cancel_current().await;
    }

    async fn cancel_current(&mut self) {
        if let Some(handle) = self.current.take() {
            if !handle.is_finished() {
                handle.abort();
                let _ = handle.await;
                info!("Cancelled utterance {:?}", self.latest);
            }
        }
    }
}

impl<E> Drop for SpeechOutput<E> {
    fn drop(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.abort();
        }
    }
}

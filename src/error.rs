use serde::Serialize;
use thiserror::Error;

/// Failures a voice session can report to its caller.
///
/// Component internals use `anyhow`; the session decides which of these kinds
/// a failure maps to based on the lifecycle step that produced it.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail")]
pub enum SessionError {
    /// Microphone denied or missing. The session never starts.
    #[error("Microphone unavailable: {0}")]
    DeviceUnavailable(String),

    /// Speech output service missing. The session never starts.
    #[error("Speech output unavailable: {0}")]
    SpeechUnavailable(String),

    /// Could not open the agent channel. Retrying may help.
    #[error("Could not reach the voice agent: {0}")]
    ChannelUnreachable(String),

    /// Agent channel lost mid-call. The call is over.
    #[error("Connection to the voice agent was lost: {0}")]
    ChannelDropped(String),

    /// One utterance could not be played. The call continues.
    #[error("Could not play agent speech: {0}")]
    SpeechPlaybackFailed(String),

    /// Error event from the agent. The call continues.
    #[error("Voice agent reported an error: {0}")]
    AgentReported(String),

    #[error("Could not evaluate the interview: {0}")]
    EvaluationFailed(String),

    #[error("No conversation was recorded, nothing to evaluate")]
    EmptyTranscript,

    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("A call has already been started on this session")]
    AlreadyStarted,
}

impl SessionError {
    /// Errors that leave the session usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::SpeechPlaybackFailed(_)
                | SessionError::AgentReported(_)
                | SessionError::DeviceUnavailable(_)
                | SessionError::ChannelUnreachable(_)
        )
    }
}

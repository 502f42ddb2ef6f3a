//! Voice session management
//!
//! This module provides the `VoiceSession` abstraction that manages:
//! - Call lifecycle (inactive, connecting, active, finished)
//! - Microphone capture and chunk streaming to the agent
//! - Agent speech playback, last request wins
//! - Transcript assembly and post-call completion

mod config;
mod session;
mod state;
mod stats;
mod transcript;

pub use config::{SessionConfig, SessionMode};
pub use session::{
    SessionBackends, SessionControl, SessionOptions, SessionUpdate, UserAction, VoiceSession,
};
pub use state::CallState;
pub use stats::SessionStats;
pub use transcript::{format_transcript, Role, TranscriptAssembler, TranscriptEntry};

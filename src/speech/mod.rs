//! Agent speech output
//!
//! - `SpeechEngine`: a synthesizer backend that can list voices and render text
//! - `SpeechOutput`: plays one utterance at a time (last request wins) and
//!   reports start/end/error signals to the session
//! - `CommandEngine`: drives an `espeak-ng` compatible command-line synthesizer

mod command;
mod output;

pub use command::CommandEngine;
pub use output::{SpeechEvent, SpeechOutput, UtteranceId};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A voice offered by the synthesizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    /// Language tag, e.g. "en-US" or "en"
    pub language: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
        }
    }

    fn matches_language(&self, language: &str) -> bool {
        let lang = self.language.to_ascii_lowercase();
        let want = language.to_ascii_lowercase();
        lang == want || lang.split(['-', '_']).next() == want.split(['-', '_']).next()
    }
}

/// Which voice to use, resolved against whatever voices exist at call time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoicePreference {
    /// Voice names in order of preference
    pub preferred: Vec<String>,
    /// Fallback language when no preferred voice is present
    pub language: String,
}

impl VoicePreference {
    /// Preferred name, then language, then anything. `None` only when no voices exist.
    pub fn resolve(&self, available: &[Voice]) -> Option<Voice> {
        self.preferred
            .iter()
            .find_map(|name| {
                available
                    .iter()
                    .find(|v| v.name.eq_ignore_ascii_case(name))
            })
            .or_else(|| {
                available
                    .iter()
                    .find(|v| v.matches_language(&self.language))
            })
            .or_else(|| available.first())
            .cloned()
    }
}

/// Speech synthesizer backend
#[async_trait::async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Whether speech output can be used. Never fails.
    async fn probe(&self) -> bool;

    /// Voices available right now; the set may change over time
    async fn voices(&self) -> Vec<Voice>;

    /// Render `text` audibly, returning once playback has finished.
    ///
    /// Dropping the future must stop playback.
    async fn speak(&self, text: &str, voice: Option<&Voice>) -> Result<()>;

    fn name(&self) -> &str;
}

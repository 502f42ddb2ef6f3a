use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Who said a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// A single turn of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,

    pub content: String,

    /// When the entry was produced (remote) or accepted (local)
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only conversation log fed by local speech and remote transcript events.
///
/// Entries keep the order in which they are accepted. Nothing is deduplicated.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    entries: Vec<TranscriptEntry>,
    frozen: bool,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Returns false once the log is frozen.
    pub fn push(&mut self, entry: TranscriptEntry) -> bool {
        if self.frozen {
            warn!("Transcript is final, dropping late {} entry", entry.role);
            return false;
        }
        debug!("Transcript += [{}] {}", entry.role, entry.content);
        self.entries.push(entry);
        true
    }

    /// Replace the whole log with the authoritative server record
    pub fn replace(&mut self, entries: Vec<TranscriptEntry>) -> bool {
        if self.frozen {
            warn!("Transcript is final, ignoring replacement");
            return false;
        }
        info!(
            "Replacing local transcript ({} entries) with server transcript ({} entries)",
            self.entries.len(),
            entries.len()
        );
        self.entries = entries;
        true
    }

    /// Make the log immutable
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }
}

/// Render as `- role : content` lines
pub fn format_transcript(entries: &[TranscriptEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("- {} : {}\n", e.role, e.content))
        .collect()
}

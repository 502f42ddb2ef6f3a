use serde::{Deserialize, Serialize};

/// Call lifecycle. Owned by the session; everything else only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallState {
    Inactive,
    Connecting,
    Active,
    /// Terminal for this session instance
    Finished,
}

impl Default for CallState {
    fn default() -> Self {
        CallState::Inactive
    }
}

impl CallState {
    /// Whether the call-to-action ("Call") should be offered
    pub fn can_start(&self) -> bool {
        *self == CallState::Inactive
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CallState::Inactive => "INACTIVE",
            CallState::Connecting => "CONNECTING",
            CallState::Active => "ACTIVE",
            CallState::Finished => "FINISHED",
        };
        f.write_str(label)
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::state::CallState;

/// Statistics about a voice session
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub session_id: String,

    pub state: CallState,

    /// When the call became active
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since the call became active
    pub duration_secs: f64,

    /// Audio chunks delivered to the transport
    pub chunks_sent: u64,

    /// Number of transcript entries so far
    pub transcript_entries: usize,

    pub agent_speaking: bool,

    pub capture_paused: bool,
}

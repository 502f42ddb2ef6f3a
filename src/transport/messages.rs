use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audio::AudioChunk;
use crate::session::{Role, SessionConfig, TranscriptEntry};

/// Session start payload: the config plus the questions pre-rendered for the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSession {
    #[serde(flatten)]
    pub config: SessionConfig,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub formatted_questions: String,
}

impl From<&SessionConfig> for StartSession {
    fn from(config: &SessionConfig) -> Self {
        Self {
            config: config.clone(),
            formatted_questions: config.formatted_questions(),
        }
    }
}

/// Audio chunk message sent to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioChunkMessage {
    pub sequence: u64,
    /// Base64-encoded WAV bytes
    pub audio: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl From<&AudioChunk> for AudioChunkMessage {
    fn from(chunk: &AudioChunk) -> Self {
        Self {
            sequence: chunk.sequence,
            audio: chunk.to_base64(),
            sample_rate: chunk.sample_rate,
            channels: chunk.channels,
            start_ms: chunk.start_ms,
            end_ms: chunk.end_ms,
        }
    }
}

/// Everything the client sends to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    StartSession(StartSession),
    AudioChunk(AudioChunkMessage),
    EndSession,
}

impl ClientMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::StartSession(_) => "start-session",
            ClientMessage::AudioChunk(_) => "audio-chunk",
            ClientMessage::EndSession => "end-session",
        }
    }

    /// Control messages steer the session; everything else is media
    pub fn is_control(&self) -> bool {
        !matches!(self, ClientMessage::AudioChunk(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMessageKind {
    Greeting,
    Response,
    Question,
}

/// Instruction for the client to speak
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    #[serde(rename = "type")]
    pub kind: AgentMessageKind,

    pub text: String,

    /// Preferred voice name, if the agent wants one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptType {
    Partial,
    Final,
}

/// Remote transcript line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptUpdate {
    pub role: Role,

    pub content: String,

    /// Absent means final
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_type: Option<TranscriptType>,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl TranscriptUpdate {
    pub fn is_final(&self) -> bool {
        self.transcript_type != Some(TranscriptType::Partial)
    }

    pub fn into_entry(self) -> TranscriptEntry {
        TranscriptEntry {
            role: self.role,
            content: self.content,
            timestamp: self.timestamp,
        }
    }
}

/// Terminal event from the agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnded {
    /// Authoritative transcript, if the agent kept one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Vec<TranscriptEntry>>,

    /// Interview created during a generate session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interview_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error reported by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentError {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

impl AgentError {
    /// Message with a hint for well-known status codes
    pub fn describe(&self) -> String {
        let hint = match self.status_code {
            Some(400) => Some("bad request, check the session parameters"),
            Some(401) => Some("unauthorized, check the agent credentials"),
            Some(404) => Some("not found, check the agent address"),
            Some(500) => Some("agent failure, try again later"),
            _ => None,
        };
        match (self.status_code, hint) {
            (Some(code), Some(hint)) => format!("{} (agent error {}: {})", self.message, code, hint),
            (Some(code), None) => format!("{} (agent error {})", self.message, code),
            _ => self.message.clone(),
        }
    }
}

/// Everything the agent sends to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    AgentMessage(AgentMessage),
    TranscriptUpdate(TranscriptUpdate),
    SessionEnded(SessionEnded),
    Error(AgentError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionMode;

    #[test]
    fn test_client_messages_are_event_tagged() {
        let config = SessionConfig::new("u1", "Ada", SessionMode::Interview)
            .with_questions(vec!["Why Rust?".to_string()]);
        let json = serde_json::to_value(ClientMessage::StartSession(StartSession::from(&config))).unwrap();
        assert_eq!(json["event"], "start-session");
        assert_eq!(json["data"]["userName"], "Ada");
        assert_eq!(json["data"]["formattedQuestions"], "- Why Rust?");

        let json = serde_json::to_string(&ClientMessage::EndSession).unwrap();
        assert_eq!(json, r#"{"event":"end-session"}"#);
    }

    #[test]
    fn test_control_versus_media() {
        assert!(ClientMessage::EndSession.is_control());
        let chunk = AudioChunkMessage {
            sequence: 0,
            audio: String::new(),
            sample_rate: 16000,
            channels: 1,
            start_ms: 0,
            end_ms: 900,
        };
        assert!(!ClientMessage::AudioChunk(chunk).is_control());
    }

    #[test]
    fn test_parse_agent_message() {
        let json = r#"{"event":"agent-message","data":{"type":"question","text":"Tell me about a hard bug"}}"#;
        match serde_json::from_str::<ServerMessage>(json).unwrap() {
            ServerMessage::AgentMessage(msg) => {
                assert_eq!(msg.kind, AgentMessageKind::Question);
                assert_eq!(msg.text, "Tell me about a hard bug");
                assert!(msg.voice.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_transcript_update_finality() {
        let json = r#"{"event":"transcript-update","data":{"role":"user","content":"I think","transcriptType":"partial"}}"#;
        let ServerMessage::TranscriptUpdate(update) = serde_json::from_str(json).unwrap() else {
            panic!("expected transcript update");
        };
        assert!(!update.is_final());

        let json = r#"{"event":"transcript-update","data":{"role":"system","content":"joined"}}"#;
        let ServerMessage::TranscriptUpdate(update) = serde_json::from_str(json).unwrap() else {
            panic!("expected transcript update");
        };
        assert!(update.is_final());
        assert_eq!(update.into_entry().role, Role::System);
    }

    #[test]
    fn test_session_ended_with_and_without_payload() {
        let json = r#"{"event":"session-ended","data":{"interviewId":"ivw_42"}}"#;
        let ServerMessage::SessionEnded(ended) = serde_json::from_str(json).unwrap() else {
            panic!("expected session-ended");
        };
        assert_eq!(ended.interview_id.as_deref(), Some("ivw_42"));
        assert!(ended.transcript.is_none());

        let json = r#"{"event":"session-ended","data":{"transcript":[{"role":"user","content":"bye"}]}}"#;
        let ServerMessage::SessionEnded(ended) = serde_json::from_str(json).unwrap() else {
            panic!("expected session-ended");
        };
        assert_eq!(ended.transcript.unwrap().len(), 1);
    }

    #[test]
    fn test_agent_error_description() {
        let err = AgentError {
            message: "rejected".to_string(),
            status_code: Some(401),
        };
        assert!(err.describe().contains("unauthorized"));

        let err = AgentError {
            message: "boom".to_string(),
            status_code: None,
        };
        assert_eq!(err.describe(), "boom");
    }
}

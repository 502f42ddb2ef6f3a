use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// What the call is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Mock interview against prepared questions; evaluated when it ends
    Interview,
    /// Conversation that collects preferences and creates a new interview
    Generate,
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interview" => Ok(SessionMode::Interview),
            "generate" => Ok(SessionMode::Generate),
            other => Err(format!("unknown session mode '{}'", other)),
        }
    }
}

/// Immutable input to one voice session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub user_id: String,

    pub user_name: String,

    #[serde(rename = "type")]
    pub mode: SessionMode,

    /// Prepared questions (interview mode)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interview_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_stack: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
}

impl SessionConfig {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>, mode: SessionMode) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            mode,
            questions: Vec::new(),
            interview_id: None,
            role: None,
            level: None,
            tech_stack: None,
            focus: None,
        }
    }

    pub fn with_interview_id(mut self, id: impl Into<String>) -> Self {
        self.interview_id = Some(id.into());
        self
    }

    pub fn with_questions(mut self, questions: Vec<String>) -> Self {
        self.questions = questions;
        self
    }

    /// Check the fields a call cannot start without
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.user_id.trim().is_empty() || self.user_name.trim().is_empty() {
            return Err(SessionError::InvalidConfig(
                "user id and user name are required".to_string(),
            ));
        }
        Ok(())
    }

    /// Questions as a bullet list, one `- question` per line
    pub fn formatted_questions(&self) -> String {
        self.questions
            .iter()
            .map(|q| format!("- {}", q))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

//! Interview and feedback records
//!
//! The voice session only needs "create and get an id back" and "fetch by id".
//! - `MemoryStore`: process-local, for tests and one-off runs
//! - `JsonFileStore`: one JSON document per record under a directory

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::info;

use crate::session::{SessionConfig, SessionMode, TranscriptEntry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRecord {
    pub user_id: String,
    pub role: String,
    pub level: String,
    pub tech_stack: Vec<String>,
    /// Behavioural/technical leaning
    #[serde(default)]
    pub focus: Option<String>,
    pub questions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl InterviewRecord {
    /// Session config for an interview call about this record
    pub fn session_config(
        &self,
        interview_id: &str,
        user_id: &str,
        user_name: &str,
    ) -> SessionConfig {
        let mut config = SessionConfig::new(user_id, user_name, SessionMode::Interview)
            .with_interview_id(interview_id)
            .with_questions(self.questions.clone());
        config.role = Some(self.role.clone());
        config.level = Some(self.level.clone());
        config.tech_stack = Some(self.tech_stack.join(","));
        config.focus = self.focus.clone();
        config
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub interview_id: String,
    pub user_id: String,
    pub transcript: Vec<TranscriptEntry>,
    #[serde(default)]
    pub total_score: Option<u32>,
    #[serde(default)]
    pub final_assessment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Store a new interview, returning its generated id
    async fn create_interview(&self, record: InterviewRecord) -> Result<String>;

    async fn get_interview(&self, id: &str) -> Result<Option<InterviewRecord>>;

    /// Store new feedback, returning its generated id
    async fn create_feedback(&self, record: FeedbackRecord) -> Result<String>;

    async fn get_feedback(&self, id: &str) -> Result<Option<FeedbackRecord>>;
}

fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

#[derive(Default)]
pub struct MemoryStore {
    interviews: RwLock<HashMap<String, InterviewRecord>>,
    feedback: RwLock<HashMap<String, FeedbackRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn create_interview(&self, record: InterviewRecord) -> Result<String> {
        let id = new_id("ivw");
        self.interviews.write().await.insert(id.clone(), record);
        Ok(id)
    }

    async fn get_interview(&self, id: &str) -> Result<Option<InterviewRecord>> {
        Ok(self.interviews.read().await.get(id).cloned())
    }

    async fn create_feedback(&self, record: FeedbackRecord) -> Result<String> {
        let id = new_id("fb");
        self.feedback.write().await.insert(id.clone(), record);
        Ok(id)
    }

    async fn get_feedback(&self, id: &str) -> Result<Option<FeedbackRecord>> {
        Ok(self.feedback.read().await.get(id).cloned())
    }
}

/// Records as `<root>/<collection>/<id>.json`
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, collection: &str, id: &str) -> Result<PathBuf> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            anyhow::bail!("Invalid record id '{}'", id);
        }
        Ok(self.root.join(collection).join(format!("{}.json", id)))
    }

    async fn create<T: Serialize + Sync>(&self, collection: &str, prefix: &str, record: &T) -> Result<String> {
        let id = new_id(prefix);
        let path = self.path(collection, &id)?;
        let dir = self.root.join(collection);

        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let json = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!("Stored {} record {}", collection, id);
        Ok(id)
    }

    async fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        let path = self.path(collection, id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Corrupt record {}", path.display()))?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for JsonFileStore {
    async fn create_interview(&self, record: InterviewRecord) -> Result<String> {
        self.create("interviews", "ivw", &record).await
    }

    async fn get_interview(&self, id: &str) -> Result<Option<InterviewRecord>> {
        self.get("interviews", id).await
    }

    async fn create_feedback(&self, record: FeedbackRecord) -> Result<String> {
        self.create("feedback", "fb", &record).await
    }

    async fn get_feedback(&self, id: &str) -> Result<Option<FeedbackRecord>> {
        self.get("feedback", id).await
    }
}

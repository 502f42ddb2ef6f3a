//! Post-call routing: results for generate sessions, evaluation for interviews

mod evaluation;

pub use evaluation::{EvaluationRequest, EvaluationResult, Evaluator, HttpEvaluator};

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::SessionError;
use crate::session::{SessionConfig, SessionMode, TranscriptEntry};

/// Where the user goes after the call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum Outcome {
    /// Generate session finished; the new interview is ready
    ResultsReady { interview_id: Option<String> },
    /// Interview evaluated
    FeedbackReady {
        interview_id: String,
        feedback_id: Option<String>,
    },
    /// Back to the pre-interview view, with the reason
    Fallback { error: SessionError },
}

pub struct CompletionHandler {
    evaluator: Arc<dyn Evaluator>,
}

impl CompletionHandler {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self { evaluator }
    }

    /// Decide the outcome of a finished call.
    ///
    /// `created_interview_id` is the id reported by the agent when the call ended.
    pub async fn complete(
        &self,
        config: &SessionConfig,
        created_interview_id: Option<String>,
        transcript: &[TranscriptEntry],
    ) -> Outcome {
        if config.mode == SessionMode::Generate {
            let interview_id = created_interview_id.or_else(|| config.interview_id.clone());
            info!("Generate session complete, interview {:?}", interview_id);
            return Outcome::ResultsReady { interview_id };
        }

        if transcript.is_empty() {
            return fallback(SessionError::EmptyTranscript);
        }

        let Some(interview_id) = config.interview_id.clone().or(created_interview_id) else {
            return fallback(SessionError::EvaluationFailed(
                "interview id is missing".to_string(),
            ));
        };

        let request = EvaluationRequest {
            interview_id: interview_id.clone(),
            user_id: config.user_id.clone(),
            transcript: transcript.to_vec(),
        };

        match self.evaluator.evaluate(request).await {
            Ok(result) if result.success => {
                info!(
                    "Feedback ready for interview {} ({:?})",
                    interview_id, result.feedback_id
                );
                Outcome::FeedbackReady {
                    interview_id,
                    feedback_id: result.feedback_id,
                }
            }
            Ok(result) => fallback(SessionError::EvaluationFailed(
                result
                    .message
                    .unwrap_or_else(|| "evaluation was not successful".to_string()),
            )),
            Err(e) => fallback(SessionError::EvaluationFailed(format!("{:#}", e))),
        }
    }
}

fn fallback(error: SessionError) -> Outcome {
    error!("Call finished without feedback: {}", error);
    Outcome::Fallback { error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;
    use anyhow::Result;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubEvaluator {
        calls: AtomicUsize,
        result: Option<EvaluationResult>,
    }

    #[async_trait::async_trait]
    impl Evaluator for StubEvaluator {
        async fn evaluate(&self, _request: EvaluationRequest) -> Result<EvaluationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .clone()
                .ok_or_else(|| anyhow::anyhow!("feedback service returned 503"))
        }
    }

    fn completion(result: Option<EvaluationResult>) -> (CompletionHandler, Arc<StubEvaluator>) {
        let stub = Arc::new(StubEvaluator {
            calls: AtomicUsize::new(0),
            result,
        });
        (CompletionHandler::new(stub.clone()), stub)
    }

    fn ok() -> Option<EvaluationResult> {
        Some(EvaluationResult {
            success: true,
            feedback_id: Some("fb_9".to_string()),
            message: None,
        })
    }

    fn transcript() -> Vec<TranscriptEntry> {
        vec![TranscriptEntry::new(Role::User, "I'd use a channel")]
    }

    #[tokio::test]
    async fn test_generate_prefers_created_interview() {
        let (handler, stub) = completion(ok());
        let config = SessionConfig::new("u1", "Ada", SessionMode::Generate).with_interview_id("ivw_old");

        let outcome = handler.complete(&config, Some("ivw_new".into()), &[]).await;
        assert_eq!(outcome, Outcome::ResultsReady { interview_id: Some("ivw_new".into()) });

        let outcome = handler.complete(&config, None, &[]).await;
        assert_eq!(outcome, Outcome::ResultsReady { interview_id: Some("ivw_old".into()) });
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_interview_without_id_or_transcript_falls_back() {
        let (handler, stub) = completion(ok());

        let config = SessionConfig::new("u1", "Ada", SessionMode::Interview).with_interview_id("ivw_1");
        let outcome = handler.complete(&config, None, &[]).await;
        assert_eq!(outcome, Outcome::Fallback { error: SessionError::EmptyTranscript });

        let config = SessionConfig::new("u1", "Ada", SessionMode::Interview);
        let outcome = handler.complete(&config, None, &transcript()).await;
        assert!(matches!(outcome, Outcome::Fallback { error: SessionError::EvaluationFailed(_) }));
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_evaluation_errors_fall_back() {
        let (handler, stub) = completion(None);
        let config = SessionConfig::new("u1", "Ada", SessionMode::Interview).with_interview_id("ivw_1");

        match handler.complete(&config, None, &transcript()).await {
            Outcome::Fallback { error: SessionError::EvaluationFailed(msg) } => {
                assert!(msg.contains("503"))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

        let (handler, _) = handler_with_failure();
        let outcome = handler.complete(&config, None, &transcript()).await;
        assert!(matches!(outcome, Outcome::Fallback { .. }));
    }

    fn handler_with_failure() -> (CompletionHandler, Arc<StubEvaluator>) {
        completion(Some(EvaluationResult {
            success: false,
            feedback_id: None,
            message: Some("model overloaded".to_string()),
        }))
    }

    #[tokio::test]
    async fn test_interview_feedback_ready() {
        let (handler, _) = completion(ok());
        let config = SessionConfig::new("u1", "Ada", SessionMode::Interview).with_interview_id("ivw_1");

        let outcome = handler.complete(&config, None, &transcript()).await;
        assert_eq!(
            outcome,
            Outcome::FeedbackReady {
                interview_id: "ivw_1".into(),
                feedback_id: Some("fb_9".into()),
            }
        );
    }
}

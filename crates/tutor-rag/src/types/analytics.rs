//! Telemetry records written by the workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of telemetry event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsKind {
    WorkflowCompleted,
    RetrievalFailed,
    GenerationFailed,
    EvaluationFallback,
    RefinementFailed,
    DocumentIngested,
    FeedbackRecorded,
}

impl AnalyticsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowCompleted => "workflow_completed",
            Self::RetrievalFailed => "retrieval_failed",
            Self::GenerationFailed => "generation_failed",
            Self::EvaluationFallback => "evaluation_fallback",
            Self::RefinementFailed => "refinement_failed",
            Self::DocumentIngested => "document_ingested",
            Self::FeedbackRecorded => "feedback_recorded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [
            Self::WorkflowCompleted,
            Self::RetrievalFailed,
            Self::GenerationFailed,
            Self::EvaluationFallback,
            Self::RefinementFailed,
            Self::DocumentIngested,
            Self::FeedbackRecorded,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == value)
    }
}

/// Free-form telemetry record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub id: Uuid,
    pub kind: AnalyticsKind,
    pub user_id: Option<String>,
    pub conversation_id: Option<Uuid>,
    pub duration_ms: u64,
    pub token_count: u64,
    pub document_count: usize,
    pub success: bool,
    #[serde(default)]
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(kind: AnalyticsKind, success: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            user_id: None,
            conversation_id: None,
            duration_ms: 0,
            token_count: 0,
            document_count: 0,
            success,
            details: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn conversation(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn tokens(mut self, token_count: u64) -> Self {
        self.token_count = token_count;
        self
    }

    pub fn documents(mut self, document_count: usize) -> Self {
        self.document_count = document_count;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

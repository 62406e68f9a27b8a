//! Request and response types for a workflow run

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use uuid::Uuid;

use super::conversation::{DocumentRef, Mode, UserRole};

/// Token counts reported by the language model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

/// A question submitted to the workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub query: String,
    /// Overwritten with the authenticated caller over HTTP
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub role: UserRole,
    pub mode: Mode,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub grade_level: Option<String>,
}

impl WorkflowRequest {
    pub fn new(query: impl Into<String>, user_id: impl Into<String>, role: UserRole, mode: Mode) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            role,
            mode,
            conversation_id: None,
            subject: None,
            grade_level: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_grade_level(mut self, grade: impl Into<String>) -> Self {
        self.grade_level = Some(grade.into());
        self
    }

    pub fn in_conversation(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }
}

/// Run statistics returned with every answer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    /// Number of refine passes executed
    pub attempts: u32,
    pub evaluation_score: f32,
    /// Whether the heuristic replaced the model evaluation
    pub evaluation_fallback: bool,
    pub refined_query: Option<String>,
    pub token_usage: TokenUsage,
    pub latency_ms: u64,
    /// Error description when the run failed
    pub error: Option<String>,
}

/// Final record of a workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResponse {
    pub success: bool,
    pub answer: String,
    pub confidence: f32,
    /// Deduplicated titles of well-matching documents
    pub sources: Vec<String>,
    pub documents_used: Vec<DocumentRef>,
    pub metadata: WorkflowMetadata,
    pub conversation_id: Option<Uuid>,
    pub message_id: Option<Uuid>,
    /// Validated quiz or exam payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

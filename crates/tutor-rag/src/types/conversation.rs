//! Conversation, message and mode types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::workflow::TokenUsage;
use crate::error::Error;

/// Role of the caller, resolved by the authentication layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Least privileged
    #[default]
    Student,
    Teacher,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "admin" => Ok(Self::Admin),
            other => Err(Error::InvalidInput(format!("unknown role '{}'", other))),
        }
    }
}

/// Model configuration selected by a mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProfile {
    /// Low temperature, used for worked solutions
    Precise,
    /// Higher temperature, used for research and content creation
    Creative,
}

/// Assistant mode of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Research,
    MathSolve,
    PhysicsSolve,
    ChemistrySolve,
    QuizCreate,
    ExamCreate,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::Research,
        Mode::MathSolve,
        Mode::PhysicsSolve,
        Mode::ChemistrySolve,
        Mode::QuizCreate,
        Mode::ExamCreate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::MathSolve => "math-solve",
            Self::PhysicsSolve => "physics-solve",
            Self::ChemistrySolve => "chemistry-solve",
            Self::QuizCreate => "quiz-create",
            Self::ExamCreate => "exam-create",
        }
    }

    /// Solvers get the precise profile, everything else the creative one
    pub fn profile(&self) -> ModelProfile {
        match self {
            Self::MathSolve | Self::PhysicsSolve | Self::ChemistrySolve => ModelProfile::Precise,
            Self::Research | Self::QuizCreate | Self::ExamCreate => ModelProfile::Creative,
        }
    }

    /// Modes whose answer must carry a JSON question payload
    pub fn expects_question_payload(&self) -> bool {
        match self {
            Self::QuizCreate | Self::ExamCreate => true,
            Self::Research | Self::MathSolve | Self::PhysicsSolve | Self::ChemistrySolve => false,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown mode '{}'", s)))
    }
}

/// A chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub owner_id: String,
    pub owner_role: UserRole,
    pub mode: Mode,
    pub subject: Option<String>,
    pub grade_level: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(
        owner_id: String,
        owner_role: UserRole,
        mode: Mode,
        subject: Option<String>,
        grade_level: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            owner_role,
            mode,
            subject,
            grade_level,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl FromStr for MessageRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(Error::InvalidInput(format!("unknown message role '{}'", other))),
        }
    }
}

/// Reference to a retrieved passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_id: Uuid,
    pub chunk_id: Uuid,
    pub title: String,
    pub similarity: f32,
}

/// Workflow details stored with an assistant message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub attempts: u32,
    pub evaluation_score: Option<f32>,
    /// Query as typed by the user
    pub original_query: String,
    /// Query used for the final retrieval, if it was rewritten
    pub refined_query: Option<String>,
    pub mode: Option<Mode>,
    pub subject: Option<String>,
    #[serde(default)]
    pub token_usage: TokenUsage,
    #[serde(default)]
    pub error: bool,
    /// Validated quiz or exam payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// An append-only conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub confidence: Option<f32>,
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
    pub metadata: Option<MessageMetadata>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role: MessageRole::User,
            content: content.into(),
            confidence: None,
            documents: Vec::new(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(
        conversation_id: Uuid,
        content: impl Into<String>,
        confidence: f32,
        documents: Vec<DocumentRef>,
        metadata: MessageMetadata,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role: MessageRole::Assistant,
            content: content.into(),
            confidence: Some(confidence),
            documents,
            metadata: Some(metadata),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trips_through_str() {
        for mode in Mode::ALL {
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
        assert!("poetry".parse::<Mode>().is_err());
    }

    #[test]
    fn test_mode_serde_matches_as_str() {
        let json = serde_json::to_string(&Mode::ChemistrySolve).unwrap();
        assert_eq!(json, "\"chemistry-solve\"");
    }

    #[test]
    fn test_solvers_use_precise_profile() {
        assert_eq!(Mode::MathSolve.profile(), ModelProfile::Precise);
        assert_eq!(Mode::PhysicsSolve.profile(), ModelProfile::Precise);
        assert_eq!(Mode::ChemistrySolve.profile(), ModelProfile::Precise);
        assert_eq!(Mode::Research.profile(), ModelProfile::Creative);
        assert_eq!(Mode::QuizCreate.profile(), ModelProfile::Creative);
    }
}

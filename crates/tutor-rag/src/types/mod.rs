//! Core types for the tutoring workflow

pub mod analytics;
pub mod conversation;
pub mod document;
pub mod workflow;

pub use analytics::{AnalyticsEvent, AnalyticsKind};
pub use conversation::{
    Conversation, DocumentRef, Message, MessageMetadata, MessageRole, Mode, ModelProfile,
    UserRole,
};
pub use document::{
    Chunk, ChunkMetadata, Document, DocumentFilter, DocumentMeta, DocumentUpdate, Visibility,
};
pub use workflow::{TokenUsage, WorkflowMetadata, WorkflowRequest, WorkflowResponse};

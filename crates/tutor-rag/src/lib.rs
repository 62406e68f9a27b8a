//! tutor-rag: Self-learning RAG workflow for educational content
//!
//! This crate answers student questions and drafts quizzes and exams by combining
//! retrieved reference passages with a hosted language model. Each query runs through
//! a bounded refine → retrieve → generate → evaluate loop, and feedback on answers
//! feeds back into how future queries are rewritten.

pub mod analytics;
pub mod config;
pub mod conversation;
pub mod error;
pub mod evaluation;
pub mod generation;
pub mod ingestion;
pub mod learning;
pub mod providers;
pub mod refinement;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod types;
pub mod workflow;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use types::{
    conversation::{Conversation, Message, MessageRole, Mode, UserRole},
    document::{Chunk, Document, DocumentMeta, Visibility},
    workflow::{WorkflowRequest, WorkflowResponse},
};
pub use workflow::Orchestrator;

//! Persistent records: documents, conversations, refinements, feedback, analytics
//!
//! `RecordStore` is implemented by `MemoryStore` (tests, ephemeral deployments) and
//! `SqliteStore` (durable storage).

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::learning::{FeedbackRecord, RefinementKey, RefinementRecord};
use crate::types::{
    AnalyticsEvent, Chunk, Conversation, Document, DocumentFilter, DocumentUpdate, Message, Mode,
};

/// Listing filter for conversations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationFilter {
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl ConversationFilter {
    pub fn matches(&self, conversation: &Conversation) -> bool {
        if let Some(owner) = &self.owner_id {
            if &conversation.owner_id != owner {
                return false;
            }
        }
        if let Some(mode) = self.mode {
            if conversation.mode != mode {
                return false;
            }
        }
        true
    }
}

/// Record store used by the workflow, ingestion and feedback paths
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ==================== Documents ====================

    async fn insert_document(&self, document: &Document) -> Result<()>;

    async fn get_document(&self, id: &Uuid) -> Result<Option<Document>>;

    /// Documents matching the filter, newest first
    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>>;

    /// Edit document metadata; returns the updated record
    async fn update_document(&self, id: &Uuid, update: &DocumentUpdate) -> Result<Option<Document>>;

    /// Delete a document and its chunks
    async fn delete_document(&self, id: &Uuid) -> Result<bool>;

    // ==================== Chunks ====================

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// Chunks of one document, or of all documents, in ordinal order
    async fn list_chunks(&self, document_id: Option<&Uuid>) -> Result<Vec<Chunk>>;

    // ==================== Conversations ====================

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()>;

    async fn get_conversation(&self, id: &Uuid) -> Result<Option<Conversation>>;

    /// Conversations matching the filter, most recently updated first
    async fn list_conversations(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>>;

    // ==================== Messages ====================

    /// Append a message and touch the conversation's `updated_at`
    async fn append_message(&self, message: &Message) -> Result<()>;

    async fn get_message(&self, id: &Uuid) -> Result<Option<Message>>;

    /// Messages in chronological order; with a limit, the last `limit` of them
    async fn list_messages(&self, conversation_id: &Uuid, limit: Option<usize>) -> Result<Vec<Message>>;

    // ==================== Refinements ====================

    /// Insert a refinement or increment its usage count
    async fn upsert_refinement(&self, key: &RefinementKey) -> Result<RefinementRecord>;

    async fn get_refinement(&self, key: &RefinementKey) -> Result<Option<RefinementRecord>>;

    /// Best refinements for a mode and subject: score >= `min_score`, ordered by
    /// usage count then score, both descending
    async fn top_refinements(
        &self,
        mode: Mode,
        subject: Option<&str>,
        min_score: f32,
        limit: usize,
    ) -> Result<Vec<RefinementRecord>>;

    /// Fold an observed score into the refinement's weighted average in one atomic step
    async fn apply_refinement_feedback(
        &self,
        key: &RefinementKey,
        observed: f32,
    ) -> Result<Option<RefinementRecord>>;

    // ==================== Feedback ====================

    async fn insert_feedback(&self, feedback: &FeedbackRecord) -> Result<()>;

    async fn list_feedback(&self, message_id: &Uuid) -> Result<Vec<FeedbackRecord>>;

    // ==================== Analytics ====================

    async fn record_event(&self, event: &AnalyticsEvent) -> Result<()>;

    /// Most recent events first
    async fn recent_events(&self, limit: usize) -> Result<Vec<AnalyticsEvent>>;

    /// Get store name for logging
    fn name(&self) -> &str;
}

/// Apply offset and optional limit to an already ordered listing
pub(crate) fn paginate<T>(items: Vec<T>, offset: usize, limit: Option<usize>) -> Vec<T> {
    let iter = items.into_iter().skip(offset);
    match limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

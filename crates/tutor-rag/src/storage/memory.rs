//! In-memory record store

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::learning::{weighted_average, FeedbackRecord, RefinementKey, RefinementRecord};
use crate::types::{
    AnalyticsEvent, Chunk, Conversation, Document, DocumentFilter, DocumentUpdate, Message, Mode,
};

use super::{paginate, ConversationFilter, RecordStore};

#[derive(Default)]
struct Tables {
    documents: HashMap<Uuid, Document>,
    chunks: HashMap<Uuid, Vec<Chunk>>,
    conversations: HashMap<Uuid, Conversation>,
    /// Append order
    messages: Vec<Message>,
    refinements: HashMap<RefinementKey, RefinementRecord>,
    feedback: Vec<FeedbackRecord>,
    events: Vec<AnalyticsEvent>,
}

/// Record store held in process memory.
///
/// All tables sit behind one lock, so every operation is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_document(&self, document: &Document) -> Result<()> {
        self.tables
            .write()
            .documents
            .insert(document.id, document.clone());
        Ok(())
    }

    async fn get_document(&self, id: &Uuid) -> Result<Option<Document>> {
        Ok(self.tables.read().documents.get(id).cloned())
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let tables = self.tables.read();
        let mut documents: Vec<Document> = tables
            .documents
            .values()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(paginate(documents, filter.offset, filter.limit))
    }

    async fn update_document(&self, id: &Uuid, update: &DocumentUpdate) -> Result<Option<Document>> {
        let mut tables = self.tables.write();
        Ok(tables.documents.get_mut(id).map(|doc| {
            doc.apply_update(update);
            doc.clone()
        }))
    }

    async fn delete_document(&self, id: &Uuid) -> Result<bool> {
        let mut tables = self.tables.write();
        tables.chunks.remove(id);
        Ok(tables.documents.remove(id).is_some())
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tables = self.tables.write();
        for chunk in chunks {
            tables
                .chunks
                .entry(chunk.document_id)
                .or_default()
                .push(chunk.clone());
        }
        Ok(())
    }

    async fn list_chunks(&self, document_id: Option<&Uuid>) -> Result<Vec<Chunk>> {
        let tables = self.tables.read();
        let mut chunks: Vec<Chunk> = match document_id {
            Some(id) => tables.chunks.get(id).cloned().unwrap_or_default(),
            None => tables.chunks.values().flatten().cloned().collect(),
        };
        chunks.sort_by(|a, b| {
            a.document_id
                .cmp(&b.document_id)
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        Ok(chunks)
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        self.tables
            .write()
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn get_conversation(&self, id: &Uuid) -> Result<Option<Conversation>> {
        Ok(self.tables.read().conversations.get(id).cloned())
    }

    async fn list_conversations(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>> {
        let tables = self.tables.read();
        let mut conversations: Vec<Conversation> = tables
            .conversations
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));

        Ok(paginate(conversations, filter.offset, filter.limit))
    }

    async fn append_message(&self, message: &Message) -> Result<()> {
        let mut tables = self.tables.write();
        let conversation = tables
            .conversations
            .get_mut(&message.conversation_id)
            .ok_or_else(|| Error::NotFound(format!("conversation {}", message.conversation_id)))?;
        conversation.updated_at = Utc::now();
        tables.messages.push(message.clone());
        Ok(())
    }

    async fn get_message(&self, id: &Uuid) -> Result<Option<Message>> {
        Ok(self.tables.read().messages.iter().find(|m| &m.id == id).cloned())
    }

    async fn list_messages(&self, conversation_id: &Uuid, limit: Option<usize>) -> Result<Vec<Message>> {
        let tables = self.tables.read();
        let messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| &m.conversation_id == conversation_id)
            .cloned()
            .collect();

        let skip = limit.map(|l| messages.len().saturating_sub(l)).unwrap_or(0);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn upsert_refinement(&self, key: &RefinementKey) -> Result<RefinementRecord> {
        let mut tables = self.tables.write();
        let record = tables
            .refinements
            .entry(key.clone())
            .and_modify(|record| {
                record.usage_count += 1;
                record.last_used_at = Utc::now();
            })
            .or_insert_with(|| RefinementRecord::first_use(key));
        Ok(record.clone())
    }

    async fn get_refinement(&self, key: &RefinementKey) -> Result<Option<RefinementRecord>> {
        Ok(self.tables.read().refinements.get(key).cloned())
    }

    async fn top_refinements(
        &self,
        mode: Mode,
        subject: Option<&str>,
        min_score: f32,
        limit: usize,
    ) -> Result<Vec<RefinementRecord>> {
        let tables = self.tables.read();
        let mut records: Vec<RefinementRecord> = tables
            .refinements
            .values()
            .filter(|r| r.mode == mode && r.subject.as_deref() == subject)
            .filter(|r| r.improvement_score.is_some_and(|s| s >= min_score))
            .cloned()
            .collect();

        records.sort_by(|a, b| {
            b.usage_count
                .cmp(&a.usage_count)
                .then_with(|| {
                    let (sa, sb) = (a.improvement_score.unwrap_or(0.0), b.improvement_score.unwrap_or(0.0));
                    sb.total_cmp(&sa)
                })
                .then_with(|| b.last_used_at.cmp(&a.last_used_at))
        });
        records.truncate(limit);
        Ok(records)
    }

    async fn apply_refinement_feedback(
        &self,
        key: &RefinementKey,
        observed: f32,
    ) -> Result<Option<RefinementRecord>> {
        let mut tables = self.tables.write();
        Ok(tables.refinements.get_mut(key).map(|record| {
            record.improvement_score = Some(weighted_average(
                record.improvement_score,
                record.usage_count,
                observed,
            ));
            record.clone()
        }))
    }

    async fn insert_feedback(&self, feedback: &FeedbackRecord) -> Result<()> {
        self.tables.write().feedback.push(feedback.clone());
        Ok(())
    }

    async fn list_feedback(&self, message_id: &Uuid) -> Result<Vec<FeedbackRecord>> {
        Ok(self
            .tables
            .read()
            .feedback
            .iter()
            .filter(|f| &f.message_id == message_id)
            .cloned()
            .collect())
    }

    async fn record_event(&self, event: &AnalyticsEvent) -> Result<()> {
        self.tables.write().events.push(event.clone());
        Ok(())
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<AnalyticsEvent>> {
        Ok(self
            .tables
            .read()
            .events
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

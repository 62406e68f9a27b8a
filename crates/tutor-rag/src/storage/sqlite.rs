//! SQLite record store
//!
//! Durable storage for documents, chunks, conversations and learning data. One
//! connection sits behind a mutex; compound operations run inside that lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::learning::{FeedbackKind, FeedbackRecord, RefinementKey, RefinementRecord};
use crate::types::{
    AnalyticsEvent, AnalyticsKind, Chunk, ChunkMetadata, Conversation, Document, DocumentFilter,
    DocumentUpdate, Message, MessageRole, Mode, UserRole, Visibility,
};

use super::{ConversationFilter, RecordStore};

/// SQLite-based record store
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create or open the database at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Store(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Store(format!("Failed to open in-memory database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.migrate()?;
        Ok(db)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            PRAGMA temp_store=MEMORY;
        "#,
        )
        .map_err(|e| Error::Store(format!("Failed to set pragmas: {}", e)))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                subject TEXT,
                grade_level TEXT,
                visibility TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                text_length INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_documents_subject ON documents(subject);
            CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id);

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                source_title TEXT NOT NULL,
                sentence_start INTEGER NOT NULL,
                sentence_end INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id, chunk_index);

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                owner_role TEXT NOT NULL,
                mode TEXT NOT NULL,
                subject TEXT,
                grade_level TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_owner ON conversations(owner_id, updated_at);

            CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                confidence REAL,
                documents TEXT NOT NULL,
                metadata TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, seq);

            -- Subject is '' when absent so the key stays unique
            CREATE TABLE IF NOT EXISTS refinements (
                id TEXT PRIMARY KEY,
                original_query TEXT NOT NULL,
                refined_query TEXT NOT NULL,
                mode TEXT NOT NULL,
                subject TEXT NOT NULL DEFAULT '',
                improvement_score REAL,
                usage_count INTEGER NOT NULL DEFAULT 1,
                last_used_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(original_query, refined_query, mode, subject)
            );

            CREATE INDEX IF NOT EXISTS idx_refinements_mode ON refinements(mode, subject);

            CREATE TABLE IF NOT EXISTS feedback (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                rating REAL,
                correction TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_feedback_message ON feedback(message_id);

            CREATE TABLE IF NOT EXISTS analytics_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                user_id TEXT,
                conversation_id TEXT,
                duration_ms INTEGER NOT NULL,
                token_count INTEGER NOT NULL,
                document_count INTEGER NOT NULL,
                success INTEGER NOT NULL,
                details TEXT,
                created_at TEXT NOT NULL
            );
        "#,
        )
        .map_err(|e| Error::Store(format!("Failed to run migrations: {}", e)))?;

        tracing::info!("Database migrations complete");
        Ok(())
    }

    fn select_refinement(conn: &Connection, key: &RefinementKey) -> Result<Option<RefinementRecord>> {
        let mut stmt = conn.prepare(
            "SELECT id, original_query, refined_query, mode, subject, improvement_score,
                    usage_count, last_used_at, created_at
             FROM refinements
             WHERE original_query = ?1 AND refined_query = ?2 AND mode = ?3 AND subject = ?4",
        )?;

        let record = stmt
            .query_row(
                params![
                    key.original_query,
                    key.refined_query,
                    key.mode.as_str(),
                    subject_key(key.subject.as_deref()),
                ],
                row_to_refinement,
            )
            .optional()?;

        Ok(record)
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    // ==================== Documents ====================

    async fn insert_document(&self, document: &Document) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO documents (
                id, title, subject, grade_level, visibility, owner_id,
                text_length, chunk_count, content_hash, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                subject = excluded.subject,
                grade_level = excluded.grade_level,
                visibility = excluded.visibility,
                chunk_count = excluded.chunk_count
            "#,
            params![
                document.id.to_string(),
                document.title,
                document.subject,
                document.grade_level,
                document.visibility.as_str(),
                document.owner_id,
                document.text_length as i64,
                document.chunk_count as i64,
                document.content_hash,
                document.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Store(format!("Failed to insert document: {}", e)))?;

        Ok(())
    }

    async fn get_document(&self, id: &Uuid) -> Result<Option<Document>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS))?;
        let document = stmt
            .query_row(params![id.to_string()], row_to_document)
            .optional()?;

        Ok(document)
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        let conn = self.conn.lock();

        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();
        let mut push = |column: &str, value: &str| {
            values.push(value.to_string());
            clauses.push(format!("{} = ?{}", column, values.len()));
        };

        if let Some(subject) = &filter.subject {
            push("subject", subject);
        }
        if let Some(grade) = &filter.grade_level {
            push("grade_level", grade);
        }
        if let Some(visibility) = filter.visibility {
            push("visibility", visibility.as_str());
        }
        if let Some(owner) = &filter.owner_id {
            push("owner_id", owner);
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);

        let sql = format!(
            "SELECT {} FROM documents {} ORDER BY created_at DESC, rowid DESC LIMIT {} OFFSET {}",
            DOCUMENT_COLUMNS, where_clause, limit, filter.offset
        );

        let mut stmt = conn.prepare(&sql)?;
        let documents = stmt
            .query_map(params_from_iter(values.iter()), row_to_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(documents)
    }

    async fn update_document(&self, id: &Uuid, update: &DocumentUpdate) -> Result<Option<Document>> {
        let conn = self.conn.lock();

        let count = conn.execute(
            r#"
            UPDATE documents SET
                title = COALESCE(?2, title),
                subject = COALESCE(?3, subject),
                grade_level = COALESCE(?4, grade_level),
                visibility = COALESCE(?5, visibility)
            WHERE id = ?1
            "#,
            params![
                id.to_string(),
                update.title,
                update.subject,
                update.grade_level,
                update.visibility.map(|v| v.as_str()),
            ],
        )?;

        if count == 0 {
            return Ok(None);
        }

        let mut stmt = conn.prepare(&format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS))?;
        let document = stmt
            .query_row(params![id.to_string()], row_to_document)
            .optional()?;

        Ok(document)
    }

    async fn delete_document(&self, id: &Uuid) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM chunks WHERE document_id = ?1", params![id.to_string()])?;
        let count = tx.execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;

        tx.commit()?;
        Ok(count > 0)
    }

    // ==================== Chunks ====================

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT OR REPLACE INTO chunks (
                    id, document_id, chunk_index, content, embedding,
                    source_title, sentence_start, sentence_end
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )?;

            for chunk in chunks {
                stmt.execute(params![
                    chunk.id.to_string(),
                    chunk.document_id.to_string(),
                    chunk.chunk_index as i64,
                    chunk.content,
                    embedding_to_blob(&chunk.embedding),
                    chunk.metadata.source_title,
                    chunk.metadata.sentence_start as i64,
                    chunk.metadata.sentence_end as i64,
                ])
                .map_err(|e| Error::Store(format!("Failed to insert chunk: {}", e)))?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    async fn list_chunks(&self, document_id: Option<&Uuid>) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock();

        let chunks = match document_id {
            Some(id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM chunks WHERE document_id = ?1 ORDER BY chunk_index",
                    CHUNK_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![id.to_string()], row_to_chunk)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM chunks ORDER BY document_id, chunk_index",
                    CHUNK_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], row_to_chunk)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };

        Ok(chunks)
    }

    // ==================== Conversations ====================

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO conversations (
                id, owner_id, owner_role, mode, subject, grade_level, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                conversation.id.to_string(),
                conversation.owner_id,
                conversation.owner_role.as_str(),
                conversation.mode.as_str(),
                conversation.subject,
                conversation.grade_level,
                conversation.created_at.to_rfc3339(),
                conversation.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Store(format!("Failed to insert conversation: {}", e)))?;

        Ok(())
    }

    async fn get_conversation(&self, id: &Uuid) -> Result<Option<Conversation>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM conversations WHERE id = ?1",
            CONVERSATION_COLUMNS
        ))?;
        let conversation = stmt
            .query_row(params![id.to_string()], row_to_conversation)
            .optional()?;

        Ok(conversation)
    }

    async fn list_conversations(&self, filter: &ConversationFilter) -> Result<Vec<Conversation>> {
        let conn = self.conn.lock();

        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM conversations
             WHERE (?1 IS NULL OR owner_id = ?1) AND (?2 IS NULL OR mode = ?2)
             ORDER BY updated_at DESC, rowid DESC LIMIT ?3 OFFSET ?4",
            CONVERSATION_COLUMNS
        ))?;

        let conversations = stmt
            .query_map(
                params![
                    filter.owner_id,
                    filter.mode.map(|m| m.as_str()),
                    limit,
                    filter.offset as i64,
                ],
                row_to_conversation,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conversations)
    }

    // ==================== Messages ====================

    async fn append_message(&self, message: &Message) -> Result<()> {
        let documents = serde_json::to_string(&message.documents)?;
        let metadata = message
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let touched = tx.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), message.conversation_id.to_string()],
        )?;
        if touched == 0 {
            return Err(Error::NotFound(format!("conversation {}", message.conversation_id)));
        }

        tx.execute(
            r#"
            INSERT INTO messages (
                id, conversation_id, role, content, confidence, documents, metadata, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                message.id.to_string(),
                message.conversation_id.to_string(),
                message.role.as_str(),
                message.content,
                message.confidence.map(|c| c as f64),
                documents,
                metadata,
                message.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Store(format!("Failed to append message: {}", e)))?;

        tx.commit()?;
        Ok(())
    }

    async fn get_message(&self, id: &Uuid) -> Result<Option<Message>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS))?;
        let message = stmt
            .query_row(params![id.to_string()], row_to_message)
            .optional()?;

        Ok(message)
    }

    async fn list_messages(&self, conversation_id: &Uuid, limit: Option<usize>) -> Result<Vec<Message>> {
        let conn = self.conn.lock();

        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY seq DESC LIMIT ?2",
            MESSAGE_COLUMNS
        ))?;

        let mut messages = stmt
            .query_map(params![conversation_id.to_string(), limit], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        messages.reverse();

        Ok(messages)
    }

    // ==================== Refinements ====================

    async fn upsert_refinement(&self, key: &RefinementKey) -> Result<RefinementRecord> {
        let conn = self.conn.lock();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT INTO refinements (
                id, original_query, refined_query, mode, subject,
                improvement_score, usage_count, last_used_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, 1, ?6, ?6)
            ON CONFLICT(original_query, refined_query, mode, subject) DO UPDATE SET
                usage_count = refinements.usage_count + 1,
                last_used_at = excluded.last_used_at
            "#,
            params![
                Uuid::new_v4().to_string(),
                key.original_query,
                key.refined_query,
                key.mode.as_str(),
                subject_key(key.subject.as_deref()),
                now,
            ],
        )
        .map_err(|e| Error::Store(format!("Failed to upsert refinement: {}", e)))?;

        Self::select_refinement(&conn, key)?
            .ok_or_else(|| Error::store("Refinement vanished after upsert"))
    }

    async fn get_refinement(&self, key: &RefinementKey) -> Result<Option<RefinementRecord>> {
        let conn = self.conn.lock();
        Self::select_refinement(&conn, key)
    }

    async fn top_refinements(
        &self,
        mode: Mode,
        subject: Option<&str>,
        min_score: f32,
        limit: usize,
    ) -> Result<Vec<RefinementRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, original_query, refined_query, mode, subject, improvement_score,
                    usage_count, last_used_at, created_at
             FROM refinements
             WHERE mode = ?1 AND subject = ?2
               AND improvement_score IS NOT NULL AND improvement_score >= ?3
             ORDER BY usage_count DESC, improvement_score DESC, last_used_at DESC
             LIMIT ?4",
        )?;

        let records = stmt
            .query_map(
                params![mode.as_str(), subject_key(subject), min_score as f64, limit as i64],
                row_to_refinement,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    async fn apply_refinement_feedback(
        &self,
        key: &RefinementKey,
        observed: f32,
    ) -> Result<Option<RefinementRecord>> {
        let conn = self.conn.lock();

        let count = conn.execute(
            r#"
            UPDATE refinements SET improvement_score = MIN(1.0, MAX(0.0,
                CASE
                    WHEN improvement_score IS NULL THEN ?1
                    ELSE (improvement_score * usage_count + ?1) / (usage_count + 1)
                END))
            WHERE original_query = ?2 AND refined_query = ?3 AND mode = ?4 AND subject = ?5
            "#,
            params![
                observed as f64,
                key.original_query,
                key.refined_query,
                key.mode.as_str(),
                subject_key(key.subject.as_deref()),
            ],
        )
        .map_err(|e| Error::Store(format!("Failed to update refinement score: {}", e)))?;

        if count == 0 {
            return Ok(None);
        }

        Self::select_refinement(&conn, key)
    }

    // ==================== Feedback ====================

    async fn insert_feedback(&self, feedback: &FeedbackRecord) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO feedback (
                id, message_id, conversation_id, user_id, kind, rating, correction, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                feedback.id.to_string(),
                feedback.message_id.to_string(),
                feedback.conversation_id.to_string(),
                feedback.user_id,
                feedback.kind.as_str(),
                feedback.rating.map(|r| r as f64),
                feedback.correction,
                feedback.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Store(format!("Failed to insert feedback: {}", e)))?;

        Ok(())
    }

    async fn list_feedback(&self, message_id: &Uuid) -> Result<Vec<FeedbackRecord>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, message_id, conversation_id, user_id, kind, rating, correction, created_at
             FROM feedback WHERE message_id = ?1 ORDER BY created_at",
        )?;

        let records = stmt
            .query_map(params![message_id.to_string()], row_to_feedback)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    // ==================== Analytics ====================

    async fn record_event(&self, event: &AnalyticsEvent) -> Result<()> {
        let details = serde_json::to_string(&event.details)?;
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO analytics_events (
                id, kind, user_id, conversation_id, duration_ms, token_count,
                document_count, success, details, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                event.id.to_string(),
                event.kind.as_str(),
                event.user_id,
                event.conversation_id.map(|id| id.to_string()),
                event.duration_ms as i64,
                event.token_count as i64,
                event.document_count as i64,
                event.success,
                details,
                event.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Store(format!("Failed to record analytics event: {}", e)))?;

        Ok(())
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<AnalyticsEvent>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, kind, user_id, conversation_id, duration_ms, token_count,
                    document_count, success, details, created_at
             FROM analytics_events ORDER BY seq DESC LIMIT ?1",
        )?;

        let events = stmt
            .query_map(params![limit as i64], row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(events)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

// ==================== Row mapping ====================

const DOCUMENT_COLUMNS: &str = "id, title, subject, grade_level, visibility, owner_id, \
    text_length, chunk_count, content_hash, created_at";

const CHUNK_COLUMNS: &str =
    "id, document_id, chunk_index, content, embedding, source_title, sentence_start, sentence_end";

const CONVERSATION_COLUMNS: &str =
    "id, owner_id, owner_role, mode, subject, grade_level, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, role, content, confidence, documents, metadata, created_at";

fn subject_key(subject: Option<&str>) -> &str {
    subject.unwrap_or("")
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::new(Error::Store(message)),
    )
}

fn parse_uuid(row: &rusqlite::Row, index: usize) -> rusqlite::Result<Uuid> {
    let value: String = row.get(index)?;
    Uuid::parse_str(&value).map_err(|e| conversion_error(index, format!("bad uuid '{}': {}", value, e)))
}

fn parse_time(row: &rusqlite::Row, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let value: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, format!("bad timestamp '{}': {}", value, e)))
}

fn parse_mode(row: &rusqlite::Row, index: usize) -> rusqlite::Result<Mode> {
    let value: String = row.get(index)?;
    value
        .parse::<Mode>()
        .map_err(|e| conversion_error(index, e.to_string()))
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let visibility: String = row.get(4)?;
    let text_length: i64 = row.get(6)?;
    let chunk_count: i64 = row.get(7)?;

    Ok(Document {
        id: parse_uuid(row, 0)?,
        title: row.get(1)?,
        subject: row.get(2)?,
        grade_level: row.get(3)?,
        visibility: Visibility::parse(&visibility)
            .ok_or_else(|| conversion_error(4, format!("unknown visibility '{}'", visibility)))?,
        owner_id: row.get(5)?,
        text_length: text_length as usize,
        chunk_count: chunk_count as u32,
        content_hash: row.get(8)?,
        created_at: parse_time(row, 9)?,
    })
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    let chunk_index: i64 = row.get(2)?;
    let embedding: Vec<u8> = row.get(4)?;
    let sentence_start: i64 = row.get(6)?;
    let sentence_end: i64 = row.get(7)?;

    Ok(Chunk {
        id: parse_uuid(row, 0)?,
        document_id: parse_uuid(row, 1)?,
        chunk_index: chunk_index as u32,
        content: row.get(3)?,
        embedding: blob_to_embedding(&embedding),
        metadata: ChunkMetadata {
            source_title: row.get(5)?,
            sentence_start: sentence_start as usize,
            sentence_end: sentence_end as usize,
        },
    })
}

fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    let role: String = row.get(2)?;

    Ok(Conversation {
        id: parse_uuid(row, 0)?,
        owner_id: row.get(1)?,
        owner_role: role
            .parse::<UserRole>()
            .map_err(|e| conversion_error(2, e.to_string()))?,
        mode: parse_mode(row, 3)?,
        subject: row.get(4)?,
        grade_level: row.get(5)?,
        created_at: parse_time(row, 6)?,
        updated_at: parse_time(row, 7)?,
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    let confidence: Option<f64> = row.get(4)?;
    let documents: String = row.get(5)?;
    let metadata: Option<String> = row.get(6)?;

    Ok(Message {
        id: parse_uuid(row, 0)?,
        conversation_id: parse_uuid(row, 1)?,
        role: role
            .parse::<MessageRole>()
            .map_err(|e| conversion_error(2, e.to_string()))?,
        content: row.get(3)?,
        confidence: confidence.map(|c| c as f32),
        documents: serde_json::from_str(&documents)
            .map_err(|e| conversion_error(5, e.to_string()))?,
        metadata: metadata
            .map(|m| serde_json::from_str(&m))
            .transpose()
            .map_err(|e| conversion_error(6, e.to_string()))?,
        created_at: parse_time(row, 7)?,
    })
}

fn row_to_refinement(row: &rusqlite::Row) -> rusqlite::Result<RefinementRecord> {
    let subject: String = row.get(4)?;
    let score: Option<f64> = row.get(5)?;
    let usage_count: i64 = row.get(6)?;

    Ok(RefinementRecord {
        id: parse_uuid(row, 0)?,
        original_query: row.get(1)?,
        refined_query: row.get(2)?,
        mode: parse_mode(row, 3)?,
        subject: (!subject.is_empty()).then_some(subject),
        improvement_score: score.map(|s| s as f32),
        usage_count: usage_count as u32,
        last_used_at: parse_time(row, 7)?,
        created_at: parse_time(row, 8)?,
    })
}

fn row_to_feedback(row: &rusqlite::Row) -> rusqlite::Result<FeedbackRecord> {
    let kind: String = row.get(4)?;
    let rating: Option<f64> = row.get(5)?;

    Ok(FeedbackRecord {
        id: parse_uuid(row, 0)?,
        message_id: parse_uuid(row, 1)?,
        conversation_id: parse_uuid(row, 2)?,
        user_id: row.get(3)?,
        kind: FeedbackKind::parse(&kind)
            .ok_or_else(|| conversion_error(4, format!("unknown feedback kind '{}'", kind)))?,
        rating: rating.map(|r| r as f32),
        correction: row.get(6)?,
        created_at: parse_time(row, 7)?,
    })
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<AnalyticsEvent> {
    let kind: String = row.get(1)?;
    let conversation_id: Option<String> = row.get(3)?;
    let duration_ms: i64 = row.get(4)?;
    let token_count: i64 = row.get(5)?;
    let document_count: i64 = row.get(6)?;
    let details: Option<String> = row.get(8)?;

    Ok(AnalyticsEvent {
        id: parse_uuid(row, 0)?,
        kind: AnalyticsKind::parse(&kind)
            .ok_or_else(|| conversion_error(1, format!("unknown event kind '{}'", kind)))?,
        user_id: row.get(2)?,
        conversation_id: conversation_id.and_then(|s| Uuid::parse_str(&s).ok()),
        duration_ms: duration_ms as u64,
        token_count: token_count as u64,
        document_count: document_count as usize,
        success: row.get(7)?,
        details: details
            .and_then(|d| serde_json::from_str(&d).ok())
            .unwrap_or(serde_json::Value::Null),
        created_at: parse_time(row, 9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChunkMetadata, DocumentMeta, MessageMetadata};

    fn document(subject: &str) -> Document {
        Document::new(
            DocumentMeta {
                title: format!("{} notes", subject),
                subject: Some(subject.into()),
                grade_level: Some("9".into()),
                visibility: Visibility::Public,
                owner_id: "t1".into(),
            },
            42,
            "hash".into(),
        )
    }

    #[test]
    fn test_document_and_chunk_round_trip() {
        tokio_test::block_on(async {
            let db = SqliteStore::in_memory().unwrap();
            let doc = document("physics");
            db.insert_document(&doc).await.unwrap();

            let mut chunk = Chunk::new(doc.id, 0, "F = ma".into(), ChunkMetadata::default());
            chunk.embedding = vec![0.25, -1.5, 3.0];
            db.insert_chunks(&[chunk.clone()]).await.unwrap();

            let stored = db.list_chunks(Some(&doc.id)).await.unwrap();
            assert_eq!(stored.len(), 1);
            assert_eq!(stored[0].embedding, vec![0.25, -1.5, 3.0]);

            let fetched = db.get_document(&doc.id).await.unwrap().unwrap();
            assert_eq!(fetched.title, "physics notes");
            assert_eq!(fetched.grade_level.as_deref(), Some("9"));

            assert!(db.delete_document(&doc.id).await.unwrap());
            assert!(db.list_chunks(None).await.unwrap().is_empty());
            assert!(!db.delete_document(&doc.id).await.unwrap());
        });
    }

    #[test]
    fn test_list_documents_filters() {
        tokio_test::block_on(async {
            let db = SqliteStore::in_memory().unwrap();
            db.insert_document(&document("physics")).await.unwrap();
            db.insert_document(&document("math")).await.unwrap();
            db.insert_document(&document("math")).await.unwrap();

            let filter = DocumentFilter {
                subject: Some("math".into()),
                ..Default::default()
            };
            assert_eq!(db.list_documents(&filter).await.unwrap().len(), 2);

            let page = DocumentFilter {
                limit: Some(2),
                offset: 2,
                ..Default::default()
            };
            assert_eq!(db.list_documents(&page).await.unwrap().len(), 1);
        });
    }

    #[test]
    fn test_update_document_metadata() {
        tokio_test::block_on(async {
            let db = SqliteStore::in_memory().unwrap();
            let doc = document("chemistry");
            db.insert_document(&doc).await.unwrap();

            let updated = db
                .update_document(
                    &doc.id,
                    &DocumentUpdate {
                        visibility: Some(Visibility::Private),
                        ..Default::default()
                    },
                )
                .await
                .unwrap()
                .unwrap();
            assert_eq!(updated.visibility, Visibility::Private);
            assert_eq!(updated.title, "chemistry notes");

            let missing = db
                .update_document(&Uuid::new_v4(), &DocumentUpdate::default())
                .await
                .unwrap();
            assert!(missing.is_none());
        });
    }

    #[test]
    fn test_refinement_upsert_and_feedback() {
        tokio_test::block_on(async {
            let db = SqliteStore::in_memory().unwrap();
            let key = RefinementKey::new("speed eq", "speed equation", Mode::PhysicsSolve, None);

            for _ in 0..3 {
                db.upsert_refinement(&key).await.unwrap();
            }
            let record = db.get_refinement(&key).await.unwrap().unwrap();
            assert_eq!(record.usage_count, 3);
            assert_eq!(record.improvement_score, None);
            assert_eq!(record.subject, None);

            let rated = db.apply_refinement_feedback(&key, 0.6).await.unwrap().unwrap();
            assert!((rated.improvement_score.unwrap() - 0.6).abs() < 1e-6);

            let rated = db.apply_refinement_feedback(&key, 1.0).await.unwrap().unwrap();
            assert!((rated.improvement_score.unwrap() - 0.7).abs() < 1e-6);

            let top = db
                .top_refinements(Mode::PhysicsSolve, None, 0.7, 5)
                .await
                .unwrap();
            assert_eq!(top.len(), 1);
            assert!(db
                .top_refinements(Mode::PhysicsSolve, Some("optics"), 0.0, 5)
                .await
                .unwrap()
                .is_empty());
        });
    }

    #[test]
    fn test_messages_round_trip_with_metadata() {
        tokio_test::block_on(async {
            let db = SqliteStore::in_memory().unwrap();
            let conversation =
                Conversation::new("s1".into(), UserRole::Student, Mode::QuizCreate, None, None);
            db.insert_conversation(&conversation).await.unwrap();

            db.append_message(&Message::user(conversation.id, "make a quiz"))
                .await
                .unwrap();
            let answer = Message::assistant(
                conversation.id,
                "Here is your quiz",
                0.8,
                Vec::new(),
                MessageMetadata {
                    attempts: 2,
                    evaluation_score: Some(0.75),
                    original_query: "make a quiz".into(),
                    mode: Some(Mode::QuizCreate),
                    ..Default::default()
                },
            );
            db.append_message(&answer).await.unwrap();

            let messages = db.list_messages(&conversation.id, None).await.unwrap();
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[0].role, MessageRole::User);

            let fetched = db.get_message(&answer.id).await.unwrap().unwrap();
            let metadata = fetched.metadata.unwrap();
            assert_eq!(metadata.attempts, 2);
            assert_eq!(metadata.mode, Some(Mode::QuizCreate));

            let last = db.list_messages(&conversation.id, Some(1)).await.unwrap();
            assert_eq!(last[0].id, answer.id);

            let orphan = Message::user(Uuid::new_v4(), "lost");
            assert!(matches!(db.append_message(&orphan).await, Err(Error::NotFound(_))));
        });
    }

    #[test]
    fn test_persists_across_reopen() {
        tokio_test::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested").join("tutor.db");
            let doc = document("biology");

            {
                let db = SqliteStore::new(&path).unwrap();
                db.insert_document(&doc).await.unwrap();
                db.record_event(&AnalyticsEvent::new(AnalyticsKind::DocumentIngested, true))
                    .await
                    .unwrap();
            }

            let db = SqliteStore::new(&path).unwrap();
            assert!(db.get_document(&doc.id).await.unwrap().is_some());
            let events = db.recent_events(10).await.unwrap();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].kind, AnalyticsKind::DocumentIngested);
        });
    }
}

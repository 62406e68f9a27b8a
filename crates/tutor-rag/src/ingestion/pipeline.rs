//! Ingestion pipeline: clean, chunk, embed, store and index documents

use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use uuid::Uuid;

use crate::analytics::AnalyticsSink;
use crate::config::{ChunkingConfig, IngestionConfig};
use crate::error::{Error, Result};
use crate::providers::Embedder;
use crate::retrieval::VectorIndex;
use crate::storage::RecordStore;
use crate::types::{AnalyticsEvent, AnalyticsKind, Chunk, Document, DocumentMeta, DocumentUpdate};

use super::chunker::{clean_text, TextChunker};

/// Result of ingesting one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct IngestOutcome {
    pub document_id: Uuid,
    pub chunk_count: u32,
}

/// SHA-256 of the cleaned text, hex encoded
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Turns raw text into stored, searchable chunks
pub struct IngestPipeline {
    chunker: TextChunker,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn RecordStore>,
    analytics: AnalyticsSink,
    batch_size: usize,
    batch_timeout: Duration,
}

impl IngestPipeline {
    pub fn new(
        chunking: &ChunkingConfig,
        ingestion: &IngestionConfig,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            chunker: TextChunker::new(chunking.chunk_size, chunking.chunk_overlap),
            embedder,
            index,
            analytics: AnalyticsSink::new(store.clone()),
            store,
            batch_size: ingestion.embedding_batch_size.max(1),
            batch_timeout: Duration::from_secs(ingestion.batch_timeout_secs),
        }
    }

    /// Ingest a document.
    ///
    /// Text that cleans to nothing still records the document, with no chunks.
    /// Embedding failures abort before anything is stored.
    pub async fn ingest(&self, raw_text: &str, meta: DocumentMeta) -> Result<IngestOutcome> {
        let started = Instant::now();

        if meta.title.trim().is_empty() {
            return Err(Error::InvalidInput("document title is empty".into()));
        }

        let text = clean_text(raw_text);
        let mut document = Document::new(meta, text.chars().count(), content_hash(&text));

        let drafts = self.chunker.chunk(&text, &document.title);
        let mut chunks: Vec<Chunk> = drafts
            .into_iter()
            .map(|draft| Chunk::new(document.id, draft.index, draft.content, draft.metadata))
            .collect();

        tracing::info!(
            "[{}] Created {} chunks from {} characters",
            document.title,
            chunks.len(),
            document.text_length
        );

        self.embed_chunks(&document.title, &mut chunks).await?;
        document.chunk_count = chunks.len() as u32;

        self.store.insert_document(&document).await?;
        if !chunks.is_empty() {
            self.store.insert_chunks(&chunks).await?;
            if let Err(e) = self.index.insert(&document, &chunks).await {
                tracing::error!("[{}] Indexing failed, rolling back: {}", document.title, e);
                if let Err(rollback) = self.store.delete_document(&document.id).await {
                    tracing::error!("[{}] Rollback failed: {}", document.title, rollback);
                }
                return Err(e);
            }
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.analytics
            .record(
                AnalyticsEvent::new(AnalyticsKind::DocumentIngested, true)
                    .user(document.owner_id.clone())
                    .duration_ms(elapsed_ms)
                    .documents(1)
                    .details(serde_json::json!({
                        "document_id": document.id,
                        "chunk_count": document.chunk_count,
                    })),
            )
            .await;

        tracing::info!(
            "[{}] COMPLETE: {} chunks stored in {}ms",
            document.title,
            document.chunk_count,
            elapsed_ms
        );

        Ok(IngestOutcome {
            document_id: document.id,
            chunk_count: document.chunk_count,
        })
    }

    /// Embed chunks in concurrent batches, each under a timeout
    async fn embed_chunks(&self, title: &str, chunks: &mut [Chunk]) -> Result<()> {
        let total_batches = chunks.len().div_ceil(self.batch_size);

        for (batch_num, batch) in chunks.chunks_mut(self.batch_size).enumerate() {
            let batch_start = Instant::now();

            let embedding_futures: Vec<_> = batch
                .iter()
                .map(|chunk| self.embedder.embed(&chunk.content))
                .collect();

            let results = timeout(self.batch_timeout, join_all(embedding_futures))
                .await
                .map_err(|_| {
                    Error::retrieval(format!(
                        "embedding batch {}/{} of '{}' timed out after {}s",
                        batch_num + 1,
                        total_batches,
                        title,
                        self.batch_timeout.as_secs()
                    ))
                })?;

            for (chunk, result) in batch.iter_mut().zip(results) {
                chunk.embedding = result?;
            }

            tracing::debug!(
                "[{}] Batch {}/{} embedded in {:.1}s",
                title,
                batch_num + 1,
                total_batches,
                batch_start.elapsed().as_secs_f64()
            );
        }

        Ok(())
    }

    /// Edit document metadata in the store and the index
    pub async fn update_document(&self, id: &Uuid, update: &DocumentUpdate) -> Result<Option<Document>> {
        let updated = self.store.update_document(id, update).await?;
        if let Some(document) = &updated {
            self.index.update_document(document).await?;
            tracing::info!("Updated metadata of document {}", id);
        }
        Ok(updated)
    }

    /// Delete a document with its chunks from the index and the store
    pub async fn delete_document(&self, id: &Uuid) -> Result<bool> {
        let removed_passages = self.index.delete_by_document(id).await?;
        let deleted = self.store.delete_document(id).await?;
        if deleted {
            tracing::info!("Deleted document {} ({} passages)", id, removed_passages);
        }
        Ok(deleted)
    }
}

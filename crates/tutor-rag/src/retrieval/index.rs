//! Vector index trait and in-memory implementation

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Chunk, Document, DocumentRef, UserRole, Visibility};

use super::keywords::keyword_score;
use super::similarity::cosine_similarity;

/// Hard filters applied before ranking
#[derive(Debug, Clone)]
pub struct SearchFilter {
    pub subject: Option<String>,
    pub grade_level: Option<String>,
    pub role: UserRole,
    pub user_id: String,
}

impl SearchFilter {
    pub fn new(role: UserRole, user_id: impl Into<String>) -> Self {
        Self {
            subject: None,
            grade_level: None,
            role,
            user_id: user_id.into(),
        }
    }

    fn admits(&self, entry: &IndexEntry) -> bool {
        if let Some(subject) = &self.subject {
            if entry.subject.as_deref() != Some(subject.as_str()) {
                return false;
            }
        }
        if let Some(grade) = &self.grade_level {
            if entry.grade_level.as_deref() != Some(grade.as_str()) {
                return false;
            }
        }
        entry
            .visibility
            .is_visible_to(&entry.owner_id, self.role, &self.user_id)
    }
}

/// A ranked passage with its parent document metadata
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub title: String,
    pub content: String,
    pub chunk_index: u32,
    /// Final ranking score
    pub similarity: f32,
    /// Cosine similarity to the query (0 for keyword-only hits)
    pub vector_score: f32,
    /// Keyword containment score, set in hybrid mode
    pub keyword_score: Option<f32>,
}

impl RetrievedPassage {
    pub fn to_ref(&self) -> DocumentRef {
        DocumentRef {
            document_id: self.document_id,
            chunk_id: self.chunk_id,
            title: self.title.clone(),
            similarity: self.similarity,
        }
    }
}

/// Trait for passage storage and similarity search
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Register a document's chunks; every chunk must carry an embedding
    async fn insert(&self, document: &Document, chunks: &[Chunk]) -> Result<()>;

    /// Rank visible passages by cosine similarity, best first
    async fn search(
        &self,
        query_embedding: &[f32],
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>>;

    /// Rank visible passages by keyword containment, dropping non-matches
    async fn keyword_search(
        &self,
        query: &str,
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>>;

    /// Refresh the document metadata copied into its passages
    async fn update_document(&self, document: &Document) -> Result<()>;

    /// Delete all passages for a document
    async fn delete_by_document(&self, document_id: &Uuid) -> Result<usize>;

    /// Total number of passages
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Get provider name for logging
    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
struct IndexEntry {
    chunk_id: Uuid,
    document_id: Uuid,
    chunk_index: u32,
    content: String,
    embedding: Vec<f32>,
    title: String,
    subject: Option<String>,
    grade_level: Option<String>,
    visibility: Visibility,
    owner_id: String,
}

impl IndexEntry {
    fn passage(&self, similarity: f32, vector_score: f32, keyword_score: Option<f32>) -> RetrievedPassage {
        RetrievedPassage {
            chunk_id: self.chunk_id,
            document_id: self.document_id,
            title: self.title.clone(),
            content: self.content.clone(),
            chunk_index: self.chunk_index,
            similarity,
            vector_score,
            keyword_score,
        }
    }
}

/// Brute-force cosine index held in process memory
pub struct MemoryVectorIndex {
    entries: DashMap<Uuid, IndexEntry>,
    /// Mapping from document IDs to chunk IDs for efficient deletion
    document_chunks: DashMap<Uuid, Vec<Uuid>>,
    /// Dimension fixed by the first indexed vector
    dimensions: RwLock<Option<usize>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            document_chunks: DashMap::new(),
            dimensions: RwLock::new(None),
        }
    }

    /// Current embedding dimension, if any vector has been indexed
    pub fn dimensions(&self) -> Option<usize> {
        *self.dimensions.read()
    }

    fn check_dimensions(&self, chunks: &[Chunk]) -> Result<()> {
        let Some(first) = chunks.first() else {
            return Ok(());
        };
        let mut dimensions = self.dimensions.write();
        let expected = dimensions.unwrap_or(first.embedding.len());

        for chunk in chunks {
            if chunk.embedding.is_empty() {
                return Err(Error::retrieval(format!("Chunk {} has no embedding", chunk.id)));
            }
            if chunk.embedding.len() != expected {
                return Err(Error::retrieval(format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    expected,
                    chunk.embedding.len()
                )));
            }
        }

        *dimensions = Some(expected);
        Ok(())
    }

    fn rank(mut results: Vec<RetrievedPassage>, top_k: usize) -> Vec<RetrievedPassage> {
        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(top_k);
        results
    }
}

impl Default for MemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn insert(&self, document: &Document, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        self.check_dimensions(chunks)?;

        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            ids.push(chunk.id);
            self.entries.insert(
                chunk.id,
                IndexEntry {
                    chunk_id: chunk.id,
                    document_id: document.id,
                    chunk_index: chunk.chunk_index,
                    content: chunk.content.clone(),
                    embedding: chunk.embedding.clone(),
                    title: document.title.clone(),
                    subject: document.subject.clone(),
                    grade_level: document.grade_level.clone(),
                    visibility: document.visibility,
                    owner_id: document.owner_id.clone(),
                },
            );
        }

        self.document_chunks.entry(document.id).or_default().extend(ids);
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>> {
        let results = self
            .entries
            .iter()
            .filter(|entry| filter.admits(entry.value()))
            .map(|entry| {
                let similarity = cosine_similarity(query_embedding, &entry.embedding);
                entry.passage(similarity, similarity, None)
            })
            .collect();

        Ok(Self::rank(results, top_k))
    }

    async fn keyword_search(
        &self,
        query: &str,
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>> {
        let results = self
            .entries
            .iter()
            .filter(|entry| filter.admits(entry.value()))
            .filter_map(|entry| {
                let score = keyword_score(query, &entry.content);
                (score > 0.0).then(|| entry.passage(score, 0.0, Some(score)))
            })
            .collect();

        Ok(Self::rank(results, top_k))
    }

    async fn update_document(&self, document: &Document) -> Result<()> {
        let Some(chunk_ids) = self.document_chunks.get(&document.id).map(|ids| ids.clone()) else {
            return Ok(());
        };

        for chunk_id in chunk_ids {
            if let Some(mut entry) = self.entries.get_mut(&chunk_id) {
                entry.title = document.title.clone();
                entry.subject = document.subject.clone();
                entry.grade_level = document.grade_level.clone();
                entry.visibility = document.visibility;
            }
        }

        Ok(())
    }

    async fn delete_by_document(&self, document_id: &Uuid) -> Result<usize> {
        let Some((_, chunk_ids)) = self.document_chunks.remove(document_id) else {
            return Ok(0);
        };

        let deleted = chunk_ids
            .iter()
            .filter(|id| self.entries.remove(id).is_some())
            .count();

        Ok(deleted)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

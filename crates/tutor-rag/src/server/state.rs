//! Application state for the tutoring server

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{RagConfig, StorageBackend};
use crate::error::Result;
use crate::ingestion::IngestPipeline;
use crate::providers::{Completer, Embedder, OllamaClient};
use crate::retrieval::{MemoryVectorIndex, VectorIndex};
use crate::storage::{MemoryStore, RecordStore, SqliteStore};
use crate::types::{Chunk, DocumentFilter};
use crate::workflow::Orchestrator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: RagConfig,
    /// Query workflow
    orchestrator: Orchestrator,
    /// Document ingestion
    pipeline: IngestPipeline,
    /// Records (documents, conversations, feedback, analytics)
    store: Arc<dyn RecordStore>,
    /// Passage index, rebuilt from the store at startup
    index: Arc<dyn VectorIndex>,
    /// Language model, probed by readiness checks
    completer: Arc<dyn Completer>,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Create state backed by Ollama and the configured record store
    pub async fn new(config: RagConfig) -> Result<Self> {
        tracing::info!("Initializing application state (storage: {:?})...", config.storage.backend);

        let store: Arc<dyn RecordStore> = match config.storage.backend {
            StorageBackend::Sqlite => {
                tracing::info!("Opening SQLite store at {}", config.storage.sqlite_path.display());
                Arc::new(SqliteStore::new(&config.storage.sqlite_path)?)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory store; records are lost on shutdown");
                Arc::new(MemoryStore::new())
            }
        };

        let ollama = Arc::new(OllamaClient::new(&config.llm, &config.embeddings)?);
        tracing::info!(
            "Ollama client initialized (generate: {}, embed: {})",
            config.llm.generate_model,
            config.embeddings.model
        );

        Self::with_providers(config, ollama.clone(), ollama, store).await
    }

    /// Create state from explicit capabilities
    pub async fn with_providers(
        config: RagConfig,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self> {
        let index: Arc<dyn VectorIndex> = Arc::new(MemoryVectorIndex::new());
        let restored = Self::hydrate_index(store.as_ref(), index.as_ref()).await?;
        tracing::info!("Vector index restored with {} passages", restored);

        let orchestrator = Orchestrator::new(
            &config,
            embedder.clone(),
            completer.clone(),
            index.clone(),
            store.clone(),
        );
        let pipeline = IngestPipeline::new(
            &config.chunking,
            &config.ingestion,
            embedder,
            index.clone(),
            store.clone(),
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                orchestrator,
                pipeline,
                store,
                index,
                completer,
                ready: RwLock::new(true),
            }),
        })
    }

    /// Load every stored chunk back into the index
    async fn hydrate_index(store: &dyn RecordStore, index: &dyn VectorIndex) -> Result<usize> {
        let documents = store.list_documents(&DocumentFilter::default()).await?;

        let mut by_document: HashMap<Uuid, Vec<Chunk>> = HashMap::new();
        for chunk in store.list_chunks(None).await? {
            by_document.entry(chunk.document_id).or_default().push(chunk);
        }

        let mut restored = 0;
        for document in &documents {
            let Some(chunks) = by_document.remove(&document.id) else {
                continue;
            };
            match index.insert(document, &chunks).await {
                Ok(()) => restored += chunks.len(),
                Err(e) => tracing::warn!("Skipping document '{}' during index restore: {}", document.title, e),
            }
        }

        if !by_document.is_empty() {
            tracing::warn!("{} documents have chunks but no record; ignored", by_document.len());
        }

        Ok(restored)
    }

    /// Get configuration
    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.inner.orchestrator
    }

    pub fn pipeline(&self) -> &IngestPipeline {
        &self.inner.pipeline
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.inner.store
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.inner.index
    }

    pub fn completer(&self) -> &Arc<dyn Completer> {
        &self.inner.completer
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}

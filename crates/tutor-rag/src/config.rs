//! Configuration for the tutoring workflow

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Ollama/LLM configuration
    pub llm: LlmConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Refinement loop configuration
    pub workflow: WorkflowConfig,
    /// Ingestion configuration
    pub ingestion: IngestionConfig,
    /// Record store configuration
    pub storage: StorageConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: RagConfig = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be positive".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if !(0.0..=1.0).contains(&self.retrieval.hybrid_alpha) {
            return Err(Error::Config("retrieval.hybrid_alpha must be within [0, 1]".into()));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be positive".into()));
        }
        if self.workflow.max_attempts == 0 {
            return Err(Error::Config("workflow.max_attempts must be positive".into()));
        }
        if self.ingestion.embedding_batch_size == 0 {
            return Err(Error::Config("ingestion.embedding_batch_size must be positive".into()));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum request body size in bytes (default: 10MB)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model served by Ollama
    pub model: String,
    /// Embedding dimensions (768 for nomic-embed-text)
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap budget carried into the next chunk, in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// LLM (Ollama) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Generation model name
    pub generate_model: String,
    /// Temperature for math/physics/chemistry answers
    pub precise_temperature: f32,
    /// Temperature for research and content creation
    pub creative_temperature: f32,
    /// Temperature for query rewrites
    pub refine_temperature: f32,
    /// Temperature for answer evaluation
    pub evaluation_temperature: f32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            generate_model: "llama3.1:8b".to_string(),
            precise_temperature: 0.1,
            creative_temperature: 0.7,
            refine_temperature: 0.3,
            evaluation_temperature: 0.0,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of passages handed to the generator
    pub top_k: usize,
    /// Blend keyword matches into vector ranking
    pub hybrid: bool,
    /// Weight of the vector score in hybrid mode
    pub hybrid_alpha: f32,
    /// Minimum similarity for a passage to be listed as a source
    pub source_threshold: f32,
    /// Maximum number of source titles in a response
    pub max_sources: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            hybrid: false,
            hybrid_alpha: 0.7,
            source_threshold: 0.5,
            max_sources: 5,
        }
    }
}

/// Refinement loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Evaluation score at or above which an answer is accepted
    pub quality_threshold: f32,
    /// Maximum number of refine passes per query
    pub max_attempts: u32,
    /// Conversational exchanges included in the prompt
    pub history_exchanges: usize,
    /// Confidence reported when no passages were retrieved
    pub ungrounded_confidence: f32,
    /// Learned refinements must score at least this to be used as examples
    pub min_pattern_score: f32,
    /// Maximum learned refinements shown to the rewrite model
    pub max_patterns: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 0.7,
            max_attempts: 3,
            history_exchanges: 3,
            ungrounded_confidence: 0.5,
            min_pattern_score: 0.7,
            max_patterns: 5,
        }
    }
}

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Chunks embedded concurrently per batch
    pub embedding_batch_size: usize,
    /// Timeout for one embedding batch in seconds
    pub batch_timeout_secs: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            embedding_batch_size: 8,
            batch_timeout_secs: 60,
        }
    }
}

/// Record store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite file on disk
    #[default]
    Sqlite,
    /// Process memory only
    Memory,
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which record store to use
    pub backend: StorageBackend,
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let sqlite_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tutor-rag")
            .join("tutor.db");

        Self {
            backend: StorageBackend::Sqlite,
            sqlite_path,
        }
    }
}

//! Provider abstractions for embeddings and language models
//!
//! The workflow only talks to these traits, so the Ollama client can be swapped
//! for deterministic substitutes in tests.

pub mod embedding;
pub mod llm;
pub mod ollama;

pub use embedding::Embedder;
pub use llm::{Completer, Completion, CompletionChunk, CompletionStream};
pub use ollama::OllamaClient;

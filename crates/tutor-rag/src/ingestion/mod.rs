//! Document ingestion: text cleaning, chunking and embedding

pub mod chunker;
pub mod pipeline;

pub use chunker::{clean_text, split_into_sentences, ChunkDraft, TextChunker};
pub use pipeline::{content_hash, IngestOutcome, IngestPipeline};

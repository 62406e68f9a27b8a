//! Retrieval: vector index, similarity and hybrid ranking

pub mod index;
pub mod keywords;
pub mod retriever;
pub mod similarity;

pub use index::{MemoryVectorIndex, RetrievedPassage, SearchFilter, VectorIndex};
pub use keywords::{extract_keywords, keyword_score};
pub use retriever::{merge_hybrid, Retriever};
pub use similarity::{cosine_similarity, mean};

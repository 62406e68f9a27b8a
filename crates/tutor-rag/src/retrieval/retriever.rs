//! Query-time retrieval over the vector index

use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::providers::Embedder;

use super::index::{RetrievedPassage, SearchFilter, VectorIndex};
use super::keywords::keyword_score;

/// Embeds queries and ranks indexed passages
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, config: RetrievalConfig) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    /// Retrieve the passages most relevant to `query`, best first.
    ///
    /// `top_k` defaults to the configured value. In hybrid mode the vector and keyword
    /// candidate sets are merged and re-ranked before truncation.
    pub async fn retrieve(
        &self,
        query: &str,
        filter: &SearchFilter,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievedPassage>> {
        let top_k = top_k.unwrap_or(self.config.top_k);
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query).await?;

        if !self.config.hybrid {
            let results = self.index.search(&embedding, filter, top_k).await?;
            tracing::debug!("Vector search returned {} passages", results.len());
            return Ok(results);
        }

        // Wider candidate pools so the re-rank has something to work with
        let pool = top_k * 2;
        let vector = self.index.search(&embedding, filter, pool).await?;
        let keyword = self.index.keyword_search(query, filter, pool).await?;

        tracing::debug!(
            "Hybrid search: {} vector candidates, {} keyword candidates",
            vector.len(),
            keyword.len()
        );

        Ok(merge_hybrid(query, vector, keyword, self.config.hybrid_alpha, top_k))
    }
}

/// Blend vector and keyword candidates: `alpha * vector + (1 - alpha) * keyword`.
///
/// Keyword-only candidates get a vector score of 0.
pub fn merge_hybrid(
    query: &str,
    vector: Vec<RetrievedPassage>,
    keyword: Vec<RetrievedPassage>,
    alpha: f32,
    top_k: usize,
) -> Vec<RetrievedPassage> {
    let mut merged: HashMap<Uuid, RetrievedPassage> = HashMap::new();

    for mut passage in vector {
        let ks = keyword_score(query, &passage.content);
        passage.keyword_score = Some(ks);
        merged.insert(passage.chunk_id, passage);
    }

    for mut passage in keyword {
        merged.entry(passage.chunk_id).or_insert_with(|| {
            passage.vector_score = 0.0;
            passage
        });
    }

    let mut results: Vec<RetrievedPassage> = merged
        .into_values()
        .map(|mut passage| {
            let ks = passage.keyword_score.unwrap_or(0.0);
            passage.similarity = alpha * passage.vector_score + (1.0 - alpha) * ks;
            passage
        })
        .collect();

    results.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    results.truncate(top_k);
    results
}

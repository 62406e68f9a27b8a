//! Answer quality scoring
//!
//! `LlmEvaluator` asks the language model for a rubric score and falls back to
//! `HeuristicEvaluator` whenever the model cannot produce one. Evaluation never
//! fails the workflow.

pub mod heuristic;
pub mod llm;

pub use heuristic::HeuristicEvaluator;
pub use llm::LlmEvaluator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::retrieval::{mean, RetrievedPassage};
use crate::types::Mode;

/// What the evaluator sees of one generate step
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub mode: Mode,
    pub question: &'a str,
    pub answer: &'a str,
    pub passages: &'a [RetrievedPassage],
    /// Generation confidence
    pub confidence: f32,
}

impl EvaluationInput<'_> {
    /// Mean similarity of the retrieved passages, `None` when nothing was retrieved
    pub fn average_retrieval(&self) -> Option<f32> {
        if self.passages.is_empty() {
            return None;
        }
        let scores: Vec<f32> = self.passages.iter().map(|p| p.similarity).collect();
        Some(mean(&scores))
    }
}

/// Quality verdict on an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Score in [0, 1]
    pub score: f32,
    pub feedback: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    /// Set when the heuristic produced the score
    #[serde(default)]
    pub used_fallback: bool,
}

/// Scores answers; implementations must not fail
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, input: &EvaluationInput<'_>) -> Evaluation;

    /// Get evaluator name for logging
    fn name(&self) -> &str;
}

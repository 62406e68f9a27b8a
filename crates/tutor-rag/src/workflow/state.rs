//! States and transitions of the refine/retrieve/generate/evaluate loop

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::WorkflowConfig;
use crate::evaluation::Evaluation;
use crate::generation::GeneratedAnswer;
use crate::retrieval::RetrievedPassage;
use crate::types::TokenUsage;

/// Step the orchestrator executes next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Refine,
    Retrieve,
    Generate,
    Evaluate,
    Done,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Refine => "refine",
            Self::Retrieve => "retrieve",
            Self::Generate => "generate",
            Self::Evaluate => "evaluate",
            Self::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable record of one run, threaded through the loop
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub state: WorkflowState,
    /// Refine passes completed so far; never decreases
    pub attempts: u32,
    /// Query used for the current cycle's retrieval
    pub current_query: String,
    pub passages: Vec<RetrievedPassage>,
    pub answer: Option<GeneratedAnswer>,
    pub evaluation: Option<Evaluation>,
    pub token_usage: TokenUsage,
    /// Set when generation failed; ends the run
    pub error: Option<String>,
    pub quality_threshold: f32,
    pub max_attempts: u32,
}

impl WorkflowContext {
    pub fn new(query: impl Into<String>, config: &WorkflowConfig) -> Self {
        Self {
            state: WorkflowState::Refine,
            attempts: 0,
            current_query: query.into(),
            passages: Vec::new(),
            answer: None,
            evaluation: None,
            token_usage: TokenUsage::default(),
            error: None,
            quality_threshold: config.quality_threshold,
            max_attempts: config.max_attempts,
        }
    }

    pub fn score(&self) -> f32 {
        self.evaluation.as_ref().map(|e| e.score).unwrap_or(0.0)
    }

    /// Whether another refine cycle is allowed and worthwhile
    pub fn should_retry(&self) -> bool {
        self.score() < self.quality_threshold
            && self.attempts < self.max_attempts
            && !self.passages.is_empty()
    }
}

/// Pure transition function
pub fn next_state(context: &WorkflowContext) -> WorkflowState {
    if context.error.is_some() {
        return WorkflowState::Done;
    }

    match context.state {
        WorkflowState::Refine => WorkflowState::Retrieve,
        WorkflowState::Retrieve => WorkflowState::Generate,
        WorkflowState::Generate => WorkflowState::Evaluate,
        WorkflowState::Evaluate if context.should_retry() => WorkflowState::Refine,
        WorkflowState::Evaluate | WorkflowState::Done => WorkflowState::Done,
    }
}

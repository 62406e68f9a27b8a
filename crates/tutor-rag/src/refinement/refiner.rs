//! Query refiner: rewrites queries using learned patterns and an LLM call

use regex::Regex;
use std::sync::{Arc, OnceLock};

use crate::analytics::AnalyticsSink;
use crate::config::WorkflowConfig;
use crate::generation::PromptBuilder;
use crate::learning::{RefinementKey, RefinementLearner};
use crate::providers::Completer;
use crate::types::{AnalyticsEvent, AnalyticsKind, Mode, TokenUsage};

use super::abbreviations::expand_abbreviations;

/// Labels models like to put in front of a rewrite, e.g. "Refined query:"
fn rewrite_label() -> &'static Regex {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    LABEL.get_or_init(|| {
        Regex::new(r"(?i)^(?:(?:refined|rewritten|improved)(?:\s+(?:query|question))?|query|question)\s*:\s*")
            .expect("Invalid regex")
    })
}

/// Input to one refine pass
#[derive(Debug, Clone)]
pub struct RefineRequest<'a> {
    pub original: &'a str,
    pub mode: Mode,
    pub subject: Option<&'a str>,
    pub grade_level: Option<&'a str>,
    /// Number of refine passes already completed
    pub attempt: u32,
    /// Evaluator feedback on the previous answer
    pub feedback_hint: Option<&'a str>,
}

/// Outcome of a refine pass
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedQuery {
    pub query: String,
    /// Whether the query differs from the original
    pub rewritten: bool,
    pub usage: TokenUsage,
}

impl RefinedQuery {
    fn unchanged(original: &str, usage: TokenUsage) -> Self {
        Self {
            query: original.to_string(),
            rewritten: false,
            usage,
        }
    }
}

/// Rewrites queries for better retrieval
pub struct QueryRefiner {
    completer: Arc<dyn Completer>,
    learner: RefinementLearner,
    analytics: AnalyticsSink,
    config: WorkflowConfig,
    temperature: f32,
}

impl QueryRefiner {
    pub fn new(
        completer: Arc<dyn Completer>,
        learner: RefinementLearner,
        analytics: AnalyticsSink,
        config: WorkflowConfig,
        temperature: f32,
    ) -> Self {
        Self {
            completer,
            learner,
            analytics,
            config,
            temperature,
        }
    }

    /// Refine a query.
    ///
    /// Attempt 0 returns the original untouched. Later attempts ask the model for a
    /// rewrite and fall back to the original on any failure; either way the pair is
    /// recorded so feedback can later score it.
    pub async fn refine(&self, request: RefineRequest<'_>) -> RefinedQuery {
        if request.attempt == 0 {
            return RefinedQuery::unchanged(request.original, TokenUsage::default());
        }

        let patterns = match self
            .learner
            .learned_patterns(
                request.mode,
                request.subject,
                self.config.min_pattern_score,
                self.config.max_patterns,
            )
            .await
        {
            Ok(patterns) => patterns,
            Err(e) => {
                tracing::warn!("Could not load learned refinements: {}", e);
                Vec::new()
            }
        };

        let prompt = PromptBuilder::build_refine_prompt(
            request.original,
            request.mode,
            request.subject,
            request.grade_level,
            &patterns,
            request.feedback_hint,
        );

        let refined = match self.completer.complete(&prompt, self.temperature).await {
            Ok(completion) => match sanitize_rewrite(&completion.text) {
                Some(query) => {
                    let query = expand_abbreviations(&query, request.mode);
                    RefinedQuery {
                        rewritten: query != request.original,
                        query,
                        usage: completion.usage,
                    }
                }
                None => {
                    self.report_failure(&request, "empty rewrite").await;
                    RefinedQuery::unchanged(request.original, completion.usage)
                }
            },
            Err(e) => {
                self.report_failure(&request, &e.to_string()).await;
                RefinedQuery::unchanged(request.original, TokenUsage::default())
            }
        };

        tracing::debug!(
            "Refine attempt {}: '{}' -> '{}' ({} learned patterns)",
            request.attempt,
            request.original,
            refined.query,
            patterns.len()
        );

        let key = RefinementKey::new(
            request.original,
            refined.query.clone(),
            request.mode,
            request.subject.map(String::from),
        );
        if let Err(e) = self.learner.record_attempt(&key).await {
            tracing::warn!("Failed to record refinement attempt: {}", e);
        }

        refined
    }

    async fn report_failure(&self, request: &RefineRequest<'_>, reason: &str) {
        tracing::warn!(
            "Query refinement failed on attempt {}, keeping original: {}",
            request.attempt,
            reason
        );
        self.analytics
            .record(
                AnalyticsEvent::new(AnalyticsKind::RefinementFailed, false).details(serde_json::json!({
                    "attempt": request.attempt,
                    "mode": request.mode.as_str(),
                    "reason": reason,
                })),
            )
            .await;
    }
}

/// First non-empty line of a model rewrite, without labels or quotes
pub fn sanitize_rewrite(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;

    let line = rewrite_label().replace(line, "");
    let line = line.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*')).trim();
    (!line.is_empty()).then(|| line.to_string())
}

//! Model-graded evaluation with heuristic fallback

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::generation::{parse_structured, PromptBuilder};
use crate::providers::Completer;

use super::heuristic::HeuristicEvaluator;
use super::{Evaluation, EvaluationInput, Evaluator};

/// Rubric object the model is asked to emit
#[derive(Debug, Deserialize)]
struct RubricScore {
    score: f32,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    improvements: Vec<String>,
}

/// Asks the language model to grade answers
pub struct LlmEvaluator {
    completer: Arc<dyn Completer>,
    temperature: f32,
    fallback: HeuristicEvaluator,
}

impl LlmEvaluator {
    pub fn new(completer: Arc<dyn Completer>, temperature: f32) -> Self {
        Self {
            completer,
            temperature,
            fallback: HeuristicEvaluator::new(),
        }
    }

    async fn grade(&self, input: &EvaluationInput<'_>) -> Result<Evaluation> {
        let prompt = PromptBuilder::build_evaluation_prompt(input.mode, input.question, input.answer, input.passages);

        let completion = self
            .completer
            .complete(&prompt, self.temperature)
            .await
            .map_err(|e| Error::evaluation(e.to_string()))?;

        let rubric: RubricScore = parse_structured(&completion.text, "evaluation")?;
        if !rubric.score.is_finite() || !(0.0..=1.0).contains(&rubric.score) {
            return Err(Error::parse(
                "evaluation",
                format!("score {} outside [0, 1]", rubric.score),
            ));
        }

        Ok(Evaluation {
            score: apply_penalties(rubric.score, input),
            feedback: rubric.feedback,
            strengths: rubric.strengths,
            improvements: rubric.improvements,
            used_fallback: false,
        })
    }
}

/// Weak grounding caps a model score: x0.8 for poor retrieval, x0.9 for low confidence
pub fn apply_penalties(score: f32, input: &EvaluationInput<'_>) -> f32 {
    let mut score = score;
    if input.average_retrieval().is_some_and(|avg| avg < 0.5) {
        score *= 0.8;
    }
    if input.confidence < 0.5 {
        score *= 0.9;
    }
    score.clamp(0.0, 1.0)
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn evaluate(&self, input: &EvaluationInput<'_>) -> Evaluation {
        match self.grade(input).await {
            Ok(evaluation) => {
                tracing::debug!("Model evaluation score: {:.3}", evaluation.score);
                evaluation
            }
            Err(e) => {
                tracing::warn!("Model evaluation unavailable, using heuristic: {}", e);
                self.fallback.score(input)
            }
        }
    }

    fn name(&self) -> &str {
        "llm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Completion;
    use crate::retrieval::RetrievedPassage;
    use crate::types::{Mode, TokenUsage};
    use uuid::Uuid;

    struct Grader(std::result::Result<&'static str, &'static str>);

    #[async_trait]
    impl Completer for Grader {
        async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<Completion> {
            match self.0 {
                Ok(text) => Ok(Completion {
                    text: text.to_string(),
                    usage: TokenUsage::default(),
                }),
                Err(message) => Err(Error::generation(message)),
            }
        }

        fn name(&self) -> &str {
            "grader"
        }

        fn model(&self) -> &str {
            "grader"
        }
    }

    fn passage(similarity: f32) -> RetrievedPassage {
        RetrievedPassage {
            chunk_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            title: "Doc".into(),
            content: "content".into(),
            chunk_index: 0,
            similarity,
            vector_score: similarity,
            keyword_score: None,
        }
    }

    fn input<'a>(passages: &'a [RetrievedPassage], confidence: f32) -> EvaluationInput<'a> {
        EvaluationInput {
            mode: Mode::Research,
            question: "What is osmosis?",
            answer: "Osmosis is the diffusion of water across a membrane.",
            passages,
            confidence,
        }
    }

    #[tokio::test]
    async fn test_model_score_is_used() {
        let evaluator = LlmEvaluator::new(
            Arc::new(Grader(Ok(
                r#"Here you go: {"score": 0.85, "feedback": "Clear", "strengths": ["concise"], "improvements": []}"#,
            ))),
            0.0,
        );
        let passages = [passage(0.8)];
        let evaluation = evaluator.evaluate(&input(&passages, 0.96)).await;

        assert!((evaluation.score - 0.85).abs() < 1e-6);
        assert_eq!(evaluation.feedback, "Clear");
        assert!(!evaluation.used_fallback);
    }

    #[tokio::test]
    async fn test_penalties_stack() {
        let evaluator = LlmEvaluator::new(Arc::new(Grader(Ok(r#"{"score": 1.0}"#))), 0.0);
        let passages = [passage(0.3)];
        let evaluation = evaluator.evaluate(&input(&passages, 0.36)).await;

        assert!((evaluation.score - 0.72).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_fallback_on_bad_output() {
        let passages = [passage(0.8)];
        for grader in [
            Grader(Ok("The answer looks fine to me.")),
            Grader(Ok(r#"{"score": 8.5}"#)),
            Grader(Err("connection refused")),
        ] {
            let evaluator = LlmEvaluator::new(Arc::new(grader), 0.0);
            let evaluation = evaluator.evaluate(&input(&passages, 0.96)).await;
            assert!(evaluation.used_fallback);
            assert!((0.0..=1.0).contains(&evaluation.score));
        }
    }
}

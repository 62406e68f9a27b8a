//! Deterministic scoring used when the model cannot grade an answer

use async_trait::async_trait;

use crate::retrieval::extract_keywords;

use super::{Evaluation, EvaluationInput, Evaluator};

const BASE_SCORE: f32 = 0.5;
const MIN_WORDS: usize = 30;
const MAX_WORDS: usize = 500;
const KEYWORD_COVERAGE: f32 = 0.6;

/// Rule-based evaluator over length, keyword coverage and retrieval quality
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEvaluator;

impl HeuristicEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Score an answer without calling a model
    pub fn score(&self, input: &EvaluationInput<'_>) -> Evaluation {
        let mut score = BASE_SCORE;
        let mut strengths = Vec::new();
        let mut improvements = Vec::new();

        let words = input.answer.split_whitespace().count();
        if (MIN_WORDS..=MAX_WORDS).contains(&words) {
            score += 0.1;
            strengths.push("Answer length is appropriate".to_string());
        } else {
            score -= 0.1;
            improvements.push(if words < MIN_WORDS {
                "Answer is too brief".to_string()
            } else {
                "Answer is too long".to_string()
            });
        }

        // A question without keywords has nothing to cover, which counts as uncovered
        let keywords = extract_keywords(input.question);
        let answer = input.answer.to_lowercase();
        let covered = keywords.iter().filter(|k| answer.contains(k.as_str())).count();
        if !keywords.is_empty() && covered as f32 / keywords.len() as f32 >= KEYWORD_COVERAGE {
            score += 0.15;
            strengths.push("Addresses the key terms of the question".to_string());
        } else {
            score -= 0.1;
            improvements.push("Address more of the question's key terms".to_string());
        }

        match input.average_retrieval() {
            None => {
                score -= 0.2;
                improvements.push("No reference material supports the answer".to_string());
            }
            Some(avg) if avg > 0.7 => {
                score += 0.15;
                strengths.push("Grounded in closely matching sources".to_string());
            }
            Some(avg) if avg < 0.4 => {
                score -= 0.15;
                improvements.push("Retrieved sources match the question poorly".to_string());
            }
            Some(_) => {}
        }

        let score = (score * 0.7 + input.confidence * 0.3).clamp(0.0, 1.0);

        Evaluation {
            score,
            feedback: format!("Heuristic evaluation over {} words", words),
            strengths,
            improvements,
            used_fallback: true,
        }
    }
}

#[async_trait]
impl Evaluator for HeuristicEvaluator {
    async fn evaluate(&self, input: &EvaluationInput<'_>) -> Evaluation {
        self.score(input)
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::RetrievedPassage;
    use crate::types::Mode;
    use uuid::Uuid;

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

    fn words(n: usize, seed: &str) -> String {
        std::iter::repeat(seed).take(n).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_well_grounded_answer() {
        let answer = format!("To explain photosynthesis: it converts light energy. {}", words(40, "chlorophyll"));
        let passages = [passage(0.9), passage(0.8)];
        let input = EvaluationInput {
            mode: Mode::Research,
            question: "Explain photosynthesis",
            answer: &answer,
            passages: &passages,
            confidence: 1.0,
        };

        // (0.5 + 0.1 + 0.15 + 0.15) * 0.7 + 1.0 * 0.3
        let evaluation = HeuristicEvaluator.score(&input);
        assert!((evaluation.score - 0.93).abs() < 1e-5);
        assert!(evaluation.used_fallback);
        assert!(evaluation.improvements.is_empty());
    }

    #[test]
    fn test_ungrounded_short_answer() {
        let input = EvaluationInput {
            mode: Mode::MathSolve,
            question: "2+2=4, true or false?",
            answer: "True.",
            passages: &[],
            confidence: 0.5,
        };

        // "false" is missing: (0.5 - 0.1 - 0.1 - 0.2) * 0.7 + 0.5 * 0.3
        let evaluation = HeuristicEvaluator.score(&input);
        assert!((evaluation.score - 0.22).abs() < 1e-5);
    }

    #[test]
    fn test_poor_retrieval_and_missing_keywords() {
        let answer = words(50, "unrelated");
        let passages = [passage(0.3)];
        let input = EvaluationInput {
            mode: Mode::Research,
            question: "Describe mitochondria function",
            answer: &answer,
            passages: &passages,
            confidence: 0.36,
        };

        // (0.5 + 0.1 - 0.1 - 0.15) * 0.7 + 0.36 * 0.3
        let evaluation = HeuristicEvaluator.score(&input);
        assert!((evaluation.score - 0.353).abs() < 1e-5);
        assert_eq!(evaluation.improvements.len(), 2);
    }

    #[test]
    fn test_question_without_keywords_is_uncovered() {
        let passages = [passage(0.6)];
        let input = EvaluationInput {
            mode: Mode::MathSolve,
            question: "2+2?",
            answer: "It is 4.",
            passages: &passages,
            confidence: 0.72,
        };

        // (0.5 - 0.1 - 0.1) * 0.7 + 0.72 * 0.3
        let evaluation = HeuristicEvaluator.score(&input);
        assert!((evaluation.score - 0.426).abs() < 1e-5);
        assert!(evaluation.improvements.iter().any(|i| i.contains("key terms")));
    }
}

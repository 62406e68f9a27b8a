//! Answer generation over retrieved context

use futures::StreamExt;
use std::sync::Arc;

use crate::config::{LlmConfig, WorkflowConfig};
use crate::error::{Error, Result};
use crate::providers::Completer;
use crate::retrieval::{mean, RetrievedPassage};
use crate::types::{Message, Mode, ModelProfile, TokenUsage};

use super::prompt::PromptBuilder;
use super::structured::QuizPayload;

/// Everything the generator needs for one answer
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub question: &'a str,
    pub mode: Mode,
    pub passages: &'a [RetrievedPassage],
    /// Prior messages of the conversation, chronological
    pub history: &'a [Message],
    pub subject: Option<&'a str>,
    pub grade_level: Option<&'a str>,
}

/// A generated answer with its grounding confidence
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub text: String,
    pub confidence: f32,
    pub usage: TokenUsage,
    /// Validated quiz or exam payload
    pub payload: Option<serde_json::Value>,
}

/// Grounding confidence: `min(avg_similarity * 1.2, 1.0)`, or the ungrounded
/// baseline when nothing was retrieved
pub fn confidence(passages: &[RetrievedPassage], ungrounded: f32) -> f32 {
    if passages.is_empty() {
        return ungrounded.clamp(0.0, 1.0);
    }
    let scores: Vec<f32> = passages.iter().map(|p| p.similarity).collect();
    (mean(&scores) * 1.2).clamp(0.0, 1.0)
}

/// Wraps the language model for answering
pub struct AnswerGenerator {
    completer: Arc<dyn Completer>,
    llm: LlmConfig,
    workflow: WorkflowConfig,
}

impl AnswerGenerator {
    pub fn new(completer: Arc<dyn Completer>, llm: LlmConfig, workflow: WorkflowConfig) -> Self {
        Self {
            completer,
            llm,
            workflow,
        }
    }

    /// Temperature for a mode's model profile
    pub fn temperature(&self, mode: Mode) -> f32 {
        match mode.profile() {
            ModelProfile::Precise => self.llm.precise_temperature,
            ModelProfile::Creative => self.llm.creative_temperature,
        }
    }

    fn build_prompt(&self, request: &GenerateRequest<'_>) -> String {
        let context = PromptBuilder::build_context(request.passages);
        let history = PromptBuilder::format_history(request.history, self.workflow.history_exchanges);

        PromptBuilder::build_answer_prompt(
            request.mode,
            request.question,
            &context,
            &history,
            request.subject,
            request.grade_level,
        )
    }

    /// Generate a complete answer
    pub async fn generate(&self, request: GenerateRequest<'_>) -> Result<GeneratedAnswer> {
        let prompt = self.build_prompt(&request);
        tracing::debug!(
            "Generating {} answer from {} passages ({} prompt chars)",
            request.mode,
            request.passages.len(),
            prompt.len()
        );

        let completion = self
            .completer
            .complete(&prompt, self.temperature(request.mode))
            .await?;

        self.finish(&request, completion.text, completion.usage)
    }

    /// Generate an answer, forwarding text deltas as they arrive
    pub async fn generate_stream(
        &self,
        request: GenerateRequest<'_>,
        on_delta: &(dyn Fn(&str) + Send + Sync),
    ) -> Result<GeneratedAnswer> {
        let prompt = self.build_prompt(&request);
        let mut stream = self
            .completer
            .stream(&prompt, self.temperature(request.mode))
            .await?;

        let mut text = String::new();
        let mut usage = TokenUsage::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !chunk.text.is_empty() {
                on_delta(&chunk.text);
                text.push_str(&chunk.text);
            }
            if let Some(reported) = chunk.usage {
                usage = reported;
            }
            if chunk.done {
                break;
            }
        }

        self.finish(&request, text, usage)
    }

    fn finish(&self, request: &GenerateRequest<'_>, text: String, usage: TokenUsage) -> Result<GeneratedAnswer> {
        if text.trim().is_empty() {
            return Err(Error::generation("model returned an empty answer"));
        }

        let payload = if request.mode.expects_question_payload() {
            let payload = QuizPayload::from_model_output(&text)
                .map_err(|e| Error::generation(format!("invalid {} output: {}", request.mode, e)))?;
            Some(serde_json::to_value(payload)?)
        } else {
            None
        };

        Ok(GeneratedAnswer {
            confidence: confidence(request.passages, self.workflow.ungrounded_confidence),
            text,
            usage,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Completion, CompletionChunk, CompletionStream};
    use async_trait::async_trait;
    use futures::stream;
    use parking_lot::Mutex;
    use uuid::Uuid;

    struct EchoCompleter {
        reply: &'static str,
        temperatures: Mutex<Vec<f32>>,
    }

    #[async_trait]
    impl Completer for EchoCompleter {
        async fn complete(&self, _prompt: &str, temperature: f32) -> Result<Completion> {
            self.temperatures.lock().push(temperature);
            Ok(Completion {
                text: self.reply.to_string(),
                usage: TokenUsage::new(100, 20),
            })
        }

        async fn stream(&self, _prompt: &str, _temperature: f32) -> Result<CompletionStream> {
            let words: Vec<Result<CompletionChunk>> = self
                .reply
                .split_inclusive(' ')
                .map(|w| {
                    Ok(CompletionChunk {
                        text: w.to_string(),
                        done: false,
                        usage: None,
                    })
                })
                .chain(std::iter::once(Ok(CompletionChunk {
                    text: String::new(),
                    done: true,
                    usage: Some(TokenUsage::new(7, 3)),
                })))
                .collect();
            Ok(stream::iter(words).boxed())
        }

        fn name(&self) -> &str {
            "echo"
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    fn generator(reply: &'static str) -> (AnswerGenerator, Arc<EchoCompleter>) {
        let completer = Arc::new(EchoCompleter {
            reply,
            temperatures: Mutex::new(Vec::new()),
        });
        let generator = AnswerGenerator::new(completer.clone(), LlmConfig::default(), WorkflowConfig::default());
        (generator, completer)
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

    fn request<'a>(mode: Mode, passages: &'a [RetrievedPassage]) -> GenerateRequest<'a> {
        GenerateRequest {
            question: "What is 2+2?",
            mode,
            passages,
            history: &[],
            subject: None,
            grade_level: None,
        }
    }

    #[test]
    fn test_confidence() {
        assert_eq!(confidence(&[], 0.5), 0.5);
        assert!((confidence(&[passage(0.5), passage(0.3)], 0.5) - 0.48).abs() < 1e-5);
        assert_eq!(confidence(&[passage(0.9), passage(0.95)], 0.5), 1.0);
    }

    #[tokio::test]
    async fn test_precise_profile_for_solvers() {
        let (generator, completer) = generator("4");
        generator.generate(request(Mode::MathSolve, &[])).await.unwrap();
        generator.generate(request(Mode::Research, &[])).await.unwrap();

        let temperatures = completer.temperatures.lock().clone();
        assert_eq!(temperatures, vec![0.1, 0.7]);
    }

    #[tokio::test]
    async fn test_stream_forwards_deltas() {
        let (generator, _) = generator("two plus two is four");
        let seen = Mutex::new(String::new());
        let passages = [passage(0.5)];

        let answer = generator
            .generate_stream(request(Mode::Research, &passages), &|delta| seen.lock().push_str(delta))
            .await
            .unwrap();

        assert_eq!(answer.text, "two plus two is four");
        assert_eq!(*seen.lock(), answer.text);
        assert_eq!(answer.usage, TokenUsage::new(7, 3));
        assert!((answer.confidence - 0.6).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_quiz_mode_requires_valid_payload() {
        let (prose_generator, _) = generator("Here is a quiz about photosynthesis!");
        let result = prose_generator.generate(request(Mode::QuizCreate, &[])).await;
        assert!(matches!(result, Err(Error::Generation(_))));

        let (quiz_generator, _) = generator(
            r#"{"title": "Sums", "questions": [{"question": "2+2?", "options": ["3", "4"], "answer": "4", "explanation": "Counting"}]}"#,
        );
        let answer = quiz_generator.generate(request(Mode::QuizCreate, &[])).await.unwrap();
        assert_eq!(answer.payload.unwrap()["questions"][0]["answer"], "4");
    }
}

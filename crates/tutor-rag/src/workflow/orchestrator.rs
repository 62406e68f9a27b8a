//! Workflow orchestrator: drives one query through the refinement loop

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::analytics::AnalyticsSink;
use crate::config::{RagConfig, RetrievalConfig, WorkflowConfig};
use crate::conversation::ConversationService;
use crate::error::Result;
use crate::evaluation::{EvaluationInput, Evaluator, LlmEvaluator};
use crate::generation::{AnswerGenerator, GenerateRequest};
use crate::learning::{FeedbackOutcome, FeedbackRequest, RefinementLearner};
use crate::providers::{Completer, Embedder};
use crate::refinement::{QueryRefiner, RefineRequest};
use crate::retrieval::{RetrievedPassage, Retriever, SearchFilter, VectorIndex};
use crate::storage::RecordStore;
use crate::types::{
    AnalyticsEvent, AnalyticsKind, Conversation, Message, MessageMetadata, WorkflowMetadata,
    WorkflowRequest, WorkflowResponse,
};

use super::state::{next_state, WorkflowContext, WorkflowState};

/// Answer returned when generation fails
pub const APOLOGY: &str =
    "I'm sorry, I wasn't able to generate an answer to your question right now. Please try again in a moment.";

/// Progress reported by `run_streaming`
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    /// A refine/retrieve/generate cycle began; earlier deltas are superseded
    AttemptStarted { attempt: u32 },
    /// Answer text as the model produces it
    Delta(String),
}

type UpdateSink<'a> = &'a (dyn Fn(StreamUpdate) + Send + Sync);

/// Deduplicated titles of passages scoring above `threshold`, best first
pub fn collect_sources(passages: &[RetrievedPassage], threshold: f32, max_sources: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    passages
        .iter()
        .filter(|p| p.similarity > threshold)
        .filter(|p| seen.insert(p.title.as_str()))
        .take(max_sources)
        .map(|p| p.title.clone())
        .collect()
}

/// Runs the refine → retrieve → generate → evaluate loop
pub struct Orchestrator {
    refiner: QueryRefiner,
    retriever: Retriever,
    generator: AnswerGenerator,
    evaluator: Arc<dyn Evaluator>,
    learner: RefinementLearner,
    conversations: ConversationService,
    analytics: AnalyticsSink,
    workflow: WorkflowConfig,
    retrieval: RetrievalConfig,
}

impl Orchestrator {
    /// Wire the workflow from its capabilities; the model grades its own answers
    pub fn new(
        config: &RagConfig,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        let analytics = AnalyticsSink::new(store.clone());
        let learner = RefinementLearner::new(store.clone(), analytics.clone());

        Self {
            refiner: QueryRefiner::new(
                completer.clone(),
                learner.clone(),
                analytics.clone(),
                config.workflow.clone(),
                config.llm.refine_temperature,
            ),
            retriever: Retriever::new(embedder, index, config.retrieval.clone()),
            generator: AnswerGenerator::new(completer.clone(), config.llm.clone(), config.workflow.clone()),
            evaluator: Arc::new(LlmEvaluator::new(completer, config.llm.evaluation_temperature)),
            learner,
            conversations: ConversationService::new(store),
            analytics,
            workflow: config.workflow.clone(),
            retrieval: config.retrieval.clone(),
        }
    }

    /// Replace the answer evaluator
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn conversations(&self) -> &ConversationService {
        &self.conversations
    }

    /// Answer a question; failures are reported in the response, never as `Err`
    pub async fn run(&self, request: WorkflowRequest) -> WorkflowResponse {
        self.execute(request, None).await
    }

    /// Like `run`, forwarding attempt starts and answer deltas to `on_update`
    pub async fn run_streaming(
        &self,
        request: WorkflowRequest,
        on_update: &(dyn Fn(StreamUpdate) + Send + Sync),
    ) -> WorkflowResponse {
        self.execute(request, Some(on_update)).await
    }

    /// Store feedback on an answer and update the rewrite that produced it
    pub async fn record_feedback(&self, request: FeedbackRequest) -> Result<FeedbackOutcome> {
        self.learner.record_feedback(request).await
    }

    async fn execute(&self, request: WorkflowRequest, on_update: Option<UpdateSink<'_>>) -> WorkflowResponse {
        let started = Instant::now();
        tracing::info!(
            "Workflow query ({}, {:?}): \"{}\"",
            request.mode,
            request.role,
            request.query
        );

        let conversation = match self.conversations.resolve(&request).await {
            Ok(conversation) => Some(conversation),
            Err(e) => {
                tracing::warn!("Conversation unavailable, answering without persistence: {}", e);
                None
            }
        };

        let history = match &conversation {
            Some(conversation) => self
                .conversations
                .history(&conversation.id, self.workflow.history_exchanges)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("Failed to load conversation history: {}", e);
                    Vec::new()
                }),
            None => Vec::new(),
        };

        if let Some(conversation) = &conversation {
            if let Err(e) = self
                .conversations
                .append(&Message::user(conversation.id, request.query.clone()))
                .await
            {
                tracing::warn!("Failed to store user message: {}", e);
            }
        }

        let filter = SearchFilter {
            subject: request.subject.clone(),
            grade_level: request.grade_level.clone(),
            role: request.role,
            user_id: request.user_id.clone(),
        };

        let mut context = WorkflowContext::new(request.query.clone(), &self.workflow);
        let mut refined_query: Option<String> = None;

        while !context.state.is_terminal() {
            tracing::debug!("Workflow step {} (attempts: {})", context.state, context.attempts);

            match context.state {
                WorkflowState::Refine => {
                    if let Some(sink) = on_update {
                        sink(StreamUpdate::AttemptStarted {
                            attempt: context.attempts + 1,
                        });
                    }

                    let hint = context.evaluation.as_ref().map(|e| e.feedback.clone());
                    let refined = self
                        .refiner
                        .refine(RefineRequest {
                            original: &request.query,
                            mode: request.mode,
                            subject: request.subject.as_deref(),
                            grade_level: request.grade_level.as_deref(),
                            attempt: context.attempts,
                            feedback_hint: hint.as_deref().filter(|h| !h.is_empty()),
                        })
                        .await;

                    if context.attempts > 0 {
                        refined_query = Some(refined.query.clone());
                    }
                    context.token_usage += refined.usage;
                    context.current_query = refined.query;
                    context.attempts += 1;
                }
                WorkflowState::Retrieve => {
                    context.passages = match self.retriever.retrieve(&context.current_query, &filter, None).await {
                        Ok(passages) => passages,
                        Err(e) => {
                            tracing::warn!("Retrieval failed, continuing without context: {}", e);
                            self.analytics
                                .record(self.event(AnalyticsKind::RetrievalFailed, false, &request, &conversation).details(
                                    serde_json::json!({
                                        "attempt": context.attempts,
                                        "error": e.to_string(),
                                    }),
                                ))
                                .await;
                            Vec::new()
                        }
                    };
                }
                WorkflowState::Generate => {
                    let generate = GenerateRequest {
                        question: &request.query,
                        mode: request.mode,
                        passages: &context.passages,
                        history: &history,
                        subject: request.subject.as_deref(),
                        grade_level: request.grade_level.as_deref(),
                    };

                    let result = match on_update {
                        Some(sink) => {
                            self.generator
                                .generate_stream(generate, &|delta| sink(StreamUpdate::Delta(delta.to_string())))
                                .await
                        }
                        None => self.generator.generate(generate).await,
                    };

                    match result {
                        Ok(answer) => {
                            context.token_usage += answer.usage;
                            context.answer = Some(answer);
                        }
                        Err(e) => {
                            tracing::error!("Generation failed on attempt {}: {}", context.attempts, e);
                            self.analytics
                                .record(self.event(AnalyticsKind::GenerationFailed, false, &request, &conversation).details(
                                    serde_json::json!({
                                        "attempt": context.attempts,
                                        "error": e.to_string(),
                                    }),
                                ))
                                .await;
                            context.error = Some(e.to_string());
                        }
                    }
                }
                WorkflowState::Evaluate => {
                    let evaluation = match &context.answer {
                        Some(answer) => {
                            let input = EvaluationInput {
                                mode: request.mode,
                                question: &request.query,
                                answer: &answer.text,
                                passages: &context.passages,
                                confidence: answer.confidence,
                            };
                            self.evaluator.evaluate(&input).await
                        }
                        None => {
                            context.error = Some("no answer to evaluate".to_string());
                            context.state = next_state(&context);
                            continue;
                        }
                    };

                    if evaluation.used_fallback {
                        self.analytics
                            .record(self.event(AnalyticsKind::EvaluationFallback, true, &request, &conversation).details(
                                serde_json::json!({
                                    "attempt": context.attempts,
                                    "score": evaluation.score,
                                }),
                            ))
                            .await;
                    }
                    tracing::debug!(
                        "Attempt {} scored {:.3} with {} passages",
                        context.attempts,
                        evaluation.score,
                        context.passages.len()
                    );
                    context.evaluation = Some(evaluation);
                }
                WorkflowState::Done => {}
            }

            context.state = next_state(&context);
        }

        self.finish(request, conversation, context, refined_query, started).await
    }

    async fn finish(
        &self,
        request: WorkflowRequest,
        conversation: Option<Conversation>,
        context: WorkflowContext,
        refined_query: Option<String>,
        started: Instant,
    ) -> WorkflowResponse {
        let evaluation_score = context.score();
        let evaluation_fallback = context.evaluation.as_ref().is_some_and(|e| e.used_fallback);
        let success = context.error.is_none() && context.answer.is_some();

        let (answer, confidence, payload, sources, documents_used) = match (&context.answer, success) {
            (Some(answer), true) => (
                answer.text.clone(),
                answer.confidence,
                answer.payload.clone(),
                collect_sources(&context.passages, self.retrieval.source_threshold, self.retrieval.max_sources),
                context.passages.iter().map(RetrievedPassage::to_ref).collect(),
            ),
            _ => (APOLOGY.to_string(), 0.0, None, Vec::new(), Vec::new()),
        };

        let latency_ms = started.elapsed().as_millis() as u64;

        let message_id = match &conversation {
            Some(conversation) => {
                let metadata = MessageMetadata {
                    attempts: context.attempts,
                    evaluation_score: context.evaluation.as_ref().map(|e| e.score),
                    original_query: request.query.clone(),
                    refined_query: refined_query.clone(),
                    mode: Some(request.mode),
                    subject: request.subject.clone(),
                    token_usage: context.token_usage,
                    error: !success,
                    payload: payload.clone(),
                };
                let message = Message::assistant(
                    conversation.id,
                    answer.clone(),
                    confidence,
                    documents_used.clone(),
                    metadata,
                );
                match self.conversations.append(&message).await {
                    Ok(()) => Some(message.id),
                    Err(e) => {
                        tracing::warn!("Failed to store assistant message: {}", e);
                        None
                    }
                }
            }
            None => None,
        };

        self.analytics
            .record(
                self.event(AnalyticsKind::WorkflowCompleted, success, &request, &conversation)
                    .duration_ms(latency_ms)
                    .tokens(context.token_usage.total())
                    .documents(documents_used.len())
                    .details(serde_json::json!({
                        "mode": request.mode.as_str(),
                        "attempts": context.attempts,
                        "evaluation_score": evaluation_score,
                        "evaluation_fallback": evaluation_fallback,
                        "error": context.error,
                    })),
            )
            .await;

        tracing::info!(
            "Workflow completed in {}ms: success={}, attempts={}, score={:.3}, {} sources",
            latency_ms,
            success,
            context.attempts,
            evaluation_score,
            sources.len()
        );

        WorkflowResponse {
            success,
            answer,
            confidence,
            sources,
            documents_used,
            metadata: WorkflowMetadata {
                attempts: context.attempts,
                evaluation_score,
                evaluation_fallback,
                refined_query,
                token_usage: context.token_usage,
                latency_ms,
                error: context.error,
            },
            conversation_id: conversation.map(|c| c.id),
            message_id,
            payload,
        }
    }

    fn event(
        &self,
        kind: AnalyticsKind,
        success: bool,
        request: &WorkflowRequest,
        conversation: &Option<Conversation>,
    ) -> AnalyticsEvent {
        let event = AnalyticsEvent::new(kind, success).user(request.user_id.clone());
        match conversation {
            Some(conversation) => event.conversation(conversation.id),
            None => event,
        }
    }
}

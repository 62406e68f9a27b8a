//! End-to-end runs of the answer workflow against scripted providers

mod common;

use parking_lot::Mutex;
use std::sync::Arc;

use common::{harness, DownEmbedder, FixedIndex, HashEmbedder, PromptKind};
use tutor_rag::learning::{FeedbackKind, FeedbackRequest, RefinementKey};
use tutor_rag::retrieval::MemoryVectorIndex;
use tutor_rag::storage::RecordStore;
use tutor_rag::types::{AnalyticsKind, MessageRole, Mode, UserRole, WorkflowRequest};
use tutor_rag::workflow::{StreamUpdate, APOLOGY};

fn request(query: &str, mode: Mode) -> WorkflowRequest {
    WorkflowRequest::new(query, "s1", UserRole::Student, mode)
}

fn grounded_index() -> Arc<FixedIndex> {
    FixedIndex::new(&[("Algebra Basics", 0.9), ("Linear Equations", 0.8)])
}

#[tokio::test]
async fn ungrounded_math_question_finishes_in_one_attempt() {
    let h = harness(Arc::new(MemoryVectorIndex::new()), Arc::new(HashEmbedder));
    h.completer.answer("True. 2 + 2 = 4.").grade(0.4);

    let response = h
        .orchestrator
        .run(request("2+2=4, true or false?", Mode::MathSolve))
        .await;

    assert!(response.success);
    assert_eq!(response.answer, "True. 2 + 2 = 4.");
    assert_eq!(response.metadata.attempts, 1);
    assert!((response.confidence - 0.5).abs() < 1e-6);
    assert!(response.sources.is_empty());
    assert!(response.metadata.refined_query.is_none());
    // attempt 0 never asks the model for a rewrite
    assert!(h.completer.prompts(PromptKind::Refine).is_empty());
}

#[tokio::test]
async fn sources_keep_distinct_titles_above_threshold() {
    let index = FixedIndex::new(&[
        ("Photosynthesis", 0.9),
        ("Cell Biology", 0.85),
        ("Plant Anatomy", 0.6),
        ("Ecology", 0.4),
        ("Genetics", 0.2),
    ]);
    let h = harness(index, Arc::new(HashEmbedder));
    h.completer.grade(0.9);

    let response = h.orchestrator.run(request("How do plants make food?", Mode::Research)).await;

    assert!(response.success);
    assert_eq!(response.sources, vec!["Photosynthesis", "Cell Biology", "Plant Anatomy"]);
    assert_eq!(response.documents_used.len(), 5);

    let duplicated = FixedIndex::new(&[("Optics", 0.9), ("Optics", 0.8), ("Waves", 0.7)]);
    let h = harness(duplicated, Arc::new(HashEmbedder));
    let response = h.orchestrator.run(request("Why is the sky blue?", Mode::PhysicsSolve)).await;
    assert_eq!(response.sources, vec!["Optics", "Waves"]);
}

#[tokio::test]
async fn low_score_triggers_one_refinement() {
    let h = harness(grounded_index(), Arc::new(HashEmbedder));
    h.completer
        .grade(0.5)
        .grade(0.8)
        .rewrite("Refined query: solve the linear eq 2x + 3 = 7 for x");

    let response = h
        .orchestrator
        .run(request("solve 2x+3=7", Mode::MathSolve).with_subject("algebra"))
        .await;

    assert!(response.success);
    assert_eq!(response.metadata.attempts, 2);
    assert!((response.metadata.evaluation_score - 0.8).abs() < 1e-6);
    assert_eq!(
        response.metadata.refined_query.as_deref(),
        Some("solve the linear equation 2x + 3 = 7 for x")
    );
    // two answers and one rewrite, 15 tokens each; grading is not counted
    assert_eq!(response.metadata.token_usage.total(), 45);

    let rewrites = h.completer.prompts(PromptKind::Refine);
    assert_eq!(rewrites.len(), 1);
    assert!(rewrites[0].contains("Scored 0.5"));
    assert_eq!(h.completer.prompts(PromptKind::Answer).len(), 2);
}

#[tokio::test]
async fn attempts_are_capped() {
    let h = harness(grounded_index(), Arc::new(HashEmbedder));
    h.completer.grade(0.3).grade(0.3).grade(0.3).grade(0.3);

    let response = h.orchestrator.run(request("explain osmosis", Mode::Research)).await;

    assert!(response.success);
    assert_eq!(response.metadata.attempts, 3);
    assert_eq!(h.completer.prompts(PromptKind::Refine).len(), 2);
    assert_eq!(h.completer.prompts(PromptKind::Grade).len(), 3);
}

#[tokio::test]
async fn feedback_teaches_future_rewrites() {
    let h = harness(grounded_index(), Arc::new(HashEmbedder));
    h.completer
        .grade(0.5)
        .grade(0.9)
        .rewrite("balance the chemical eq for burning methane");

    let query = request("balance eq CH4 + O2", Mode::ChemistrySolve).with_subject("chemistry");
    let response = h.orchestrator.run(query.clone()).await;
    let refined = response.metadata.refined_query.clone().unwrap();
    assert_eq!(refined, "balance the chemical equilibrium for burning methane");

    let outcome = h
        .orchestrator
        .record_feedback(FeedbackRequest {
            message_id: response.message_id.unwrap(),
            conversation_id: response.conversation_id.unwrap(),
            user_id: "s1".into(),
            kind: FeedbackKind::Approve,
            rating: None,
            correction: None,
        })
        .await
        .unwrap();

    let refinement = outcome.refinement.unwrap();
    assert_eq!(refinement.improvement_score, Some(1.0));
    assert_eq!(refinement.usage_count, 1);

    let key = RefinementKey::new(
        "balance eq CH4 + O2",
        refined.clone(),
        Mode::ChemistrySolve,
        Some("chemistry".into()),
    );
    assert!(h.store.get_refinement(&key).await.unwrap().is_some());

    // The approved rewrite is now offered as a worked example
    h.completer.grade(0.5).grade(0.9);
    h.orchestrator.run(query).await;
    let rewrites = h.completer.prompts(PromptKind::Refine);
    assert!(rewrites.last().unwrap().contains(&refined));
}

#[tokio::test]
async fn rating_feedback_folds_into_average() {
    let h = harness(grounded_index(), Arc::new(HashEmbedder));
    let key = RefinementKey::new("q", "better q", Mode::Research, None);
    for _ in 0..3 {
        h.store.upsert_refinement(&key).await.unwrap();
    }
    h.store.apply_refinement_feedback(&key, 0.6).await.unwrap();

    let record = h.store.apply_refinement_feedback(&key, 1.0).await.unwrap().unwrap();
    assert!((record.improvement_score.unwrap() - 0.7).abs() < 1e-6);
}

#[tokio::test]
async fn generation_failure_returns_apology() {
    let h = harness(grounded_index(), Arc::new(HashEmbedder));
    h.completer.fail_answer("model offline");

    let response = h.orchestrator.run(request("what is inertia?", Mode::PhysicsSolve)).await;

    assert!(!response.success);
    assert_eq!(response.answer, APOLOGY);
    assert!(response.metadata.error.as_deref().unwrap().contains("model offline"));
    assert!(h.completer.prompts(PromptKind::Grade).is_empty());

    let message = h.store.get_message(&response.message_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(message.role, MessageRole::Assistant);
    assert!(message.metadata.unwrap().error);

    let events = h.store.recent_events(10).await.unwrap();
    assert!(events.iter().any(|e| e.kind == AnalyticsKind::GenerationFailed));
}

#[tokio::test]
async fn malformed_quiz_is_a_generation_failure() {
    let h = harness(grounded_index(), Arc::new(HashEmbedder));
    h.completer.answer("Sure! Here are five questions about the water cycle...");

    let response = h.orchestrator.run(request("quiz on the water cycle", Mode::QuizCreate)).await;

    assert!(!response.success);
    assert_eq!(response.answer, APOLOGY);
    assert!(response.payload.is_none());
}

#[tokio::test]
async fn valid_quiz_carries_payload() {
    let h = harness(grounded_index(), Arc::new(HashEmbedder));
    h.completer.answer(
        r#"{"title": "Water Cycle", "questions": [{"question": "What drives evaporation?", "options": ["The sun", "The moon"], "answer": "A", "explanation": "Solar heat"}]}"#,
    );

    let response = h.orchestrator.run(request("quiz on the water cycle", Mode::QuizCreate)).await;

    assert!(response.success);
    let payload = response.payload.unwrap();
    assert_eq!(payload["questions"][0]["answer"], "The sun");
}

#[tokio::test]
async fn retrieval_failure_is_not_fatal() {
    let h = harness(grounded_index(), Arc::new(DownEmbedder));

    let response = h.orchestrator.run(request("define velocity", Mode::PhysicsSolve)).await;

    assert!(response.success);
    assert!(response.documents_used.is_empty());
    assert_eq!(response.metadata.attempts, 1);

    let events = h.store.recent_events(10).await.unwrap();
    assert!(events.iter().any(|e| e.kind == AnalyticsKind::RetrievalFailed));
}

#[tokio::test]
async fn conversation_history_reaches_the_prompt() {
    let h = harness(grounded_index(), Arc::new(HashEmbedder));
    h.completer.answer("Mitochondria produce ATP.");

    let first = h.orchestrator.run(request("What do mitochondria do?", Mode::Research)).await;
    let conversation_id = first.conversation_id.unwrap();

    let second = h
        .orchestrator
        .run(request("And ribosomes?", Mode::Research).in_conversation(conversation_id))
        .await;
    assert_eq!(second.conversation_id, Some(conversation_id));

    let answers = h.completer.prompts(PromptKind::Answer);
    assert!(answers[1].contains("Mitochondria produce ATP."));

    let messages = h.store.list_messages(&conversation_id, None).await.unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[3].role, MessageRole::Assistant);
}

#[tokio::test]
async fn streaming_reports_attempts_and_deltas() {
    let h = harness(grounded_index(), Arc::new(HashEmbedder));
    h.completer.grade(0.5).grade(0.9);

    let updates = Mutex::new(Vec::new());
    let response = h
        .orchestrator
        .run_streaming(request("explain diffusion", Mode::Research), &|update| {
            updates.lock().push(update)
        })
        .await;

    let updates = updates.into_inner();
    let attempts: Vec<u32> = updates
        .iter()
        .filter_map(|u| match u {
            StreamUpdate::AttemptStarted { attempt } => Some(*attempt),
            StreamUpdate::Delta(_) => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2]);

    let last_delta: String = updates
        .iter()
        .rev()
        .take_while(|u| matches!(u, StreamUpdate::Delta(_)))
        .filter_map(|u| match u {
            StreamUpdate::Delta(text) => Some(text.as_str()),
            StreamUpdate::AttemptStarted { .. } => None,
        })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    assert_eq!(last_delta, response.answer);
    assert_eq!(response.metadata.attempts, 2);
}

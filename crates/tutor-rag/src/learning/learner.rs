//! Refinement learner: records rewrites and folds user feedback into their scores

use std::sync::Arc;
use uuid::Uuid;

use crate::analytics::AnalyticsSink;
use crate::error::{Error, Result};
use crate::storage::RecordStore;
use crate::types::{AnalyticsEvent, AnalyticsKind, Mode};

use super::feedback::{FeedbackRecord, FeedbackRequest};
use super::patterns::{RefinementKey, RefinementRecord};

/// Result of recording feedback
#[derive(Debug, Clone, serde::Serialize)]
pub struct FeedbackOutcome {
    pub feedback_id: Uuid,
    pub observed_score: f32,
    /// Refinement whose score changed, if the message came from a rewritten query
    pub refinement: Option<RefinementRecord>,
}

/// Persists refinement outcomes and feedback-derived scores
#[derive(Clone)]
pub struct RefinementLearner {
    store: Arc<dyn RecordStore>,
    analytics: AnalyticsSink,
}

impl RefinementLearner {
    pub fn new(store: Arc<dyn RecordStore>, analytics: AnalyticsSink) -> Self {
        Self { store, analytics }
    }

    /// Record one use of a rewrite (insert or increment usage)
    pub async fn record_attempt(&self, key: &RefinementKey) -> Result<RefinementRecord> {
        self.store.upsert_refinement(key).await
    }

    /// Well-rated rewrites for a mode and subject, most used first
    pub async fn learned_patterns(
        &self,
        mode: Mode,
        subject: Option<&str>,
        min_score: f32,
        limit: usize,
    ) -> Result<Vec<RefinementRecord>> {
        self.store.top_refinements(mode, subject, min_score, limit).await
    }

    /// Fold an observed score into a refinement's average
    pub async fn apply_feedback(
        &self,
        key: &RefinementKey,
        observed: f32,
    ) -> Result<Option<RefinementRecord>> {
        self.store.apply_refinement_feedback(key, observed).await
    }

    /// Store feedback on an assistant message and update the refinement behind it
    pub async fn record_feedback(&self, request: FeedbackRequest) -> Result<FeedbackOutcome> {
        let observed_score = request.observed_score()?;

        let message = self
            .store
            .get_message(&request.message_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("message {}", request.message_id)))?;

        if message.conversation_id != request.conversation_id {
            return Err(Error::InvalidInput(format!(
                "message {} does not belong to conversation {}",
                request.message_id, request.conversation_id
            )));
        }

        let record = FeedbackRecord::from(request);
        self.store.insert_feedback(&record).await?;

        let refinement = match message.metadata.as_ref().and_then(RefinementKey::from_metadata) {
            Some(key) => {
                let updated = self.apply_feedback(&key, observed_score).await?;
                if let Some(updated) = &updated {
                    tracing::info!(
                        "Refinement '{}' -> '{}' now scores {:.3} after {} feedback",
                        updated.original_query,
                        updated.refined_query,
                        updated.improvement_score.unwrap_or_default(),
                        record.kind.as_str()
                    );
                }
                updated
            }
            None => None,
        };

        self.analytics
            .record(
                AnalyticsEvent::new(AnalyticsKind::FeedbackRecorded, true)
                    .user(record.user_id.clone())
                    .conversation(record.conversation_id)
                    .details(serde_json::json!({
                        "message_id": record.message_id,
                        "kind": record.kind.as_str(),
                        "observed_score": observed_score,
                        "refinement_updated": refinement.is_some(),
                    })),
            )
            .await;

        Ok(FeedbackOutcome {
            feedback_id: record.id,
            observed_score,
            refinement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::FeedbackKind;
    use crate::storage::MemoryStore;
    use crate::types::{Conversation, Message, MessageMetadata, UserRole};

    async fn setup(refined: Option<&str>) -> (RefinementLearner, Arc<MemoryStore>, Message) {
        let store = Arc::new(MemoryStore::new());
        let learner = RefinementLearner::new(store.clone(), AnalyticsSink::new(store.clone()));

        let conversation = Conversation::new("s1".into(), UserRole::Student, Mode::MathSolve, None, None);
        store.insert_conversation(&conversation).await.unwrap();

        let message = Message::assistant(
            conversation.id,
            "x = 4",
            0.9,
            Vec::new(),
            MessageMetadata {
                attempts: 2,
                original_query: "solve eq".into(),
                refined_query: refined.map(String::from),
                mode: Some(Mode::MathSolve),
                ..Default::default()
            },
        );
        store.append_message(&message).await.unwrap();
        (learner, store, message)
    }

    fn request(message: &Message, kind: FeedbackKind, rating: Option<f32>) -> FeedbackRequest {
        FeedbackRequest {
            message_id: message.id,
            conversation_id: message.conversation_id,
            user_id: "s1".into(),
            kind,
            rating,
            correction: None,
        }
    }

    #[tokio::test]
    async fn test_rating_updates_refinement() {
        let (learner, store, message) = setup(Some("solve the equation")).await;
        let key = RefinementKey::new("solve eq", "solve the equation", Mode::MathSolve, None);
        for _ in 0..3 {
            learner.record_attempt(&key).await.unwrap();
        }
        learner.apply_feedback(&key, 0.6).await.unwrap();

        let outcome = learner
            .record_feedback(request(&message, FeedbackKind::Rating, Some(1.0)))
            .await
            .unwrap();

        let refinement = outcome.refinement.unwrap();
        assert!((refinement.improvement_score.unwrap() - 0.7).abs() < 1e-6);
        assert_eq!(store.list_feedback(&message.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_feedback_without_refinement_is_stored() {
        let (learner, store, message) = setup(None).await;

        let outcome = learner
            .record_feedback(request(&message, FeedbackKind::Approve, None))
            .await
            .unwrap();

        assert!(outcome.refinement.is_none());
        assert_eq!(outcome.observed_score, 1.0);
        assert_eq!(store.list_feedback(&message.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_feedback_rejects_mismatched_conversation() {
        let (learner, _store, message) = setup(None).await;
        let mut bad = request(&message, FeedbackKind::Reject, None);
        bad.conversation_id = Uuid::new_v4();

        assert!(matches!(
            learner.record_feedback(bad).await,
            Err(Error::InvalidInput(_))
        ));
    }
}

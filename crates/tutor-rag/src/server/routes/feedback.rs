//! Feedback endpoint

use axum::{extract::State, Json};

use crate::error::{Error, Result};
use crate::learning::{FeedbackOutcome, FeedbackRequest};
use crate::server::state::AppState;

use super::Caller;

/// POST /api/feedback - Rate an assistant message
pub async fn record_feedback(
    State(state): State<AppState>,
    caller: Caller,
    Json(mut request): Json<FeedbackRequest>,
) -> Result<Json<FeedbackOutcome>> {
    let conversation = state
        .store()
        .get_conversation(&request.conversation_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("conversation {}", request.conversation_id)))?;

    if conversation.owner_id != caller.user_id {
        return Err(Error::Forbidden("feedback is limited to your own conversations".into()));
    }
    request.user_id = caller.user_id;

    let outcome = state.orchestrator().record_feedback(request).await?;

    tracing::info!(
        "Recorded feedback {} (observed score {:.2}, refinement updated: {})",
        outcome.feedback_id,
        outcome.observed_score,
        outcome.refinement.is_some()
    );

    Ok(Json(outcome))
}

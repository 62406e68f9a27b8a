//! Conversation endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::Message;

use super::Caller;

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    /// Only the last `limit` messages
    #[serde(default)]
    pub limit: Option<usize>,
}

/// GET /api/conversations/:id/messages - Messages of one of the caller's conversations
pub async fn list_messages(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Message>>> {
    let messages = state
        .orchestrator()
        .conversations()
        .messages_for(&id, &caller.user_id, query.limit)
        .await?;

    Ok(Json(messages))
}

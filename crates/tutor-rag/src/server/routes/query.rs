//! Workflow endpoints

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{WorkflowRequest, WorkflowResponse};
use crate::workflow::StreamUpdate;

use super::Caller;

/// Bind the request to the authenticated caller and reject empty questions
fn authorize(caller: Caller, mut request: WorkflowRequest) -> Result<WorkflowRequest> {
    if request.query.trim().is_empty() {
        return Err(Error::InvalidInput("query is empty".into()));
    }
    request.user_id = caller.user_id;
    request.role = caller.role;
    Ok(request)
}

/// POST /api/query - Run the workflow
pub async fn run_query(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<WorkflowRequest>,
) -> Result<Json<WorkflowResponse>> {
    let request = authorize(caller, request)?;
    Ok(Json(state.orchestrator().run(request).await))
}

fn json_event<T: Serialize>(name: &str, data: &T) -> Event {
    Event::default().event(name).json_data(data).unwrap_or_else(|e| {
        tracing::warn!("Failed to encode {} event: {}", name, e);
        Event::default().event("error").data("event encoding failed")
    })
}

/// POST /api/query/stream - Run the workflow, streaming progress as server-sent events.
///
/// Emits `attempt` and `delta` events while the answer is produced and a final
/// `result` event carrying the complete response.
pub async fn stream_query(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<WorkflowRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let request = authorize(caller, request)?;
    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    tokio::spawn(async move {
        let on_update = |update: StreamUpdate| {
            let event = match update {
                StreamUpdate::AttemptStarted { attempt } => {
                    json_event("attempt", &serde_json::json!({ "attempt": attempt }))
                }
                StreamUpdate::Delta(text) => json_event("delta", &serde_json::json!({ "text": text })),
            };
            // Client went away; the run still completes and is persisted
            let _ = tx.send(event);
        };

        let response = state.orchestrator().run_streaming(request, &on_update).await;
        let _ = tx.send(json_event("result", &response));
    });

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

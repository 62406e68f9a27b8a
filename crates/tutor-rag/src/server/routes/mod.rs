//! API routes for the tutoring server

pub mod conversations;
pub mod documents;
pub mod feedback;
pub mod query;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, post},
    Router,
};

use crate::error::Error;
use crate::server::state::AppState;
use crate::types::UserRole;

/// Header carrying the authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the authenticated user role
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Identity resolved by the authentication proxy in front of the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: UserRole,
}

impl Caller {
    /// Owners and admins may edit or delete a record
    pub fn can_manage(&self, owner_id: &str) -> bool {
        self.role == UserRole::Admin || self.user_id == owner_id
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| Error::InvalidInput(format!("missing {} header", name)))
        };

        let user_id = header(USER_ID_HEADER)?.to_string();
        let role = header(USER_ROLE_HEADER)?.parse()?;

        Ok(Self { user_id, role })
    }
}

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Workflow
        .route("/query", post(query::run_query))
        .route("/query/stream", post(query::stream_query))
        // Document management
        .route(
            "/documents",
            post(documents::ingest_document).get(documents::list_documents),
        )
        .route(
            "/documents/:id",
            get(documents::get_document)
                .patch(documents::update_document)
                .delete(documents::delete_document),
        )
        // Learning
        .route("/feedback", post(feedback::record_feedback))
        // Conversations
        .route("/conversations/:id/messages", get(conversations::list_messages))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "tutor-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Self-learning RAG workflow for educational Q&A, quizzes and exams",
        "modes": crate::types::Mode::ALL.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
        "endpoints": {
            "POST /api/query": "Run the answer workflow",
            "POST /api/query/stream": "Run the answer workflow with server-sent events",
            "POST /api/documents": "Ingest a document",
            "GET /api/documents": "List visible documents",
            "GET /api/documents/:id": "Get document details",
            "PATCH /api/documents/:id": "Edit document metadata",
            "DELETE /api/documents/:id": "Delete a document and its chunks",
            "POST /api/feedback": "Rate an answer",
            "GET /api/conversations/:id/messages": "List conversation messages"
        },
        "headers": {
            USER_ID_HEADER: "Authenticated user id",
            USER_ROLE_HEADER: "student | teacher | admin"
        }
    }))
}

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use super::agent::{ChatMessage, Speaker};
use crate::{auth::extractors::CurrentUser, state::AppState};

pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Earlier turns, oldest first.
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn chat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    if body.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message must not be empty".into()));
    }
    let agent = state.agent.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "chat assistant is not configured".to_string(),
    ))?;

    let mut history = body.history;
    history.push(ChatMessage {
        speaker: Speaker::User,
        content: body.message,
    });

    let reply = agent.respond(&history).await.map_err(|e| {
        error!(error = %e, "agent failed");
        (
            StatusCode::BAD_GATEWAY,
            "No response from the assistant. Please try again.".to_string(),
        )
    })?;
    Ok(Json(ChatResponse { message: reply }))
}

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::services::dialogue::{prompts, DialogError};
use crate::state::AppState;

// POST /chatbot/start
#[derive(Serialize)]
pub struct StartResponse {
    session_id: String,
    message: &'static str,
}

pub async fn start(State(state): State<Arc<AppState>>) -> Json<StartResponse> {
    let handle = state.sessions.create();
    let session_id = handle.lock().await.id.clone();

    tracing::info!(session_id = %session_id, "chat session started");

    Json(StartResponse {
        session_id,
        message: prompts::START,
    })
}

// POST /chatbot/interact
#[derive(Deserialize)]
pub struct InteractRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct InteractResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

pub async fn interact(
    State(state): State<Arc<AppState>>,
    body: Result<Json<InteractRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::debug!("rejected chat body: {rejection}");
            return DialogError::InputRejected(prompts::MALFORMED_TURN.to_string())
                .into_response();
        }
    };

    let Some(handle) = state.sessions.get(&req.session_id) else {
        tracing::info!(session_id = %req.session_id, "unknown or expired session");
        return DialogError::SessionNotFound.into_response();
    };

    // Held for the whole turn: one writer per session.
    let mut session = handle.lock().await;
    state.sessions.touch_expiry(&req.session_id);

    match state.dialogue.advance(&mut session, &req.message) {
        Ok(reply) => Json(InteractResponse {
            message: reply.message,
            token: reply.token,
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

use crate::server::cookie::{read_cookie, session_cookie};
use crate::server::error::ApiError;
use crate::server::AppState;
use crate::session::FALLBACK_MESSAGE;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::SET_COOKIE, HeaderMap},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const INDEX_HTML: &str = include_str!("../../templates/index.html");

#[derive(Debug, Deserialize)]
pub struct JaltolInput {
    pub user: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JaltolOutput {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        service: "jaltol",
    })
}

/// Answer one chat message, carrying memory in the session cookie.
pub async fn handle_jaltol(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<JaltolInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(input) = payload
        .map_err(|e| ApiError::bad_request("Invalid request body").with_details(e.body_text()))?;

    let stored = read_cookie(&headers, &state.cookie.name);
    tracing::info!(
        has_session = stored.is_some(),
        chars = input.user.chars().count(),
        "Processing query"
    );

    let sessions = Arc::clone(&state.sessions);
    let incoming = stored.clone();
    let outcome =
        tokio::task::spawn_blocking(move || sessions.query(stored.as_deref(), &input.user)).await;

    match outcome {
        Ok(outcome) => Ok(chat_response(&state, outcome.text, outcome.memory.as_deref())),
        Err(e) => {
            tracing::error!(error = %e, "Session worker failed");
            // Memory is unchanged, so hand the incoming blob back.
            Ok(chat_response(
                &state,
                FALLBACK_MESSAGE.to_string(),
                incoming.as_deref(),
            ))
        }
    }
}

fn chat_response(state: &AppState, text: String, memory: Option<&str>) -> Response {
    let mut response = Json(JaltolOutput { text }).into_response();
    if let Some(cookie) = memory.and_then(|memory| session_cookie(&state.cookie, memory)) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    response
}

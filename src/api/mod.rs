//! HTTP surface: the chat endpoint plus conversation management.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    serve, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::chat::ChatRequest;
use crate::AppContext;

mod conversations;

pub type AppState = Arc<AppContext>;

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    message: String,
    #[serde(default = "default_user_id")]
    user_id: String,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

fn default_user_id() -> String {
    "anonymous".to_string()
}

/// Handle POST /chat - run one turn of the pipeline
async fn chat(State(state): State<AppState>, Json(body): Json<ChatBody>) -> Response {
    if body.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "No input given"})),
        )
            .into_response();
    }

    let request = ChatRequest {
        message: body.message,
        user_id: body.user_id,
        conversation_id: body.conversation_id,
        language: body.language,
        name: body.name,
    };

    match state.engine.handle(request).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            tracing::error!("Chat turn failed: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to process message"})),
            )
                .into_response()
        }
    }
}

/// Handle GET /health
async fn health() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/chat/clear", post(conversations::clear))
        .route(
            "/chat/conversations",
            get(conversations::list).post(conversations::create),
        )
        .route(
            "/chat/conversations/:conversation_id",
            get(conversations::detail).delete(conversations::delete),
        )
        .route("/chat/history", get(conversations::history))
        .with_state(state)
}

pub async fn run(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.bind_addr.clone();
    let app = router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("API listening on {addr}");
    serve(listener, app).await?;
    Ok(())
}

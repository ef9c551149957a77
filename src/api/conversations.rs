//! Conversation management endpoints: list, create, inspect, delete, and the
//! flat history view the chat widget polls.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct UserIdBody {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserIdQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
}

fn missing_user_id() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "user_id is required"})),
    )
        .into_response()
}

/// Handle POST /chat/clear - delete the user's conversation file
pub async fn clear(State(state): State<AppState>, Json(body): Json<UserIdBody>) -> Response {
    let Some(user_id) = body.user_id.filter(|u| !u.is_empty()) else {
        return missing_user_id();
    };

    match state.store.clear_user(&user_id).await {
        Ok(()) => Json(json!({
            "success": true,
            "message": "Chat history cleared successfully"
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Error clearing chat history: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to clear chat history"})),
            )
                .into_response()
        }
    }
}

/// Handle GET /chat/conversations - summaries, most recent first
pub async fn list(State(state): State<AppState>, Query(query): Query<UserIdQuery>) -> Response {
    let Some(user_id) = query.user_id.filter(|u| !u.is_empty()) else {
        return missing_user_id();
    };

    match state.store.list_conversations(&user_id).await {
        Ok(summaries) => Json(json!({
            "user_id": user_id,
            "conversations": summaries
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Error listing conversations: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to list conversations"})),
            )
                .into_response()
        }
    }
}

/// Handle POST /chat/conversations - create a new conversation
pub async fn create(State(state): State<AppState>, Json(body): Json<UserIdBody>) -> Response {
    let Some(user_id) = body.user_id.filter(|u| !u.is_empty()) else {
        return missing_user_id();
    };

    match state.store.create_conversation(&user_id).await {
        Ok(conversation_id) => Json(json!({
            "success": true,
            "conversation_id": conversation_id,
            "message": "New conversation created"
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Error creating conversation: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to create conversation"})),
            )
                .into_response()
        }
    }
}

/// Handle GET /chat/conversations/{id} - full conversation detail
pub async fn detail(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Query(query): Query<UserIdQuery>,
) -> Response {
    let Some(user_id) = query.user_id.filter(|u| !u.is_empty()) else {
        return missing_user_id();
    };

    match state.store.get_conversation(&user_id, &conversation_id).await {
        Ok(Some(conversation)) => Json(json!({
            "user_id": user_id,
            "conversation_id": conversation.conversation_id,
            "title": conversation.title,
            "created_at": conversation.created_at,
            "updated_at": conversation.updated_at,
            "messages": conversation.messages
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Conversation not found"})),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Error loading conversation: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to load conversation"})),
            )
                .into_response()
        }
    }
}

/// Handle DELETE /chat/conversations/{id}
pub async fn delete(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    Query(query): Query<UserIdQuery>,
) -> Response {
    let Some(user_id) = query.user_id.filter(|u| !u.is_empty()) else {
        return missing_user_id();
    };

    match state.store.delete_conversation(&user_id, &conversation_id).await {
        Ok(true) => Json(json!({
            "success": true,
            "message": "Conversation deleted successfully"
        }))
        .into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Conversation not found"})),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Error deleting conversation: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to delete conversation"})),
            )
                .into_response()
        }
    }
}

/// Handle GET /chat/history - message list for one conversation (or the most
/// recent one when no id is given)
pub async fn history(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> Response {
    let Some(user_id) = query.user_id.filter(|u| !u.is_empty()) else {
        return missing_user_id();
    };

    match state.store.messages(&user_id, query.conversation_id.as_deref()).await {
        Ok(messages) => Json(json!({
            "user_id": user_id,
            "conversation_id": query.conversation_id,
            "messages": messages
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Error loading history: {e:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to load history"})),
            )
                .into_response()
        }
    }
}

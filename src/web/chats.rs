//! Chat session management: the sidebar and chat pages talk to these.

use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::models::chats::{Chat, NewChat};
use crate::models::messages::Message;
use crate::models::streams::Stream;
use crate::web::auth::{require_user, AuthUser};
use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateChatResponse {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTitleRequest {
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct DeletedChatResponse {
    pub id: Uuid,
    pub deleted: bool,
}

/// POST /api/chats - Create a new chat session
async fn create_chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateChatRequest>,
) -> Result<Json<CreateChatResponse>, ApiError> {
    debug!("Creating new chat for user: {}", user.id);

    let chat = state.db.create_chat(NewChat {
        id: Uuid::new_v4(),
        user_id: user.id,
        title: body.title,
    })?;

    Ok(Json(CreateChatResponse { id: chat.id }))
}

/// GET /api/chats - List the caller's chats, most recently updated first
async fn list_chats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Chat>>, ApiError> {
    let chats = state.db.list_chats_for_user(user.id)?;
    Ok(Json(chats))
}

/// GET /api/chats/:id/messages - Full transcript in creation order
async fn load_chat(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Message>>, ApiError> {
    // Ownership gate; the message query itself filters by chat only.
    let chat = state.db.get_chat_by_id_and_user(chat_id, user.id)?;

    let messages = state.db.load_chat_messages(chat.id)?;
    Ok(Json(messages))
}

/// POST /api/chats/:id/title - Rename a chat
async fn update_title(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<UpdateTitleRequest>,
) -> Result<Json<Chat>, ApiError> {
    if body.title.trim().is_empty() {
        return Err(ApiError::BadRequest);
    }

    state.db.update_chat_title(chat_id, user.id, &body.title)?;
    let chat = state.db.get_chat_by_id_and_user(chat_id, user.id)?;
    Ok(Json(chat))
}

/// DELETE /api/chats/:id - Remove a chat; messages and streams cascade
async fn delete_chat(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DeletedChatResponse>, ApiError> {
    debug!("Deleting chat {} for user {}", chat_id, user.id);

    let deleted = state.db.delete_chat(chat_id, user.id)?;
    if deleted == 0 {
        return Err(ApiError::NotFound);
    }

    Ok(Json(DeletedChatResponse {
        id: chat_id,
        deleted: true,
    }))
}

/// GET /api/chats/:id/stream - The latest active generation attempt, if any
async fn latest_stream(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Option<Stream>>, ApiError> {
    let chat = state.db.get_chat_by_id_and_user(chat_id, user.id)?;
    let stream = state.db.latest_active_stream(chat.id)?;
    Ok(Json(stream))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chats", post(create_chat))
        .route("/api/chats", get(list_chats))
        .route("/api/chats/:id/messages", get(load_chat))
        .route("/api/chats/:id/title", post(update_title))
        .route("/api/chats/:id", delete(delete_chat))
        .route("/api/chats/:id/stream", get(latest_stream))
        .layer(from_fn_with_state(state.clone(), require_user))
        .with_state(state)
}

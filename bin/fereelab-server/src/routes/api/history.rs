//! `/api/chat/history`: list, create, update, archive and restore saved chats.
//!
//! Every route needs a session; chats of other users answer 404.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use utoipa::{IntoParams, OpenApi};
use uuid::Uuid;

use fereelab_types::{
    ChatDocument, ChatListResponse, ChatMessage, CreateChatRequest, MessageBody, ModelRef,
    Pagination, UpdateChatRequest, DEFAULT_CHAT_TITLE,
};

use crate::auth::AuthUser;
use crate::db::{ChatPatch, ChatStore};
use crate::error::ServerError;
use crate::extract::ApiJson;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(OpenApi)]
#[openapi(
    paths(list_chats, create_chat, update_chat, delete_chat, get_chat, restore_chat),
    components(schemas(
        ChatDocument,
        ChatMessage,
        ChatListResponse,
        CreateChatRequest,
        UpdateChatRequest,
        Pagination,
        MessageBody
    ))
)]
pub struct HistoryApi;

/// Register chat-history routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/chat/history",
            get(list_chats)
                .post(create_chat)
                .put(update_chat)
                .delete(delete_chat),
        )
        .route("/chat/history/{id}", get(get_chat))
        .route("/chat/history/{id}/restore", post(restore_chat))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListQuery {
    /// Page size (default 20, at most 100).
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// List archived (soft-deleted) chats instead of active ones.
    pub archived: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    pub chat_id: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ── Handlers ──────────────────────────────────────────────────────────────────

#[utoipa::path(
    get,
    path = "/api/chat/history",
    tag = "history",
    params(ListQuery),
    responses(
        (status = 200, description = "One page of the caller's chats", body = ChatListResponse),
        (status = 401, description = "Not signed in"),
    )
)]
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ChatListResponse>, ServerError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);
    let active = !query.archived.unwrap_or(false);

    let chats = state.store.list_chats(&user.id, active, limit, offset).await?;
    let total = state.store.count_chats(&user.id, active).await?;
    Ok(Json(ChatListResponse {
        chats,
        pagination: Pagination::new(total, limit, offset),
    }))
}

#[utoipa::path(
    post,
    path = "/api/chat/history",
    tag = "history",
    request_body = CreateChatRequest,
    responses(
        (status = 201, description = "Chat created", body = ChatDocument),
        (status = 400, description = "Messages missing or empty"),
        (status = 401, description = "Not signed in"),
    )
)]
pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    ApiJson(req): ApiJson<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatDocument>), ServerError> {
    let messages = req
        .messages
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ServerError::BadRequest("Messages array is required".into()))?;

    let now = Utc::now();
    let chat = ChatDocument {
        id: Uuid::new_v4().to_string(),
        user_id: user.id,
        title: non_blank(req.title).unwrap_or_else(|| DEFAULT_CHAT_TITLE.to_owned()),
        messages,
        model: req.model,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_chat(chat.clone()).await?;
    Ok((StatusCode::CREATED, Json(chat)))
}

#[utoipa::path(
    put,
    path = "/api/chat/history",
    tag = "history",
    request_body = UpdateChatRequest,
    responses(
        (status = 200, description = "Updated chat", body = ChatDocument),
        (status = 400, description = "chatId missing"),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "Chat not found"),
    )
)]
pub async fn update_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    ApiJson(req): ApiJson<UpdateChatRequest>,
) -> Result<Json<ChatDocument>, ServerError> {
    let chat_id = non_blank(req.chat_id)
        .ok_or_else(|| ServerError::BadRequest("Chat ID is required".into()))?;
    let patch = ChatPatch {
        title: non_blank(req.title),
        messages: req.messages,
        model: req.model.filter(|m: &ModelRef| !m.id.is_empty()),
    };
    state
        .store
        .update_chat(&user.id, &chat_id, patch, Utc::now())
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound("Chat not found".into()))
}

#[utoipa::path(
    delete,
    path = "/api/chat/history",
    tag = "history",
    params(DeleteQuery),
    responses(
        (status = 200, description = "Chat archived", body = MessageBody),
        (status = 400, description = "chatId missing"),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "Chat not found"),
    )
)]
pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<MessageBody>, ServerError> {
    let chat_id = non_blank(query.chat_id)
        .ok_or_else(|| ServerError::BadRequest("Chat ID is required".into()))?;
    if !state
        .store
        .set_chat_active(&user.id, &chat_id, false, Utc::now())
        .await?
    {
        return Err(ServerError::NotFound("Chat not found".into()));
    }
    Ok(Json(MessageBody {
        message: "Chat deleted successfully".into(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/chat/history/{id}",
    tag = "history",
    params(("id" = String, Path, description = "Chat id")),
    responses(
        (status = 200, description = "The chat, active or archived", body = ChatDocument),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "Chat not found"),
    )
)]
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ChatDocument>, ServerError> {
    state
        .store
        .get_chat(&user.id, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound("Chat not found".into()))
}

#[utoipa::path(
    post,
    path = "/api/chat/history/{id}/restore",
    tag = "history",
    params(("id" = String, Path, description = "Chat id")),
    responses(
        (status = 200, description = "Chat restored", body = ChatDocument),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "Chat not found"),
    )
)]
pub async fn restore_chat(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ChatDocument>, ServerError> {
    if !state
        .store
        .set_chat_active(&user.id, &id, true, Utc::now())
        .await?
    {
        return Err(ServerError::NotFound("Chat not found".into()));
    }
    state
        .store
        .get_chat(&user.id, &id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound("Chat not found".into()))
}

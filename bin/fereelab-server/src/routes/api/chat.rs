//! `POST /api/chat`: proxy a conversation to the upstream completion API.
//!
//! Streamed responses are relayed byte-for-byte through a bounded channel
//! while a copy is accumulated; once upstream finishes, the copy is parsed
//! and the exchange is stored for signed-in callers.

use std::fmt::Display;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use utoipa::OpenApi;

use fereelab_types::{sse, ChatCompletionRequest, ErrorBody, ModelRef, PromptMessage, CHAT_ID_HEADER};

use crate::auth::OptionalAuthUser;
use crate::db::sqlite::SqliteStore;
use crate::error::ServerError;
use crate::extract::ApiJson;
use crate::services::persist::{persist_exchange, resolve_target, ChatTarget};
use crate::state::AppState;
use crate::upstream::CompletionBody;

/// Chunks buffered between the upstream reader and the response body.
const RELAY_CHANNEL_CAPACITY: usize = 32;

#[derive(OpenApi)]
#[openapi(
    paths(chat_completion),
    components(schemas(ChatCompletionRequest, PromptMessage, ModelRef, ErrorBody))
)]
pub struct ChatApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/chat", post(chat_completion))
}

/// An exchange waiting for the assistant reply before it can be stored.
struct PendingExchange {
    store: Arc<SqliteStore>,
    user_id: String,
    target: ChatTarget,
    incoming: Vec<PromptMessage>,
    model: ModelRef,
}

impl PendingExchange {
    /// Store failures are logged only; the response has already been sent.
    async fn save(self, reply: &str) {
        let result = persist_exchange(
            self.store.as_ref(),
            &self.user_id,
            &self.target,
            &self.incoming,
            reply,
            &self.model,
            Utc::now(),
        )
        .await;
        match result {
            Ok(true) => info!(chat_id = %self.target.chat_id, "exchange saved"),
            Ok(false) => {}
            Err(e) => error!(chat_id = %self.target.chat_id, error = %e, "failed to save exchange"),
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "chat",
    request_body = ChatCompletionRequest,
    responses(
        (status = 200, description = "Upstream completion (JSON), or its event stream when `stream` is true", body = Value),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 500, description = "Upstream API key not configured", body = ErrorBody),
        (status = 502, description = "Upstream unreachable", body = ErrorBody),
    )
)]
pub async fn chat_completion(
    State(state): State<Arc<AppState>>,
    OptionalAuthUser(user): OptionalAuthUser,
    ApiJson(req): ApiJson<ChatCompletionRequest>,
) -> Result<Response, ServerError> {
    if !state.upstream.is_configured() {
        return Err(ServerError::UpstreamNotConfigured);
    }
    if req.messages.is_empty() {
        return Err(ServerError::BadRequest("Messages array is required".into()));
    }

    let model = req
        .model
        .clone()
        .filter(|m| !m.id.trim().is_empty())
        .unwrap_or_else(|| ModelRef::new(state.config.default_model.clone()));
    let temperature = req.temperature.unwrap_or(state.config.default_temperature);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ServerError::BadRequest(format!(
            "invalid temperature ({temperature}): must be between 0.0 and 2.0"
        )));
    }
    let max_tokens = req
        .max_tokens
        .or(model.max_tokens)
        .unwrap_or(state.config.default_max_tokens);
    if max_tokens == 0 {
        return Err(ServerError::BadRequest(
            "invalid max_tokens (0): must be positive".into(),
        ));
    }

    let pending = match user {
        Some(user) => {
            let target = resolve_target(
                state.store.as_ref(),
                &user.id,
                req.chat_id.as_deref(),
                &req.messages,
                state.config.merge_window,
                Utc::now(),
            )
            .await?;
            Some(PendingExchange {
                store: Arc::clone(&state.store),
                user_id: user.id,
                target,
                incoming: req.messages.clone(),
                model: model.clone(),
            })
        }
        None => None,
    };
    let chat_id = pending.as_ref().map(|p| p.target.chat_id.clone());

    let body = CompletionBody {
        model: model.id.clone(),
        messages: req.messages,
        stream: req.stream,
        max_tokens,
        temperature,
    };
    let upstream = state.upstream.chat_completions(&body).await?;

    let mut response = if req.stream {
        let (tx, rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
        tokio::spawn(relay(upstream.bytes_stream(), tx, pending));
        (
            StatusCode::OK,
            [
                (CONTENT_TYPE, "text/event-stream"),
                (CACHE_CONTROL, "no-cache"),
            ],
            Body::from_stream(ReceiverStream::new(rx)),
        )
            .into_response()
    } else {
        let completion: Value = upstream.json().await?;
        if let Some(pending) = pending {
            let reply = completion["choices"][0]["message"]["content"]
                .as_str()
                .unwrap_or_default();
            pending.save(reply).await;
        }
        Json(completion).into_response()
    };

    if let Some(id) = chat_id {
        match HeaderValue::from_str(&id) {
            Ok(value) => {
                response.headers_mut().insert(CHAT_ID_HEADER, value);
            }
            Err(e) => warn!(chat_id = %id, error = %e, "chat id is not a valid header value"),
        }
    }
    Ok(response)
}

/// Forward upstream chunks to the client in order, keeping a copy.
///
/// Stops early, without saving, when the client goes away or upstream
/// fails mid-stream.
async fn relay<S, E>(
    upstream: S,
    tx: mpsc::Sender<Result<Bytes, std::io::Error>>,
    pending: Option<PendingExchange>,
) where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: Display + Send,
{
    let mut upstream = std::pin::pin!(upstream);
    let mut received = Vec::new();

    while let Some(chunk) = upstream.next().await {
        match chunk {
            Ok(bytes) => {
                if pending.is_some() {
                    received.extend_from_slice(&bytes);
                }
                if tx.send(Ok(bytes)).await.is_err() {
                    debug!("client disconnected; stopping relay");
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "upstream stream failed");
                let _ = tx
                    .send(Err(std::io::Error::other(e.to_string())))
                    .await;
                return;
            }
        }
    }
    drop(tx);

    if let Some(pending) = pending {
        let reply = sse::assemble(&received);
        pending.save(&reply).await;
    }
}

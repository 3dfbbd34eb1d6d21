//! Types shared between the FereeLAB server, client library, and CLI.
//!
//! - [`chat`]: chat documents, messages, and the proxy request body.
//! - [`models`]: the reshaped model catalog.
//! - [`auth`]: signup / login payloads and user profiles.
//! - [`sse`]: incremental parser for the `data: {...}` / `data: [DONE]` framing.
//! - [`tokens`]: rough token-count and cost estimates.

pub mod auth;
pub mod chat;
pub mod models;
pub mod sse;
pub mod tokens;

pub use auth::{AuthProvider, AuthResponse, LoginRequest, SignupRequest, UserProfile};
pub use chat::{
    ChatCompletionRequest, ChatDocument, ChatListResponse, ChatMessage, CreateChatRequest,
    ModelRef, Pagination, PromptMessage, Role, UpdateChatRequest, DEFAULT_CHAT_TITLE,
    title_from_prompt,
};
pub use models::{ModelInfo, ModelPricing, ModelProvider, ModelsResponse, DEFAULT_MODEL_ID};
pub use sse::{SseEvent, SseParser};
pub use tokens::{calculate_token_cost, estimate_token_count, TokenCost};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Header carrying the id of the chat a proxied exchange is stored into.
pub const CHAT_ID_HEADER: &str = "x-chat-id";

/// JSON body of every non-2xx API response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    /// Upstream error payload, when the failure came from the upstream API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
}

/// Plain `{"message": "..."}` acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageBody {
    pub message: String,
}

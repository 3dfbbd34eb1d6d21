//! Chat documents and the request bodies of the chat / history API.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

/// Title given to chats created without one.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

/// Maximum number of characters of the first prompt kept in a derived title.
const TITLE_PREFIX_CHARS: usize = 50;

/// Author of a chat message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(0);

fn new_message_id() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let seq = MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("msg_{nanos}_{seq}")
}

/// A message embedded in a [`ChatDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default = "new_message_id")]
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Id of the model that produced (or was asked for) this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Id of the message this one replies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub is_streaming: bool,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            model: None,
            reply_to: None,
            is_streaming: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// The `{role, content}` projection sent upstream.
    pub fn to_prompt(&self) -> PromptMessage {
        PromptMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// The `{role, content}` pair forwarded to the upstream completion API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn into_message(self) -> ChatMessage {
        ChatMessage::new(self.role, self.content)
    }
}

/// Model selection stored with a chat and accepted by the proxy.
///
/// Clients may send a full catalog entry here; only the fields below are
/// kept, and `provider` is accepted either as a name or as `{id, name}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(
        default,
        deserialize_with = "provider_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            provider: None,
            max_tokens: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProviderField {
    Name(String),
    Object {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
}

fn provider_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let field = Option::<ProviderField>::deserialize(deserializer)?;
    Ok(field.and_then(|f| match f {
        ProviderField::Name(name) => Some(name),
        ProviderField::Object { id, name } => name.or(id),
    }))
}

/// A persisted conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatDocument {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<ModelRef>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Title for a chat started by `prompt`: its first 50 characters, with an
/// ellipsis when truncated.
pub fn title_from_prompt(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return DEFAULT_CHAT_TITLE.to_owned();
    }
    let mut title: String = trimmed.chars().take(TITLE_PREFIX_CHARS).collect();
    if trimmed.chars().count() > TITLE_PREFIX_CHARS {
        title.push_str("...");
    }
    title
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(total: u64, limit: u32, offset: u32) -> Self {
        Self {
            total,
            limit,
            offset,
            has_more: u64::from(offset) + u64::from(limit) < total,
        }
    }
}

/// Response body of `GET /api/chat/history`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatListResponse {
    pub chats: Vec<ChatDocument>,
    pub pagination: Pagination,
}

/// Request body of `POST /api/chat/history`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Required and non-empty.
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
}

/// Request body of `PUT /api/chat/history`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChatRequest {
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
}

/// Request body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionRequest {
    pub messages: Vec<PromptMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelRef>,
    /// When `true`, upstream's event stream is relayed as it arrives.
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Overrides the model's `maxTokens`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Chat this exchange continues, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

//! Deciding which chat a proxied exchange belongs to, and saving it there.
//!
//! The target is resolved before the upstream call so its id can be sent
//! to the client as a response header. When the exchange completes,
//! [`persist_exchange`] writes prior messages plus the assistant reply into
//! that chat with a single upsert.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use fereelab_types::{
    ChatDocument, ChatMessage, ModelRef, PromptMessage, Role, title_from_prompt,
};

use crate::db::ChatStore;

/// Where a completed exchange will be written.
#[derive(Debug, Clone)]
pub struct ChatTarget {
    pub chat_id: String,
    /// The stored chat being continued, or `None` when a new chat will be
    /// created under `chat_id`.
    pub existing: Option<ChatDocument>,
}

/// `true` when every stored message matches the incoming message at the
/// same position by role and content.
fn is_prefix(stored: &[ChatMessage], incoming: &[PromptMessage]) -> bool {
    stored.len() <= incoming.len()
        && stored
            .iter()
            .zip(incoming)
            .all(|(s, i)| s.role == i.role && s.content == i.content)
}

/// Pick the chat an exchange continues.
///
/// An explicit `chat_id` naming one of the caller's active chats wins.
/// Otherwise the caller's newest active chat is reused when it was created
/// within `merge_window` of `now` and its messages are a prefix of
/// `incoming`. Anything else gets a freshly minted id.
pub async fn resolve_target<S: ChatStore>(
    store: &S,
    user_id: &str,
    chat_id: Option<&str>,
    incoming: &[PromptMessage],
    merge_window: Duration,
    now: DateTime<Utc>,
) -> Result<ChatTarget, sqlx::Error> {
    if let Some(id) = chat_id.filter(|id| !id.is_empty()) {
        match store.get_chat(user_id, id).await? {
            Some(chat) if chat.is_active => {
                return Ok(ChatTarget {
                    chat_id: chat.id.clone(),
                    existing: Some(chat),
                });
            }
            _ => debug!(chat_id = %id, "requested chat not usable; falling back"),
        }
    }

    if let Some(latest) = store.latest_active_chat(user_id).await? {
        let window = chrono::Duration::from_std(merge_window).unwrap_or_default();
        let recent = now.signed_duration_since(latest.created_at) <= window;
        if recent && is_prefix(&latest.messages, incoming) {
            debug!(chat_id = %latest.id, "merging into recent chat");
            return Ok(ChatTarget {
                chat_id: latest.id.clone(),
                existing: Some(latest),
            });
        }
    }

    Ok(ChatTarget {
        chat_id: Uuid::new_v4().to_string(),
        existing: None,
    })
}

/// Write `incoming` plus the assistant reply into the target chat.
///
/// Stored messages that prefix `incoming` keep their ids and timestamps;
/// when they diverge, `incoming` replaces them. Blank replies are dropped.
/// Returns `false` when nothing was written.
pub async fn persist_exchange<S: ChatStore>(
    store: &S,
    user_id: &str,
    target: &ChatTarget,
    incoming: &[PromptMessage],
    reply: &str,
    model: &ModelRef,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    if reply.trim().is_empty() {
        debug!(chat_id = %target.chat_id, "empty assistant reply; not persisting");
        return Ok(false);
    }

    let mut messages: Vec<ChatMessage> = match &target.existing {
        Some(chat) if is_prefix(&chat.messages, incoming) => {
            let mut kept = chat.messages.clone();
            kept.extend(
                incoming[chat.messages.len()..]
                    .iter()
                    .cloned()
                    .map(PromptMessage::into_message),
            );
            kept
        }
        _ => incoming
            .iter()
            .cloned()
            .map(PromptMessage::into_message)
            .collect(),
    };

    let reply_to = messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.id.clone());
    let mut assistant = ChatMessage::new(Role::Assistant, reply).with_model(model.id.clone());
    assistant.reply_to = reply_to;
    messages.push(assistant);

    let (title, created_at) = match &target.existing {
        Some(chat) => (chat.title.clone(), chat.created_at),
        None => {
            let first_prompt = incoming
                .iter()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .unwrap_or_default();
            (title_from_prompt(first_prompt), now)
        }
    };

    store
        .upsert_chat(ChatDocument {
            id: target.chat_id.clone(),
            user_id: user_id.to_owned(),
            title,
            messages,
            model: Some(model.clone()),
            is_active: true,
            created_at,
            updated_at: now,
        })
        .await?;
    Ok(true)
}

//! Conversation state and the send flow.
//!
//! [`ChatState`] mirrors what a chat window shows: the conversation list,
//! the open conversation and its messages, model selection, and the reply
//! target. [`ChatManager`] pairs it with an [`ApiClient`] and drives a send
//! from user message through streamed reply.

use chrono::{DateTime, Utc};
use fereelab_types::{
    ChatCompletionRequest, ChatDocument, ChatMessage, DEFAULT_CHAT_TITLE, ModelInfo, ModelRef,
    Role, UpdateChatRequest, title_from_prompt,
};
use tracing::{debug, warn};

use crate::api::{ApiClient, ListParams};
use crate::error::ClientError;
use crate::stream::consume_stream;

/// Assistant text shown when a send fails.
pub const SEND_ERROR_TEXT: &str = "Sorry, an error occurred while processing your message.";

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub model: Option<ModelRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `true` once the server knows this conversation by `id`.
    pub saved: bool,
}

impl Conversation {
    /// A local, not yet saved conversation.
    pub fn draft(model: Option<ModelRef>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("conv_{}", now.timestamp_millis()),
            title: DEFAULT_CHAT_TITLE.to_owned(),
            messages: Vec::new(),
            model,
            created_at: now,
            updated_at: now,
            saved: false,
        }
    }
}

impl From<ChatDocument> for Conversation {
    fn from(doc: ChatDocument) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            messages: doc.messages,
            model: doc.model,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
            saved: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub conversations: Vec<Conversation>,
    current: Option<Conversation>,
    messages: Vec<ChatMessage>,
    pub models: Vec<ModelInfo>,
    pub selected_model: Option<ModelInfo>,
    reply_to: Option<String>,
    pub is_loading: bool,
    pub is_streaming: bool,
    /// Temporary chats are never saved server-side.
    pub is_temporary: bool,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.current.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn reply_to(&self) -> Option<&str> {
        self.reply_to.as_deref()
    }

    /// Select `message_id` as the reply target, or clear it if it already is.
    pub fn toggle_reply_to(&mut self, message_id: &str) {
        if self.reply_to.as_deref() == Some(message_id) {
            self.reply_to = None;
        } else {
            self.reply_to = Some(message_id.to_owned());
        }
    }

    pub fn clear_reply_to(&mut self) {
        self.reply_to = None;
    }

    pub fn set_current_conversation(&mut self, conversation: Option<Conversation>) {
        self.messages = conversation
            .as_ref()
            .map(|c| c.messages.clone())
            .unwrap_or_default();
        self.current = conversation;
        self.reply_to = None;
    }

    /// Copy the message list into the open conversation and its list entry.
    fn sync_current(&mut self) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        current.messages = self.messages.clone();
        current.updated_at = Utc::now();
        if let Some(entry) = self.conversations.iter_mut().find(|c| c.id == current.id) {
            *entry = current.clone();
        }
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.sync_current();
    }

    /// Replace a message's content. Returns `false` for unknown ids.
    pub fn update_message(&mut self, message_id: &str, content: &str) -> bool {
        let Some(msg) = self.messages.iter_mut().find(|m| m.id == message_id) else {
            return false;
        };
        msg.content = content.to_owned();
        self.sync_current();
        true
    }

    fn append_to_message(&mut self, message_id: &str, delta: &str) {
        if let Some(msg) = self.messages.iter_mut().find(|m| m.id == message_id) {
            msg.content.push_str(delta);
        }
    }

    fn finish_message(&mut self, message_id: &str) {
        if let Some(msg) = self.messages.iter_mut().find(|m| m.id == message_id) {
            msg.is_streaming = false;
        }
        self.sync_current();
    }

    pub fn delete_message(&mut self, message_id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != message_id);
        if self.reply_to.as_deref() == Some(message_id) {
            self.reply_to = None;
        }
        let removed = self.messages.len() != before;
        if removed {
            self.sync_current();
        }
        removed
    }

    pub fn set_messages(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
        self.sync_current();
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.reply_to = None;
    }

    /// Open a fresh draft conversation at the top of the list.
    pub fn start_new_conversation(&mut self) {
        let draft = Conversation::draft(self.selected_model.as_ref().map(ModelInfo::to_ref));
        self.conversations.insert(0, draft.clone());
        self.set_current_conversation(Some(draft));
        self.is_temporary = false;
    }

    /// Open a conversation that is neither listed nor saved.
    pub fn start_temporary_chat(&mut self) {
        self.set_current_conversation(None);
        self.is_temporary = true;
    }

    /// Select a catalog model by id. Returns `false` when it is not listed.
    pub fn select_model(&mut self, model_id: &str) -> bool {
        match self.models.iter().find(|m| m.id == model_id) {
            Some(model) => {
                self.selected_model = Some(model.clone());
                true
            }
            None => false,
        }
    }

    /// Model sent with the next request: the selection, else the current
    /// conversation's model.
    pub fn active_model(&self) -> Option<ModelRef> {
        self.selected_model
            .as_ref()
            .map(ModelInfo::to_ref)
            .or_else(|| self.current.as_ref().and_then(|c| c.model.clone()))
    }

    /// Record the server's id for the open conversation, creating a listed
    /// conversation when none is open.
    fn adopt_chat_id(&mut self, chat_id: &str, prompt: &str) {
        match self.current.as_mut() {
            Some(current) if current.id == chat_id => current.saved = true,
            Some(current) => {
                let old_id = std::mem::replace(&mut current.id, chat_id.to_owned());
                if !current.saved && current.title == DEFAULT_CHAT_TITLE {
                    current.title = title_from_prompt(prompt);
                }
                current.saved = true;
                let updated = current.clone();
                match self.conversations.iter_mut().find(|c| c.id == old_id) {
                    Some(entry) => *entry = updated,
                    None => self.conversations.insert(0, updated),
                }
            }
            None => {
                let mut conversation = Conversation::draft(self.active_model());
                conversation.id = chat_id.to_owned();
                conversation.title = title_from_prompt(prompt);
                conversation.messages = self.messages.clone();
                conversation.saved = true;
                self.conversations.insert(0, conversation.clone());
                self.current = Some(conversation);
            }
        }
    }
}

/// What a completed send produced.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub reply: String,
    /// Server chat id the exchange was stored into.
    pub chat_id: Option<String>,
}

#[derive(Debug)]
pub struct ChatManager {
    api: ApiClient,
    pub state: ChatState,
}

impl ChatManager {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            state: ChatState::new(),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut ApiClient {
        &mut self.api
    }

    /// Send `content` and stream the reply into the message list.
    ///
    /// A user message and a streaming assistant placeholder are appended
    /// first; each delta grows the placeholder and is passed to `on_delta`.
    /// On failure the placeholder shows [`SEND_ERROR_TEXT`] and the error is
    /// returned. Blank input is ignored.
    pub async fn send_message<F>(
        &mut self,
        content: &str,
        on_delta: F,
    ) -> Result<Option<SendOutcome>, ClientError>
    where
        F: FnMut(&str),
    {
        let content = content.trim();
        if content.is_empty() || self.state.is_streaming {
            return Ok(None);
        }
        let model = self.state.active_model();

        let mut user = ChatMessage::new(Role::User, content);
        user.reply_to = self.state.reply_to.take();
        self.state.add_message(user);

        let request = ChatCompletionRequest {
            messages: self.state.messages.iter().map(ChatMessage::to_prompt).collect(),
            model: model.clone(),
            stream: true,
            temperature: None,
            max_tokens: None,
            chat_id: self
                .state
                .current
                .as_ref()
                .filter(|c| c.saved)
                .map(|c| c.id.clone()),
        };

        let mut placeholder = ChatMessage::new(Role::Assistant, "");
        placeholder.is_streaming = true;
        placeholder.model = model.map(|m| m.id);
        let placeholder_id = placeholder.id.clone();
        self.state.add_message(placeholder);
        self.state.is_streaming = true;

        let result = self.stream_reply(&request, &placeholder_id, on_delta).await;
        self.state.is_streaming = false;

        match result {
            Ok(outcome) => {
                self.state.finish_message(&placeholder_id);
                if let Some(chat_id) = outcome.chat_id.as_deref() {
                    self.state.adopt_chat_id(chat_id, content);
                }
                debug!(chat_id = ?outcome.chat_id, chars = outcome.reply.len(), "reply received");
                Ok(Some(outcome))
            }
            Err(e) => {
                warn!(error = %e, "send failed");
                self.state.update_message(&placeholder_id, SEND_ERROR_TEXT);
                self.state.finish_message(&placeholder_id);
                Err(e)
            }
        }
    }

    async fn stream_reply<F>(
        &mut self,
        request: &ChatCompletionRequest,
        placeholder_id: &str,
        mut on_delta: F,
    ) -> Result<SendOutcome, ClientError>
    where
        F: FnMut(&str),
    {
        let api = if self.state.is_temporary {
            self.api.anonymous()
        } else {
            self.api.clone()
        };
        let stream = api.stream(request).await?;
        let chat_id = stream.chat_id.clone();
        let state = &mut self.state;
        let reply = consume_stream(stream.bytes(), |delta| {
            state.append_to_message(placeholder_id, delta);
            on_delta(delta);
        })
        .await?;
        Ok(SendOutcome { reply, chat_id })
    }

    /// Reload the conversation list from the server.
    pub async fn load_conversations(&mut self, params: ListParams) -> Result<usize, ClientError> {
        self.state.is_loading = true;
        let result = self.api.list_chats(params).await;
        self.state.is_loading = false;
        let list = result?;
        self.state.conversations = list.chats.into_iter().map(Conversation::from).collect();
        Ok(self.state.conversations.len())
    }

    /// Open a saved conversation, fetching its latest messages.
    pub async fn switch_to_conversation(&mut self, id: &str) -> Result<(), ClientError> {
        let doc = self.api.get_chat(id).await?;
        let conversation = Conversation::from(doc);
        if let Some(entry) = self.state.conversations.iter_mut().find(|c| c.id == id) {
            *entry = conversation.clone();
        }
        self.state.set_current_conversation(Some(conversation));
        self.state.is_temporary = false;
        Ok(())
    }

    /// Archive a conversation. When it was open, switch to the first
    /// remaining one or start a new draft.
    pub async fn delete_conversation(&mut self, id: &str) -> Result<(), ClientError> {
        let saved = self
            .state
            .conversations
            .iter()
            .find(|c| c.id == id)
            .is_none_or(|c| c.saved);
        if saved {
            self.api.delete_chat(id).await?;
        }
        self.state.conversations.retain(|c| c.id != id);

        if self.state.current.as_ref().is_some_and(|c| c.id == id) {
            match self.state.conversations.first().cloned() {
                Some(next) => self.state.set_current_conversation(Some(next)),
                None => self.state.start_new_conversation(),
            }
        }
        Ok(())
    }

    pub async fn rename_conversation(&mut self, id: &str, title: &str) -> Result<(), ClientError> {
        let doc = self
            .api
            .update_chat(&UpdateChatRequest {
                chat_id: Some(id.to_owned()),
                title: Some(title.to_owned()),
                messages: None,
                model: None,
            })
            .await?;
        let updated = Conversation::from(doc);
        if let Some(entry) = self.state.conversations.iter_mut().find(|c| c.id == id) {
            *entry = updated.clone();
        }
        if let Some(current) = self.state.current.as_mut().filter(|c| c.id == id) {
            current.title = updated.title;
        }
        Ok(())
    }

    /// Fetch the model catalog. Without a selection, the first model (or
    /// the built-in fallback when the catalog is empty) is selected.
    pub async fn refresh_models(&mut self) -> Result<usize, ClientError> {
        let resp = self.api.models().await?;
        self.state.models = resp.models;
        if self.state.selected_model.is_none() {
            self.state.selected_model = Some(
                self.state
                    .models
                    .first()
                    .cloned()
                    .unwrap_or_else(ModelInfo::fallback),
            );
        }
        Ok(self.state.models.len())
    }
}

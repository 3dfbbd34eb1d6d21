//! Database abstraction layer.
//!
//! One trait per concern ([`UserStore`], [`AuthSessionStore`], [`ChatStore`])
//! defines what handlers may ask of persistence. The default implementation
//! is [`sqlite::SqliteStore`]; to move to another database implement the
//! traits for a new type and change the concrete type in
//! [`crate::state::AppState`].
//!
//! Chats are stored as documents: the message list and model selection are
//! JSON columns, so every write to a chat is a single-row statement.
//!
//! All trait methods use `impl Future` in their signatures so no extra
//! `async-trait` crate is required.

pub mod sqlite;

use std::future::Future;

use chrono::{DateTime, SecondsFormat, Utc};
use fereelab_types::{AuthProvider, ChatDocument, ChatMessage, ModelRef, UserProfile};

/// A row in the `users` table.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    /// Always stored lowercased.
    pub email: String,
    pub name: String,
    /// Argon2 PHC string; `None` for OAuth-provisioned accounts.
    pub password_hash: Option<String>,
    pub image: Option<String>,
    pub provider: AuthProvider,
    pub provider_id: Option<String>,
    pub email_verified: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            image: self.image.clone(),
            provider: self.provider,
            created_at: self.created_at,
        }
    }
}

/// A row in the `auth_sessions` table.
#[derive(Debug, Clone)]
pub struct AuthSessionRecord {
    pub token_hash: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Partial update of a chat; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ChatPatch {
    pub title: Option<String>,
    pub messages: Option<Vec<ChatMessage>>,
    pub model: Option<ModelRef>,
}

pub trait UserStore: Send + Sync + 'static {
    /// Fails with a unique-constraint violation when the email is taken.
    fn insert_user(&self, user: UserRecord) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn find_user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>, sqlx::Error>> + Send;

    fn get_user(&self, id: &str) -> impl Future<Output = Result<Option<UserRecord>, sqlx::Error>> + Send;
}

pub trait AuthSessionStore: Send + Sync + 'static {
    fn insert_auth_session(
        &self,
        session: AuthSessionRecord,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// The active user owning an unexpired session with this token hash.
    fn find_session_user(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<UserRecord>, sqlx::Error>> + Send;

    /// Returns `true` if a session was removed.
    fn delete_auth_session(&self, token_hash: &str) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    fn purge_expired_sessions(&self, now: DateTime<Utc>) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
}

pub trait ChatStore: Send + Sync + 'static {
    fn insert_chat(&self, chat: ChatDocument) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// A chat owned by `user_id`, active or not.
    fn get_chat(
        &self,
        user_id: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<ChatDocument>, sqlx::Error>> + Send;

    /// Chats with the given active flag, most recently updated first.
    fn list_chats(
        &self,
        user_id: &str,
        active: bool,
        limit: u32,
        offset: u32,
    ) -> impl Future<Output = Result<Vec<ChatDocument>, sqlx::Error>> + Send;

    fn count_chats(&self, user_id: &str, active: bool) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;

    /// Apply `patch` and bump `updated_at`. `None` when not found or not owned.
    fn update_chat(
        &self,
        user_id: &str,
        id: &str,
        patch: ChatPatch,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<ChatDocument>, sqlx::Error>> + Send;

    /// Soft-delete (`false`) or restore (`true`). Returns `false` when not
    /// found or not owned.
    fn set_chat_active(
        &self,
        user_id: &str,
        id: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// The user's most recently created active chat.
    fn latest_active_chat(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<ChatDocument>, sqlx::Error>> + Send;

    /// Insert `chat`, or replace the messages (and model, when given) of the
    /// existing chat with the same id owned by the same user.
    fn upsert_chat(&self, chat: ChatDocument) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str, column: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        tracing::warn!(raw = %raw, column, error = %e, "failed to parse timestamp; using now");
        Utc::now()
    })
}

//! SQLite implementation of the store traits.
//!
//! Uses [`sqlx`] with the `sqlite` feature. Migrations are embedded at
//! compile time from `./migrations` (relative to the crate root) and run on
//! [`SqliteStore::connect`].
//!
//! The runtime-checked `sqlx::query` form is used so that no `DATABASE_URL`
//! is needed at compile time.

use chrono::{DateTime, Utc};
use fereelab_types::{AuthProvider, ChatDocument, ChatMessage, ModelRef};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use super::{
    fmt_ts, parse_ts, AuthSessionRecord, AuthSessionStore, ChatPatch, ChatStore, UserRecord,
    UserStore,
};

type UserRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    bool,
    String,
    String,
);

type ChatRow = (String, String, String, String, Option<String>, bool, String, String);

const USER_COLUMNS: &str = "u.id, u.email, u.name, u.password_hash, u.image, u.provider, \
     u.provider_id, u.email_verified, u.is_active, u.created_at, u.updated_at";

const CHAT_COLUMNS: &str =
    "id, user_id, title, messages, model, is_active, created_at, updated_at";

/// SQLite-backed store for users, login sessions, and chats.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g.
    /// `"sqlite://fereelab.db?mode=rwc"`, or `"sqlite::memory:"` for tests.
    /// An in-memory database lives in a single pooled connection that is
    /// never recycled, since each new connection would see an empty database.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(url)
                .await?
        } else {
            SqlitePoolOptions::new().connect(url).await?
        };
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

fn user_from_row(row: UserRow) -> UserRecord {
    let (
        id,
        email,
        name,
        password_hash,
        image,
        provider,
        provider_id,
        email_verified,
        is_active,
        created_at,
        updated_at,
    ) = row;
    UserRecord {
        provider: provider.parse().unwrap_or_else(|_| {
            tracing::warn!(raw = %provider, user_id = %id, "unknown auth provider; using credentials");
            AuthProvider::Credentials
        }),
        id,
        email,
        name,
        password_hash,
        image,
        provider_id,
        email_verified: email_verified.map(|raw| parse_ts(&raw, "email_verified")),
        is_active,
        created_at: parse_ts(&created_at, "created_at"),
        updated_at: parse_ts(&updated_at, "updated_at"),
    }
}

fn chat_from_row(row: ChatRow) -> ChatDocument {
    let (id, user_id, title, messages, model, is_active, created_at, updated_at) = row;
    let messages: Vec<ChatMessage> = serde_json::from_str(&messages).unwrap_or_else(|e| {
        tracing::warn!(chat_id = %id, error = %e, "failed to parse stored messages; using empty list");
        Vec::new()
    });
    let model: Option<ModelRef> = model.and_then(|raw| {
        serde_json::from_str(&raw)
            .map_err(|e| tracing::warn!(chat_id = %id, error = %e, "failed to parse stored model"))
            .ok()
    });
    ChatDocument {
        id,
        user_id,
        title,
        messages,
        model,
        is_active,
        created_at: parse_ts(&created_at, "created_at"),
        updated_at: parse_ts(&updated_at, "updated_at"),
    }
}

fn encode_messages(messages: &[ChatMessage]) -> Result<String, sqlx::Error> {
    serde_json::to_string(messages).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn encode_model(model: Option<&ModelRef>) -> Result<Option<String>, sqlx::Error> {
    model
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

// ── UserStore ─────────────────────────────────────────────────────────────────

impl UserStore for SqliteStore {
    async fn insert_user(&self, user: UserRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO users (id, email, name, password_hash, image, provider, provider_id, \
             email_verified, is_active, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&user.id)
        .bind(user.email.to_lowercase())
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(&user.image)
        .bind(user.provider.to_string())
        .bind(&user.provider_id)
        .bind(user.email_verified.map(fmt_ts))
        .bind(user.is_active)
        .bind(fmt_ts(user.created_at))
        .bind(fmt_ts(user.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.email = ?1"
        ))
        .bind(email.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(user_from_row))
    }
}

// ── AuthSessionStore ──────────────────────────────────────────────────────────

impl AuthSessionStore for SqliteStore {
    async fn insert_auth_session(&self, session: AuthSessionRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO auth_sessions (token_hash, user_id, created_at, expires_at) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&session.token_hash)
        .bind(&session.user_id)
        .bind(fmt_ts(session.created_at))
        .bind(fmt_ts(session.expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_session_user(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRecord>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM auth_sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.token_hash = ?1 AND s.expires_at > ?2 AND u.is_active = 1"
        ))
        .bind(token_hash)
        .bind(fmt_ts(now))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn delete_auth_session(&self, token_hash: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE token_hash = ?1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= ?1")
            .bind(fmt_ts(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ── ChatStore ─────────────────────────────────────────────────────────────────

impl ChatStore for SqliteStore {
    async fn insert_chat(&self, chat: ChatDocument) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO chats (id, user_id, title, messages, model, is_active, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&chat.id)
        .bind(&chat.user_id)
        .bind(&chat.title)
        .bind(encode_messages(&chat.messages)?)
        .bind(encode_model(chat.model.as_ref())?)
        .bind(chat.is_active)
        .bind(fmt_ts(chat.created_at))
        .bind(fmt_ts(chat.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_chat(&self, user_id: &str, id: &str) -> Result<Option<ChatDocument>, sqlx::Error> {
        let row: Option<ChatRow> = sqlx::query_as(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1 AND user_id = ?2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(chat_from_row))
    }

    async fn list_chats(
        &self,
        user_id: &str,
        active: bool,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ChatDocument>, sqlx::Error> {
        let rows: Vec<ChatRow> = sqlx::query_as(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats \
             WHERE user_id = ?1 AND is_active = ?2 \
             ORDER BY updated_at DESC, id DESC LIMIT ?3 OFFSET ?4"
        ))
        .bind(user_id)
        .bind(active)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(chat_from_row).collect())
    }

    async fn count_chats(&self, user_id: &str, active: bool) -> Result<u64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM chats WHERE user_id = ?1 AND is_active = ?2")
                .bind(user_id)
                .bind(active)
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn update_chat(
        &self,
        user_id: &str,
        id: &str,
        patch: ChatPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<ChatDocument>, sqlx::Error> {
        let messages = patch
            .messages
            .as_deref()
            .map(encode_messages)
            .transpose()?;
        let model = encode_model(patch.model.as_ref())?;
        let result = sqlx::query(
            "UPDATE chats SET \
                 title = COALESCE(?1, title), \
                 messages = COALESCE(?2, messages), \
                 model = COALESCE(?3, model), \
                 updated_at = ?4 \
             WHERE id = ?5 AND user_id = ?6",
        )
        .bind(&patch.title)
        .bind(messages)
        .bind(model)
        .bind(fmt_ts(now))
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_chat(user_id, id).await
    }

    async fn set_chat_active(
        &self,
        user_id: &str,
        id: &str,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE chats SET is_active = ?1, updated_at = ?2 WHERE id = ?3 AND user_id = ?4",
        )
        .bind(active)
        .bind(fmt_ts(now))
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn latest_active_chat(&self, user_id: &str) -> Result<Option<ChatDocument>, sqlx::Error> {
        let row: Option<ChatRow> = sqlx::query_as(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats WHERE user_id = ?1 AND is_active = 1 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(chat_from_row))
    }

    async fn upsert_chat(&self, chat: ChatDocument) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO chats (id, user_id, title, messages, model, is_active, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(id) DO UPDATE SET \
                 messages = excluded.messages, \
                 model = COALESCE(excluded.model, chats.model), \
                 updated_at = excluded.updated_at \
             WHERE chats.user_id = excluded.user_id",
        )
        .bind(&chat.id)
        .bind(&chat.user_id)
        .bind(&chat.title)
        .bind(encode_messages(&chat.messages)?)
        .bind(encode_model(chat.model.as_ref())?)
        .bind(chat.is_active)
        .bind(fmt_ts(chat.created_at))
        .bind(fmt_ts(chat.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

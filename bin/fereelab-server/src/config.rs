//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use fereelab_types::DEFAULT_MODEL_ID;

/// Runtime configuration for fereelab-server.
///
/// Every field has a default so the server starts without any environment
/// variables set; only the upstream API key has no usable default, and its
/// absence surfaces as a 500 on the routes that need it.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://fereelab.db?mode=rwc"`).
    pub database_url: String,

    /// Bearer key for the upstream completion API.
    pub upstream_api_key: Option<String>,

    /// Base URL of the upstream API, without a trailing slash.
    pub upstream_base_url: String,

    /// Sent upstream as `HTTP-Referer`.
    pub app_url: String,

    /// Sent upstream as `X-Title`.
    pub app_title: String,

    /// Model id used when a chat request does not name one.
    pub default_model: String,

    pub default_max_tokens: u32,

    pub default_temperature: f32,

    /// How recently a chat must have been created for an anonymous
    /// continuation (no `chatId`) to be merged into it.
    pub merge_window: Duration,

    /// How long a fetched model catalog is served from memory.
    pub models_cache_ttl: Duration,

    /// Lifetime of a login session token.
    pub session_ttl: Duration,

    /// Comma-separated CORS origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve the OpenAPI document at `/api-docs/openapi.json`.
    pub enable_api_docs: bool,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Also write daily-rotated log files into this directory.
    pub log_dir: Option<String>,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("FEREELAB_BIND", "0.0.0.0:3000"),
            database_url: env_or("FEREELAB_DATABASE_URL", "sqlite://fereelab.db?mode=rwc"),
            upstream_api_key: env_opt("FEREELAB_UPSTREAM_API_KEY")
                .or_else(|| env_opt("OPENROUTER_API_KEY")),
            upstream_base_url: env_or("FEREELAB_UPSTREAM_BASE_URL", "https://openrouter.ai/api/v1")
                .trim_end_matches('/')
                .to_owned(),
            app_url: env_or("FEREELAB_APP_URL", "http://localhost:3000"),
            app_title: env_or("FEREELAB_APP_TITLE", "FereeLAB Chat"),
            default_model: env_or("FEREELAB_DEFAULT_MODEL", DEFAULT_MODEL_ID),
            default_max_tokens: parse_env("FEREELAB_DEFAULT_MAX_TOKENS", 4000),
            default_temperature: parse_env("FEREELAB_DEFAULT_TEMPERATURE", 0.7),
            merge_window: Duration::from_secs(parse_env("FEREELAB_MERGE_WINDOW_SECS", 60)),
            models_cache_ttl: Duration::from_secs(parse_env("FEREELAB_MODELS_CACHE_SECS", 3 * 60 * 60)),
            session_ttl: Duration::from_secs(parse_env::<u64>("FEREELAB_SESSION_TTL_HOURS", 720) * 3600),
            cors_allowed_origins: env_opt("FEREELAB_CORS_ORIGINS"),
            enable_api_docs: env_flag("FEREELAB_ENABLE_API_DOCS", true),
            log_level: env_or("FEREELAB_LOG", "info"),
            log_json: env_flag("FEREELAB_LOG_JSON", false),
            log_dir: env_opt("FEREELAB_LOG_DIR"),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
impl Config {
    /// Configuration for in-process tests: in-memory database, no upstream key.
    pub fn for_tests() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_owned(),
            database_url: "sqlite::memory:".to_owned(),
            upstream_api_key: None,
            upstream_base_url: "http://127.0.0.1:9".to_owned(),
            app_url: "http://localhost:3000".to_owned(),
            app_title: "FereeLAB Chat".to_owned(),
            default_model: DEFAULT_MODEL_ID.to_owned(),
            default_max_tokens: 4000,
            default_temperature: 0.7,
            merge_window: Duration::from_secs(60),
            models_cache_ttl: Duration::from_secs(3 * 60 * 60),
            session_ttl: Duration::from_secs(3600),
            cors_allowed_origins: None,
            enable_api_docs: true,
            log_level: "debug".to_owned(),
            log_json: false,
            log_dir: None,
        }
    }
}

//! Client for the OpenRouter-compatible upstream API.
//!
//! Only two endpoints are used: `POST /chat/completions` (streamed or not)
//! and `GET /models`. Every request carries the bearer key plus the
//! `HTTP-Referer` / `X-Title` attribution headers.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use fereelab_types::PromptMessage;

use crate::config::Config;
use crate::error::ServerError;

/// Body of `POST {base}/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionBody {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    pub stream: bool,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    app_url: String,
    app_title: String,
}

impl UpstreamClient {
    pub fn from_config(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.upstream_base_url.clone(),
            api_key: config.upstream_api_key.clone(),
            app_url: config.app_url.clone(),
            app_title: config.app_title.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Send a completion request and return the response once its status
    /// is known to be successful. The body is left unread so the caller can
    /// either stream it or parse it as JSON.
    pub async fn chat_completions(
        &self,
        body: &CompletionBody,
    ) -> Result<reqwest::Response, ServerError> {
        let key = self.api_key.as_deref().ok_or(ServerError::UpstreamNotConfigured)?;
        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model = %body.model, stream = body.stream, "forwarding chat completion");

        let resp = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {key}"))
            .header(CONTENT_TYPE, "application/json")
            .header("HTTP-Referer", &self.app_url)
            .header("X-Title", &self.app_title)
            .json(body)
            .send()
            .await?;
        check_status(resp, "Failed to get response from upstream").await
    }

    /// Fetch the raw `data` array of `GET {base}/models`.
    pub async fn list_models(&self) -> Result<Vec<Value>, ServerError> {
        let key = self.api_key.as_deref().ok_or(ServerError::UpstreamNotConfigured)?;
        let url = format!("{}/models", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {key}"))
            .header("HTTP-Referer", &self.app_url)
            .header("X-Title", &self.app_title)
            .send()
            .await?;
        let resp = check_status(resp, "Failed to fetch models").await?;
        let body: Value = resp.json().await?;
        match body.get("data").and_then(Value::as_array) {
            Some(models) => Ok(models.clone()),
            None => {
                warn!("model listing has no `data` array; treating as empty");
                Ok(Vec::new())
            }
        }
    }
}

/// Turn a non-success response into [`ServerError::Upstream`], keeping the
/// upstream status and whatever JSON it sent back.
async fn check_status(resp: reqwest::Response, message: &str) -> Result<reqwest::Response, ServerError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let details = serde_json::from_str(&text).unwrap_or_else(|_| Value::Object(Default::default()));
    warn!(%status, body = %text, "upstream request failed");
    Err(ServerError::Upstream {
        status,
        message: message.to_owned(),
        details,
    })
}

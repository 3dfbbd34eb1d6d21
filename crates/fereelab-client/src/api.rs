//! Typed client for the FereeLAB HTTP API.

use std::time::Duration;

use bytes::Bytes;
use fereelab_types::{
    AuthResponse, CHAT_ID_HEADER, ChatCompletionRequest, ChatDocument, ChatListResponse,
    CreateChatRequest, ErrorBody, LoginRequest, MessageBody, ModelsResponse, SignupRequest,
    UpdateChatRequest, UserProfile,
};
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use urlencoding::encode;

use crate::error::ClientError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Paging and filter options for [`ApiClient::list_chats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ListParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub archived: bool,
}

impl ListParams {
    fn query(&self) -> String {
        let mut parts = Vec::new();
        if let Some(limit) = self.limit {
            parts.push(format!("limit={limit}"));
        }
        if let Some(offset) = self.offset {
            parts.push(format!("offset={offset}"));
        }
        if self.archived {
            parts.push("archived=true".to_owned());
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("?{}", parts.join("&"))
        }
    }
}

/// Reply of a non-streaming `POST /api/chat`.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Chat the exchange was stored into; absent for anonymous callers.
    pub chat_id: Option<String>,
    /// `choices[0].message.content`, empty when missing.
    pub content: String,
    /// Upstream's response body, untouched.
    pub raw: Value,
}

/// An open streaming reply of `POST /api/chat`.
#[derive(Debug)]
pub struct CompletionStream {
    pub chat_id: Option<String>,
    response: Response,
}

impl CompletionStream {
    /// The raw event-stream body, chunk by chunk.
    pub fn bytes(self) -> impl Stream<Item = Result<Bytes, ClientError>> {
        self.response.bytes_stream().map(|r| r.map_err(ClientError::from))
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .user_agent(concat!("fereelab-client/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// A copy of this client that sends no bearer token.
    pub fn anonymous(&self) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token: None,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.token.as_deref() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, ClientError> {
        let resp = self.authorize(req).send().await?;
        check_status(resp).await
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = self.send(req.timeout(REQUEST_TIMEOUT)).await?;
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    // ── Health ────────────────────────────────────────────────────────────────

    pub async fn health(&self) -> Result<Value, ClientError> {
        self.send_json(self.http.get(self.url("/health"))).await
    }

    // ── Accounts ──────────────────────────────────────────────────────────────

    /// Create an account; the returned session token is kept on the client.
    pub async fn signup(&mut self, body: &SignupRequest) -> Result<AuthResponse, ClientError> {
        let resp: AuthResponse = self
            .send_json(self.http.post(self.url("/api/auth/signup")).json(body))
            .await?;
        self.token = Some(resp.token.clone());
        Ok(resp)
    }

    /// Sign in; the returned session token is kept on the client.
    pub async fn login(&mut self, body: &LoginRequest) -> Result<AuthResponse, ClientError> {
        let resp: AuthResponse = self
            .send_json(self.http.post(self.url("/api/auth/login")).json(body))
            .await?;
        self.token = Some(resp.token.clone());
        Ok(resp)
    }

    /// Revoke the current session and forget its token.
    pub async fn logout(&mut self) -> Result<MessageBody, ClientError> {
        let resp = self
            .send_json(self.http.post(self.url("/api/auth/logout")))
            .await?;
        self.token = None;
        Ok(resp)
    }

    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        self.send_json(self.http.get(self.url("/api/auth/me"))).await
    }

    // ── Chat proxy ────────────────────────────────────────────────────────────

    /// Non-streaming completion. `stream` on `body` is forced off.
    pub async fn complete(&self, body: &ChatCompletionRequest) -> Result<Completion, ClientError> {
        let mut body = body.clone();
        body.stream = false;
        let resp = self
            .send(self.http.post(self.url("/api/chat")).json(&body))
            .await?;
        let chat_id = chat_id_of(&resp);
        let raw: Value = serde_json::from_slice(&resp.bytes().await?)?;
        let content = raw
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        Ok(Completion {
            chat_id,
            content,
            raw,
        })
    }

    /// Streaming completion. `stream` on `body` is forced on.
    pub async fn stream(&self, body: &ChatCompletionRequest) -> Result<CompletionStream, ClientError> {
        let mut body = body.clone();
        body.stream = true;
        let response = self
            .send(self.http.post(self.url("/api/chat")).json(&body))
            .await?;
        let chat_id = chat_id_of(&response);
        debug!(chat_id = ?chat_id, "completion stream opened");
        Ok(CompletionStream { chat_id, response })
    }

    // ── History ───────────────────────────────────────────────────────────────

    pub async fn list_chats(&self, params: ListParams) -> Result<ChatListResponse, ClientError> {
        let url = format!("{}{}", self.url("/api/chat/history"), params.query());
        self.send_json(self.http.get(url)).await
    }

    pub async fn get_chat(&self, id: &str) -> Result<ChatDocument, ClientError> {
        self.send_json(self.http.get(self.url(&format!("/api/chat/history/{}", encode(id)))))
            .await
    }

    pub async fn create_chat(&self, body: &CreateChatRequest) -> Result<ChatDocument, ClientError> {
        self.send_json(self.http.post(self.url("/api/chat/history")).json(body))
            .await
    }

    pub async fn update_chat(&self, body: &UpdateChatRequest) -> Result<ChatDocument, ClientError> {
        self.send_json(self.http.put(self.url("/api/chat/history")).json(body))
            .await
    }

    /// Archive a chat (soft delete).
    pub async fn delete_chat(&self, id: &str) -> Result<MessageBody, ClientError> {
        let url = format!("{}?chatId={}", self.url("/api/chat/history"), encode(id));
        self.send_json(self.http.delete(url)).await
    }

    pub async fn restore_chat(&self, id: &str) -> Result<ChatDocument, ClientError> {
        self.send_json(
            self.http
                .post(self.url(&format!("/api/chat/history/{}/restore", encode(id)))),
        )
        .await
    }

    // ── Models ────────────────────────────────────────────────────────────────

    pub async fn models(&self) -> Result<ModelsResponse, ClientError> {
        self.send_json(self.http.get(self.url("/api/models"))).await
    }
}

fn chat_id_of(resp: &Response) -> Option<String> {
    resp.headers()
        .get(CHAT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

/// Map a non-2xx response to a typed error, keeping the server's message.
async fn check_status(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }
    let text = resp.text().await.unwrap_or_default();
    let (message, details) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.error, body.details),
        Err(_) if text.trim().is_empty() => (
            status.canonical_reason().unwrap_or("request failed").to_owned(),
            None,
        ),
        Err(_) => (text, None),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
        details,
    })
}

//! End-to-end tests: the real router against an in-memory store and a fake
//! upstream served from a local listener.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use fereelab_types::{ChatDocument, CHAT_ID_HEADER};

use super::build;
use crate::config::Config;
use crate::db::sqlite::SqliteStore;
use crate::db::ChatStore;
use crate::middleware::trace::X_TRACE_ID;
use crate::state::AppState;

// ── Fake upstream ─────────────────────────────────────────────────────────────

const STREAM_BODY: &str = concat!(
    ": keep-alive\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
    "data: not json\n\n",
    "data:{\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\r\n\r\n",
    "data: [DONE]\n\n",
);

#[derive(Clone, Default)]
struct FakeUpstream {
    requests: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
    model_fetches: Arc<AtomicUsize>,
}

impl FakeUpstream {
    fn last_request(&self) -> (HeaderMap, Value) {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

async fn fake_completions(
    State(up): State<FakeUpstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    up.requests.lock().unwrap().push((headers, body.clone()));
    if body["model"] == "fail/model" {
        let err = json!({ "error": { "message": "rate limited", "code": 429 } });
        return (StatusCode::TOO_MANY_REQUESTS, Json(err)).into_response();
    }
    if body["stream"] == true {
        return ([(CONTENT_TYPE, "text/event-stream")], STREAM_BODY).into_response();
    }
    Json(json!({
        "id": "gen-1",
        "choices": [{ "message": { "role": "assistant", "content": "Hello" } }]
    }))
    .into_response()
}

async fn fake_models(State(up): State<FakeUpstream>) -> Json<Value> {
    up.model_fetches.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "data": [
            {
                "id": "openai/gpt-4o",
                "name": "GPT-4o",
                "context_length": 128000,
                "pricing": { "prompt": "0.000005", "completion": "0.000015" }
            },
            { "id": "bare-model" }
        ]
    }))
}

async fn spawn_upstream() -> (String, FakeUpstream) {
    let up = FakeUpstream::default();
    let app = Router::new()
        .route("/chat/completions", post(fake_completions))
        .route("/models", get(fake_models))
        .with_state(up.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("http://{addr}"), up)
}

// ── Harness ───────────────────────────────────────────────────────────────────

async fn app_with(config: Config) -> (Router, Arc<AppState>) {
    let store = SqliteStore::connect(&config.database_url).await.unwrap();
    let state = Arc::new(AppState::new(config, store));
    (build(Arc::clone(&state)), state)
}

async fn app_with_upstream() -> (Router, Arc<AppState>, FakeUpstream) {
    let (base, up) = spawn_upstream().await;
    let mut config = Config::for_tests();
    config.upstream_api_key = Some("test-key".into());
    config.upstream_base_url = base;
    let (app, state) = app_with(config).await;
    (app, state, up)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// A JSON-typed request whose body is sent as-is.
fn raw_request(method: &str, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_owned())).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

async fn send_json(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, _, body) = send(app, req).await;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

/// Sign up a fresh account; returns `(token, user_id)`.
async fn signup(app: &Router, email: &str) -> (String, String) {
    let body = json!({ "email": email, "password": "hunter2hunter2", "name": "Tester" });
    let (status, resp) = send_json(app, request("POST", "/api/auth/signup", None, Some(body))).await;
    assert_eq!(status, StatusCode::CREATED, "{resp}");
    (
        resp["token"].as_str().unwrap().to_owned(),
        resp["user"]["id"].as_str().unwrap().to_owned(),
    )
}

async fn create_chat(app: &Router, token: &str, title: &str) -> Value {
    let body = json!({
        "title": title,
        "messages": [{ "role": "user", "content": format!("about {title}") }]
    });
    let (status, chat) = send_json(app, request("POST", "/api/chat/history", Some(token), Some(body))).await;
    assert_eq!(status, StatusCode::CREATED);
    chat
}

/// Streamed exchanges are saved after the body ends, on the relay task.
async fn wait_for_chat(state: &AppState, user_id: &str, chat_id: &str) -> ChatDocument {
    for _ in 0..100 {
        if let Some(chat) = state.store.get_chat(user_id, chat_id).await.unwrap() {
            return chat;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("chat {chat_id} was never saved");
}

// ── Health, docs, tracing ─────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok_and_echoes_trace_id() {
    let (app, _) = app_with(Config::for_tests()).await;
    let trace_id = "3f2b8c1e-4a5d-4e6f-8a7b-9c0d1e2f3a4b";
    let req = Request::builder()
        .uri("/health")
        .header(X_TRACE_ID, trace_id)
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[X_TRACE_ID], trace_id);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["upstreamConfigured"], false);
}

#[tokio::test]
async fn openapi_document_lists_api_paths() {
    let (app, _) = app_with(Config::for_tests()).await;
    let (status, doc) = send_json(&app, request("GET", "/api-docs/openapi.json", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    for path in ["/api/chat", "/api/chat/history", "/api/models", "/api/auth/login"] {
        assert!(doc["paths"].get(path).is_some(), "missing {path}");
    }
}

#[tokio::test]
async fn openapi_document_can_be_disabled() {
    let mut config = Config::for_tests();
    config.enable_api_docs = false;
    let (app, _) = app_with(config).await;
    let (status, _, _) = send(&app, request("GET", "/api-docs/openapi.json", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Accounts ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn signup_login_logout_round_trip() {
    let (app, _) = app_with(Config::for_tests()).await;
    let (token, _) = signup(&app, "Ada@Example.com").await;

    let (status, me) = send_json(&app, request("GET", "/api/auth/me", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ada@example.com");
    assert_eq!(me["provider"], "credentials");

    let login = json!({ "email": "ADA@example.com", "password": "hunter2hunter2" });
    let (status, session) = send_json(&app, request("POST", "/api/auth/login", None, Some(login))).await;
    assert_eq!(status, StatusCode::OK);
    let second = session["token"].as_str().unwrap().to_owned();
    assert_ne!(second, token);

    let (status, body) = send_json(&app, request("POST", "/api/auth/logout", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");

    let (status, body) = send_json(&app, request("GET", "/api/auth/me", Some(&token), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
    let (status, _) = send_json(&app, request("GET", "/api/auth/me", Some(&second), None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let (app, _) = app_with(Config::for_tests()).await;
    signup(&app, "dup@example.com").await;
    let body = json!({ "email": "DUP@example.com", "password": "another-password", "name": "Again" });
    let (status, _) = send_json(&app, request("POST", "/api/auth/signup", None, Some(body))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn signup_rejects_short_password_and_bad_email() {
    let (app, _) = app_with(Config::for_tests()).await;
    let short = json!({ "email": "a@example.com", "password": "short", "name": "A" });
    let (status, _) = send_json(&app, request("POST", "/api/auth/signup", None, Some(short))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bad = json!({ "email": "not-an-email", "password": "long-enough", "name": "A" });
    let (status, _) = send_json(&app, request("POST", "/api/auth/signup", None, Some(bad))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_password_gets_generic_401() {
    let (app, _) = app_with(Config::for_tests()).await;
    signup(&app, "eve@example.com").await;
    for login in [
        json!({ "email": "eve@example.com", "password": "wrong-password" }),
        json!({ "email": "nobody@example.com", "password": "hunter2hunter2" }),
    ] {
        let (status, body) = send_json(&app, request("POST", "/api/auth/login", None, Some(login))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid email or password");
    }
}

#[tokio::test]
async fn malformed_login_body_gets_generic_401() {
    let (app, _) = app_with(Config::for_tests()).await;
    for body in [r#"{"email":"x@y.z"}"#, "{not json", r#"{"email":1,"password":2}"#] {
        let (status, resp) =
            send_json(&app, raw_request("POST", "/api/auth/login", None, body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{body}");
        assert_eq!(resp, json!({ "error": "Invalid email or password" }));
    }
}

#[tokio::test]
async fn malformed_bodies_are_json_400s() {
    let (app, _, _) = app_with_upstream().await;
    let (status, resp) =
        send_json(&app, raw_request("POST", "/api/chat", None, r#"{"stream":false,"messages":"hi"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(resp["error"].as_str().is_some_and(|m| !m.is_empty()), "{resp}");

    let (status, resp) =
        send_json(&app, raw_request("POST", "/api/auth/signup", None, "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(resp["error"].is_string());

    let (token, _) = signup(&app, "m@example.com").await;
    for method in ["POST", "PUT"] {
        let (status, resp) = send_json(
            &app,
            raw_request(method, "/api/chat/history", Some(&token), r#"{"title":["x"]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{method}");
        assert!(resp["error"].is_string());
    }
}

// ── Chat history ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn history_requires_a_session() {
    let (app, _) = app_with(Config::for_tests()).await;
    let (status, body) = send_json(&app, request("GET", "/api/chat/history", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = send_json(&app, request("GET", "/api/chat/history", Some("bogus"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_requires_non_empty_messages() {
    let (app, _) = app_with(Config::for_tests()).await;
    let (token, _) = signup(&app, "c@example.com").await;

    for body in [json!({ "title": "x", "messages": [] }), json!({ "title": "x" })] {
        let (status, body) =
            send_json(&app, request("POST", "/api/chat/history", Some(&token), Some(body))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Messages array is required");
    }
}

#[tokio::test]
async fn create_defaults_title_and_lists_newest_first() {
    let (app, _) = app_with(Config::for_tests()).await;
    let (token, _) = signup(&app, "l@example.com").await;

    let body = json!({ "messages": [{ "role": "user", "content": "hi" }] });
    let (status, chat) = send_json(&app, request("POST", "/api/chat/history", Some(&token), Some(body))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(chat["title"], "New Chat");
    assert_eq!(chat["isActive"], true);
    assert!(chat["messages"][0]["id"].as_str().is_some());

    create_chat(&app, &token, "second").await;
    let newest = create_chat(&app, &token, "third").await;

    let (status, page) =
        send_json(&app, request("GET", "/api/chat/history?limit=2&offset=0", Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["chats"].as_array().unwrap().len(), 2);
    assert_eq!(page["chats"][0]["id"], newest["id"]);
    assert_eq!(page["pagination"]["total"], 3);
    assert_eq!(page["pagination"]["hasMore"], true);

    let (_, rest) =
        send_json(&app, request("GET", "/api/chat/history?limit=2&offset=2", Some(&token), None)).await;
    assert_eq!(rest["chats"].as_array().unwrap().len(), 1);
    assert_eq!(rest["pagination"]["hasMore"], false);
}

#[tokio::test]
async fn update_is_partial_and_requires_chat_id() {
    let (app, _) = app_with(Config::for_tests()).await;
    let (token, _) = signup(&app, "u@example.com").await;
    let chat = create_chat(&app, &token, "draft").await;

    let (status, _) = send_json(
        &app,
        request("PUT", "/api/chat/history", Some(&token), Some(json!({ "title": "x" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let patch = json!({ "chatId": chat["id"], "title": "renamed", "model": { "id": "openai/gpt-4o" } });
    let (status, updated) = send_json(&app, request("PUT", "/api/chat/history", Some(&token), Some(patch))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "renamed");
    assert_eq!(updated["model"]["id"], "openai/gpt-4o");
    assert_eq!(updated["messages"], chat["messages"]);
}

#[tokio::test]
async fn other_users_chats_are_not_found() {
    let (app, _) = app_with(Config::for_tests()).await;
    let (owner, _) = signup(&app, "owner@example.com").await;
    let (intruder, _) = signup(&app, "intruder@example.com").await;
    let chat = create_chat(&app, &owner, "private").await;
    let id = chat["id"].as_str().unwrap();

    let patch = json!({ "chatId": id, "title": "pwned" });
    let (status, body) = send_json(&app, request("PUT", "/api/chat/history", Some(&intruder), Some(patch))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.get("title").is_none());

    let uri = format!("/api/chat/history?chatId={id}");
    let (status, _) = send_json(&app, request("DELETE", &uri, Some(&intruder), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(&app, request("GET", &format!("/api/chat/history/{id}"), Some(&intruder), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, mine) = send_json(&app, request("GET", &format!("/api/chat/history/{id}"), Some(&owner), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["title"], "private");
    assert_eq!(mine["isActive"], true);
}

#[tokio::test]
async fn delete_archives_and_restore_brings_back() {
    let (app, state) = app_with(Config::for_tests()).await;
    let (token, user_id) = signup(&app, "d@example.com").await;
    let chat = create_chat(&app, &token, "old").await;
    let id = chat["id"].as_str().unwrap();

    let (status, _) = send_json(&app, request("DELETE", "/api/chat/history", Some(&token), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/chat/history?chatId={id}");
    let (status, body) = send_json(&app, request("DELETE", &uri, Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Chat deleted successfully");

    let (_, page) = send_json(&app, request("GET", "/api/chat/history", Some(&token), None)).await;
    assert!(page["chats"].as_array().unwrap().is_empty());
    let stored = state.store.get_chat(&user_id, id).await.unwrap().unwrap();
    assert!(!stored.is_active);

    let (_, archived) =
        send_json(&app, request("GET", "/api/chat/history?archived=true", Some(&token), None)).await;
    assert_eq!(archived["chats"][0]["id"], id);

    let restore = format!("/api/chat/history/{id}/restore");
    let (status, restored) = send_json(&app, request("POST", &restore, Some(&token), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored["isActive"], true);
    let (_, page) = send_json(&app, request("GET", "/api/chat/history", Some(&token), None)).await;
    assert_eq!(page["chats"].as_array().unwrap().len(), 1);
}

// ── Proxy ─────────────────────────────────────────────────────────────────────

fn chat_body(stream: bool) -> Value {
    json!({ "messages": [{ "role": "user", "content": "hi" }], "stream": stream })
}

#[tokio::test]
async fn proxy_without_key_is_a_500() {
    let (app, _) = app_with(Config::for_tests()).await;
    let (status, body) = send_json(&app, request("POST", "/api/chat", None, Some(chat_body(false)))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Upstream API key not configured");

    let (status, _) = send_json(&app, request("GET", "/api/models", None, None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn proxy_sends_defaults_and_attribution_headers() {
    let (app, _, up) = app_with_upstream().await;
    let (status, body) = send_json(&app, request("POST", "/api/chat", None, Some(chat_body(false)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["choices"][0]["message"]["content"], "Hello");

    let (headers, sent) = up.last_request();
    assert_eq!(headers[AUTHORIZATION], "Bearer test-key");
    assert_eq!(headers["http-referer"], "http://localhost:3000");
    assert_eq!(headers["x-title"], "FereeLAB Chat");
    assert_eq!(sent["model"], "openrouter/switchpoint-router");
    assert_eq!(sent["max_tokens"], 4000);
    assert!((sent["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    assert_eq!(sent["messages"][0]["role"], "user");
}

#[tokio::test]
async fn proxy_uses_model_max_tokens() {
    let (app, _, up) = app_with_upstream().await;
    let body = json!({
        "messages": [{ "role": "user", "content": "hi" }],
        "model": { "id": "openai/gpt-4o", "maxTokens": 1234, "provider": { "id": "openai", "name": "OpenAI" } }
    });
    let (status, _) = send_json(&app, request("POST", "/api/chat", None, Some(body))).await;
    assert_eq!(status, StatusCode::OK);
    let (_, sent) = up.last_request();
    assert_eq!(sent["model"], "openai/gpt-4o");
    assert_eq!(sent["max_tokens"], 1234);
}

#[tokio::test]
async fn proxy_rejects_out_of_range_sampling() {
    let (app, _, _) = app_with_upstream().await;
    let mut body = chat_body(false);
    body["temperature"] = json!(2.5);
    let (status, _) = send_json(&app, request("POST", "/api/chat", None, Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut body = chat_body(false);
    body["maxTokens"] = json!(0);
    let (status, _) = send_json(&app, request("POST", "/api/chat", None, Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upstream_error_keeps_its_status() {
    let (app, _, _) = app_with_upstream().await;
    let body = json!({ "messages": [{ "role": "user", "content": "hi" }], "model": { "id": "fail/model" } });
    let (status, body) = send_json(&app, request("POST", "/api/chat", None, Some(body))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["details"]["error"]["code"], 429);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn unreachable_upstream_is_a_502() {
    let mut config = Config::for_tests();
    config.upstream_api_key = Some("test-key".into());
    let (app, _) = app_with(config).await;
    let (status, body) = send_json(&app, request("POST", "/api/chat", None, Some(chat_body(false)))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Failed to reach upstream API");
}

#[tokio::test]
async fn anonymous_stream_is_relayed_verbatim() {
    let (app, _, _) = app_with_upstream().await;
    let (status, headers, body) = send(&app, request("POST", "/api/chat", None, Some(chat_body(true)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[CONTENT_TYPE], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache");
    assert!(headers.get(CHAT_ID_HEADER).is_none());
    assert_eq!(body, Bytes::from_static(STREAM_BODY.as_bytes()));
}

#[tokio::test]
async fn signed_in_stream_is_saved_under_announced_chat() {
    let (app, state, _) = app_with_upstream().await;
    let (token, user_id) = signup(&app, "s@example.com").await;

    let (status, headers, body) =
        send(&app, request("POST", "/api/chat", Some(&token), Some(chat_body(true)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Bytes::from_static(STREAM_BODY.as_bytes()));
    let chat_id = headers[CHAT_ID_HEADER].to_str().unwrap().to_owned();

    let chat = wait_for_chat(&state, &user_id, &chat_id).await;
    assert_eq!(chat.title, "hi");
    assert_eq!(chat.messages.len(), 2);
    assert_eq!(chat.messages[1].content, "Hello");
    assert_eq!(chat.messages[1].model.as_deref(), Some("openrouter/switchpoint-router"));
}

#[tokio::test]
async fn quick_follow_up_merges_but_new_topic_does_not() {
    let (app, state, _) = app_with_upstream().await;
    let (token, user_id) = signup(&app, "m@example.com").await;

    let (_, headers, _) = send(&app, request("POST", "/api/chat", Some(&token), Some(chat_body(false)))).await;
    let first = headers[CHAT_ID_HEADER].to_str().unwrap().to_owned();

    let follow_up = json!({ "messages": [
        { "role": "user", "content": "hi" },
        { "role": "assistant", "content": "Hello" },
        { "role": "user", "content": "tell me more" }
    ] });
    let (_, headers, _) = send(&app, request("POST", "/api/chat", Some(&token), Some(follow_up))).await;
    assert_eq!(headers[CHAT_ID_HEADER].to_str().unwrap(), first);
    let merged = state.store.get_chat(&user_id, &first).await.unwrap().unwrap();
    assert_eq!(merged.messages.len(), 4);

    let unrelated = json!({ "messages": [{ "role": "user", "content": "something else" }] });
    let (_, headers, _) = send(&app, request("POST", "/api/chat", Some(&token), Some(unrelated))).await;
    assert_ne!(headers[CHAT_ID_HEADER].to_str().unwrap(), first);
    assert_eq!(state.store.count_chats(&user_id, true).await.unwrap(), 2);
}

// ── Model catalog ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn models_are_reshaped_then_served_from_cache() {
    let (app, _, up) = app_with_upstream().await;

    let (status, fresh) = send_json(&app, request("GET", "/api/models", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fresh["cached"], false);
    assert!(fresh["cacheExpiry"].as_str().is_some());
    let gpt = &fresh["models"][0];
    assert_eq!(gpt["provider"]["id"], "openai");
    assert_eq!(gpt["maxTokens"], 128000);
    assert_eq!(gpt["context_length"], 128000);
    let bare = &fresh["models"][1];
    assert_eq!(bare["name"], "bare-model");
    assert_eq!(bare["context_length"], 4000);
    assert_eq!(bare["pricing"]["prompt"], "0");

    let (_, cached) = send_json(&app, request("GET", "/api/models", None, None)).await;
    assert_eq!(cached["cached"], true);
    assert!(cached.get("cacheExpiry").is_none());
    assert_eq!(cached["models"], fresh["models"]);
    assert_eq!(up.model_fetches.load(Ordering::SeqCst), 1);
}

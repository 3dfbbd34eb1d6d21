pub mod auth;
pub mod chat;
pub mod history;
pub mod models;

use std::sync::Arc;

use axum::Router;
use utoipa::OpenApi;

use crate::state::AppState;

/// Routes nested under `/api`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(chat::router())
        .merge(history::router())
        .merge(models::router())
        .merge(auth::router())
}

#[derive(OpenApi)]
#[openapi()]
pub struct Api;

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut doc = Api::openapi();
    doc.merge(chat::ChatApi::openapi());
    doc.merge(history::HistoryApi::openapi());
    doc.merge(models::ModelsApi::openapi());
    doc.merge(auth::AuthApi::openapi());
    doc
}

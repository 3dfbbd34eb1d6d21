use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::routes::{api, health};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(info(
    title = "fereelab-server",
    description = "FereeLAB chat API: upstream proxy, chat history, model catalog, accounts",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(api::api_docs());
    root
}

/// Serves the merged document at `/api-docs/openapi.json`.
pub fn router() -> Router<Arc<AppState>> {
    let doc = Arc::new(get_docs());
    Router::new().route(
        "/api-docs/openapi.json",
        get(move || {
            let doc = Arc::clone(&doc);
            async move { Json(doc.as_ref().clone()) }
        }),
    )
}

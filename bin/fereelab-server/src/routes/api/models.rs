//! `GET /api/models`: the upstream model catalog, cached in memory.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use tracing::info;
use utoipa::OpenApi;

use fereelab_types::{ErrorBody, ModelInfo, ModelPricing, ModelProvider, ModelsResponse};

use crate::error::ServerError;
use crate::services::catalog::reshape;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(list_models),
    components(schemas(ModelsResponse, ModelInfo, ModelPricing, ModelProvider))
)]
pub struct ModelsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/models", get(list_models))
}

/// The reshaped upstream model catalog, served from memory for a few hours
/// after each fetch.
#[utoipa::path(
    get,
    path = "/api/models",
    tag = "models",
    responses(
        (status = 200, description = "Model catalog", body = ModelsResponse),
        (status = 500, description = "Upstream API key not configured", body = ErrorBody),
    )
)]
pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ModelsResponse>, ServerError> {
    if !state.upstream.is_configured() {
        return Err(ServerError::UpstreamNotConfigured);
    }
    let now = Utc::now();
    if let Some(models) = state.models.get(now).await {
        return Ok(Json(ModelsResponse {
            models,
            cached: true,
            cache_expiry: None,
        }));
    }

    let models: Vec<ModelInfo> = state
        .upstream
        .list_models()
        .await?
        .into_iter()
        .filter_map(reshape)
        .collect();
    info!(count = models.len(), "fetched model catalog");
    let expiry = state.models.store(models.clone(), now).await;
    Ok(Json(ModelsResponse {
        models,
        cached: false,
        cache_expiry: Some(expiry),
    }))
}

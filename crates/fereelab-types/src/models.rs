//! Model catalog entries as served by `GET /api/models`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Model used when a request does not name one.
pub const DEFAULT_MODEL_ID: &str = "openrouter/switchpoint-router";

/// Per-token prices as decimal strings, exactly as upstream reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ModelPricing {
    pub prompt: String,
    pub completion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ModelProvider {
    pub id: String,
    pub name: String,
}

/// A catalog entry reshaped from upstream's model listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "context_length")]
    pub context_length: u64,
    pub pricing: ModelPricing,
    pub provider: ModelProvider,
    pub max_tokens: u64,
    pub input_price: f64,
    pub output_price: f64,
}

impl ModelInfo {
    /// Entry selected when the catalog cannot be loaded.
    pub fn fallback() -> Self {
        Self {
            id: DEFAULT_MODEL_ID.to_owned(),
            name: "Switchpoint Router".to_owned(),
            description: "Default model".to_owned(),
            context_length: 4000,
            pricing: ModelPricing {
                prompt: "0".to_owned(),
                completion: "0".to_owned(),
            },
            provider: ModelProvider {
                id: "switchpoint".to_owned(),
                name: "Switchpoint".to_owned(),
            },
            max_tokens: 4000,
            input_price: 0.0,
            output_price: 0.0,
        }
    }

    /// The reference stored with chats that use this model.
    pub fn to_ref(&self) -> crate::ModelRef {
        crate::ModelRef {
            id: self.id.clone(),
            name: Some(self.name.clone()),
            provider: Some(self.provider.name.clone()),
            max_tokens: u32::try_from(self.max_tokens).ok(),
        }
    }
}

/// Response body of `GET /api/models`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    /// `true` when served from the in-memory cache.
    #[serde(default)]
    pub cached: bool,
    /// When a freshly fetched catalog stops being served from cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_expiry: Option<DateTime<Utc>>,
}

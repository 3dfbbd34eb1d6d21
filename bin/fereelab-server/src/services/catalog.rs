//! Model catalog: reshaping upstream's listing and caching the result.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use fereelab_types::{ModelInfo, ModelPricing, ModelProvider};

const DEFAULT_CONTEXT_LENGTH: u64 = 4000;

#[derive(Debug, Default, Deserialize)]
struct RawModel {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    context_length: Option<u64>,
    #[serde(default)]
    pricing: Option<RawPricing>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPricing {
    #[serde(default)]
    prompt: Option<Value>,
    #[serde(default)]
    completion: Option<Value>,
}

/// Upstream reports prices as strings, but numbers are accepted too.
fn price_text(raw: Option<Value>) -> String {
    match raw {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => "0".to_owned(),
    }
}

/// Reshape one upstream model entry. Returns `None` for entries without an id.
pub fn reshape(raw: Value) -> Option<ModelInfo> {
    let raw: RawModel = match serde_json::from_value(raw) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "skipping malformed model entry");
            return None;
        }
    };
    if raw.id.is_empty() {
        return None;
    }

    let pricing = raw.pricing.unwrap_or_default();
    let prompt = price_text(pricing.prompt);
    let completion = price_text(pricing.completion);
    let context_length = raw
        .context_length
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_CONTEXT_LENGTH);
    let segment = raw.id.split('/').next().unwrap_or_default();
    let provider = if segment.is_empty() {
        ModelProvider {
            id: "unknown".to_owned(),
            name: "Unknown".to_owned(),
        }
    } else {
        ModelProvider {
            id: segment.to_owned(),
            name: segment.to_owned(),
        }
    };

    Some(ModelInfo {
        name: raw
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| raw.id.clone()),
        description: raw.description.unwrap_or_default(),
        context_length,
        input_price: prompt.parse().unwrap_or(0.0),
        output_price: completion.parse().unwrap_or(0.0),
        pricing: ModelPricing { prompt, completion },
        provider,
        max_tokens: context_length,
        id: raw.id,
    })
}

#[derive(Debug, Clone)]
struct Cached {
    models: Vec<ModelInfo>,
    expires_at: DateTime<Utc>,
}

/// Process-wide catalog cache with a fixed time-to-live.
#[derive(Debug)]
pub struct ModelCache {
    ttl: Duration,
    inner: RwLock<Option<Cached>>,
}

impl ModelCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: RwLock::new(None),
        }
    }

    /// The cached catalog if it has not yet expired at `now`.
    pub async fn get(&self, now: DateTime<Utc>) -> Option<Vec<ModelInfo>> {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            Some(cached) if cached.expires_at > now => Some(cached.models.clone()),
            Some(_) => {
                debug!("model catalog cache expired");
                None
            }
            None => None,
        }
    }

    /// Replace the cached catalog; returns when it expires.
    pub async fn store(&self, models: Vec<ModelInfo>, now: DateTime<Utc>) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::hours(3));
        let expires_at = now + ttl;
        *self.inner.write().await = Some(Cached { models, expires_at });
        expires_at
    }
}

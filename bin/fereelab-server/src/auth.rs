//! Password hashing, bearer tokens, and the authenticated-user extractors.
//!
//! Tokens are opaque random strings handed to the client once; only their
//! SHA-256 digest is stored, so a leaked database cannot be replayed.

use std::fmt::Write as _;
use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::db::{AuthSessionStore, UserRecord};
use crate::error::ServerError;
use crate::state::AppState;

/// Argon2id hash in PHC form. Runs on the blocking pool.
pub async fn hash_password(password: &str) -> Result<String, ServerError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ServerError::Internal(format!("password hashing failed: {e}")))
    })
    .await
    .map_err(|e| ServerError::Internal(format!("password hashing task failed: {e}")))?
}

/// `Ok(false)` for a wrong password and for an unparseable stored hash.
pub async fn verify_password(password: &str, stored: &str) -> Result<bool, ServerError> {
    let password = password.to_owned();
    let stored = stored.to_owned();
    tokio::task::spawn_blocking(move || match PasswordHash::new(&stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            debug!(error = %e, "stored password hash is not a PHC string");
            false
        }
    })
    .await
    .map_err(|e| ServerError::Internal(format!("password check task failed: {e}")))
}

/// A fresh bearer token (256 bits of randomness from two v4 UUIDs).
pub fn new_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Hex SHA-256 of a bearer token, as stored in `auth_sessions`.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

/// The raw token of an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn resolve_user(parts: &Parts, state: &AppState) -> Result<Option<UserRecord>, ServerError> {
    let Some(token) = bearer_token(&parts.headers) else {
        return Ok(None);
    };
    let user = state
        .store
        .find_session_user(&hash_token(token), Utc::now())
        .await?;
    Ok(user)
}

/// Extracts the caller's account; rejects with 401 when the request carries
/// no valid session token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserRecord);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        resolve_user(parts, state)
            .await?
            .map(AuthUser)
            .ok_or_else(|| ServerError::Unauthorized("Unauthorized".into()))
    }
}

/// Like [`AuthUser`] but anonymous callers are let through as `None`.
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<UserRecord>);

impl FromRequestParts<Arc<AppState>> for OptionalAuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        resolve_user(parts, state).await.map(OptionalAuthUser)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn password_round_trip() {
        let hash = hash_password("correct horse").await.unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash).await.unwrap());
        assert!(!verify_password("wrong horse", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string").await.unwrap());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn hashing_leaves_the_runtime_free() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::Relaxed);
                    tokio::task::yield_now().await;
                }
            })
        };
        let hash = hash_password("correct horse").await.unwrap();
        let during_hash = ticks.load(Ordering::Relaxed);
        assert!(verify_password("correct horse", &hash).await.unwrap());
        ticker.abort();
        assert!(during_hash > 0, "other tasks stalled while hashing");
    }

    #[test]
    fn token_hash_is_stable_hex() {
        let token = new_token();
        assert_eq!(token.len(), 64);
        let hashed = hash_token(&token);
        assert_eq!(hashed.len(), 64);
        assert_eq!(hashed, hash_token(&token));
        assert_ne!(hashed, token);
        assert!(hashed.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn bearer_prefix_is_required() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}

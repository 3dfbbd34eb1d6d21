//! Email / password accounts and bearer-token sessions.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::OpenApi;
use uuid::Uuid;
use validator::Validate;

use fereelab_types::{
    AuthProvider, AuthResponse, ErrorBody, LoginRequest, MessageBody, SignupRequest, UserProfile,
};

use crate::auth::{bearer_token, hash_password, hash_token, new_token, verify_password, AuthUser};
use crate::db::{AuthSessionRecord, AuthSessionStore, UserRecord, UserStore};
use crate::error::ServerError;
use crate::extract::ApiJson;
use crate::state::AppState;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(OpenApi)]
#[openapi(
    paths(signup, login, logout, me),
    components(schemas(SignupRequest, LoginRequest, AuthResponse, UserProfile, AuthProvider))
)]
pub struct AuthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

#[derive(Debug, Deserialize, Validate)]
struct SignupForm {
    #[validate(email(message = "a valid email address is required"))]
    email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    password: String,
    #[validate(length(min = 1, max = 100, message = "name is required"))]
    name: String,
}

#[derive(Debug, Deserialize, Validate)]
struct LoginForm {
    #[validate(length(min = 1))]
    email: String,
    #[validate(length(min = 1))]
    password: String,
}

/// Create a session for `user` and build the signup / login response.
async fn issue_session(state: &AppState, user: &UserRecord) -> Result<AuthResponse, ServerError> {
    let token = new_token();
    let now = Utc::now();
    let ttl = chrono::Duration::from_std(state.config.session_ttl)
        .map_err(|e| ServerError::Internal(format!("session ttl out of range: {e}")))?;
    let expires_at = now + ttl;
    state
        .store
        .insert_auth_session(AuthSessionRecord {
            token_hash: hash_token(&token),
            user_id: user.id.clone(),
            created_at: now,
            expires_at,
        })
        .await?;
    Ok(AuthResponse {
        token,
        expires_at,
        user: user.to_profile(),
    })
}

#[utoipa::path(
    post,
    path = "/api/auth/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created and signed in", body = AuthResponse),
        (status = 400, description = "Invalid email, name, or password", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    )
)]
async fn signup(
    State(state): State<Arc<AppState>>,
    ApiJson(form): ApiJson<SignupForm>,
) -> Result<(StatusCode, Json<AuthResponse>), ServerError> {
    form.validate()?;
    let email = form.email.trim().to_lowercase();
    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ServerError::Conflict("Email already registered".into()));
    }

    let now = Utc::now();
    let user = UserRecord {
        id: Uuid::new_v4().to_string(),
        email,
        name: form.name.trim().to_owned(),
        password_hash: Some(hash_password(&form.password).await?),
        image: None,
        provider: AuthProvider::Credentials,
        provider_id: None,
        email_verified: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    // The unique index still catches a concurrent signup with this email.
    if let Err(e) = state.store.insert_user(user.clone()).await {
        if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
            return Err(ServerError::Conflict("Email already registered".into()));
        }
        return Err(e.into());
    }
    info!(user_id = %user.id, "account created");

    let resp = issue_session(&state, &user).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid email or password", body = ErrorBody),
    )
)]
async fn login(
    State(state): State<Arc<AppState>>,
    form: Result<Json<LoginForm>, JsonRejection>,
) -> Result<Json<AuthResponse>, ServerError> {
    let Ok(Json(form)) = form else {
        return Err(ServerError::Unauthorized(INVALID_CREDENTIALS.into()));
    };
    if form.validate().is_err() {
        return Err(ServerError::Unauthorized(INVALID_CREDENTIALS.into()));
    }
    let email = form.email.trim().to_lowercase();
    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ServerError::Unauthorized(INVALID_CREDENTIALS.into()))?;

    let verified = match user.password_hash.as_deref() {
        Some(hash) => verify_password(&form.password, hash).await?,
        None => false,
    };
    if !verified {
        warn!(user_id = %user.id, "failed login attempt");
        return Err(ServerError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let resp = issue_session(&state, &user).await?;
    info!(user_id = %user.id, "signed in");
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    responses((status = 200, description = "Session revoked", body = MessageBody))
)]
async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MessageBody>, ServerError> {
    if let Some(token) = bearer_token(&headers) {
        state.store.delete_auth_session(&hash_token(token)).await?;
    }
    let purged = state.store.purge_expired_sessions(Utc::now()).await?;
    if purged > 0 {
        info!(purged, "removed expired sessions");
    }
    Ok(Json(MessageBody {
        message: "Logged out successfully".into(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "The signed-in user", body = UserProfile),
        (status = 401, description = "Not signed in", body = ErrorBody),
    )
)]
async fn me(AuthUser(user): AuthUser) -> Json<UserProfile> {
    Json(user.to_profile())
}

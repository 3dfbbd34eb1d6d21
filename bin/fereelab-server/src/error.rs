//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code.
//!
//! Internal errors (database, transport) are logged with full detail but
//! only a generic message is returned to the caller. Upstream API errors
//! keep the upstream status code and payload so clients can see why the
//! model provider refused the request.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fereelab_types::ErrorBody;
use thiserror::Error;
use tracing::error;

/// All errors that can occur in the fereelab-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the SQLite store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The caller referenced a resource that does not exist (or is not theirs).
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing, unknown, or expired credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The request conflicts with existing state (e.g. duplicate email).
    #[error("conflict: {0}")]
    Conflict(String),

    /// No upstream API key is configured.
    #[error("upstream API key not configured")]
    UpstreamNotConfigured,

    /// Upstream answered with a non-success status.
    #[error("upstream returned {status}: {message}")]
    Upstream {
        status: StatusCode,
        message: String,
        details: serde_json::Value,
    },

    /// Upstream could not be reached or its response could not be read.
    #[error("upstream transport error: {0}")]
    UpstreamTransport(#[from] reqwest::Error),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message, details) = match self {
            // Client-facing errors: expose the message directly.
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m, None),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, None),
            ServerError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m, None),
            ServerError::Conflict(m) => (StatusCode::CONFLICT, m, None),
            ServerError::UpstreamNotConfigured => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Upstream API key not configured".to_owned(),
                None,
            ),
            ServerError::Upstream {
                status,
                message,
                details,
            } => (status, message, Some(details)),

            // Internal errors: log the full detail, return a generic message.
            ServerError::UpstreamTransport(e) => {
                error!(error = %e, "upstream transport error");
                (
                    StatusCode::BAD_GATEWAY,
                    "Failed to reach upstream API".to_owned(),
                    None,
                )
            }
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_owned(),
                    None,
                )
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_owned(),
                    None,
                )
            }
        };
        let body = ErrorBody {
            error: client_message,
            details,
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        // Keep the whole chain in the logs; clients only see a generic message.
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}

impl From<validator::ValidationErrors> for ServerError {
    fn from(e: validator::ValidationErrors) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

impl From<JsonRejection> for ServerError {
    fn from(e: JsonRejection) -> Self {
        ServerError::BadRequest(e.body_text())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(e: serde_json::Error) -> Self {
        ServerError::Internal(format!("json: {e}"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn upstream_error_keeps_status_and_details() {
        let resp = ServerError::Upstream {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "Failed to get response from upstream".into(),
            details: serde_json::json!({ "error": { "code": 429 } }),
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(resp).await;
        assert_eq!(body["details"]["error"]["code"], 429);
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_detail() {
        let resp = ServerError::Internal("disk path /var/secret".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["error"], "Internal server error");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn json_rejection_becomes_bad_request_body() {
        use axum::extract::FromRequest;

        let req = axum::http::Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();
        let rejection = Json::<serde_json::Value>::from_request(req, &())
            .await
            .unwrap_err();
        let resp = ServerError::from(rejection).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert!(body["error"].as_str().is_some_and(|m| !m.is_empty()));
    }

    #[tokio::test]
    async fn missing_key_is_a_500_with_message() {
        let resp = ServerError::UpstreamNotConfigured.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(resp).await["error"], "Upstream API key not configured");
    }
}

//! Unified error handling for the auth API.
//!
//! Every failure in the auth core ends up as an [`ApiError`], which renders
//! itself as a status code plus a short JSON body. Internal detail is logged
//! server-side and never echoed to the client beyond its category.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::jwt::TokenError;
use crate::store::StoreError;

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Unified error type for API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    /// Token failed structural, signature, expiry or algorithm checks
    #[error("Authentication failed: {0}")]
    Token(#[from] TokenError),

    /// A refresh token where an access token was expected, or vice versa
    #[error("Invalid token type")]
    WrongTokenType,

    /// Unknown email or wrong password; the two are indistinguishable
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Please verify your email before logging in")]
    EmailNotVerified,

    /// No authenticated context where one is required
    #[error("{0}")]
    Unauthenticated(String),

    /// Provider data could not be mapped onto a local identity
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Request body was not the JSON the handler expects
    #[error("Invalid request body")]
    InvalidBody(#[from] JsonRejection),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ApiError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ApiError::Unauthenticated(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        ApiError::NotFound(resource.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Token(_)
            | ApiError::WrongTokenType
            | ApiError::InvalidCredentials
            | ApiError::EmailNotVerified
            | ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) | ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ReconciliationFailed(_)
            | ApiError::Store(_)
            | ApiError::Internal(_)
            | ApiError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Parser detail describes the caller's own input, so it is safe to echo.
        let details = match &self {
            ApiError::InvalidBody(rejection) => Some(rejection.body_text()),
            _ => None,
        };
        let error_message = match &self {
            ApiError::Token(e) => {
                tracing::warn!("Rejected token: {}", e);
                self.to_string()
            }
            ApiError::WrongTokenType => {
                tracing::warn!("Rejected token: wrong token type");
                self.to_string()
            }
            ApiError::Store(e) => {
                tracing::error!("Storage error: {:?}", e);
                "Internal server error".to_string()
            }
            ApiError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                "Internal server error".to_string()
            }
            ApiError::ReconciliationFailed(msg) => {
                tracing::error!("Reconciliation failed: {}", msg);
                "Internal server error".to_string()
            }
            ApiError::Config(msg) => {
                tracing::error!("Configuration error: {}", msg);
                "Server configuration error".to_string()
            }
            ApiError::NotFound(_)
            | ApiError::InvalidCredentials
            | ApiError::EmailNotVerified
            | ApiError::Unauthenticated(_)
            | ApiError::InvalidBody(_) => self.to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Token(TokenError::Expired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::WrongTokenType.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::EmailNotVerified.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::bad_request("nope").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_token_errors_name_only_the_category() {
        let body = body_json(ApiError::Token(TokenError::InvalidSignature).into_response()).await;
        assert_eq!(body["error"], "Authentication failed: invalid signature");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_internal_errors_do_not_leak_detail() {
        let response = ApiError::Internal(anyhow::anyhow!("db password is hunter2")).into_response();
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
        assert!(!body.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn test_json_rejection_carries_details() {
        let request = axum::http::Request::builder()
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();
        let rejection = <Json<serde_json::Value> as axum::extract::FromRequest<()>>::from_request(
            request,
            &(),
        )
        .await
        .unwrap_err();

        let response = ApiError::from(rejection).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Invalid request body");
        assert!(body["details"].as_str().is_some_and(|d| !d.is_empty()));
    }

    #[tokio::test]
    async fn test_bad_request_uses_message_verbatim() {
        let body = body_json(ApiError::bad_request("Passwords do not match").into_response()).await;
        assert_eq!(body["error"], "Passwords do not match");
    }
}

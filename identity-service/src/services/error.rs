use service_core::error::AppError;
use std::fmt;
use thiserror::Error;

/// Which credential pair failed; rendered without naming the wrong field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Password,
    ServiceAccount,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::Password => f.write_str("invalid username or password"),
            CredentialKind::ServiceAccount => f.write_str("invalid key or secret"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("{0}")]
    InvalidCredentials(CredentialKind),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("grant_type invalid")]
    InvalidGrantType,

    #[error("scope invalid")]
    InvalidScope,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("mfa disabled")]
    MfaDisabled,

    #[error("mfa code invalid")]
    MfaInvalid,

    #[error("Unsupported mfa factor: {0}")]
    UnsupportedMfaFactor(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already taken")]
    Conflict(&'static str),

    #[error("Passkey ceremony failed: {0}")]
    Passkey(#[from] webauthn_rs::prelude::WebauthnError),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::anyhow!(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials(kind) => {
                AppError::Unauthorized(anyhow::anyhow!(kind.to_string()))
            }
            ServiceError::InvalidToken(reason) => {
                tracing::debug!(reason = %reason, "Token rejected");
                AppError::Unauthorized(anyhow::anyhow!("invalid token"))
            }
            ServiceError::InvalidGrantType => AppError::BadRequest(anyhow::anyhow!("grant_type invalid")),
            ServiceError::InvalidScope => AppError::BadRequest(anyhow::anyhow!("scope invalid")),
            ServiceError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ServiceError::MfaDisabled => AppError::Forbidden(anyhow::anyhow!("mfa disabled")),
            ServiceError::MfaInvalid => AppError::Forbidden(anyhow::anyhow!("mfa code invalid")),
            ServiceError::UnsupportedMfaFactor(kind) => {
                AppError::InternalError(anyhow::anyhow!("Unsupported mfa factor: {}", kind))
            }
            ServiceError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            ServiceError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            ServiceError::Conflict(what) => AppError::Conflict(anyhow::anyhow!("{} already taken", what)),
            ServiceError::Passkey(e) => {
                tracing::warn!(error = %e, "Passkey ceremony rejected");
                AppError::BadRequest(anyhow::anyhow!("passkey ceremony failed"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::to_bytes,
        http::StatusCode,
        response::IntoResponse,
    };

    async fn render(err: ServiceError) -> (StatusCode, serde_json::Value) {
        let response = AppError::from(err).into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_token_failures_hide_the_reason() {
        let (status, body) = render(ServiceError::InvalidToken(
            "InvalidSignature".to_string(),
        ))
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, serde_json::json!({"error": "invalid token"}));
    }

    #[tokio::test]
    async fn test_credential_failures_name_no_field() {
        let (status, body) =
            render(ServiceError::InvalidCredentials(CredentialKind::Password)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid username or password");
    }

    #[tokio::test]
    async fn test_conflict_is_409() {
        let (status, body) = render(ServiceError::Conflict("username")).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "username already taken");
    }
}

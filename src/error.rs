//! Authentication Error Types
//!
//! Centralized error taxonomy for all authentication operations.
//!
//! Cryptographic verification failures never surface here directly: token
//! verification reports `None` and the orchestrator translates that into
//! [`AuthError::InvalidToken`] exactly once. Store and hashing failures map
//! to 500-class variants with generic client-facing messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Authentication errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Deliberately covers both unknown-email and wrong-password so callers
    /// cannot enumerate accounts.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Session not found or expired")]
    SessionNotFound,

    #[error("Refresh token already used")]
    TokenReplay,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Password hashing failed")]
    Hashing,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error")]
    Internal,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AuthError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "validation_error", msg.clone())
            }
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                self.to_string(),
            ),
            AuthError::AccountDisabled => {
                (StatusCode::FORBIDDEN, "account_disabled", self.to_string())
            }
            AuthError::InvalidToken => {
                (StatusCode::UNAUTHORIZED, "invalid_token", self.to_string())
            }
            AuthError::SessionNotFound => (
                StatusCode::UNAUTHORIZED,
                "session_not_found",
                self.to_string(),
            ),
            AuthError::TokenReplay => {
                (StatusCode::UNAUTHORIZED, "token_replay", self.to_string())
            }
            AuthError::EmailTaken => (StatusCode::CONFLICT, "email_taken", self.to_string()),
            AuthError::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                msg.clone(),
            ),
            AuthError::Hashing | AuthError::Database(_) | AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        (
            status,
            Json(serde_json::json!({
                "error": error_code,
                "message": message
            })),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // Unique-constraint violation on users.email
            if db_err.code().as_deref() == Some("23505") {
                return AuthError::EmailTaken;
            }
        }
        tracing::error!("Database error: {:?}", err);
        AuthError::Database(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        tracing::error!("Password hashing error: {:?}", err);
        AuthError::Hashing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_error_does_not_reveal_which_field_failed() {
        let msg = AuthError::InvalidCredentials.to_string();
        assert!(!msg.to_lowercase().contains("account"));
        assert!(!msg.to_lowercase().contains("not found"));
    }

    #[test]
    fn internal_variants_share_a_generic_response() {
        for err in [
            AuthError::Hashing,
            AuthError::Database("connection reset".into()),
            AuthError::Internal,
        ] {
            let response = err.into_response();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
}

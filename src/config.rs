//! Authentication Configuration
//!
//! All configuration values are loaded from environment variables. Both
//! signing secrets are required: there is no fallback secret, and
//! [`AuthConfig::validate`] refuses a production deployment with missing,
//! short, or identical secrets.

use crate::error::AuthError;
use std::env;

/// Deployment environment, controls the `Secure` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Authentication configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Deployment environment (from APP_ENV, "production" or anything else)
    pub environment: Environment,

    /// Secret for signing access tokens (from AUTH_ACCESS_SECRET env var)
    pub access_secret: String,

    /// Secret for signing refresh tokens (from AUTH_REFRESH_SECRET env var).
    /// Must differ from the access secret so compromise of one cannot forge
    /// the other token kind.
    pub refresh_secret: String,

    /// JWT issuer claim (from AUTH_ISSUER env var)
    pub issuer: String,

    /// JWT audience claim (from AUTH_AUDIENCE env var)
    pub audience: String,

    /// Access token lifetime in seconds (from AUTH_ACCESS_TTL env var)
    pub access_ttl: i64,

    /// Refresh token lifetime in seconds (from AUTH_REFRESH_TTL env var)
    pub refresh_ttl: i64,

    /// Refresh token lifetime under "remember me" in seconds
    /// (from AUTH_REMEMBER_TTL env var)
    pub remember_ttl: i64,

    /// Maximum concurrently valid sessions per user (from AUTH_MAX_SESSIONS)
    pub max_sessions_per_user: usize,

    /// Argon2 memory cost in KiB (from ARGON2_MEMORY_COST env var)
    pub argon2_memory_cost: u32,

    /// Argon2 time cost (iterations) (from ARGON2_TIME_COST env var)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (from ARGON2_PARALLELISM env var)
    pub argon2_parallelism: u32,
}

impl AuthConfig {
    /// Load configuration from environment variables.
    ///
    /// Errors when either signing secret is absent; secrets have no default
    /// in any environment.
    pub fn from_env() -> Result<Self, AuthError> {
        let access_secret = env::var("AUTH_ACCESS_SECRET")
            .map_err(|_| AuthError::Config("AUTH_ACCESS_SECRET must be set".to_string()))?;
        let refresh_secret = env::var("AUTH_REFRESH_SECRET")
            .map_err(|_| AuthError::Config("AUTH_REFRESH_SECRET must be set".to_string()))?;

        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        };

        Ok(Self {
            environment,
            access_secret,
            refresh_secret,

            issuer: env::var("AUTH_ISSUER").unwrap_or_else(|_| "autoassist".to_string()),

            audience: env::var("AUTH_AUDIENCE").unwrap_or_else(|_| "autoassist-users".to_string()),

            access_ttl: env::var("AUTH_ACCESS_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(900), // 15 minutes

            refresh_ttl: env::var("AUTH_REFRESH_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(604_800), // 7 days

            remember_ttl: env::var("AUTH_REMEMBER_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2_592_000), // 30 days

            max_sessions_per_user: env::var("AUTH_MAX_SESSIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),

            argon2_memory_cost: env::var("ARGON2_MEMORY_COST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(65536), // 64 MiB

            argon2_time_cost: env::var("ARGON2_TIME_COST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),

            argon2_parallelism: env::var("ARGON2_PARALLELISM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4),
        })
    }

    /// Validate the configuration. Called once at process start; a failure
    /// here must abort startup.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.access_secret.len() < 32 {
            return Err(AuthError::Config(
                "AUTH_ACCESS_SECRET must be at least 32 characters".to_string(),
            ));
        }

        if self.refresh_secret.len() < 32 {
            return Err(AuthError::Config(
                "AUTH_REFRESH_SECRET must be at least 32 characters".to_string(),
            ));
        }

        if self.access_secret == self.refresh_secret {
            return Err(AuthError::Config(
                "AUTH_ACCESS_SECRET and AUTH_REFRESH_SECRET must be distinct".to_string(),
            ));
        }

        if self.access_ttl <= 0 {
            return Err(AuthError::Config(
                "AUTH_ACCESS_TTL must be positive".to_string(),
            ));
        }

        if self.refresh_ttl <= self.access_ttl {
            return Err(AuthError::Config(
                "AUTH_REFRESH_TTL must be greater than AUTH_ACCESS_TTL".to_string(),
            ));
        }

        if self.remember_ttl < self.refresh_ttl {
            return Err(AuthError::Config(
                "AUTH_REMEMBER_TTL must be at least AUTH_REFRESH_TTL".to_string(),
            ));
        }

        if self.max_sessions_per_user == 0 {
            return Err(AuthError::Config(
                "AUTH_MAX_SESSIONS must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AuthConfig {
    AuthConfig {
        environment: Environment::Development,
        access_secret: "a".repeat(32),
        refresh_secret: "b".repeat(32),
        issuer: "autoassist".to_string(),
        audience: "autoassist-users".to_string(),
        access_ttl: 900,
        refresh_ttl: 604_800,
        remember_ttl: 2_592_000,
        max_sessions_per_user: 5,
        argon2_memory_cost: 1024,
        argon2_time_cost: 1,
        argon2_parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_short_secret() {
        let config = AuthConfig {
            access_secret: "short".to_string(),
            ..test_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_identical_secrets() {
        let config = AuthConfig {
            refresh_secret: "a".repeat(32),
            ..test_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_refresh_ttl_below_access() {
        let config = AuthConfig {
            access_ttl: 604_800,
            refresh_ttl: 900,
            ..test_config()
        };
        assert!(config.validate().is_err());
    }
}

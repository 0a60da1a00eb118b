//! AutoAssist Authentication Core
//!
//! Issuance, verification, and rotation of signed access/refresh token
//! pairs, persistent session tracking with a per-user concurrency ceiling,
//! and declarative route-level role gating.
//!
//! - Access tokens live 15 minutes, refresh tokens 7 days; each kind is
//!   signed with its own secret.
//! - The refresh JWT doubles as the session's store key and is rotated on
//!   every successful refresh; presenting a rotated-away value is treated
//!   as credential theft and revokes the account's sessions.
//! - At most five sessions may be valid per user; a sixth login evicts the
//!   oldest.
//!
//! # Configuration
//!
//! Loaded from environment variables, validated at startup:
//! - `AUTH_ACCESS_SECRET` / `AUTH_REFRESH_SECRET` - distinct signing
//!   secrets, required, min 32 chars each
//! - `AUTH_ISSUER` / `AUTH_AUDIENCE` - claim values (default "autoassist" /
//!   "autoassist-users")
//! - `AUTH_ACCESS_TTL` / `AUTH_REFRESH_TTL` / `AUTH_REMEMBER_TTL` -
//!   lifetimes in seconds (defaults 900 / 604800 / 2592000)
//! - `AUTH_MAX_SESSIONS` - per-user session cap (default 5)
//! - `APP_ENV` - "production" enables the `Secure` cookie attribute
//!
//! # Usage
//!
//! ```rust,ignore
//! use autoassist_auth::{AuthConfig, AuthService, PgSessionStore, PgUserStore};
//! use std::sync::Arc;
//!
//! let config = AuthConfig::from_env()?;
//! let sessions = Arc::new(PgSessionStore::new(pool.clone()));
//! sessions.run_migrations().await?;
//! let users = Arc::new(PgUserStore::new(pool));
//! let auth = Arc::new(AuthService::new(config, users, sessions)?);
//! let app = autoassist_auth::create_routes(auth);
//! ```

pub mod config;
pub mod cookies;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod password;
pub mod service;
pub mod session;
pub mod token;
pub mod users;

// Re-export commonly used types
pub use config::{AuthConfig, Environment};
pub use error::AuthError;
pub use extractors::{AuthUser, ClientInfo};
pub use handlers::{create_routes, create_routes_with_table, AuthState};
pub use middleware::{Identity, RouteDecision, RouteGuard, RouteTable};
pub use models::*;
pub use password::{PasswordService, PasswordStrength};
pub use service::{AuthService, ClientMeta};
pub use session::{
    MemorySessionStore, NewSession, PgSessionStore, RotateOutcome, SessionStore,
};
pub use token::TokenService;
pub use users::{MemoryUserStore, PgUserStore, UserStore};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::models::{default_preferences, Session, User, UserRole};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    pub fn test_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "driver@example.com".to_string(),
            password_hash: "$argon2id$v=19$m=1024,t=1,p=1$c2FsdHNhbHQ$AAAAAAAAAAA".to_string(),
            name: "Avery Driver".to_string(),
            role: UserRole::User,
            is_active: true,
            preferences: default_preferences(),
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn test_session(token: &str) -> Session {
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            family: Uuid::new_v4(),
            refresh_token: token.to_string(),
            rotated_from: None,
            rotated_to: None,
            user_agent: Some("test-agent".to_string()),
            ip_address: None,
            is_valid: true,
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(7),
        }
    }
}

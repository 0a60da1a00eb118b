//! Authentication Models
//!
//! Data structures for authentication requests, responses, database
//! entities, and JWT claims.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

// ============================================
// Database Entities
// ============================================

/// User role enum matching database type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Moderator,
    Admin,
}

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }

    pub fn can_moderate(&self) -> bool {
        matches!(self, UserRole::Moderator | UserRole::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Moderator => "moderator",
            UserRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User entity from the user store.
///
/// The user store is an external collaborator; this crate only reads users
/// and touches `last_login_at`/`updated_at` and the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub preferences: serde_json::Value,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A disabled user must never receive a token pair.
    pub fn can_login(&self) -> bool {
        self.is_active
    }
}

/// Fields needed to create a user row
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: UserRole,
    pub preferences: serde_json::Value,
}

/// Default preference block attached at signup.
pub fn default_preferences() -> serde_json::Value {
    serde_json::json!({
        "theme": "system",
        "notifications": true,
        "language": "en"
    })
}

/// One authenticated device/browser.
///
/// Each rotation retires the current row as a tombstone (`rotated_to` set,
/// `is_valid` cleared) and inserts a successor row in the same `family`.
/// Tombstones persist for the token's 7-day window, so presenting any
/// ancestor value in the chain resolves to that family and is recognizable
/// as a replay.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Shared by every row in one rotation chain; assigned at login.
    pub family: Uuid,
    pub refresh_token: String,
    pub rotated_from: Option<String>,
    /// Set on the tombstone when this row's token is rotated away. A dead
    /// row without it was logged out or evicted, not rotated.
    pub rotated_to: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub is_valid: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Valid flag set and not past `expires_at`.
    pub fn is_live(&self) -> bool {
        self.is_valid && !self.is_expired()
    }
}

// ============================================
// JWT Claims
// ============================================

/// Token kind discriminator; an access-typed token presented where a
/// refresh token is expected must be rejected regardless of signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    /// User email
    pub email: String,
    /// User role
    pub role: UserRole,
    /// Token kind
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// Unique token id; two tokens minted in the same second must still be
    /// distinct, since the refresh value doubles as the session key.
    pub jti: Uuid,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Expiration (seconds since epoch)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
}

/// An access/refresh token pair, always minted together.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Claims input for token issuance.
#[derive(Debug, Clone)]
pub struct UserClaims {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl From<&User> for UserClaims {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

// ============================================
// Request DTOs
// ============================================

/// Login request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    #[serde(default)]
    pub remember_me: bool,
}

/// Signup request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

/// Refresh request; the token normally arrives via cookie, the body field
/// is a fallback for non-browser clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Logout request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub all_devices: bool,
}

// ============================================
// Response DTOs
// ============================================

/// Public user data with the password hash stripped
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub is_active: bool,
    pub preferences: serde_json::Value,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for SanitizedUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            is_active: user.is_active,
            preferences: user.preferences,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

/// Authentication response with the minted token pair
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub user: SanitizedUser,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Simple message response
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

//! Session Store
//!
//! Persistent record of active refresh-token sessions, keyed by the
//! refresh-token value itself. One abstraction so the backing store is
//! swappable; [`postgres::PgSessionStore`] is the durable backend and
//! [`memory::MemorySessionStore`] backs tests and embedded use.

pub mod memory;
pub mod postgres;

use crate::error::AuthError;
use crate::models::Session;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use memory::MemorySessionStore;
pub use postgres::PgSessionStore;

/// Fields for a new session row. The refresh token is the signed JWT from
/// the token service, not a separate random value.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub refresh_token: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Result of a rotation attempt.
#[derive(Debug, Clone)]
pub enum RotateOutcome {
    /// Old value was live; the session now carries the new token value.
    Rotated(Session),
    /// Old value was rotated away at some earlier point in its chain - a
    /// theft signal. The store has revoked the whole rotation family; the
    /// caller should revoke the rest of the user's sessions.
    Replay { user_id: Uuid },
    /// Old value is unknown, expired, or explicitly invalidated.
    NotFound,
}

/// Durable session tracking per §"one refresh token, one session".
///
/// All methods are I/O suspension points; callers must not hold locks
/// across them.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new valid session, enforcing the per-user cap in the same
    /// atomic step: while the user already holds `max` or more live
    /// sessions, the oldest (by `created_at`) are evicted so the insert
    /// leaves at most `max` live. Two concurrent calls at `max - 1` live
    /// sessions must not jointly exceed the cap.
    async fn create(&self, new: NewSession, max: usize) -> Result<Session, AuthError>;

    /// Look up a live session by refresh-token value.
    async fn get(&self, refresh_token: &str) -> Result<Option<Session>, AuthError>;

    /// Atomically retire the live session keyed by `old_token` and insert
    /// its successor keyed by `new_token` in the same family. Exactly one
    /// of two concurrent calls with the same `old_token` can win; any
    /// later presentation of a retired value observes a replay.
    async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RotateOutcome, AuthError>;

    /// Invalidate the single session keyed by `refresh_token`.
    /// Returns false when no live session matched.
    async fn invalidate(&self, refresh_token: &str) -> Result<bool, AuthError>;

    /// Invalidate every valid session for a user (logout-all, password
    /// change, account disable). Returns the number revoked.
    async fn invalidate_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthError>;
}

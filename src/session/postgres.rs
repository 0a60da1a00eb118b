//! Postgres session store.
//!
//! Cap enforcement and insertion run in one transaction under a per-user
//! advisory lock, so parallel logins for the same user serialize and can
//! never jointly exceed the cap. Rotation retires the old row as a
//! tombstone and inserts its successor in the same transaction; the
//! conditional tombstone update is the winner-selection step for
//! concurrent refreshes.

use super::{NewSession, RotateOutcome, SessionStore};
use crate::error::AuthError;
use crate::models::Session;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Session store backed by a `sessions` table.
pub struct PgSessionStore {
    db: PgPool,
}

impl PgSessionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create the sessions table and its indexes.
    pub async fn run_migrations(&self) -> Result<(), AuthError> {
        tracing::info!("Running session store migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id UUID NOT NULL,
                family UUID NOT NULL,
                refresh_token TEXT NOT NULL UNIQUE,
                rotated_from TEXT,
                rotated_to TEXT,
                user_agent TEXT,
                ip_address VARCHAR(45),
                is_valid BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                expires_at TIMESTAMPTZ NOT NULL
            );
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);")
            .execute(&self.db)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_family ON sessions(family);")
            .execute(&self.db)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, new: NewSession, max: usize) -> Result<Session, AuthError> {
        let mut tx = self.db.begin().await?;

        // Serialize logins per user for the rest of the transaction;
        // row locks alone cannot stop two transactions from both
        // counting "room for one more" and inserting.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(new.user_id)
            .execute(&mut *tx)
            .await?;

        let live: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM sessions
            WHERE user_id = $1 AND is_valid = TRUE AND expires_at > NOW()
            ORDER BY created_at ASC
            "#,
        )
        .bind(new.user_id)
        .fetch_all(&mut *tx)
        .await?;

        if live.len() >= max {
            let evict: Vec<Uuid> = live
                .iter()
                .take(live.len() - (max - 1))
                .map(|(id,)| *id)
                .collect();

            sqlx::query("UPDATE sessions SET is_valid = FALSE WHERE id = ANY($1)")
                .bind(&evict)
                .execute(&mut *tx)
                .await?;

            tracing::info!(
                user_id = %new.user_id,
                evicted = evict.len(),
                "Evicted sessions over per-user cap"
            );
        }

        let session: Session = sqlx::query_as(
            r#"
            INSERT INTO sessions (user_id, family, refresh_token, user_agent, ip_address, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(Uuid::new_v4())
        .bind(&new.refresh_token)
        .bind(&new.user_agent)
        .bind(&new.ip_address)
        .bind(new.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(session)
    }

    async fn get(&self, refresh_token: &str) -> Result<Option<Session>, AuthError> {
        let session = sqlx::query_as(
            r#"
            SELECT * FROM sessions
            WHERE refresh_token = $1 AND is_valid = TRUE AND expires_at > NOW()
            "#,
        )
        .bind(refresh_token)
        .fetch_optional(&self.db)
        .await?;

        Ok(session)
    }

    async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RotateOutcome, AuthError> {
        let mut tx = self.db.begin().await?;

        // Winner selection: only a live, not-yet-rotated row matches, so
        // concurrent rotations with the same token retire it exactly once.
        let retired: Option<Session> = sqlx::query_as(
            r#"
            UPDATE sessions
            SET is_valid = FALSE, rotated_to = $2
            WHERE refresh_token = $1 AND is_valid = TRUE AND expires_at > NOW()
            RETURNING *
            "#,
        )
        .bind(old_token)
        .bind(new_token)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(old) = retired {
            let successor: Session = sqlx::query_as(
                r#"
                INSERT INTO sessions
                    (user_id, family, refresh_token, rotated_from, user_agent, ip_address, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(old.user_id)
            .bind(old.family)
            .bind(new_token)
            .bind(old_token)
            .bind(&old.user_agent)
            .bind(&old.ip_address)
            .bind(expires_at)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            return Ok(RotateOutcome::Rotated(successor));
        }

        // A tombstone means the value was rotated away at some point in
        // its chain; any second presentation revokes the whole family.
        // Dead rows without `rotated_to` were logged out or evicted.
        let replayed: Option<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT family, user_id FROM sessions WHERE refresh_token = $1 AND rotated_to IS NOT NULL",
        )
        .bind(old_token)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match replayed {
            Some((family, user_id)) => {
                sqlx::query("UPDATE sessions SET is_valid = FALSE WHERE family = $1 AND is_valid = TRUE")
                    .bind(family)
                    .execute(&mut *tx)
                    .await?;
                RotateOutcome::Replay { user_id }
            }
            None => RotateOutcome::NotFound,
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn invalidate(&self, refresh_token: &str) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE sessions SET is_valid = FALSE WHERE refresh_token = $1 AND is_valid = TRUE",
        )
        .bind(refresh_token)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn invalidate_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let result = sqlx::query(
            "UPDATE sessions SET is_valid = FALSE WHERE user_id = $1 AND is_valid = TRUE",
        )
        .bind(user_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

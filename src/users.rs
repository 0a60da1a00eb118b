//! User Store boundary
//!
//! The user/profile store is an external collaborator; this crate only
//! needs lookup, insert-at-signup, a `last_login_at` touch, and a password
//! hash upgrade. Modeled as one trait so the auth core never depends on a
//! concrete backend.

use crate::error::AuthError;
use crate::models::{NewUser, User};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Read-mostly view of the durable user record store.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError>;

    /// Insert a new user row; `EmailTaken` on a duplicate email.
    async fn insert(&self, new: NewUser) -> Result<User, AuthError>;

    /// Touch `last_login_at` and `updated_at`.
    async fn touch_last_login(&self, id: Uuid) -> Result<(), AuthError>;

    /// Replace the stored password hash (opportunistic cost upgrades).
    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<(), AuthError>;
}

// ============================================
// Postgres backend
// ============================================

/// User store backed by the shared `users` table.
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let user = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    async fn insert(&self, new: NewUser) -> Result<User, AuthError> {
        let user = sqlx::query_as(
            r#"
            INSERT INTO users (email, password_hash, name, role, preferences)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.name)
        .bind(new.role)
        .bind(&new.preferences)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET last_login_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<(), AuthError> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(hash)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

// ============================================
// In-memory backend
// ============================================

/// Process-local user store for tests and embedded use.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pre-built user row.
    pub async fn seed(&self, user: User) {
        self.users.lock().await.push(user);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AuthError> {
        let users = self.users.lock().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn insert(&self, new: NewUser) -> Result<User, AuthError> {
        let mut users = self.users.lock().await;
        if users.iter().any(|u| u.email == new.email) {
            return Err(AuthError::EmailTaken);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            name: new.name,
            role: new.role,
            is_active: true,
            preferences: new.preferences,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<(), AuthError> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.iter_mut().find(|u| u.id == id) {
            let now = Utc::now();
            user.last_login_at = Some(now);
            user.updated_at = now;
        }
        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, hash: &str) -> Result<(), AuthError> {
        let mut users = self.users.lock().await;
        if let Some(user) = users.iter_mut().find(|u| u.id == id) {
            user.password_hash = hash.to_string();
            user.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{default_preferences, UserRole};

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            name: "Test User".to_string(),
            role: UserRole::User,
            preferences: default_preferences(),
        }
    }

    #[tokio::test]
    async fn insert_and_lookup() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("a@example.com")).await.unwrap();

        assert!(store
            .find_by_email("a@example.com")
            .await
            .unwrap()
            .is_some());
        assert!(store.find_by_id(user.id).await.unwrap().is_some());
        assert!(store.find_by_email("b@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryUserStore::new();
        store.insert(new_user("a@example.com")).await.unwrap();

        let err = store.insert(new_user("a@example.com")).await.unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
    }

    #[tokio::test]
    async fn touch_updates_last_login() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("a@example.com")).await.unwrap();
        assert!(user.last_login_at.is_none());

        store.touch_last_login(user.id).await.unwrap();
        let updated = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(updated.last_login_at.is_some());
    }
}

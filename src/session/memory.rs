//! In-memory session store.
//!
//! A single mutex over the whole table gives the same atomicity the
//! Postgres backend gets from transactions: evict-and-insert and
//! tombstone rotation each happen under one lock hold and cannot
//! interleave.

use super::{NewSession, RotateOutcome, SessionStore};
use crate::error::AuthError;
use crate::models::Session;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Session store backed by a process-local map.
#[derive(Default)]
pub struct MemorySessionStore {
    // Keyed by refresh-token value; retired values stay as tombstones.
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Evict the user's oldest live sessions until `max - 1` remain.
fn evict_over_cap(sessions: &mut HashMap<String, Session>, user_id: Uuid, max: usize) -> u64 {
    let mut live: Vec<(String, DateTime<Utc>)> = sessions
        .values()
        .filter(|s| s.user_id == user_id && s.is_live())
        .map(|s| (s.refresh_token.clone(), s.created_at))
        .collect();

    if live.len() < max {
        return 0;
    }

    live.sort_by_key(|(_, created_at)| *created_at);
    let evict = live.len() - (max - 1);
    for (token, _) in live.into_iter().take(evict) {
        if let Some(session) = sessions.get_mut(&token) {
            session.is_valid = false;
        }
    }

    evict as u64
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, new: NewSession, max: usize) -> Result<Session, AuthError> {
        // Eviction and insert share one lock hold, so parallel logins
        // cannot both observe room for one more.
        let mut sessions = self.sessions.lock().await;
        evict_over_cap(&mut sessions, new.user_id, max);

        let session = Session {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            family: Uuid::new_v4(),
            refresh_token: new.refresh_token.clone(),
            rotated_from: None,
            rotated_to: None,
            user_agent: new.user_agent,
            ip_address: new.ip_address,
            is_valid: true,
            created_at: Utc::now(),
            expires_at: new.expires_at,
        };

        sessions.insert(new.refresh_token, session.clone());
        Ok(session)
    }

    async fn get(&self, refresh_token: &str) -> Result<Option<Session>, AuthError> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(refresh_token)
            .filter(|s| s.is_live())
            .cloned())
    }

    async fn rotate(
        &self,
        old_token: &str,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RotateOutcome, AuthError> {
        let mut sessions = self.sessions.lock().await;

        let old = match sessions.get(old_token) {
            Some(session) => session.clone(),
            None => return Ok(RotateOutcome::NotFound),
        };

        if old.is_live() {
            // Retire the old row as a tombstone, insert its successor.
            if let Some(tombstone) = sessions.get_mut(old_token) {
                tombstone.is_valid = false;
                tombstone.rotated_to = Some(new_token.to_string());
            }
            let successor = Session {
                id: Uuid::new_v4(),
                user_id: old.user_id,
                family: old.family,
                refresh_token: new_token.to_string(),
                rotated_from: Some(old_token.to_string()),
                rotated_to: None,
                user_agent: old.user_agent,
                ip_address: old.ip_address,
                is_valid: true,
                created_at: Utc::now(),
                expires_at,
            };
            sessions.insert(new_token.to_string(), successor.clone());
            return Ok(RotateOutcome::Rotated(successor));
        }

        if old.rotated_to.is_some() {
            // A rotated-away value, however far back in the chain, is a
            // replayed token; the whole family dies.
            for session in sessions.values_mut() {
                if session.family == old.family && session.is_valid {
                    session.is_valid = false;
                }
            }
            return Ok(RotateOutcome::Replay {
                user_id: old.user_id,
            });
        }

        // Logged out, evicted, or expired without rotation.
        Ok(RotateOutcome::NotFound)
    }

    async fn invalidate(&self, refresh_token: &str) -> Result<bool, AuthError> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(refresh_token) {
            Some(session) if session.is_valid => {
                session.is_valid = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn invalidate_all_for_user(&self, user_id: Uuid) -> Result<u64, AuthError> {
        let mut sessions = self.sessions.lock().await;
        let mut revoked = 0;
        for session in sessions.values_mut() {
            if session.user_id == user_id && session.is_valid {
                session.is_valid = false;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const CAP: usize = 5;

    fn new_session(user_id: Uuid, token: &str) -> NewSession {
        NewSession {
            user_id,
            refresh_token: token.to_string(),
            user_agent: Some("test-agent".to_string()),
            ip_address: None,
            expires_at: Utc::now() + Duration::days(7),
        }
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = MemorySessionStore::new();
        let user_id = Uuid::new_v4();
        store
            .create(new_session(user_id, "tok-1"), CAP)
            .await
            .unwrap();

        let found = store.get("tok-1").await.unwrap().unwrap();
        assert_eq!(found.user_id, user_id);
        assert!(found.is_valid);
        assert!(store.get("tok-unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_session_is_not_returned() {
        let store = MemorySessionStore::new();
        let user_id = Uuid::new_v4();
        let mut new = new_session(user_id, "tok-1");
        new.expires_at = Utc::now() - Duration::minutes(1);
        store.create(new, CAP).await.unwrap();

        assert!(store.get("tok-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cap_evicts_oldest_sessions_first() {
        let store = MemorySessionStore::new();
        let user_id = Uuid::new_v4();

        // Sixth create under a cap of five evicts the oldest session,
        // leaving five valid with the first one gone.
        for i in 0..6 {
            store
                .create(new_session(user_id, &format!("tok-{i}")), CAP)
                .await
                .unwrap();
            // Distinct created_at values keep the eviction order stable
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        assert!(store.get("tok-0").await.unwrap().is_none());
        for i in 1..6 {
            assert!(
                store.get(&format!("tok-{i}")).await.unwrap().is_some(),
                "session tok-{i} should survive"
            );
        }
    }

    #[tokio::test]
    async fn parallel_creates_cannot_exceed_the_cap() {
        let store = MemorySessionStore::new();
        let user_id = Uuid::new_v4();

        for i in 0..4 {
            store
                .create(new_session(user_id, &format!("tok-{i}")), CAP)
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        // Two logins racing at four live sessions: at most one may find
        // room without evicting.
        let (a, b) = tokio::join!(
            store.create(new_session(user_id, "tok-4"), CAP),
            store.create(new_session(user_id, "tok-5"), CAP),
        );
        a.unwrap();
        b.unwrap();

        let mut live = 0;
        for i in 0..6 {
            if store.get(&format!("tok-{i}")).await.unwrap().is_some() {
                live += 1;
            }
        }
        assert_eq!(live, CAP, "cap must hold across interleaved creates");
        assert!(store.get("tok-0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cap_ignores_other_users_sessions() {
        let store = MemorySessionStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        for i in 0..5 {
            store
                .create(new_session(alice, &format!("alice-{i}")), CAP)
                .await
                .unwrap();
        }
        store.create(new_session(bob, "bob-0"), CAP).await.unwrap();

        for i in 0..5 {
            assert!(store.get(&format!("alice-{i}")).await.unwrap().is_some());
        }
        assert!(store.get("bob-0").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rotate_retires_old_value_and_records_lineage() {
        let store = MemorySessionStore::new();
        let user_id = Uuid::new_v4();
        let created = store
            .create(new_session(user_id, "old"), CAP)
            .await
            .unwrap();

        let expires = Utc::now() + Duration::days(7);
        let outcome = store.rotate("old", "new", expires).await.unwrap();
        let session = match outcome {
            RotateOutcome::Rotated(s) => s,
            other => panic!("expected rotation, got {other:?}"),
        };

        assert_eq!(session.refresh_token, "new");
        assert_eq!(session.rotated_from.as_deref(), Some("old"));
        assert_eq!(session.family, created.family);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn replayed_token_revokes_the_family() {
        let store = MemorySessionStore::new();
        let user_id = Uuid::new_v4();
        store.create(new_session(user_id, "old"), CAP).await.unwrap();

        let expires = Utc::now() + Duration::days(7);
        store.rotate("old", "new", expires).await.unwrap();

        // Second presentation of the rotated-away value
        let outcome = store.rotate("old", "newer", expires).await.unwrap();
        match outcome {
            RotateOutcome::Replay { user_id: uid } => assert_eq!(uid, user_id),
            other => panic!("expected replay, got {other:?}"),
        }

        // The live end of the chain is revoked with it
        assert!(store.get("new").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ancestor_replay_is_detected_across_the_whole_chain() {
        let store = MemorySessionStore::new();
        let user_id = Uuid::new_v4();
        store.create(new_session(user_id, "t1"), CAP).await.unwrap();

        // Two rotations later, t1 is two links behind the live value.
        let expires = Utc::now() + Duration::days(7);
        store.rotate("t1", "t2", expires).await.unwrap();
        store.rotate("t2", "t3", expires).await.unwrap();
        assert!(store.get("t3").await.unwrap().is_some());

        let outcome = store.rotate("t1", "t4", expires).await.unwrap();
        match outcome {
            RotateOutcome::Replay { user_id: uid } => assert_eq!(uid, user_id),
            other => panic!("expected replay, got {other:?}"),
        }
        assert!(store.get("t3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rotate_unknown_token_is_not_found() {
        let store = MemorySessionStore::new();
        let outcome = store
            .rotate("never-issued", "new", Utc::now() + Duration::days(7))
            .await
            .unwrap();
        assert!(matches!(outcome, RotateOutcome::NotFound));
    }

    #[tokio::test]
    async fn logged_out_token_is_not_a_replay_signal() {
        let store = MemorySessionStore::new();
        let user_id = Uuid::new_v4();
        store.create(new_session(user_id, "tok"), CAP).await.unwrap();
        store.invalidate("tok").await.unwrap();

        // An explicitly invalidated value was never rotated away, so a
        // second presentation is a dead token, not theft.
        let outcome = store
            .rotate("tok", "new", Utc::now() + Duration::days(7))
            .await
            .unwrap();
        assert!(matches!(outcome, RotateOutcome::NotFound));
    }

    #[tokio::test]
    async fn invalidate_single_and_all() {
        let store = MemorySessionStore::new();
        let user_id = Uuid::new_v4();
        store.create(new_session(user_id, "tok-0"), CAP).await.unwrap();
        store.create(new_session(user_id, "tok-1"), CAP).await.unwrap();

        assert!(store.invalidate("tok-0").await.unwrap());
        assert!(!store.invalidate("tok-0").await.unwrap());
        assert!(store.get("tok-0").await.unwrap().is_none());

        let revoked = store.invalidate_all_for_user(user_id).await.unwrap();
        assert_eq!(revoked, 1);
        assert!(store.get("tok-1").await.unwrap().is_none());
    }
}

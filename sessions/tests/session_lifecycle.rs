//! Integration tests for single-session operations and index expiry tracking.
//!
//! Runs against the in-memory backend with a manual clock, so expiry is driven
//! explicitly and background tasks are awaited through the task tracker.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, Duration, Utc};
use composable_rust_sessions::clock::Clock;
use composable_rust_sessions::mocks::{ManualClock, MemoryBackend};
use composable_rust_sessions::state::format_expires;
use composable_rust_sessions::{
    SessionConfig, SessionData, SessionError, SessionId, SessionManager, UserId,
};
use serde_json::json;
use std::sync::Arc;

struct Harness {
    sessions: SessionManager<MemoryBackend>,
    backend: MemoryBackend,
    clock: ManualClock,
}

impl Harness {
    fn new() -> Self {
        let clock = ManualClock::at_test_epoch();
        let backend = MemoryBackend::new(Arc::new(clock.clone()));
        let sessions = SessionManager::new(backend.clone(), clock.clone());
        Self {
            sessions,
            backend,
            clock,
        }
    }

    fn in_minutes(&self, minutes: i64) -> DateTime<Utc> {
        self.clock.now() + Duration::minutes(minutes)
    }

    async fn settle(&self) {
        self.sessions
            .background()
            .wait_idle_with_timeout(std::time::Duration::from_secs(5))
            .await
            .expect("background tasks did not settle");
    }

    async fn create(&self, user: &str, expires: DateTime<Utc>) -> SessionId {
        self.sessions
            .create_session(None, SessionData::new(user, expires))
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_record_expiry_matches_expires_exactly() {
    let h = Harness::new();
    let expires = h.in_minutes(10);

    let session_id = h.create("u1", expires).await;

    let record_expiry = h.sessions.session_expiry(&session_id).await.unwrap();
    assert_eq!(record_expiry, Some(expires));
}

#[tokio::test]
async fn test_caller_supplied_id_is_used() {
    let h = Harness::new();
    let session_id = SessionId::from("my-session");

    let returned = h
        .sessions
        .create_session(Some(session_id.clone()), SessionData::new("u1", h.in_minutes(10)))
        .await
        .unwrap();

    assert_eq!(returned, session_id);
    assert!(h.backend.contains_key("session:my-session").unwrap());
    assert_eq!(
        h.backend.score("user:u1:sessions", "my-session").unwrap(),
        Some(h.in_minutes(10).timestamp_millis())
    );
}

#[tokio::test]
async fn test_index_expiry_tracks_maximum() {
    let h = Harness::new();
    let user = UserId::from("u1");

    h.create("u1", h.in_minutes(10)).await;
    h.create("u1", h.in_minutes(20)).await;
    h.settle().await;

    assert_eq!(
        h.sessions.user_index_expiry(&user).await.unwrap(),
        Some(h.in_minutes(20))
    );
}

#[tokio::test]
async fn test_shorter_session_never_shrinks_index_expiry() {
    let h = Harness::new();
    let user = UserId::from("u1");

    h.create("u1", h.in_minutes(20)).await;
    h.settle().await;
    h.create("u1", h.in_minutes(5)).await;
    h.settle().await;

    assert_eq!(
        h.sessions.user_index_expiry(&user).await.unwrap(),
        Some(h.in_minutes(20))
    );
}

#[tokio::test]
async fn test_read_unknown_session_returns_none() {
    let h = Harness::new();

    let result = h.sessions.read_session(&SessionId::from("nope")).await.unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn test_read_after_native_expiry_returns_none() {
    let h = Harness::new();
    let session_id = h.create("u1", h.in_minutes(10)).await;

    h.clock.advance(Duration::minutes(10));

    assert!(h.sessions.read_session(&session_id).await.unwrap().is_none());
    assert!(!h.sessions.exists(&session_id).await.unwrap());
}

#[tokio::test]
async fn test_read_hit_prunes_stale_index_entries() {
    let h = Harness::new();
    let user = UserId::from("u1");

    let short = h.create("u1", h.in_minutes(5)).await;
    let long = h.create("u1", h.in_minutes(30)).await;
    h.settle().await;

    h.clock.advance(Duration::minutes(6));
    assert_eq!(
        h.sessions.index().list_session_ids(&user).await.unwrap(),
        vec![short, long.clone()]
    );

    assert!(h.sessions.read_session(&long).await.unwrap().is_some());
    h.settle().await;

    assert_eq!(
        h.sessions.index().list_session_ids(&user).await.unwrap(),
        vec![long]
    );
}

#[tokio::test]
async fn test_create_rejects_invalid_data() {
    let h = Harness::new();

    let missing_user = SessionData::empty().with("expires", "2025-01-01T00:10:00.000Z");
    let result = h.sessions.create_session(None, missing_user).await;
    assert!(matches!(result, Err(SessionError::Validation(_))));

    let bad_expires = SessionData::new("u1", h.in_minutes(10)).with("expires", "soon");
    let result = h.sessions.create_session(None, bad_expires).await;
    assert!(matches!(result, Err(SessionError::Validation(_))));

    let result = h
        .sessions
        .create_session(Some(SessionId::from("")), SessionData::new("u1", h.in_minutes(10)))
        .await;
    assert!(matches!(result, Err(SessionError::Validation(_))));

    let far_future = SessionData::new("u1", h.in_minutes(10)).with("expires", i64::MAX);
    let result = h.sessions.create_session(None, far_future).await;
    assert!(matches!(result, Err(SessionError::Validation(_))));

    assert_eq!(h.backend.key_count().unwrap(), 0);
}

#[tokio::test]
async fn test_create_over_existing_session_of_other_user_conflicts() {
    let h = Harness::new();
    let session_id = SessionId::from("shared");

    h.sessions
        .create_session(Some(session_id.clone()), SessionData::new("alice", h.in_minutes(10)))
        .await
        .unwrap();

    let result = h
        .sessions
        .create_session(Some(session_id.clone()), SessionData::new("mallory", h.in_minutes(10)))
        .await;

    assert!(matches!(result, Err(SessionError::Conflict { .. })));
    let stored = h.sessions.read_session(&session_id).await.unwrap().unwrap();
    assert_eq!(stored.user_id(), Some("alice"));
    assert!(!h.backend.contains_key("user:mallory:sessions").unwrap());
}

#[tokio::test]
async fn test_create_over_existing_session_of_same_user_replaces_it() {
    let h = Harness::new();
    let session_id = SessionId::from("s1");

    h.sessions
        .create_session(
            Some(session_id.clone()),
            SessionData::new("u1", h.in_minutes(10)).with("old", true),
        )
        .await
        .unwrap();
    h.sessions
        .create_session(
            Some(session_id.clone()),
            SessionData::new("u1", h.in_minutes(30)).with("new", true),
        )
        .await
        .unwrap();

    let stored = h.sessions.read_session(&session_id).await.unwrap().unwrap();
    assert_eq!(stored.get("old"), None);
    assert_eq!(stored.get("new"), Some(&json!(true)));
    assert_eq!(
        h.sessions.session_expiry(&session_id).await.unwrap(),
        Some(h.in_minutes(30))
    );
}

#[tokio::test]
async fn test_update_unknown_session_is_not_found() {
    let h = Harness::new();

    let result = h
        .sessions
        .update_session(&SessionId::from("ghost"), SessionData::empty().with("a", 1))
        .await;

    assert!(matches!(result, Err(SessionError::NotFound(id)) if id == "ghost"));
}

#[tokio::test]
async fn test_update_changing_user_conflicts() {
    let h = Harness::new();
    let session_id = h.create("u1", h.in_minutes(10)).await;

    let result = h
        .sessions
        .update_session(&session_id, SessionData::empty().with("userId", "u2"))
        .await;

    assert!(matches!(
        result,
        Err(SessionError::Conflict { ref existing_user_id, ref attempted_user_id, .. })
            if existing_user_id == "u1" && attempted_user_id == "u2"
    ));
}

#[tokio::test]
async fn test_update_with_same_user_is_allowed() {
    let h = Harness::new();
    let session_id = h.create("u1", h.in_minutes(10)).await;

    h.sessions
        .update_session(&session_id, SessionData::empty().with("userId", "u1").with("a", 1))
        .await
        .unwrap();

    let stored = h.sessions.read_session(&session_id).await.unwrap().unwrap();
    assert_eq!(stored.get("a"), Some(&json!(1)));
}

#[tokio::test]
async fn test_update_expires_rescores_index_and_record() {
    let h = Harness::new();
    let user = UserId::from("u1");

    let first = h.create("u1", h.in_minutes(10)).await;
    let second = h.create("u1", h.in_minutes(20)).await;
    h.settle().await;

    let later = SessionData::empty().with("expires", format_expires(h.in_minutes(60)));
    h.sessions.update_session(&first, later).await.unwrap();
    h.settle().await;

    assert_eq!(
        h.sessions.session_expiry(&first).await.unwrap(),
        Some(h.in_minutes(60))
    );
    assert_eq!(
        h.sessions.index().list_session_ids(&user).await.unwrap(),
        vec![second, first]
    );
    assert_eq!(
        h.sessions.user_index_expiry(&user).await.unwrap(),
        Some(h.in_minutes(60))
    );
}

#[tokio::test]
async fn test_delete_unknown_session_is_silent() {
    let h = Harness::new();

    h.sessions.delete_session(&SessionId::from("ghost")).await.unwrap();
}

#[tokio::test]
async fn test_delete_removes_record_and_index_entry_and_resyncs() {
    let h = Harness::new();
    let user = UserId::from("u1");

    let shorter = h.create("u1", h.in_minutes(10)).await;
    let longer = h.create("u1", h.in_minutes(20)).await;
    h.settle().await;

    h.sessions.delete_session(&longer).await.unwrap();
    h.settle().await;

    assert!(h.sessions.read_session(&longer).await.unwrap().is_none());
    assert_eq!(
        h.sessions.index().list_session_ids(&user).await.unwrap(),
        vec![shorter.clone()]
    );
    assert_eq!(
        h.sessions.user_index_expiry(&user).await.unwrap(),
        Some(h.in_minutes(10))
    );

    h.sessions.delete_session(&shorter).await.unwrap();
    h.settle().await;

    assert_eq!(h.sessions.user_index_expiry(&user).await.unwrap(), None);
    assert_eq!(h.backend.key_count().unwrap(), 0);
}

#[tokio::test]
async fn test_index_disappears_with_last_session() {
    let h = Harness::new();

    h.create("u1", h.in_minutes(10)).await;
    h.create("u1", h.in_minutes(20)).await;
    h.settle().await;

    h.clock.advance(Duration::minutes(20));

    assert_eq!(h.backend.key_count().unwrap(), 0);
}

#[tokio::test]
async fn test_failed_resync_does_not_fail_create_and_heals_later() {
    let h = Harness::new();
    let user = UserId::from("u1");

    h.backend.fail_expiry_updates(true);
    let session_id = h.create("u1", h.in_minutes(10)).await;
    h.settle().await;

    assert!(h.sessions.read_session(&session_id).await.unwrap().is_some());
    assert_eq!(h.sessions.user_index_expiry(&user).await.unwrap(), None);

    h.backend.fail_expiry_updates(false);
    h.create("u1", h.in_minutes(5)).await;
    h.settle().await;

    assert_eq!(
        h.sessions.user_index_expiry(&user).await.unwrap(),
        Some(h.in_minutes(10))
    );
}

#[tokio::test]
async fn test_undersized_id_setting_still_generates_distinct_ids() {
    let clock = ManualClock::at_test_epoch();
    let backend = MemoryBackend::new(Arc::new(clock.clone()));
    let config = SessionConfig::default().with_generated_id_bytes(0);
    let sessions = SessionManager::with_config(backend.clone(), clock.clone(), &config);
    let expires = clock.now() + Duration::minutes(10);

    let alice = sessions
        .create_session(None, SessionData::new("alice", expires))
        .await
        .unwrap();
    let bob = sessions
        .create_session(None, SessionData::new("bob", expires))
        .await
        .unwrap();

    assert_ne!(alice, bob);
    assert_eq!(alice.as_str().len(), 22);
    assert!(!backend.contains_key("session:").unwrap());
}

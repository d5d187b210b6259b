//! Operations spanning every session of a user.

use crate::error::{Result, SessionError};
use crate::index::UserSessionIndex;
use crate::providers::SessionBackend;
use crate::record::SessionRecords;
use crate::state::{SessionData, SessionId, UserId};
use futures::future::join_all;

/// Apply `partial` to every live session of `user_id`.
///
/// Enumeration prunes stale index entries; surviving sessions are updated
/// concurrently. See [`update_each`] for how individual failures are handled.
///
/// # Returns
///
/// Number of sessions updated.
///
/// # Errors
///
/// Returns error if enumeration fails, or the first per-session failure other
/// than [`SessionError::NotFound`].
pub async fn update_all_for_user<B: SessionBackend>(
    records: &SessionRecords<B>,
    index: &UserSessionIndex<B>,
    user_id: &UserId,
    partial: &SessionData,
) -> Result<usize> {
    let session_ids: Vec<SessionId> = index
        .enumerate_sessions(user_id)
        .await?
        .into_iter()
        .map(|session| session.session_id)
        .collect();

    let updated = update_each(records, &session_ids, partial).await?;

    tracing::debug!(
        user_id = %user_id,
        listed = session_ids.len(),
        updated,
        "Updated user sessions"
    );

    Ok(updated)
}

/// Apply `partial` to each of `session_ids` concurrently.
///
/// A session that disappears before its update runs (it expired or was deleted
/// after enumeration) is skipped silently. Any other failure does not stop the
/// remaining updates; once all have finished, the first such failure is returned.
///
/// # Errors
///
/// Returns the first per-session failure other than [`SessionError::NotFound`].
pub async fn update_each<B: SessionBackend>(
    records: &SessionRecords<B>,
    session_ids: &[SessionId],
    partial: &SessionData,
) -> Result<usize> {
    let results = join_all(
        session_ids
            .iter()
            .map(|session_id| records.update(session_id, partial.clone())),
    )
    .await;

    let mut updated = 0;
    let mut first_failure: Option<SessionError> = None;

    for (session_id, result) in session_ids.iter().zip(results) {
        match result {
            Ok(()) => updated += 1,
            Err(SessionError::NotFound(_)) => {
                tracing::debug!(
                    session_id = %session_id,
                    "Session expired before bulk update, skipping"
                );
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "Bulk session update failed"
                );
                first_failure.get_or_insert(e);
            }
        }
    }

    match first_failure {
        Some(e) => Err(e),
        None => Ok(updated),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::background::BackgroundTasks;
    use crate::clock::Clock;
    use crate::mocks::{ManualClock, MemoryBackend};
    use chrono::Duration;
    use std::sync::Arc;

    fn setup() -> (SessionRecords<MemoryBackend>, ManualClock) {
        let clock = ManualClock::at_test_epoch();
        let backend = MemoryBackend::new(Arc::new(clock.clone()));
        let index = UserSessionIndex::new(
            backend.clone(),
            Arc::new(clock.clone()),
            BackgroundTasks::new(),
        );
        (SessionRecords::new(backend, index), clock)
    }

    #[tokio::test]
    async fn test_vanished_session_is_skipped() {
        let (records, clock) = setup();
        let expires = clock.now() + Duration::minutes(10);

        let live = records
            .create(None, SessionData::new("u1", expires))
            .await
            .unwrap();
        let vanished = SessionId::from("expired-between-enumeration-and-update");

        let updated = update_each(
            &records,
            &[vanished, live.clone()],
            &SessionData::empty().with("flag", true),
        )
        .await
        .unwrap();

        assert_eq!(updated, 1);
        let data = records.read(&live).await.unwrap().unwrap();
        assert_eq!(data.get("flag"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn test_conflict_does_not_stop_siblings() {
        let (records, clock) = setup();
        let expires = clock.now() + Duration::minutes(10);

        let first = records
            .create(None, SessionData::new("u1", expires))
            .await
            .unwrap();
        let second = records
            .create(None, SessionData::new("u2", expires))
            .await
            .unwrap();

        // Setting userId to "u1" is a no-op for the first session and a conflict for the second
        let result = update_each(
            &records,
            &[first.clone(), second.clone()],
            &SessionData::empty().with("userId", "u1").with("seen", 1),
        )
        .await;

        assert!(matches!(result, Err(SessionError::Conflict { .. })));
        let first_data = records.read(&first).await.unwrap().unwrap();
        assert_eq!(first_data.get("seen"), Some(&serde_json::json!(1)));
        let second_data = records.read(&second).await.unwrap().unwrap();
        assert_eq!(second_data.get("seen"), None);
    }
}

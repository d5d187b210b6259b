//! Per-user session index.
//!
//! Each user owns a sorted set at `user:{user_id}:sessions` whose members are
//! session ids scored by their expiry (epoch ms), so ascending rank order is
//! soonest-expiring first. The set carries its own absolute expiry, kept equal to
//! its highest score, so it disappears once the last of its sessions expires.
//!
//! The index may reference sessions whose record already expired. Such members
//! are removed lazily by [`UserSessionIndex::prune_expired`], scheduled from reads
//! and enumerations, never synchronously on expiry.

use crate::background::BackgroundTasks;
use crate::clock::Clock;
use crate::error::Result;
use crate::keys::{session_key, user_sessions_key};
use crate::metrics::{INDEX_MEMBERS_PRUNED_TOTAL, SESSIONS_DELETED_TOTAL};
use crate::providers::SessionBackend;
use crate::state::{SessionData, SessionId, UserId, UserSession};
use futures::future::join_all;
use std::sync::Arc;

/// Default number of read-apply passes a TTL resync makes before giving up.
pub const DEFAULT_MAX_RESYNC_PASSES: u32 = 3;

/// Manager of the per-user session indexes.
#[derive(Clone)]
pub struct UserSessionIndex<B> {
    backend: B,
    clock: Arc<dyn Clock>,
    tasks: BackgroundTasks,
    max_resync_passes: u32,
}

impl<B: SessionBackend> UserSessionIndex<B> {
    /// Create an index manager over `backend`.
    #[must_use]
    pub fn new(backend: B, clock: Arc<dyn Clock>, tasks: BackgroundTasks) -> Self {
        Self {
            backend,
            clock,
            tasks,
            max_resync_passes: DEFAULT_MAX_RESYNC_PASSES,
        }
    }

    /// Set how many read-apply passes a TTL resync may make (at least one).
    #[must_use]
    pub fn with_max_resync_passes(mut self, passes: u32) -> Self {
        self.max_resync_passes = passes.max(1);
        self
    }

    /// Add `session_id` with score `expires_at_ms`, or re-score it if present.
    ///
    /// # Errors
    ///
    /// Returns error if the store command fails.
    pub async fn add(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
        expires_at_ms: i64,
    ) -> Result<()> {
        self.backend
            .add_member(&user_sessions_key(user_id), session_id.as_str(), expires_at_ms)
            .await
    }

    /// Remove `session_id` from the user's index.
    ///
    /// # Errors
    ///
    /// Returns error if the store command fails.
    pub async fn remove(&self, user_id: &UserId, session_id: &SessionId) -> Result<()> {
        self.backend
            .remove_member(&user_sessions_key(user_id), session_id.as_str())
            .await?;
        Ok(())
    }

    /// Set the index's absolute expiry to its highest member score.
    ///
    /// Does nothing when the index is empty or absent. After applying an expiry the
    /// maximum is read again; if a concurrent add or remove moved it, the pass
    /// repeats, so an older resync cannot leave a stale expiry behind.
    ///
    /// # Errors
    ///
    /// Returns error if a store command fails.
    pub async fn resync_ttl(&self, user_id: &UserId) -> Result<()> {
        let key = user_sessions_key(user_id);
        let mut target = self.max_score(&key).await?;

        for _ in 0..self.max_resync_passes {
            let Some(expires_at_ms) = target else {
                return Ok(());
            };

            self.backend.set_absolute_expiry(&key, expires_at_ms).await?;

            let current = self.max_score(&key).await?;
            if current == target {
                tracing::debug!(
                    user_id = %user_id,
                    expires_at_ms,
                    "Resynced user session index expiry"
                );
                return Ok(());
            }
            target = current;
        }

        tracing::debug!(
            user_id = %user_id,
            passes = self.max_resync_passes,
            "User session index kept changing during resync, leaving it to the next trigger"
        );
        Ok(())
    }

    /// Remove every member whose score (expiry) is at or before now.
    ///
    /// # Returns
    ///
    /// Number of members removed.
    ///
    /// # Errors
    ///
    /// Returns error if the store command fails.
    pub async fn prune_expired(&self, user_id: &UserId) -> Result<u64> {
        let now_ms = self.clock.now_millis();
        let removed = self
            .backend
            .remove_range_by_score(&user_sessions_key(user_id), i64::MIN, now_ms)
            .await?;

        if removed > 0 {
            metrics::counter!(INDEX_MEMBERS_PRUNED_TOTAL).increment(removed);
            tracing::debug!(
                user_id = %user_id,
                removed,
                "Pruned expired session references"
            );
        }

        Ok(removed)
    }

    /// All session ids in the user's index, soonest-expiring first.
    ///
    /// # Errors
    ///
    /// Returns error if the store command fails.
    pub async fn list_session_ids(&self, user_id: &UserId) -> Result<Vec<SessionId>> {
        let members = self
            .backend
            .range_by_rank(&user_sessions_key(user_id), 0, -1)
            .await?;

        Ok(members.into_iter().map(SessionId).collect())
    }

    /// Live sessions of the user, soonest-expiring first.
    ///
    /// Ids whose record is gone (or now belongs to another user) are skipped, and a
    /// background prune is scheduled when any are found.
    ///
    /// # Errors
    ///
    /// Returns error if a store command fails or a stored record is corrupt.
    pub async fn enumerate_sessions(&self, user_id: &UserId) -> Result<Vec<UserSession>> {
        let session_ids = self.list_session_ids(user_id).await?;

        let records = join_all(
            session_ids
                .iter()
                .map(|session_id| self.load_record(session_id)),
        )
        .await;

        let listed = session_ids.len();
        let mut sessions = Vec::with_capacity(listed);
        for (session_id, record) in session_ids.into_iter().zip(records) {
            match record? {
                Some(data) if data.user_id() == Some(user_id.as_str()) => {
                    sessions.push(UserSession { session_id, data });
                }
                _ => {}
            }
        }

        let stale = listed - sessions.len();
        if stale > 0 {
            tracing::debug!(
                user_id = %user_id,
                stale,
                live = sessions.len(),
                "Found stale session references, scheduling prune"
            );
            self.spawn_prune(user_id);
        }

        Ok(sessions)
    }

    /// Delete the user's index and every session record listed in it.
    ///
    /// Records are not re-checked for freshness first; deleting an already
    /// expired record is a no-op. Every delete is attempted even if some fail.
    ///
    /// # Returns
    ///
    /// Number of session ids that were listed in the index.
    ///
    /// # Errors
    ///
    /// Returns the first failed store command, after all deletes have finished.
    pub async fn delete_all(&self, user_id: &UserId) -> Result<usize> {
        let session_ids = self.list_session_ids(user_id).await?;
        let index_key = user_sessions_key(user_id);

        let mut keys: Vec<String> = session_ids.iter().map(session_key).collect();
        keys.push(index_key);

        let results = join_all(keys.iter().map(|key| self.backend.delete(key))).await;

        let mut first_failure = None;
        for (key, result) in keys.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(
                    user_id = %user_id,
                    key = %key,
                    error = %e,
                    "Failed to delete key while deleting user sessions"
                );
                first_failure.get_or_insert(e);
            }
        }
        if let Some(e) = first_failure {
            return Err(e);
        }

        let deleted = session_ids.len();
        metrics::counter!(SESSIONS_DELETED_TOTAL).increment(deleted as u64);
        tracing::info!(
            user_id = %user_id,
            session_count = deleted,
            "Deleted all user sessions"
        );

        Ok(deleted)
    }

    /// Absolute expiry of the user's index in epoch milliseconds.
    ///
    /// # Errors
    ///
    /// Returns error if the store command fails.
    pub async fn expiry_millis(&self, user_id: &UserId) -> Result<Option<i64>> {
        self.backend.absolute_expiry(&user_sessions_key(user_id)).await
    }

    /// Schedule [`resync_ttl`](Self::resync_ttl) in the background.
    pub fn spawn_resync_ttl(&self, user_id: &UserId) {
        let index = self.clone();
        let user_id = user_id.clone();
        self.tasks
            .spawn("resync_ttl", async move { index.resync_ttl(&user_id).await });
    }

    /// Schedule [`prune_expired`](Self::prune_expired) in the background.
    pub fn spawn_prune(&self, user_id: &UserId) {
        let index = self.clone();
        let user_id = user_id.clone();
        self.tasks.spawn("prune_expired", async move {
            index.prune_expired(&user_id).await.map(|_| ())
        });
    }

    async fn load_record(&self, session_id: &SessionId) -> Result<Option<SessionData>> {
        let bytes = self.backend.get(&session_key(session_id)).await?;
        bytes.map(|bytes| SessionData::from_bytes(&bytes)).transpose()
    }

    async fn max_score(&self, key: &str) -> Result<Option<i64>> {
        let top = self.backend.range_by_rank_with_scores(key, -1, -1).await?;
        Ok(top.into_iter().next().map(|(_, score)| score))
    }
}

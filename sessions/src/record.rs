//! Session record manager.
//!
//! Owns create/read/update/delete of a single session record stored at
//! `session:{session_id}` with its native expiry set to the record's `expires`.
//! Every mutation is mirrored into the owner's [`UserSessionIndex`] and followed
//! by a background index-TTL resync; every hit schedules a background prune.
//!
//! The record write and the index write are independent store commands issued
//! concurrently. A failure between them can leave the index pointing at a missing
//! record, which enumeration detects and pruning repairs.

use crate::error::{Result, SessionError};
use crate::index::UserSessionIndex;
use crate::keys::session_key;
use crate::metrics::{SESSION_READS_TOTAL, SESSIONS_DELETED_TOTAL, SESSIONS_WRITTEN_TOTAL};
use crate::providers::SessionBackend;
use crate::state::{
    DEFAULT_SESSION_ID_BYTES, SessionData, SessionId, USER_ID_FIELD, UserId, clamp_session_id_bytes,
};

/// Manager of individual session records.
#[derive(Clone)]
pub struct SessionRecords<B> {
    backend: B,
    index: UserSessionIndex<B>,
    generated_id_bytes: usize,
}

impl<B: SessionBackend> SessionRecords<B> {
    /// Create a record manager writing through `backend` and maintaining `index`.
    #[must_use]
    pub const fn new(backend: B, index: UserSessionIndex<B>) -> Self {
        Self {
            backend,
            index,
            generated_id_bytes: DEFAULT_SESSION_ID_BYTES,
        }
    }

    /// Set the number of random bytes in generated session ids (at least
    /// [`MIN_SESSION_ID_BYTES`](crate::state::MIN_SESSION_ID_BYTES)).
    #[must_use]
    pub const fn with_generated_id_bytes(mut self, bytes: usize) -> Self {
        self.generated_id_bytes = clamp_session_id_bytes(bytes);
        self
    }

    /// Create (or overwrite) a session record and index it under its user.
    ///
    /// # Arguments
    ///
    /// - `session_id`: Id to store under, or `None` to generate one
    /// - `data`: Full record; must carry `userId` and `expires`
    ///
    /// # Returns
    ///
    /// The session id used.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `data` lacks a valid `userId`/`expires`, or the id is empty →
    ///   [`SessionError::Validation`]
    /// - A record exists under the id for a different user →
    ///   [`SessionError::Conflict`]
    /// - A store command fails
    pub async fn create(
        &self,
        session_id: Option<SessionId>,
        data: SessionData,
    ) -> Result<SessionId> {
        let header = data.validate()?;

        let session_id = match session_id {
            Some(id) if id.as_str().is_empty() => {
                return Err(SessionError::Validation("session id must not be empty".into()));
            }
            Some(id) => id,
            None => SessionId::generate_with_bytes(self.generated_id_bytes),
        };

        // userId is immutable once a record exists under this id
        if let Some(existing) = self.load(&session_id).await? {
            if let Some(existing_user_id) = existing.user_id() {
                if existing_user_id != header.user_id.as_str() {
                    tracing::error!(
                        session_id = %session_id,
                        existing_user_id = %existing_user_id,
                        new_user_id = %header.user_id,
                        "Attempt to change immutable userId"
                    );
                    return Err(SessionError::Conflict {
                        session_id: session_id.0.clone(),
                        existing_user_id: existing_user_id.to_string(),
                        attempted_user_id: header.user_id.0.clone(),
                    });
                }
            }
        }

        let bytes = data.to_bytes()?;
        let key = session_key(&session_id);

        tokio::try_join!(
            self.backend.set(&key, bytes, header.expires_at_ms),
            self.index.add(&header.user_id, &session_id, header.expires_at_ms),
        )?;

        self.index.spawn_resync_ttl(&header.user_id);

        metrics::counter!(SESSIONS_WRITTEN_TOTAL).increment(1);
        tracing::info!(
            session_id = %session_id,
            user_id = %header.user_id,
            expires_at_ms = header.expires_at_ms,
            "Stored session"
        );

        Ok(session_id)
    }

    /// Read a session record.
    ///
    /// A hit schedules a background prune of the owner's index.
    ///
    /// # Returns
    ///
    /// The record, or `None` if it does not exist or has expired.
    ///
    /// # Errors
    ///
    /// Returns error if the store command fails or the stored record is corrupt.
    pub async fn read(&self, session_id: &SessionId) -> Result<Option<SessionData>> {
        let Some(data) = self.load(session_id).await? else {
            metrics::counter!(SESSION_READS_TOTAL, "result" => "miss").increment(1);
            return Ok(None);
        };

        metrics::counter!(SESSION_READS_TOTAL, "result" => "hit").increment(1);
        if let Some(user_id) = data.user_id() {
            self.index.spawn_prune(&UserId::from(user_id));
        }

        Ok(Some(data))
    }

    /// Shallow-merge `partial` into an existing record and rewrite it.
    ///
    /// Goes through [`create`](Self::create), so a changed `expires` re-scores the
    /// index entry and resyncs the index expiry.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - No record exists → [`SessionError::NotFound`]
    /// - `partial` sets a different `userId` → [`SessionError::Conflict`]
    /// - The merged record is invalid → [`SessionError::Validation`]
    /// - A store command fails
    pub async fn update(&self, session_id: &SessionId, partial: SessionData) -> Result<()> {
        let mut data = self
            .load(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.0.clone()))?;

        if let Some(requested) = partial.get(USER_ID_FIELD) {
            let existing_user_id = data.user_id().unwrap_or_default();
            if requested.as_str() != Some(existing_user_id) {
                tracing::error!(
                    session_id = %session_id,
                    existing_user_id = %existing_user_id,
                    new_user_id = %requested,
                    "Attempt to change immutable userId"
                );
                return Err(SessionError::Conflict {
                    session_id: session_id.0.clone(),
                    existing_user_id: existing_user_id.to_string(),
                    attempted_user_id: requested
                        .as_str()
                        .map_or_else(|| requested.to_string(), str::to_string),
                });
            }
        }

        data.merge(partial);
        self.create(Some(session_id.clone()), data).await?;

        Ok(())
    }

    /// Delete a session record and its index entry.
    ///
    /// Deleting a missing session is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if a store command fails or the stored record is corrupt.
    pub async fn delete(&self, session_id: &SessionId) -> Result<()> {
        let Some(data) = self.load(session_id).await? else {
            tracing::debug!(session_id = %session_id, "Session already gone, nothing to delete");
            return Ok(());
        };

        let key = session_key(session_id);
        match data.user_id() {
            Some(user_id) => {
                let user_id = UserId::from(user_id);
                tokio::try_join!(
                    self.backend.delete(&key),
                    self.index.remove(&user_id, session_id),
                )?;
                self.index.spawn_resync_ttl(&user_id);
            }
            None => {
                self.backend.delete(&key).await?;
            }
        }

        metrics::counter!(SESSIONS_DELETED_TOTAL).increment(1);
        tracing::info!(session_id = %session_id, "Deleted session");

        Ok(())
    }

    /// Absolute store-level expiry of a record in epoch milliseconds.
    ///
    /// # Errors
    ///
    /// Returns error if the store command fails.
    pub async fn expiry_millis(&self, session_id: &SessionId) -> Result<Option<i64>> {
        self.backend.absolute_expiry(&session_key(session_id)).await
    }

    /// Fetch and decode a record without side effects.
    pub(crate) async fn load(&self, session_id: &SessionId) -> Result<Option<SessionData>> {
        self.backend
            .get(&session_key(session_id))
            .await?
            .map(|bytes| SessionData::from_bytes(&bytes))
            .transpose()
    }
}

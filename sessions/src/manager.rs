//! Public session API.
//!
//! [`SessionManager`] wires the record manager, the user index manager and the
//! background task tracker over one backend and exposes the session operations.

use crate::background::BackgroundTasks;
use crate::bulk;
use crate::clock::{Clock, SystemClock};
use crate::config::SessionConfig;
use crate::error::Result;
use crate::index::UserSessionIndex;
use crate::providers::SessionBackend;
use crate::record::SessionRecords;
use crate::state::{SessionData, SessionId, UserId, UserSession, millis_to_datetime};
use crate::stores::RedisBackend;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Session manager.
///
/// Stateless apart from the backend handle: every piece of state lives in the
/// store. Cheap to clone; clones share the backend and the task tracker.
///
/// # Example
///
/// ```
/// use composable_rust_sessions::{SessionData, SessionManager};
/// use composable_rust_sessions::mocks::{ManualClock, MemoryBackend};
/// use composable_rust_sessions::clock::Clock;
/// use chrono::Duration;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let clock = ManualClock::at_test_epoch();
/// let backend = MemoryBackend::new(Arc::new(clock.clone()));
/// let sessions = SessionManager::new(backend, clock.clone());
///
/// let data = SessionData::new("user-1", clock.now() + Duration::minutes(10));
/// let session_id = sessions.create_session(None, data.clone()).await?;
///
/// assert_eq!(sessions.read_session(&session_id).await?, Some(data));
/// # Ok::<(), composable_rust_sessions::SessionError>(())
/// # }).unwrap();
/// ```
#[derive(Clone)]
pub struct SessionManager<B> {
    records: SessionRecords<B>,
    index: UserSessionIndex<B>,
    tasks: BackgroundTasks,
}

impl SessionManager<RedisBackend> {
    /// Connect to Redis as configured.
    ///
    /// # Errors
    ///
    /// Returns error if connection to Redis fails.
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let backend = RedisBackend::new(&config.redis_url).await?;
        Ok(Self::with_config(backend, SystemClock, config))
    }
}

impl<B: SessionBackend> SessionManager<B> {
    /// Create a manager over `backend` with default settings.
    #[must_use]
    pub fn new(backend: B, clock: impl Clock + 'static) -> Self {
        Self::with_config(backend, clock, &SessionConfig::default())
    }

    /// Create a manager over `backend` using the tunables in `config`.
    ///
    /// `config.redis_url` is not used here; the backend is already connected.
    #[must_use]
    pub fn with_config(backend: B, clock: impl Clock + 'static, config: &SessionConfig) -> Self {
        let tasks = BackgroundTasks::new();
        let index = UserSessionIndex::new(backend.clone(), Arc::new(clock), tasks.clone())
            .with_max_resync_passes(config.max_resync_passes);
        let records = SessionRecords::new(backend, index.clone())
            .with_generated_id_bytes(config.generated_id_bytes);

        Self {
            records,
            index,
            tasks,
        }
    }

    /// Create a session, generating its id when `session_id` is `None`.
    ///
    /// # Errors
    ///
    /// See [`SessionRecords::create`].
    pub async fn create_session(
        &self,
        session_id: Option<SessionId>,
        data: SessionData,
    ) -> Result<SessionId> {
        self.records.create(session_id, data).await
    }

    /// Read a session; `None` if it does not exist or has expired.
    ///
    /// # Errors
    ///
    /// See [`SessionRecords::read`].
    pub async fn read_session(&self, session_id: &SessionId) -> Result<Option<SessionData>> {
        self.records.read(session_id).await
    }

    /// Shallow-merge `partial` into an existing session.
    ///
    /// # Errors
    ///
    /// See [`SessionRecords::update`].
    pub async fn update_session(&self, session_id: &SessionId, partial: SessionData) -> Result<()> {
        self.records.update(session_id, partial).await
    }

    /// Delete a session; a no-op if it does not exist.
    ///
    /// # Errors
    ///
    /// See [`SessionRecords::delete`].
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        self.records.delete(session_id).await
    }

    /// Live sessions of a user, soonest-expiring first.
    ///
    /// # Errors
    ///
    /// See [`UserSessionIndex::enumerate_sessions`].
    pub async fn get_user_sessions(&self, user_id: &UserId) -> Result<Vec<UserSession>> {
        self.index.enumerate_sessions(user_id).await
    }

    /// Apply `partial` to every live session of a user, skipping sessions that
    /// expire mid-batch.
    ///
    /// # Returns
    ///
    /// Number of sessions updated.
    ///
    /// # Errors
    ///
    /// See [`bulk::update_all_for_user`].
    pub async fn update_user_sessions(
        &self,
        user_id: &UserId,
        partial: &SessionData,
    ) -> Result<usize> {
        bulk::update_all_for_user(&self.records, &self.index, user_id, partial).await
    }

    /// Delete every session of a user along with the user's index.
    ///
    /// # Returns
    ///
    /// Number of session ids the index listed.
    ///
    /// # Errors
    ///
    /// See [`UserSessionIndex::delete_all`].
    pub async fn delete_user_sessions(&self, user_id: &UserId) -> Result<usize> {
        self.index.delete_all(user_id).await
    }

    /// Whether a live record exists for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns error if the store command fails or the stored record is corrupt.
    pub async fn exists(&self, session_id: &SessionId) -> Result<bool> {
        Ok(self.records.load(session_id).await?.is_some())
    }

    /// Store-level expiry of a session record.
    ///
    /// # Errors
    ///
    /// Returns error if the store command fails.
    pub async fn session_expiry(&self, session_id: &SessionId) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .records
            .expiry_millis(session_id)
            .await?
            .and_then(millis_to_datetime))
    }

    /// Store-level expiry of a user's session index.
    ///
    /// # Errors
    ///
    /// Returns error if the store command fails.
    pub async fn user_index_expiry(&self, user_id: &UserId) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .index
            .expiry_millis(user_id)
            .await?
            .and_then(millis_to_datetime))
    }

    /// The record manager.
    #[must_use]
    pub const fn records(&self) -> &SessionRecords<B> {
        &self.records
    }

    /// The user index manager.
    #[must_use]
    pub const fn index(&self) -> &UserSessionIndex<B> {
        &self.index
    }

    /// Tracker of background index maintenance, for awaiting quiescence.
    #[must_use]
    pub const fn background(&self) -> &BackgroundTasks {
        &self.tasks
    }
}

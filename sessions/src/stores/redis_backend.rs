//! Redis-based session backend.
//!
//! # Architecture
//!
//! Sessions are stored in Redis with:
//! - **Primary key**: `session:{session_id}` → JSON-serialized session data,
//!   `SET ... PXAT {expires}`
//! - **User index**: `user:{user_id}:sessions` (Sorted Set) → session ids scored by
//!   their expiry in epoch milliseconds, `PEXPIREAT {max score}`
//!
//! Each trait method issues exactly one command. Nothing here is pipelined or
//! wrapped in `MULTI`, because the index protocol heals drift lazily instead.
//!
//! # Example
//!
//! ```no_run
//! use composable_rust_sessions::stores::RedisBackend;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = RedisBackend::new("redis://127.0.0.1:6379").await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, SessionError};
use crate::providers::SessionBackend;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// Redis-based session backend.
///
/// Provides:
/// - String values with absolute millisecond expiry
/// - Sorted sets for the per-user session index
/// - Connection multiplexing via `ConnectionManager`
#[derive(Clone)]
pub struct RedisBackend {
    /// Connection manager, cloned per command.
    conn_manager: ConnectionManager,
}

impl RedisBackend {
    /// Create a new Redis session backend.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    ///
    /// # Errors
    ///
    /// Returns error if connection to Redis fails.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| SessionError::Store(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            SessionError::Store(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::debug!("Connected session backend to Redis");

        Ok(Self { conn_manager })
    }

    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn from_connection_manager(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend").finish_non_exhaustive()
    }
}

impl SessionBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn_manager.clone();

        conn.get(key)
            .await
            .map_err(|e| SessionError::Store(format!("Failed to get {key} from Redis: {e}")))
    }

    async fn set(&self, key: &str, value: Vec<u8>, expires_at_ms: i64) -> Result<()> {
        let mut conn = self.conn_manager.clone();

        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PXAT")
            .arg(expires_at_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| SessionError::Store(format!("Failed to set {key} in Redis: {e}")))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();

        let removed: u64 = conn
            .del(key)
            .await
            .map_err(|e| SessionError::Store(format!("Failed to delete {key} from Redis: {e}")))?;

        Ok(removed > 0)
    }

    async fn add_member(&self, key: &str, member: &str, score: i64) -> Result<()> {
        let mut conn = self.conn_manager.clone();

        let _: () = conn.zadd(key, member, score).await.map_err(|e| {
            SessionError::Store(format!("Failed to add {member} to {key}: {e}"))
        })?;

        Ok(())
    }

    async fn range_by_rank(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.conn_manager.clone();

        conn.zrange(key, start, stop)
            .await
            .map_err(|e| SessionError::Store(format!("Failed to read range of {key}: {e}")))
    }

    async fn range_by_rank_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, i64)>> {
        let mut conn = self.conn_manager.clone();

        let members: Vec<(String, f64)> =
            conn.zrange_withscores(key, start, stop).await.map_err(|e| {
                SessionError::Store(format!("Failed to read scored range of {key}: {e}"))
            })?;

        // Scores are epoch milliseconds, exact in an f64 until year 287396.
        #[allow(clippy::cast_possible_truncation)]
        Ok(members
            .into_iter()
            .map(|(member, score)| (member, score as i64))
            .collect())
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();

        let removed: u64 = conn.zrem(key, member).await.map_err(|e| {
            SessionError::Store(format!("Failed to remove {member} from {key}: {e}"))
        })?;

        Ok(removed > 0)
    }

    async fn remove_range_by_score(&self, key: &str, min: i64, max: i64) -> Result<u64> {
        let mut conn = self.conn_manager.clone();

        conn.zrembyscore(key, min, max).await.map_err(|e| {
            SessionError::Store(format!("Failed to remove score range from {key}: {e}"))
        })
    }

    async fn set_absolute_expiry(&self, key: &str, expires_at_ms: i64) -> Result<bool> {
        let mut conn = self.conn_manager.clone();

        let applied: i64 = redis::cmd("PEXPIREAT")
            .arg(key)
            .arg(expires_at_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| SessionError::Store(format!("Failed to set expiry of {key}: {e}")))?;

        Ok(applied == 1)
    }

    async fn absolute_expiry(&self, key: &str) -> Result<Option<i64>> {
        let mut conn = self.conn_manager.clone();

        let expires_at_ms: i64 = redis::cmd("PEXPIRETIME")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| SessionError::Store(format!("Failed to get expiry of {key}: {e}")))?;

        match expires_at_ms {
            -2 => Ok(None), // Key doesn't exist
            -1 => Ok(None), // Key exists but has no expiration
            ms => Ok(Some(ms)),
        }
    }
}

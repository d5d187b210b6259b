//! Session backend trait.

use crate::error::Result;
use std::future::Future;

/// Key-value store with sorted sets and absolute millisecond expiry.
///
/// This trait abstracts over the session storage (Redis). Every method maps to a
/// single store command and is expected to be applied atomically by the store;
/// no method sequence is.
///
/// # Implementation Notes
///
/// - Expired keys must behave as absent for every operation
/// - A sorted set whose last member is removed must cease to exist
/// - Rank arguments follow Redis conventions (negative values count from the end)
/// - The backend is cloned into background tasks, so clones must share the
///   same underlying connection
pub trait SessionBackend: Clone + Send + Sync + 'static {
    /// Get the value stored at `key` (`GET`).
    ///
    /// # Errors
    ///
    /// Returns error if the command fails or `key` holds a non-string value.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Store `value` at `key`, expiring at `expires_at_ms` (`SET key value PXAT ms`).
    ///
    /// Replaces any previous value and expiry.
    ///
    /// # Errors
    ///
    /// Returns error if the command fails.
    fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        expires_at_ms: i64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Delete `key` whatever its type (`DEL`).
    ///
    /// # Returns
    ///
    /// `true` if a key was removed.
    ///
    /// # Errors
    ///
    /// Returns error if the command fails.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Add `member` with `score`, or update the score of an existing member (`ZADD`).
    ///
    /// # Errors
    ///
    /// Returns error if the command fails or `key` is not a sorted set.
    fn add_member(
        &self,
        key: &str,
        member: &str,
        score: i64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Members between ranks `start` and `stop` inclusive, ascending by score (`ZRANGE`).
    ///
    /// # Errors
    ///
    /// Returns error if the command fails or `key` is not a sorted set.
    fn range_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Like [`range_by_rank`](Self::range_by_rank), with each member's score
    /// (`ZRANGE ... WITHSCORES`).
    ///
    /// # Errors
    ///
    /// Returns error if the command fails or `key` is not a sorted set.
    fn range_by_rank_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> impl Future<Output = Result<Vec<(String, i64)>>> + Send;

    /// Remove `member` (`ZREM`).
    ///
    /// # Returns
    ///
    /// `true` if the member was present.
    ///
    /// # Errors
    ///
    /// Returns error if the command fails or `key` is not a sorted set.
    fn remove_member(&self, key: &str, member: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Remove every member whose score lies in `[min, max]` (`ZREMRANGEBYSCORE`).
    ///
    /// # Returns
    ///
    /// Number of members removed.
    ///
    /// # Errors
    ///
    /// Returns error if the command fails or `key` is not a sorted set.
    fn remove_range_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
    ) -> impl Future<Output = Result<u64>> + Send;

    /// Set the absolute expiry of `key` (`PEXPIREAT`).
    ///
    /// # Returns
    ///
    /// `true` if the key exists and the expiry was applied.
    ///
    /// # Errors
    ///
    /// Returns error if the command fails.
    fn set_absolute_expiry(
        &self,
        key: &str,
        expires_at_ms: i64,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Absolute expiry of `key` in epoch milliseconds (`PEXPIRETIME`).
    ///
    /// # Returns
    ///
    /// `None` if the key does not exist or has no expiry.
    ///
    /// # Errors
    ///
    /// Returns error if the command fails.
    fn absolute_expiry(&self, key: &str) -> impl Future<Output = Result<Option<i64>>> + Send;
}

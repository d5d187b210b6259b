//! In-memory session backend for testing.
//!
//! Emulates the Redis semantics the session layer relies on:
//! - keys expire at their absolute expiry and then behave as absent
//! - an emptied sorted set ceases to exist
//! - rank ranges accept negative indexes
//! - commands against a key of the wrong type fail with `WRONGTYPE`
//!
//! Time comes from an injected [`Clock`], typically a [`ManualClock`] shared with
//! the session manager.
//!
//! [`ManualClock`]: super::ManualClock

use crate::clock::Clock;
use crate::error::{Result, SessionError};
use crate::providers::SessionBackend;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    String(Vec<u8>),
    SortedSet(HashMap<String, i64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at_ms: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms)
    }
}

/// Mock session backend.
///
/// Uses in-memory storage for testing.
#[derive(Clone)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
    fail_expiry_updates: Arc<AtomicBool>,
    failing_deletes: Arc<Mutex<HashSet<String>>>,
}

impl MemoryBackend {
    /// Create an empty backend driven by `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
            fail_expiry_updates: Arc::new(AtomicBool::new(false)),
            failing_deletes: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Make every `set_absolute_expiry` call fail until reset (for testing failure
    /// handling of background resyncs).
    pub fn fail_expiry_updates(&self, fail: bool) {
        self.fail_expiry_updates.store(fail, Ordering::SeqCst);
    }

    /// Make every `delete` of `key` fail (for testing partial bulk deletes).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn fail_deletes_of(&self, key: impl Into<String>) -> Result<()> {
        self.failing_deletes
            .lock()
            .map_err(|_| SessionError::Store("Mutex lock failed".to_string()))?
            .insert(key.into());
        Ok(())
    }

    /// Get count of live keys (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn key_count(&self) -> Result<usize> {
        self.with_entries(|entries, _| Ok(entries.len()))
    }

    /// Whether a live key exists (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned.
    pub fn contains_key(&self, key: &str) -> Result<bool> {
        self.with_entries(|entries, _| Ok(entries.contains_key(key)))
    }

    /// Score of `member` in the sorted set at `key` (for testing).
    ///
    /// # Errors
    ///
    /// Returns error if lock is poisoned or `key` is not a sorted set.
    pub fn score(&self, key: &str, member: &str) -> Result<Option<i64>> {
        self.with_entries(|entries, _| match entries.get(key) {
            None => Ok(None),
            Some(entry) => Ok(sorted_set(entry)?.get(member).copied()),
        })
    }

    /// Run `f` against the live entries, after dropping expired ones.
    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Entry>, i64) -> Result<T>,
    ) -> Result<T> {
        let now_ms = self.clock.now_millis();
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| SessionError::Store("Mutex lock failed".to_string()))?;

        entries.retain(|_, entry| !entry.is_expired(now_ms));
        f(&mut entries, now_ms)
    }

    /// Run `f` against the sorted set at `key`, removing the key if `f` empties it.
    fn with_sorted_set<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, i64>) -> T,
    ) -> Result<Option<T>> {
        self.with_entries(|entries, _| {
            let Some(entry) = entries.get_mut(key) else {
                return Ok(None);
            };
            let Value::SortedSet(members) = &mut entry.value else {
                return Err(SessionError::Store(WRONG_TYPE.to_string()));
            };

            let result = f(members);
            if members.is_empty() {
                entries.remove(key);
            }
            Ok(Some(result))
        })
    }

    /// Members of the sorted set at `key`, ascending by (score, member).
    fn ranked(&self, key: &str, start: isize, stop: isize) -> Result<Vec<(String, i64)>> {
        let members = self
            .with_sorted_set(key, |members| {
                let mut ranked: Vec<(String, i64)> =
                    members.iter().map(|(m, s)| (m.clone(), *s)).collect();
                ranked.sort_by(|(m1, s1), (m2, s2)| s1.cmp(s2).then_with(|| m1.cmp(m2)));
                ranked
            })?
            .unwrap_or_default();

        Ok(match resolve_range(members.len(), start, stop) {
            Some((from, to)) => members[from..=to].to_vec(),
            None => Vec::new(),
        })
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(Arc::new(crate::clock::SystemClock))
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend").finish_non_exhaustive()
    }
}

impl SessionBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_entries(|entries, _| match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::String(bytes),
                ..
            }) => Ok(Some(bytes.clone())),
            Some(_) => Err(SessionError::Store(WRONG_TYPE.to_string())),
        })
    }

    async fn set(&self, key: &str, value: Vec<u8>, expires_at_ms: i64) -> Result<()> {
        self.with_entries(|entries, now_ms| {
            if expires_at_ms <= now_ms {
                // Already expired: the write replaces and immediately drops the key
                entries.remove(key);
            } else {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::String(value),
                        expires_at_ms: Some(expires_at_ms),
                    },
                );
            }
            Ok(())
        })
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let failing = self
            .failing_deletes
            .lock()
            .map_err(|_| SessionError::Store("Mutex lock failed".to_string()))?
            .contains(key);
        if failing {
            return Err(SessionError::Store(format!("Injected failure deleting {key}")));
        }

        self.with_entries(|entries, _| Ok(entries.remove(key).is_some()))
    }

    async fn add_member(&self, key: &str, member: &str, score: i64) -> Result<()> {
        self.with_entries(|entries, _| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::SortedSet(HashMap::new()),
                expires_at_ms: None,
            });

            match &mut entry.value {
                Value::SortedSet(members) => {
                    members.insert(member.to_string(), score);
                    Ok(())
                }
                Value::String(_) => Err(SessionError::Store(WRONG_TYPE.to_string())),
            }
        })
    }

    async fn range_by_rank(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        Ok(self
            .ranked(key, start, stop)?
            .into_iter()
            .map(|(member, _)| member)
            .collect())
    }

    async fn range_by_rank_with_scores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, i64)>> {
        self.ranked(key, start, stop)
    }

    async fn remove_member(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .with_sorted_set(key, |members| members.remove(member).is_some())?
            .unwrap_or(false))
    }

    async fn remove_range_by_score(&self, key: &str, min: i64, max: i64) -> Result<u64> {
        Ok(self
            .with_sorted_set(key, |members| {
                let before = members.len();
                members.retain(|_, score| *score < min || *score > max);
                (before - members.len()) as u64
            })?
            .unwrap_or(0))
    }

    async fn set_absolute_expiry(&self, key: &str, expires_at_ms: i64) -> Result<bool> {
        if self.fail_expiry_updates.load(Ordering::SeqCst) {
            return Err(SessionError::Store(format!(
                "Injected failure setting expiry of {key}"
            )));
        }

        self.with_entries(|entries, now_ms| {
            if !entries.contains_key(key) {
                return Ok(false);
            }
            if expires_at_ms <= now_ms {
                entries.remove(key);
            } else if let Some(entry) = entries.get_mut(key) {
                entry.expires_at_ms = Some(expires_at_ms);
            }
            Ok(true)
        })
    }

    async fn absolute_expiry(&self, key: &str) -> Result<Option<i64>> {
        self.with_entries(|entries, _| Ok(entries.get(key).and_then(|e| e.expires_at_ms)))
    }
}

fn sorted_set(entry: &Entry) -> Result<&HashMap<String, i64>> {
    match &entry.value {
        Value::SortedSet(members) => Ok(members),
        Value::String(_) => Err(SessionError::Store(WRONG_TYPE.to_string())),
    }
}

/// Resolve a Redis rank range against a set of `len` members.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = isize::try_from(len).ok()?;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start >= len || start > stop {
        return None;
    }

    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}

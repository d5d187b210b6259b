//! Manually driven clock for testing.

use crate::clock::Clock;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Clock that only moves when told to.
///
/// Clones share the same time, so a clone handed to a [`MemoryBackend`] and one
/// handed to the session manager stay in step.
///
/// [`MemoryBackend`]: super::MemoryBackend
///
/// # Example
///
/// ```
/// use composable_rust_sessions::clock::Clock;
/// use composable_rust_sessions::mocks::ManualClock;
/// use chrono::Duration;
///
/// let clock = ManualClock::at_test_epoch();
/// let start = clock.now();
/// clock.advance(Duration::minutes(5));
/// assert_eq!(clock.now() - start, Duration::minutes(5));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock stopped at `time`.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(time.timestamp_millis())),
        }
    }

    /// Create a clock stopped at 2025-01-01 00:00:00 UTC.
    #[must_use]
    pub fn at_test_epoch() -> Self {
        Self::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or_default())
    }

    /// Move the clock forward (or backward, for a negative duration).
    pub fn advance(&self, by: Duration) {
        self.now_ms.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }

    /// Jump to `time`.
    pub fn set(&self, time: DateTime<Utc>) {
        self.now_ms.store(time.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.now_millis())
            .single()
            .unwrap_or_default()
    }

    fn now_millis(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

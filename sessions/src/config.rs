//! Session layer configuration.
//!
//! Values can be built in code or loaded from environment variables with
//! sensible defaults.

use crate::index::DEFAULT_MAX_RESYNC_PASSES;
use crate::state::{DEFAULT_SESSION_ID_BYTES, clamp_session_id_bytes};
use serde::{Deserialize, Serialize};
use std::env;

/// Default Redis URL.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Session layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Redis connection URL.
    ///
    /// Default: `redis://127.0.0.1:6379`
    pub redis_url: String,

    /// Random bytes in a generated session id (encoded as base64url).
    ///
    /// Default: 32 (256 bits). Values below 16 are raised to 16.
    pub generated_id_bytes: usize,

    /// Read-apply passes an index TTL resync makes while the index keeps changing.
    ///
    /// Default: 3
    pub max_resync_passes: u32,
}

impl SessionConfig {
    /// Create configuration for the given Redis URL.
    #[must_use]
    pub const fn new(redis_url: String) -> Self {
        Self {
            redis_url,
            generated_id_bytes: DEFAULT_SESSION_ID_BYTES,
            max_resync_passes: DEFAULT_MAX_RESYNC_PASSES,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// - `REDIS_URL`
    /// - `SESSION_ID_BYTES`
    /// - `SESSION_INDEX_RESYNC_PASSES`
    ///
    /// Missing or unparsable values fall back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string()),
            generated_id_bytes: env::var("SESSION_ID_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .map_or(DEFAULT_SESSION_ID_BYTES, clamp_session_id_bytes),
            max_resync_passes: env::var("SESSION_INDEX_RESYNC_PASSES")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|passes| *passes > 0)
                .unwrap_or(DEFAULT_MAX_RESYNC_PASSES),
        }
    }

    /// Set the number of random bytes in generated session ids (at least
    /// [`MIN_SESSION_ID_BYTES`](crate::state::MIN_SESSION_ID_BYTES)).
    #[must_use]
    pub const fn with_generated_id_bytes(mut self, bytes: usize) -> Self {
        self.generated_id_bytes = clamp_session_id_bytes(bytes);
        self
    }

    /// Set the maximum number of index TTL resync passes.
    #[must_use]
    pub const fn with_max_resync_passes(mut self, passes: u32) -> Self {
        self.max_resync_passes = passes;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REDIS_URL.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MIN_SESSION_ID_BYTES;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.redis_url, DEFAULT_REDIS_URL);
        assert_eq!(config.generated_id_bytes, 32);
        assert_eq!(config.max_resync_passes, 3);
    }

    #[test]
    fn test_builders() {
        let config = SessionConfig::new("redis://cache:6379".to_string())
            .with_generated_id_bytes(16)
            .with_max_resync_passes(5);

        assert_eq!(config.redis_url, "redis://cache:6379");
        assert_eq!(config.generated_id_bytes, 16);
        assert_eq!(config.max_resync_passes, 5);
    }

    #[test]
    fn test_generated_id_bytes_has_a_floor() {
        let config = SessionConfig::default().with_generated_id_bytes(0);
        assert_eq!(config.generated_id_bytes, MIN_SESSION_ID_BYTES);

        let config = SessionConfig::default().with_generated_id_bytes(8);
        assert_eq!(config.generated_id_bytes, 16);
    }
}

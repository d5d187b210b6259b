//! # Composable Rust Sessions
//!
//! Session records with automatic expiry, plus a per-user index of live
//! sessions, stored in Redis.
//!
//! ## Data Layout
//!
//! ```text
//! session:{session_id}      STRING  JSON record     PXAT = record.expires
//! user:{user_id}:sessions   ZSET    session ids     score = record.expires (ms)
//!                                                   PEXPIREAT = max score
//! ```
//!
//! ## Consistency
//!
//! The record and its index entry are written by two independent commands; no
//! transaction spans them. Derived state is repaired lazily:
//!
//! - after every create, update or delete, the index expiry is resynced to the
//!   highest remaining score in a background task
//! - after every read hit, and whenever enumeration meets an id whose record is
//!   gone, expired index members are pruned in a background task
//!
//! Background tasks never fail the operation that scheduled them; see
//! [`BackgroundTasks`] to wait for them.
//!
//! ## Example
//!
//! ```no_run
//! use composable_rust_sessions::{SessionConfig, SessionData, SessionManager, UserId};
//! use chrono::{Duration, Utc};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sessions = SessionManager::connect(&SessionConfig::from_env()).await?;
//!
//! let session_id = sessions
//!     .create_session(None, SessionData::new("user-1", Utc::now() + Duration::hours(24)))
//!     .await?;
//!
//! sessions
//!     .update_session(&session_id, SessionData::empty().with("theme", "dark"))
//!     .await?;
//!
//! for session in sessions.get_user_sessions(&UserId::from("user-1")).await? {
//!     println!("{} expires {:?}", session.session_id, session.data.expires_at());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod background;
pub mod bulk;
pub mod clock;
pub mod config;
pub mod error;
pub mod index;
pub mod keys;
pub mod manager;
pub mod metrics;
pub mod providers;
pub mod record;
pub mod state;
pub mod stores;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use background::BackgroundTasks;
pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use index::UserSessionIndex;
pub use manager::SessionManager;
pub use providers::SessionBackend;
pub use record::SessionRecords;
pub use state::{SessionData, SessionId, UserId, UserSession};

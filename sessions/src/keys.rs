//! Store key naming.
//!
//! These names are shared with existing deployments and must not change.

use crate::state::{SessionId, UserId};

/// Key of a session record: `session:{session_id}`.
#[must_use]
pub fn session_key(session_id: &SessionId) -> String {
    format!("session:{}", session_id.0)
}

/// Key of a user's session index: `user:{user_id}:sessions`.
#[must_use]
pub fn user_sessions_key(user_id: &UserId) -> String {
    format!("user:{}:sessions", user_id.0)
}

//! Error types for session operations.

use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Error taxonomy for the session layer.
///
/// Client errors (`Validation`, `Conflict`, `NotFound`) are surfaced synchronously
/// to the caller of the triggering operation and are never retried. System errors
/// wrap failures of the underlying store or of (de)serialization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    // ═══════════════════════════════════════════════════════════
    // Client Errors
    // ═══════════════════════════════════════════════════════════

    /// Session data is missing or has malformed required fields.
    #[error("Invalid session data: {0}")]
    Validation(String),

    /// Attempted to change the owner of an existing session.
    #[error(
        "Session {session_id} belongs to user {existing_user_id}, cannot reassign to {attempted_user_id}"
    )]
    Conflict {
        /// Session whose owner was to be changed
        session_id: String,
        /// Owner currently stored
        existing_user_id: String,
        /// Owner requested by the caller
        attempted_user_id: String,
    },

    /// Session does not exist (never created, deleted, or expired).
    #[error("Session not found: {0}")]
    NotFound(String),

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Stored blob could not be decoded, or data could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Store command failed.
    #[error("Store error: {0}")]
    Store(String),
}

impl SessionError {
    /// Returns `true` if this error was caused by the caller's input or by the
    /// state of the addressed session rather than by the infrastructure.
    ///
    /// # Examples
    ///
    /// ```
    /// # use composable_rust_sessions::SessionError;
    /// assert!(SessionError::NotFound("abc".into()).is_client_error());
    /// assert!(!SessionError::Store("connection reset".into()).is_client_error());
    /// ```
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Conflict { .. } | Self::NotFound(_)
        )
    }

    /// Returns `true` for [`SessionError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

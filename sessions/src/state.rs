//! Session state types.
//!
//! A session is a JSON object with two mandatory fields, `userId` and `expires`,
//! plus arbitrary passenger fields that are stored and returned untouched.

use crate::error::{Result, SessionError};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field holding the owning user's id.
pub const USER_ID_FIELD: &str = "userId";

/// Field holding the absolute expiry of the session.
pub const EXPIRES_FIELD: &str = "expires";

/// Number of random bytes in a generated session id.
pub const DEFAULT_SESSION_ID_BYTES: usize = 32;

/// Fewest random bytes a generated session id may carry (128 bits).
pub const MIN_SESSION_ID_BYTES: usize = 16;

/// Clamp a requested generated-id size to [`MIN_SESSION_ID_BYTES`].
#[must_use]
pub const fn clamp_session_id_bytes(bytes: usize) -> usize {
    if bytes < MIN_SESSION_ID_BYTES {
        MIN_SESSION_ID_BYTES
    } else {
        bytes
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Wrap a caller-supplied identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a cryptographically secure random `SessionId`.
    ///
    /// Uses 256 bits of randomness encoded as base64url (43 characters).
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with_bytes(DEFAULT_SESSION_ID_BYTES)
    }

    /// Generate a random `SessionId` from `byte_len` random bytes, raised to at
    /// least [`MIN_SESSION_ID_BYTES`].
    #[must_use]
    pub fn generate_with_bytes(byte_len: usize) -> Self {
        use base64::Engine;
        use rand::RngCore;

        let mut random_bytes = vec![0u8; clamp_session_id_bytes(byte_len)];
        rand::thread_rng().fill_bytes(&mut random_bytes);
        Self(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes))
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of the user owning a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Wrap a user identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Session Data
// ═══════════════════════════════════════════════════════════════════════

/// Session payload: a JSON object keyed by field name.
///
/// Used both for full records (which must carry `userId` and `expires`) and for
/// partial updates (any subset of fields).
///
/// # Examples
///
/// ```
/// use composable_rust_sessions::SessionData;
/// use chrono::{Duration, Utc};
///
/// let data = SessionData::new("user-1", Utc::now() + Duration::minutes(10))
///     .with("theme", "dark")
///     .with("visits", 3);
///
/// assert_eq!(data.user_id(), Some("user-1"));
/// assert_eq!(data.get("theme"), Some(&serde_json::json!("dark")));
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData(Map<String, Value>);

impl SessionData {
    /// Create session data with the two mandatory fields.
    ///
    /// `expires` is written as an ISO-8601 string with millisecond precision.
    #[must_use]
    pub fn new(user_id: impl Into<String>, expires: DateTime<Utc>) -> Self {
        Self::empty()
            .with(USER_ID_FIELD, user_id.into())
            .with(EXPIRES_FIELD, format_expires(expires))
    }

    /// Create data with no fields, typically the start of a partial update.
    #[must_use]
    pub fn empty() -> Self {
        Self(Map::new())
    }

    /// Set a field, consuming and returning `self`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Set a field, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Get a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The owning user, if `userId` is present and a string.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.0.get(USER_ID_FIELD).and_then(Value::as_str)
    }

    /// The absolute expiry in epoch milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] if `expires` is missing or malformed.
    pub fn expires_at_millis(&self) -> Result<i64> {
        let value = self.0.get(EXPIRES_FIELD).ok_or_else(|| {
            SessionError::Validation(format!("missing required field `{EXPIRES_FIELD}`"))
        })?;
        parse_expires(value)
    }

    /// The absolute expiry.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] if `expires` is missing or malformed.
    pub fn expires_at(&self) -> Result<DateTime<Utc>> {
        let millis = self.expires_at_millis()?;
        millis_to_datetime(millis).ok_or_else(|| {
            SessionError::Validation(format!("`{EXPIRES_FIELD}` is out of range: {millis}"))
        })
    }

    /// Shallow-merge `partial` over `self`: top-level keys of `partial` replace
    /// those of `self`, nested objects are not merged.
    pub fn merge(&mut self, partial: Self) {
        self.0.extend(partial.0);
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying JSON object.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Unwrap into the underlying JSON object.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Check the mandatory fields and extract them.
    pub(crate) fn validate(&self) -> Result<RecordHeader> {
        let user_id = match self.0.get(USER_ID_FIELD) {
            Some(Value::String(user_id)) if !user_id.is_empty() => UserId(user_id.clone()),
            Some(Value::String(_)) => {
                return Err(SessionError::Validation(format!(
                    "`{USER_ID_FIELD}` must not be empty"
                )));
            }
            Some(_) => {
                return Err(SessionError::Validation(format!(
                    "`{USER_ID_FIELD}` must be a string"
                )));
            }
            None => {
                return Err(SessionError::Validation(format!(
                    "missing required field `{USER_ID_FIELD}`"
                )));
            }
        };

        Ok(RecordHeader {
            user_id,
            expires_at_ms: self.expires_at_millis()?,
        })
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.0).map_err(|e| SessionError::Serialization(e.to_string()))
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| SessionError::Serialization(e.to_string()))
    }
}

impl From<Map<String, Value>> for SessionData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for SessionData {
    type Error = SessionError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SessionError::Validation(format!(
                "session data must be a JSON object, got {other}"
            ))),
        }
    }
}

/// Mandatory fields of a validated record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub user_id: UserId,
    pub expires_at_ms: i64,
}

/// A live session as returned by user-level enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    /// Session identifier.
    pub session_id: SessionId,
    /// Session payload.
    pub data: SessionData,
}

// ═══════════════════════════════════════════════════════════════════════
// Timestamps
// ═══════════════════════════════════════════════════════════════════════

/// Format an expiry the way it is written on the wire (`2025-01-01T00:10:00.000Z`).
#[must_use]
pub fn format_expires(expires: DateTime<Utc>) -> String {
    expires.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Convert epoch milliseconds to a timestamp.
#[must_use]
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn parse_expires(value: &Value) -> Result<i64> {
    let millis = match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| {
                SessionError::Validation(format!(
                    "`{EXPIRES_FIELD}` is not an ISO-8601 timestamp ({raw}): {e}"
                ))
            })?
            .timestamp_millis(),
        Value::Number(number) => number.as_i64().ok_or_else(|| {
            SessionError::Validation(format!(
                "`{EXPIRES_FIELD}` must be whole epoch milliseconds, got {number}"
            ))
        })?,
        other => {
            return Err(SessionError::Validation(format!(
                "`{EXPIRES_FIELD}` must be an ISO-8601 string or epoch milliseconds, got {other}"
            )));
        }
    };

    // The store rejects non-positive absolute expiry times.
    if millis <= 0 {
        return Err(SessionError::Validation(format!(
            "`{EXPIRES_FIELD}` must be after the Unix epoch, got {millis}"
        )));
    }

    // Must round-trip through `expires_at` and stay exact as a sorted set score.
    if millis_to_datetime(millis).is_none() {
        return Err(SessionError::Validation(format!(
            "`{EXPIRES_FIELD}` is out of range: {millis}"
        )));
    }

    Ok(millis)
}

//! Storage implementations for the session layer.
//!
//! - **Redis Backend** - Session records and per-user indexes with native expiry

pub mod redis_backend;

// Re-exports
pub use redis_backend::RedisBackend;

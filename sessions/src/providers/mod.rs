//! Provider traits consumed by the session layer.
//!
//! The session layer owns no state of its own; everything lives behind a
//! [`SessionBackend`], a key-value store with absolute per-key expiry and sorted
//! sets.

pub mod backend;

pub use backend::SessionBackend;

//! Mock implementations for testing.
//!
//! - [`MemoryBackend`]: in-process stand-in for Redis
//! - [`ManualClock`]: deterministic, advanceable time

pub mod clock;
pub mod memory;

pub use clock::ManualClock;
pub use memory::MemoryBackend;

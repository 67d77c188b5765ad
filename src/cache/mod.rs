//! Cache Module
//!
//! Key/value cache with per-entry expiration, refresh deadlines and a
//! pluggable storage backend.

mod arithmetic;
mod entry;
mod refresh;
mod store;
mod value;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{current_timestamp_ns, Entry, Expiration};
pub use refresh::REFRESH_QUEUE_CAPACITY;
pub use store::{Cache, WeakCache};
pub use value::{Numeric, Value};

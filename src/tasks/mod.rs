//! Background Tasks Module
//!
//! Contains background tasks that run for the lifetime of a cache.
//!
//! # Tasks
//! - Janitor: Removes expired entries from in-memory storage at a fixed interval

mod janitor;

pub(crate) use janitor::Janitor;

//! Per-tag advisory locking.

pub mod lease;
pub mod manager;

pub use lease::TagLease;
pub use manager::{LockInfo, TagLockManager, DEFAULT_POLL_INTERVAL};

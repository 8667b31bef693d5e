//! # vt-core
//!
//! Core crate for the simulated trading terminal, providing:
//!
//! - **Types** (`types`) — enums, quotes and bars, instruments, the order family
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — domain-specific `VtError` via thiserror
//! - **Ordering** (`ordering`) — per-instrument monotonic tick filter
//! - **CPU affinity** (`cpu_affinity`) — pinning the engine worker thread
//! - **Time utilities** (`time_util`) — timestamps and bar bucketing
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod cpu_affinity;
pub mod error;
pub mod logging;
pub mod ordering;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use error::VtError;
pub use types::*;

//! # onio-std
//!
//! Standard implementations for the onio realtime middleware engine.
//!
//! This crate provides:
//! - **Listener registry**: [`ListenerRegistry`] with copy-on-write snapshots
//! - **Standard middleware**: Logging, Timeout
//! - **Testing utilities**: in-memory transport and recording doubles

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core traits
pub use onio_core;

// Modules
pub mod middleware;
pub mod registry;
pub mod testing;

pub use registry::{ListenerEntry, ListenerHandle, ListenerRegistry, ListenerSnapshot};

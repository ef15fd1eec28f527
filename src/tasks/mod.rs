//! Background Tasks Module
//!
//! Contains background tasks that run alongside the server.
//!
//! # Tasks
//! - TTL Cleanup: Sweeps expired entries of the memory backend
//! - Connection Monitor: Logs lifecycle events and reports exhaustion

mod cleanup;
mod monitor;

pub use cleanup::spawn_cleanup_task;
pub use monitor::spawn_connection_monitor;

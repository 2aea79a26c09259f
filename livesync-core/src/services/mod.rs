// File: src/services/mod.rs

pub mod group_sync;
pub mod monitor;

pub use group_sync::GroupSync;
pub use monitor::StreamMonitor;

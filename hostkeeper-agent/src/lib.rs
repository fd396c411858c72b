//! Hostkeeper agent library
//!
//! Periodic health checks of local services, containers, remote hosts and
//! resource usage, with automatic restarts and transition-based operator
//! notifications.

pub mod backends;
pub mod config;
pub mod error;
pub mod execution;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod notifier;
pub mod probe;
pub mod remediate;
pub mod scheduler;
pub mod state;

pub use error::{MonitorError, MonitorResult};
pub use monitor::{CycleReport, Monitor};

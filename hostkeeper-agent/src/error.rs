use std::path::PathBuf;
use thiserror::Error;

/// Error taxonomy of the monitoring engine
///
/// Only `Config` is fatal, and only at start-up. Everything else is recovered
/// inside the cycle that produced it.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("probe for {entity} could not run: {reason}")]
    ProbeExecution { entity: String, reason: String },

    #[error("{action} of {entity} could not be executed: {reason}")]
    RemediationExecution {
        entity: String,
        action: String,
        reason: String,
    },

    #[error("notification delivery failed: {0}")]
    NotificationDelivery(String),

    #[error("failed to persist state to {path}: {source}")]
    StatePersistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{kind} {name} is not monitored")]
    UnknownEntity { kind: String, name: String },
}

pub type MonitorResult<T> = Result<T, MonitorError>;

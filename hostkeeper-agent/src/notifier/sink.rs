use super::MessageFormat;
use crate::error::MonitorResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Chat identifier of the single operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorId(pub i64);

impl fmt::Display for OperatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where operator messages go
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, operator: OperatorId, text: &str, format: MessageFormat) -> MonitorResult<()>;

    fn name(&self) -> &'static str;
}

/// Writes messages to the log only
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn notify(&self, operator: OperatorId, text: &str, format: MessageFormat) -> MonitorResult<()> {
        info!(operator = %operator, ?format, "notify: {}", text);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

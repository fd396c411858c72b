//! Probe backends
//!
//! Narrow capability interfaces in front of the init system, the container
//! runtime, the network and resource sampling. All fragile parsing of tool
//! output lives in the system implementations below this module and returns
//! typed states.

pub mod docker;
pub mod systemd;
pub mod tcp;

use crate::error::MonitorResult;
use crate::execution::CommandExecutor;
use crate::metrics::SystemSampler;
use crate::models::ProcessEntry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// State of a systemd unit as reported by the init system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitState {
    Active,
    /// Definite inactive or failed state, with the raw state text
    Inactive(String),
    /// The query failed or its output could not be interpreted
    Error(String),
}

/// State of a container as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Up(String),
    Exited(String),
    Absent,
    Error(String),
}

/// Result of one TCP connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TcpOutcome {
    Ok,
    Refused(String),
    TimedOut,
    Error(String),
}

/// Lifecycle action on a service or container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitAction {
    Start,
    Stop,
    Restart,
}

impl UnitAction {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitAction::Start => "start",
            UnitAction::Stop => "stop",
            UnitAction::Restart => "restart",
        }
    }

    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "start" => Some(UnitAction::Start),
            "stop" => Some(UnitAction::Stop),
            "restart" => Some(UnitAction::Restart),
            _ => None,
        }
    }
}

impl fmt::Display for UnitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an action command that did run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionReport {
    pub success: bool,
    pub output: String,
}

/// Init system capability (systemd)
#[async_trait]
pub trait UnitBackend: Send + Sync {
    async fn query_unit_state(&self, unit: &str) -> UnitState;

    /// `Err` only when the command itself could not be executed
    async fn unit_action(&self, unit: &str, action: UnitAction) -> MonitorResult<ActionReport>;
}

/// Container runtime capability (docker)
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    async fn query_container_state(&self, container: &str) -> ContainerState;

    /// `Err` only when the command itself could not be executed
    async fn container_action(
        &self,
        container: &str,
        action: UnitAction,
    ) -> MonitorResult<ActionReport>;
}

/// Network reachability capability
#[async_trait]
pub trait TcpProber: Send + Sync {
    async fn tcp_probe(&self, host: &str, port: u16, timeout: Duration) -> TcpOutcome;
}

/// Resource usage capability
#[async_trait]
pub trait ResourceSampler: Send + Sync {
    async fn cpu_percent(&self) -> MonitorResult<f32>;
    async fn disk_percent(&self, mount: &str) -> MonitorResult<f32>;
    async fn top_cpu_consumers(&self, limit: usize) -> MonitorResult<Vec<ProcessEntry>>;
}

/// The full set of backends a monitor probes through
#[derive(Clone)]
pub struct Backends {
    pub units: Arc<dyn UnitBackend>,
    pub containers: Arc<dyn ContainerBackend>,
    pub tcp: Arc<dyn TcpProber>,
    pub resources: Arc<dyn ResourceSampler>,
}

impl Backends {
    /// Real backends: systemctl, docker, tokio sockets, sysinfo + df
    pub fn system(executor: CommandExecutor) -> Self {
        Self {
            units: Arc::new(systemd::SystemdBackend::new(executor.clone())),
            containers: Arc::new(docker::DockerBackend::new(executor.clone())),
            tcp: Arc::new(tcp::SocketProber),
            resources: Arc::new(SystemSampler::new(executor)),
        }
    }
}

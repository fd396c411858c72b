//! Core data model for hostkeeper
//!
//! - Entity descriptors (what is monitored and how)
//! - Tri-state health status (online / offline / unknown)
//! - Probe outcomes and metric readings produced during a cycle

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monitored entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Service,
    Container,
    RemoteHost,
    ResourceMetric,
}

impl EntityKind {
    /// Only services and containers are restarted automatically
    pub fn is_remediable(self) -> bool {
        matches!(self, EntityKind::Service | EntityKind::Container)
    }

    /// Plural path segment used by the control API (`/check/services`, ...)
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "services" | "service" => Some(EntityKind::Service),
            "containers" | "container" | "docker" => Some(EntityKind::Container),
            "hosts" | "host" | "servers" | "server" => Some(EntityKind::RemoteHost),
            "metrics" | "metric" | "resources" => Some(EntityKind::ResourceMetric),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Service => "service",
            EntityKind::Container => "container",
            EntityKind::RemoteHost => "server",
            EntityKind::ResourceMetric => "metric",
        };
        f.write_str(label)
    }
}

/// Which resource a metric entity samples
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "metric", rename_all = "lowercase")]
pub enum Metric {
    Cpu,
    Disk { mount: String },
}

/// Kind-specific check parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckParams {
    Unit { unit: String },
    Container { container: String },
    Tcp { host: String, port: u16 },
    Metric { metric: Metric, threshold_percent: f32 },
}

/// One monitored thing, immutable for the process lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub name: String,
    pub kind: EntityKind,
    pub check: CheckParams,
}

impl EntityDescriptor {
    pub fn service(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            check: CheckParams::Unit { unit: name.clone() },
            name,
            kind: EntityKind::Service,
        }
    }

    pub fn container(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            check: CheckParams::Container { container: name.clone() },
            name,
            kind: EntityKind::Container,
        }
    }

    pub fn remote_host(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            kind: EntityKind::RemoteHost,
            check: CheckParams::Tcp { host: host.into(), port },
        }
    }

    pub fn cpu(threshold_percent: f32) -> Self {
        Self {
            name: "cpu".to_string(),
            kind: EntityKind::ResourceMetric,
            check: CheckParams::Metric { metric: Metric::Cpu, threshold_percent },
        }
    }

    pub fn disk(mount: impl Into<String>, threshold_percent: f32) -> Self {
        let mount = mount.into();
        Self {
            name: format!("disk:{}", mount),
            kind: EntityKind::ResourceMetric,
            check: CheckParams::Metric { metric: Metric::Disk { mount }, threshold_percent },
        }
    }
}

/// Tri-state health classification
///
/// `Unknown` means the probe produced no interpretable signal. It is never
/// treated as a confirmed-down signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Online,
    Offline,
    Unknown,
}

impl HealthStatus {
    pub fn is_online(self) -> bool {
        matches!(self, HealthStatus::Online)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Online => "online",
            HealthStatus::Offline => "offline",
            HealthStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one probe: status plus raw diagnostic text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub status: HealthStatus,
    pub detail: String,
}

impl ProbeOutcome {
    pub fn new(status: HealthStatus, detail: impl Into<String>) -> Self {
        Self { status, detail: detail.into() }
    }

    pub fn online(detail: impl Into<String>) -> Self {
        Self::new(HealthStatus::Online, detail)
    }

    pub fn offline(detail: impl Into<String>) -> Self {
        Self::new(HealthStatus::Offline, detail)
    }

    pub fn unknown(detail: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unknown, detail)
    }
}

/// A single top CPU consumer captured for alert diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

/// Result of sampling a resource metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricReading {
    pub metric: Metric,
    pub threshold_percent: f32,
    pub first_sample: Option<f32>,
    pub second_sample: Option<f32>,
    /// Online = within threshold, Offline = sustained excess, Unknown = sampling failed
    pub status: HealthStatus,
    pub top_consumers: Vec<ProcessEntry>,
    pub detail: String,
}

impl MetricReading {
    pub fn is_alert(&self) -> bool {
        self.status == HealthStatus::Offline
    }
}

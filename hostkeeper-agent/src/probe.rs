//! Health probes
//!
//! One read-only check per entity kind, always producing a tri-state
//! status. Backend failures turn into `Unknown`, never into a panic or an
//! aborted cycle.

use crate::backends::{Backends, ContainerState, TcpOutcome, UnitState};
use crate::models::{
    CheckParams, EntityDescriptor, HealthStatus, Metric, MetricReading, ProbeOutcome,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timings and limits used by the probes
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub tcp_timeout: Duration,
    pub tcp_retry_backoff: Duration,
    pub tcp_retry_timeout: Duration,
    pub cpu_resample_delay: Duration,
    pub top_consumers: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            tcp_timeout: Duration::from_secs(5),
            tcp_retry_backoff: Duration::from_secs(5),
            tcp_retry_timeout: Duration::from_secs(10),
            cpu_resample_delay: Duration::from_secs(5),
            top_consumers: 10,
        }
    }
}

pub struct Probe {
    backends: Backends,
    settings: ProbeSettings,
}

impl Probe {
    pub fn new(backends: Backends, settings: ProbeSettings) -> Self {
        Self { backends, settings }
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Probe a service, container or remote host
    ///
    /// Metric entities go through [`Probe::sample_metric`]; asking for their
    /// plain status here samples them and keeps only the classification.
    pub async fn check(&self, entity: &EntityDescriptor) -> ProbeOutcome {
        match &entity.check {
            CheckParams::Unit { unit } => self.check_service(unit).await,
            CheckParams::Container { container } => self.check_container(container).await,
            CheckParams::Tcp { host, port } => self.check_remote_host(&entity.name, host, *port).await,
            CheckParams::Metric { metric, threshold_percent } => {
                let reading = self.sample_metric(metric, *threshold_percent).await;
                ProbeOutcome::new(reading.status, reading.detail)
            }
        }
    }

    pub async fn check_service(&self, unit: &str) -> ProbeOutcome {
        info!("Checking {}...", unit);
        let outcome = match self.backends.units.query_unit_state(unit).await {
            UnitState::Active => ProbeOutcome::online("active"),
            UnitState::Inactive(state) => ProbeOutcome::offline(state),
            UnitState::Error(reason) => ProbeOutcome::unknown(reason),
        };
        info!("{} is {} ({})", unit, outcome.status, outcome.detail);
        outcome
    }

    pub async fn check_container(&self, container: &str) -> ProbeOutcome {
        info!("Checking {}...", container);
        let outcome = match self.backends.containers.query_container_state(container).await {
            ContainerState::Up(line) => ProbeOutcome::online(line),
            ContainerState::Exited(line) => ProbeOutcome::offline(line),
            ContainerState::Absent => ProbeOutcome::unknown(format!("no container matching {}", container)),
            ContainerState::Error(reason) => ProbeOutcome::unknown(reason),
        };
        info!("{} is {}", container, outcome.status);
        outcome
    }

    /// TCP reachability with one delayed retry
    ///
    /// Online if either attempt connects. After two failures the second
    /// attempt decides: refused or timed out means Offline, anything else
    /// (DNS, unreachable network, ...) means Unknown.
    pub async fn check_remote_host(&self, name: &str, host: &str, port: u16) -> ProbeOutcome {
        info!("Pinging {} at port {}...", name, port);
        let tcp = &self.backends.tcp;

        let first = tcp.tcp_probe(host, port, self.settings.tcp_timeout).await;
        if first == TcpOutcome::Ok {
            info!("Server {} is online.", name);
            return ProbeOutcome::online(format!("{}:{} accepted connection", host, port));
        }

        debug!("First attempt to {}:{} failed ({:?}), retrying", host, port, first);
        tokio::time::sleep(self.settings.tcp_retry_backoff).await;

        let outcome = match tcp.tcp_probe(host, port, self.settings.tcp_retry_timeout).await {
            TcpOutcome::Ok => ProbeOutcome::online(format!(
                "{}:{} accepted connection on retry",
                host, port
            )),
            TcpOutcome::Refused(reason) => {
                ProbeOutcome::offline(format!("{}:{} refused: {}", host, port, reason))
            }
            TcpOutcome::TimedOut => ProbeOutcome::offline(format!(
                "{}:{} timed out after {:?}",
                host, port, self.settings.tcp_retry_timeout
            )),
            TcpOutcome::Error(reason) => {
                ProbeOutcome::unknown(format!("{}:{} failed: {}", host, port, reason))
            }
        };
        info!("Server {} is {} ({})", name, outcome.status, outcome.detail);
        outcome
    }

    /// Sample a resource metric
    ///
    /// CPU needs two consecutive samples over threshold (spikes are common);
    /// disk alerts on a single sample.
    pub async fn sample_metric(&self, metric: &Metric, threshold_percent: f32) -> MetricReading {
        match metric {
            Metric::Cpu => self.sample_cpu(threshold_percent).await,
            Metric::Disk { mount } => self.sample_disk(mount, threshold_percent).await,
        }
    }

    async fn sample_cpu(&self, threshold_percent: f32) -> MetricReading {
        let resources = &self.backends.resources;
        let mut reading = MetricReading {
            metric: Metric::Cpu,
            threshold_percent,
            first_sample: None,
            second_sample: None,
            status: HealthStatus::Unknown,
            top_consumers: Vec::new(),
            detail: String::new(),
        };

        let first = match resources.cpu_percent().await {
            Ok(percent) => percent,
            Err(e) => {
                warn!("CPU sampling failed: {}", e);
                reading.detail = e.to_string();
                return reading;
            }
        };
        info!("CPU usage: {:.1}%", first);
        reading.first_sample = Some(first);

        if first <= threshold_percent {
            reading.status = HealthStatus::Online;
            reading.detail = format!("{:.1}%", first);
            return reading;
        }

        tokio::time::sleep(self.settings.cpu_resample_delay).await;

        let second = match resources.cpu_percent().await {
            Ok(percent) => percent,
            Err(e) => {
                warn!("CPU re-sampling failed: {}", e);
                reading.detail = e.to_string();
                return reading;
            }
        };
        info!("CPU usage on re-sample: {:.1}%", second);
        reading.second_sample = Some(second);

        if second <= threshold_percent {
            debug!("CPU spike of {:.1}% did not persist", first);
            reading.status = HealthStatus::Online;
            reading.detail = format!("{:.1}% then {:.1}%", first, second);
            return reading;
        }

        reading.status = HealthStatus::Offline;
        reading.detail = format!("{:.1}% then {:.1}%", first, second);
        match resources.top_cpu_consumers(self.settings.top_consumers).await {
            Ok(top) => reading.top_consumers = top,
            Err(e) => warn!("Could not capture top CPU consumers: {}", e),
        }
        reading
    }

    async fn sample_disk(&self, mount: &str, threshold_percent: f32) -> MetricReading {
        let mut reading = MetricReading {
            metric: Metric::Disk { mount: mount.to_string() },
            threshold_percent,
            first_sample: None,
            second_sample: None,
            status: HealthStatus::Unknown,
            top_consumers: Vec::new(),
            detail: String::new(),
        };

        match self.backends.resources.disk_percent(mount).await {
            Ok(percent) => {
                info!("Storage usage on {}: {}%", mount, percent);
                reading.first_sample = Some(percent);
                reading.detail = format!("{}%", percent);
                reading.status = if percent > threshold_percent {
                    HealthStatus::Offline
                } else {
                    HealthStatus::Online
                };
            }
            Err(e) => {
                warn!("Disk sampling for {} failed: {}", mount, e);
                reading.detail = e.to_string();
            }
        }
        reading
    }
}

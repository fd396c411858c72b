//! Auto-remediation for services and containers
//!
//! Services get `systemctl restart`, containers get `docker start`. After a
//! settle delay the entity is probed once more to confirm.

use crate::backends::{Backends, UnitAction};
use crate::models::{CheckParams, EntityDescriptor, HealthStatus, ProbeOutcome};
use crate::probe::Probe;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// How a remediation attempt ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RemediationResult {
    /// Was down, confirmed up after the action
    Restored,
    /// The action ran but the entity is still not up
    StillDown { command_output: Option<String> },
    /// The action command itself could not be executed
    ExecutionFailed { reason: String },
}

/// One remediation attempt, never persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemediationAttempt {
    pub entity: String,
    pub action_taken: String,
    pub post_action: Option<ProbeOutcome>,
    pub result: RemediationResult,
}

impl RemediationAttempt {
    pub fn succeeded(&self) -> bool {
        self.result == RemediationResult::Restored
    }

    pub fn post_action_status(&self) -> Option<HealthStatus> {
        self.post_action.as_ref().map(|p| p.status)
    }
}

/// Settle delays between the action and the confirming probe
#[derive(Debug, Clone)]
pub struct RemediationSettings {
    pub service_settle: Duration,
    pub container_settle: Duration,
}

impl Default for RemediationSettings {
    fn default() -> Self {
        Self {
            service_settle: Duration::ZERO,
            container_settle: Duration::from_secs(5),
        }
    }
}

pub struct Remediator {
    backends: Backends,
    probe: Arc<Probe>,
    settings: RemediationSettings,
}

impl Remediator {
    pub fn new(backends: Backends, probe: Arc<Probe>, settings: RemediationSettings) -> Self {
        Self { backends, probe, settings }
    }

    /// Try to bring a down service or container back
    ///
    /// Returns `None` for kinds that are observation-only.
    pub async fn remediate(&self, entity: &EntityDescriptor) -> Option<RemediationAttempt> {
        let (action_taken, action_result, settle) = match &entity.check {
            CheckParams::Unit { unit } => {
                info!("Restarting {}...", unit);
                (
                    format!("systemctl restart {}", unit),
                    self.backends.units.unit_action(unit, UnitAction::Restart).await,
                    self.settings.service_settle,
                )
            }
            CheckParams::Container { container } => {
                info!("Restarting {}...", container);
                (
                    format!("docker start {}", container),
                    self.backends.containers.container_action(container, UnitAction::Start).await,
                    self.settings.container_settle,
                )
            }
            CheckParams::Tcp { .. } | CheckParams::Metric { .. } => return None,
        };

        let report = match action_result {
            Ok(report) => report,
            Err(e) => {
                error!("Error while restarting {} {}: {}", entity.kind, entity.name, e);
                return Some(RemediationAttempt {
                    entity: entity.name.clone(),
                    action_taken,
                    post_action: None,
                    result: RemediationResult::ExecutionFailed { reason: e.to_string() },
                });
            }
        };

        let command_output = if report.success {
            None
        } else {
            warn!("{} exited unsuccessfully: {}", action_taken, report.output.trim());
            Some(report.output.trim().to_string())
        };

        tokio::time::sleep(settle).await;
        let post = self.probe.check(entity).await;

        let result = if post.status.is_online() {
            info!("{} {} was restarted successfully.", entity.kind, entity.name);
            RemediationResult::Restored
        } else {
            info!("{} {} was down, and could not be restarted.", entity.kind, entity.name);
            RemediationResult::StillDown { command_output }
        };

        Some(RemediationAttempt {
            entity: entity.name.clone(),
            action_taken,
            post_action: Some(post),
            result,
        })
    }
}

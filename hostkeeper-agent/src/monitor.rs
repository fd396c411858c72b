//! Check cycle engine
//!
//! A cycle has two phases. The observe phase probes every entity and runs
//! remediation where needed; it touches no shared state. The commit phase
//! holds the state store lock while it loads the previous snapshot, decides
//! notifications from the transitions, updates and saves the snapshot.
//! Notifications are sent after the lock is released.

use crate::backends::{ActionReport, Backends, UnitAction};
use crate::error::{MonitorError, MonitorResult};
use crate::metrics::SystemMetrics;
use crate::models::{CheckParams, EntityDescriptor, EntityKind, Metric, ProbeOutcome};
use crate::notifier::{DeliverySummary, EntityObservation, Notification, Notifier, Observation, Trigger};
use crate::probe::{Probe, ProbeSettings};
use crate::remediate::{RemediationSettings, Remediator};
use crate::state::{StateSnapshot, StateStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outcome of one cycle, returned to the scheduler and the control API
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub observations: Vec<Observation>,
    pub notifications: Vec<Notification>,
    /// False when the snapshot could not be written; the next cycle
    /// compares against the older file
    pub persisted: bool,
    pub delivery: DeliverySummary,
}

/// Result of an operator-requested action plus a fresh probe
#[derive(Debug, Clone, Serialize)]
pub struct ControlOutcome {
    pub report: ActionReport,
    pub status: ProbeOutcome,
}

pub struct Monitor {
    entities: Vec<EntityDescriptor>,
    backends: Backends,
    probe: Arc<Probe>,
    remediator: Remediator,
    notifier: Notifier,
    store: Arc<StateStore>,
}

impl Monitor {
    pub fn new(
        entities: Vec<EntityDescriptor>,
        backends: Backends,
        probe_settings: ProbeSettings,
        remediation_settings: RemediationSettings,
        notifier: Notifier,
        store: Arc<StateStore>,
    ) -> Self {
        let probe = Arc::new(Probe::new(backends.clone(), probe_settings));
        let remediator = Remediator::new(backends.clone(), probe.clone(), remediation_settings);
        Self {
            entities,
            backends,
            probe,
            remediator,
            notifier,
            store,
        }
    }

    pub fn entities(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    pub fn find(&self, kind: EntityKind, name: &str) -> Option<&EntityDescriptor> {
        self.entities.iter().find(|e| e.kind == kind && e.name == name)
    }

    /// Full scheduled cycle over every configured entity
    pub async fn run_cycle(&self) -> CycleReport {
        let entities: Vec<&EntityDescriptor> = self.entities.iter().collect();
        self.run(&entities, Trigger::Scheduled).await
    }

    /// On-demand check of every entity of one kind
    pub async fn check_kind(&self, kind: EntityKind) -> CycleReport {
        let entities: Vec<&EntityDescriptor> =
            self.entities.iter().filter(|e| e.kind == kind).collect();
        self.run(&entities, Trigger::OnDemand).await
    }

    /// On-demand check of every configured entity
    pub async fn check_all(&self) -> CycleReport {
        let entities: Vec<&EntityDescriptor> = self.entities.iter().collect();
        self.run(&entities, Trigger::OnDemand).await
    }

    /// On-demand check of one entity; `None` if it is not configured
    pub async fn check_entity(&self, kind: EntityKind, name: &str) -> Option<CycleReport> {
        let entity = self.find(kind, name)?;
        Some(self.run(&[entity], Trigger::OnDemand).await)
    }

    async fn run(&self, entities: &[&EntityDescriptor], trigger: Trigger) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(cycle = %cycle_id, ?trigger, "Starting check of {} entities", entities.len());

        let mut observations = Vec::with_capacity(entities.len());
        for entity in entities {
            observations.push(self.observe(entity).await);
        }

        let (notifications, persisted) = self.commit(&observations, trigger).await;
        let delivery = self.notifier.deliver(&notifications).await;

        let finished_at = Utc::now();
        info!(
            cycle = %cycle_id,
            "Check finished in {} ms: {} notifications ({} delivered, {} failed)",
            (finished_at - started_at).num_milliseconds(),
            notifications.len(),
            delivery.delivered,
            delivery.failed
        );

        CycleReport {
            cycle_id,
            trigger,
            started_at,
            finished_at,
            observations,
            notifications,
            persisted,
            delivery,
        }
    }

    /// Probe one entity and remediate it if it is down
    ///
    /// Unknown services and containers are remediated as well: a restart is
    /// the only way to learn more about them.
    pub async fn observe(&self, entity: &EntityDescriptor) -> Observation {
        if let CheckParams::Metric { metric, threshold_percent } = &entity.check {
            let reading = self.probe.sample_metric(metric, *threshold_percent).await;
            return Observation::Metric {
                entity: entity.clone(),
                reading,
            };
        }

        let probe = self.probe.check(entity).await;
        let remediation = if entity.kind.is_remediable() && !probe.status.is_online() {
            info!("{} {} is {}, trying to bring it back", entity.kind, entity.name, probe.status);
            self.remediator.remediate(entity).await
        } else {
            None
        };

        Observation::Entity(EntityObservation {
            entity: entity.clone(),
            probe,
            remediation,
        })
    }

    /// Decide notifications and persist the new snapshot under the lock
    async fn commit(&self, observations: &[Observation], trigger: Trigger) -> (Vec<Notification>, bool) {
        let _guard = self.store.lock().await;
        let mut snapshot = self.store.load().await;

        let mut notifications = Vec::new();
        for observation in observations {
            let name = &observation.entity().name;
            let prior = snapshot.get(name).copied();
            notifications.extend(self.notifier.decide(observation, prior, trigger));

            if let Some(status) = observation.stored_status() {
                snapshot.insert(name.clone(), status);
            }
        }

        let persisted = match self.store.save(&snapshot).await {
            Ok(()) => true,
            Err(e) => {
                error!("{}", e);
                false
            }
        };

        (notifications, persisted)
    }

    /// Statuses stored by the last cycles
    pub async fn stored_states(&self) -> StateSnapshot {
        let _guard = self.store.lock().await;
        self.store.load().await
    }

    /// Operator-requested start/stop/restart of a configured service or container
    ///
    /// The follow-up probe is reported but not stored; the next cycle owns
    /// the state file.
    pub async fn control(
        &self,
        kind: EntityKind,
        name: &str,
        action: UnitAction,
    ) -> MonitorResult<ControlOutcome> {
        let unknown = || MonitorError::UnknownEntity {
            kind: kind.to_string(),
            name: name.to_string(),
        };
        let entity = self.find(kind, name).ok_or_else(unknown)?;

        info!("Operator requested {} of {} {}", action, entity.kind, entity.name);
        let report = match &entity.check {
            CheckParams::Unit { unit } => self.backends.units.unit_action(unit, action).await?,
            CheckParams::Container { container } => {
                self.backends.containers.container_action(container, action).await?
            }
            CheckParams::Tcp { .. } | CheckParams::Metric { .. } => return Err(unknown()),
        };

        if !report.success {
            warn!("{} of {} {} failed: {}", action, entity.kind, entity.name, report.output.trim());
        }

        let status = self.probe.check(entity).await;
        Ok(ControlOutcome { report, status })
    }

    /// On-demand system overview (uptime, CPU, memory, monitored mounts)
    pub async fn system_info(&self) -> SystemMetrics {
        let mounts: Vec<String> = self
            .entities
            .iter()
            .filter_map(|e| match &e.check {
                CheckParams::Metric { metric: Metric::Disk { mount }, .. } => Some(mount.clone()),
                _ => None,
            })
            .collect();
        SystemMetrics::collect(self.backends.resources.as_ref(), &mounts).await
    }
}

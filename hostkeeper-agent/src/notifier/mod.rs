//! Transition notifier
//!
//! Decides what, if anything, the operator hears about an observation, given
//! the status stored by the previous cycle. Delivery goes through a
//! [`NotificationSink`]; failed deliveries are logged and dropped.

pub mod mqtt;
pub mod sink;
pub mod telegram;

pub use sink::{LogSink, NotificationSink, OperatorId};

use crate::metrics::format_process_table;
use crate::models::{EntityDescriptor, EntityKind, HealthStatus, Metric, MetricReading, ProbeOutcome};
use crate::remediate::{RemediationAttempt, RemediationResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Longest raw diagnostic text quoted in a message
const MAX_DETAIL_CHARS: usize = 1500;

/// Message rendering mode understood by the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    Plain,
    /// HTML subset (`<b>`, `<pre>`), payloads escaped
    Rich,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BackOnline,
    Restarted,
    RestartFailed,
    RestartError,
    Offline,
    StatusUnknown,
    ResourceAlert,
    StatusEcho,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub entity: String,
    pub kind: NotificationKind,
    pub text: String,
    pub format: MessageFormat,
}

/// What caused a check to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    /// Operator asked for this check; routine "still up" results are echoed
    OnDemand,
}

/// Probe (and possibly remediation) result for one service, container or host
#[derive(Debug, Clone, Serialize)]
pub struct EntityObservation {
    pub entity: EntityDescriptor,
    pub probe: ProbeOutcome,
    pub remediation: Option<RemediationAttempt>,
}

impl EntityObservation {
    /// Status after remediation, which is what gets stored
    pub fn final_status(&self) -> HealthStatus {
        self.remediation
            .as_ref()
            .and_then(RemediationAttempt::post_action_status)
            .unwrap_or(self.probe.status)
    }
}

/// Everything one cycle learned about one entity
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Observation {
    Entity(EntityObservation),
    Metric { entity: EntityDescriptor, reading: MetricReading },
}

impl Observation {
    pub fn entity(&self) -> &EntityDescriptor {
        match self {
            Observation::Entity(obs) => &obs.entity,
            Observation::Metric { entity, .. } => entity,
        }
    }

    /// Status to persist; metrics are not tracked across cycles
    pub fn stored_status(&self) -> Option<HealthStatus> {
        match self {
            Observation::Entity(obs) => Some(obs.final_status()),
            Observation::Metric { .. } => None,
        }
    }
}

/// Delivery counters for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliverySummary {
    pub delivered: usize,
    pub failed: usize,
}

pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    operator: OperatorId,
    repeat_alerts: bool,
    cpu_resample_delay: Duration,
}

impl Notifier {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        operator: OperatorId,
        repeat_alerts: bool,
        cpu_resample_delay: Duration,
    ) -> Self {
        Self {
            sink,
            operator,
            repeat_alerts,
            cpu_resample_delay,
        }
    }

    /// Messages for one observation given the previously stored status
    pub fn decide(
        &self,
        observation: &Observation,
        prior: Option<HealthStatus>,
        trigger: Trigger,
    ) -> Vec<Notification> {
        match observation {
            Observation::Entity(obs) => self.decide_entity(obs, prior, trigger),
            Observation::Metric { entity, reading } => {
                decide_metric(entity, reading, trigger, self.cpu_resample_delay)
            }
        }
    }

    fn decide_entity(
        &self,
        obs: &EntityObservation,
        prior: Option<HealthStatus>,
        trigger: Trigger,
    ) -> Vec<Notification> {
        let entity = &obs.entity;

        if let Some(attempt) = &obs.remediation {
            return vec![remediation_message(entity, attempt)];
        }

        let status = obs.final_status();
        let was_down = matches!(prior, Some(HealthStatus::Offline | HealthStatus::Unknown));

        match status {
            HealthStatus::Online if was_down => vec![back_online(entity)],
            HealthStatus::Online if trigger == Trigger::OnDemand => vec![status_echo(entity)],
            HealthStatus::Online => Vec::new(),
            HealthStatus::Offline | HealthStatus::Unknown => {
                if !self.repeat_alerts && trigger == Trigger::Scheduled && prior == Some(status) {
                    info!("{} {} still {}, alert already sent", entity.kind, entity.name, status);
                    return Vec::new();
                }
                if status == HealthStatus::Offline {
                    vec![offline_alert(entity)]
                } else {
                    vec![unknown_alert(entity, &obs.probe.detail)]
                }
            }
        }
    }

    /// Send a batch; failures are logged, never propagated
    pub async fn deliver(&self, notifications: &[Notification]) -> DeliverySummary {
        let mut summary = DeliverySummary::default();
        for notification in notifications {
            match self
                .sink
                .notify(self.operator, &notification.text, notification.format)
                .await
            {
                Ok(()) => summary.delivered += 1,
                Err(e) => {
                    error!("Error while sending {} message: {}", self.sink.name(), e);
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

fn kind_label(kind: EntityKind) -> (&'static str, &'static str) {
    match kind {
        EntityKind::Service => ("📦", "Service"),
        EntityKind::Container => ("🐳", "Container"),
        EntityKind::RemoteHost => ("🖥", "Server"),
        EntityKind::ResourceMetric => ("📈", "Metric"),
    }
}

fn notification(
    entity: &EntityDescriptor,
    kind: NotificationKind,
    text: String,
    format: MessageFormat,
) -> Notification {
    Notification {
        entity: entity.name.clone(),
        kind,
        text,
        format,
    }
}

fn back_online(entity: &EntityDescriptor) -> Notification {
    let (_, label) = kind_label(entity.kind);
    notification(
        entity,
        NotificationKind::BackOnline,
        format!("✅ {} {} is back online.", label, entity.name),
        MessageFormat::Plain,
    )
}

fn status_echo(entity: &EntityDescriptor) -> Notification {
    let (_, label) = kind_label(entity.kind);
    notification(
        entity,
        NotificationKind::StatusEcho,
        format!("✅ {} {} is online.", label, entity.name),
        MessageFormat::Plain,
    )
}

fn offline_alert(entity: &EntityDescriptor) -> Notification {
    let (_, label) = kind_label(entity.kind);
    notification(
        entity,
        NotificationKind::Offline,
        format!("⚠️ {} {} is offline!", label, entity.name),
        MessageFormat::Plain,
    )
}

fn unknown_alert(entity: &EntityDescriptor, detail: &str) -> Notification {
    let (_, label) = kind_label(entity.kind);
    notification(
        entity,
        NotificationKind::StatusUnknown,
        format!(
            "⚠️ Status of {} <b>{}</b> is unknown!\nOutput: <pre>{}</pre>",
            label.to_lowercase(),
            escape_html(&entity.name),
            escape_html(&truncate_detail(detail))
        ),
        MessageFormat::Rich,
    )
}

fn remediation_message(entity: &EntityDescriptor, attempt: &RemediationAttempt) -> Notification {
    let (icon, label) = kind_label(entity.kind);
    match &attempt.result {
        RemediationResult::Restored => notification(
            entity,
            NotificationKind::Restarted,
            format!(
                "🦾 {} {} {} was down, but I have restarted it successfully.",
                icon, label, entity.name
            ),
            MessageFormat::Plain,
        ),
        RemediationResult::ExecutionFailed { reason } => notification(
            entity,
            NotificationKind::RestartError,
            format!(
                "😨 {} {} {} is down, but while restarting it, I encountered an error: {}",
                icon, label, entity.name, reason
            ),
            MessageFormat::Plain,
        ),
        RemediationResult::StillDown { command_output } => {
            if attempt.post_action_status() == Some(HealthStatus::Unknown) {
                let mut detail = attempt
                    .post_action
                    .as_ref()
                    .map(|p| p.detail.clone())
                    .unwrap_or_default();
                if let Some(output) = command_output {
                    detail = format!("{}\n{}", detail, output);
                }
                return unknown_alert(entity, &detail);
            }

            let text = format!(
                "😓 {} {} {} is down, and I was not able to restart it. Please help me!",
                icon, label, entity.name
            );
            match command_output {
                Some(output) if !output.is_empty() => notification(
                    entity,
                    NotificationKind::RestartFailed,
                    format!(
                        "{}\n<pre>{}</pre>",
                        escape_html(&text),
                        escape_html(&truncate_detail(output))
                    ),
                    MessageFormat::Rich,
                ),
                _ => notification(entity, NotificationKind::RestartFailed, text, MessageFormat::Plain),
            }
        }
    }
}

fn decide_metric(
    entity: &EntityDescriptor,
    reading: &MetricReading,
    trigger: Trigger,
    cpu_resample_delay: Duration,
) -> Vec<Notification> {
    let threshold = reading.threshold_percent;
    match (&reading.metric, reading.status) {
        (Metric::Cpu, HealthStatus::Offline) => {
            let first = reading.first_sample.unwrap_or_default();
            let second = reading.second_sample.unwrap_or_default();
            let table = format_process_table(&reading.top_consumers);
            vec![notification(
                entity,
                NotificationKind::ResourceAlert,
                format!(
                    "🔥 CPU usage is high (&gt; {:.0}%). First time it was {:.1}% and after {} seconds it was {:.1}%. These are the top consumers: \n<pre>{}</pre>",
                    threshold,
                    first,
                    cpu_resample_delay.as_secs(),
                    second,
                    escape_html(&table)
                ),
                MessageFormat::Rich,
            )]
        }
        (Metric::Disk { mount }, HealthStatus::Offline) => vec![notification(
            entity,
            NotificationKind::ResourceAlert,
            format!(
                "💾 Storage usage on {} is high: {:.0}% (> {:.0}%).",
                mount,
                reading.first_sample.unwrap_or_default(),
                threshold
            ),
            MessageFormat::Plain,
        )],
        (metric, HealthStatus::Online) if trigger == Trigger::OnDemand => {
            let text = match metric {
                Metric::Cpu => format!("✅ CPU usage is {}.", reading.detail),
                Metric::Disk { mount } => format!("✅ Storage usage on {} is {}.", mount, reading.detail),
            };
            vec![notification(entity, NotificationKind::StatusEcho, text, MessageFormat::Plain)]
        }
        // sampling failed: the metric is not being watched
        (_, HealthStatus::Unknown) => vec![unknown_alert(entity, &reading.detail)],
        _ => Vec::new(),
    }
}

/// Escape text for the HTML subset of rich messages
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn truncate_detail(detail: &str) -> String {
    let detail = detail.trim();
    if detail.chars().count() <= MAX_DETAIL_CHARS {
        return detail.to_string();
    }
    let mut cut: String = detail.chars().take(MAX_DETAIL_CHARS).collect();
    cut.push_str("\n…");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProcessEntry;

    fn notifier(repeat_alerts: bool) -> Notifier {
        Notifier::new(
            Arc::new(LogSink),
            OperatorId(1),
            repeat_alerts,
            Duration::from_secs(5),
        )
    }

    fn observed(entity: EntityDescriptor, probe: ProbeOutcome) -> Observation {
        Observation::Entity(EntityObservation {
            entity,
            probe,
            remediation: None,
        })
    }

    fn remediated(entity: EntityDescriptor, post: Option<ProbeOutcome>, result: RemediationResult) -> Observation {
        Observation::Entity(EntityObservation {
            probe: ProbeOutcome::offline("inactive (dead)"),
            remediation: Some(RemediationAttempt {
                entity: entity.name.clone(),
                action_taken: "systemctl restart".to_string(),
                post_action: post,
                result,
            }),
            entity,
        })
    }

    #[test]
    fn test_first_time_online_is_silent() {
        let obs = observed(EntityDescriptor::service("nginx"), ProbeOutcome::online("active"));
        assert!(notifier(true).decide(&obs, None, Trigger::Scheduled).is_empty());
        assert!(notifier(true)
            .decide(&obs, Some(HealthStatus::Online), Trigger::Scheduled)
            .is_empty());
    }

    #[test]
    fn test_back_online_after_offline_or_unknown() {
        let obs = observed(
            EntityDescriptor::remote_host("nas", "10.0.0.2", 445),
            ProbeOutcome::online("ok"),
        );
        for prior in [HealthStatus::Offline, HealthStatus::Unknown] {
            let notes = notifier(true).decide(&obs, Some(prior), Trigger::Scheduled);
            assert_eq!(notes.len(), 1);
            assert_eq!(notes[0].kind, NotificationKind::BackOnline);
            assert_eq!(notes[0].text, "✅ Server nas is back online.");
        }
    }

    #[test]
    fn test_on_demand_echoes_online() {
        let obs = observed(
            EntityDescriptor::remote_host("nas", "10.0.0.2", 445),
            ProbeOutcome::online("ok"),
        );
        let notes = notifier(true).decide(&obs, None, Trigger::OnDemand);
        assert_eq!(notes[0].kind, NotificationKind::StatusEcho);
    }

    #[test]
    fn test_unknown_alert_carries_escaped_output() {
        let obs = observed(
            EntityDescriptor::remote_host("vpn", "vpn.lan", 1194),
            ProbeOutcome::unknown("lookup <vpn.lan> failed"),
        );
        let notes = notifier(true).decide(&obs, Some(HealthStatus::Online), Trigger::Scheduled);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::StatusUnknown);
        assert_eq!(notes[0].format, MessageFormat::Rich);
        assert!(notes[0].text.contains("lookup &lt;vpn.lan&gt; failed"));
    }

    #[test]
    fn test_repeat_alerts_can_be_suppressed() {
        let obs = observed(
            EntityDescriptor::remote_host("nas", "10.0.0.2", 445),
            ProbeOutcome::offline("refused"),
        );
        let prior = Some(HealthStatus::Offline);
        assert_eq!(notifier(true).decide(&obs, prior, Trigger::Scheduled).len(), 1);
        assert!(notifier(false).decide(&obs, prior, Trigger::Scheduled).is_empty());
        // the operator asked explicitly, so still answer
        assert_eq!(notifier(false).decide(&obs, prior, Trigger::OnDemand).len(), 1);
    }

    #[test]
    fn test_remediation_outcomes_have_distinct_wording() {
        let svc = EntityDescriptor::service("pihole-FTL");
        let n = notifier(true);

        let restored = remediated(svc.clone(), Some(ProbeOutcome::online("active")), RemediationResult::Restored);
        let notes = n.decide(&restored, Some(HealthStatus::Online), Trigger::Scheduled);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::Restarted);

        let failed = remediated(
            svc.clone(),
            Some(ProbeOutcome::offline("failed (Result: exit-code)")),
            RemediationResult::StillDown { command_output: None },
        );
        let notes = n.decide(&failed, None, Trigger::Scheduled);
        assert_eq!(notes[0].kind, NotificationKind::RestartFailed);
        assert!(notes[0].text.contains("not able to restart"));

        let errored = remediated(
            svc,
            None,
            RemediationResult::ExecutionFailed { reason: "systemctl timed out".to_string() },
        );
        let notes = n.decide(&errored, None, Trigger::Scheduled);
        assert_eq!(notes[0].kind, NotificationKind::RestartError);
        assert!(notes[0].text.contains("encountered an error: systemctl timed out"));
    }

    #[test]
    fn test_cpu_alert_lists_top_consumers() {
        let reading = MetricReading {
            metric: Metric::Cpu,
            threshold_percent: 80.0,
            first_sample: Some(93.0),
            second_sample: Some(91.5),
            status: HealthStatus::Offline,
            top_consumers: vec![ProcessEntry {
                pid: 77,
                name: "<stress>".to_string(),
                cpu_percent: 88.0,
                memory_mb: 4.0,
            }],
            detail: String::new(),
        };
        let obs = Observation::Metric { entity: EntityDescriptor::cpu(80.0), reading };
        let notes = notifier(true).decide(&obs, None, Trigger::Scheduled);

        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].format, MessageFormat::Rich);
        assert!(notes[0].text.contains("&lt;stress&gt;"));
        assert!(notes[0].text.contains("93.0%"));
        assert!(notes[0].text.contains("after 5 seconds it was 91.5%"));
    }

    #[test]
    fn test_metric_within_threshold_is_silent_on_schedule() {
        let reading = MetricReading {
            metric: Metric::Disk { mount: "/".to_string() },
            threshold_percent: 90.0,
            first_sample: Some(40.0),
            second_sample: None,
            status: HealthStatus::Online,
            top_consumers: Vec::new(),
            detail: "40%".to_string(),
        };
        let obs = Observation::Metric { entity: EntityDescriptor::disk("/", 90.0), reading };
        assert!(notifier(true).decide(&obs, None, Trigger::Scheduled).is_empty());
        assert_eq!(notifier(true).decide(&obs, None, Trigger::OnDemand).len(), 1);
    }

    #[test]
    fn test_failed_metric_sample_alerts_as_unknown() {
        let reading = MetricReading {
            metric: Metric::Disk { mount: "/mnt/data".to_string() },
            threshold_percent: 90.0,
            first_sample: None,
            second_sample: None,
            status: HealthStatus::Unknown,
            top_consumers: Vec::new(),
            detail: "df: /mnt/data: No such file or directory".to_string(),
        };
        let obs = Observation::Metric { entity: EntityDescriptor::disk("/mnt/data", 90.0), reading };
        let notes = notifier(false).decide(&obs, None, Trigger::Scheduled);

        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::StatusUnknown);
        assert!(notes[0].text.contains("<b>disk:/mnt/data</b> is unknown"));
        assert!(notes[0].text.contains("No such file or directory"));
    }

    #[test]
    fn test_truncate_detail() {
        let long = "x".repeat(MAX_DETAIL_CHARS + 10);
        assert!(truncate_detail(&long).ends_with('…'));
        assert_eq!(truncate_detail("  short  "), "short");
    }
}

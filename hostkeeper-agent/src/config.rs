//! Configuration loading
//!
//! Handles:
//! - Monitored entity lists (TOML + legacy one-per-line list files)
//! - Probe timings and thresholds
//! - Notification sink selection (secrets come from the environment)
//! - Control API and logging settings

use crate::error::{MonitorError, MonitorResult};
use crate::models::{EntityDescriptor, EntityKind};
use crate::notifier::OperatorId;
use crate::probe::ProbeSettings;
use crate::remediate::RemediationSettings;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub services: Vec<String>,
    pub containers: Vec<String>,
    pub hosts: Vec<HostEntry>,
    pub operator: OperatorConfig,
    pub schedule: ScheduleConfig,
    pub state: StateConfig,
    pub probes: ProbeConfig,
    pub remediation: RemediationConfig,
    pub notify: NotifyConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub commands: CommandConfig,
    pub lists: ListFilesConfig,
    /// File the configuration was read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEntry {
    pub name: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub chat_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub interval_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub command_timeout_secs: u64,
    pub tcp_timeout_secs: u64,
    pub tcp_retry_backoff_secs: u64,
    pub tcp_retry_timeout_secs: u64,
    pub cpu_threshold_percent: f32,
    pub cpu_resample_delay_secs: u64,
    pub disk_threshold_percent: f32,
    pub disk_mounts: Vec<String>,
    pub top_consumers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    pub service_settle_secs: u64,
    pub container_settle_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Telegram,
    Mqtt,
    Log,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub sink: SinkKind,
    pub repeat_alerts: bool,
    pub telegram: TelegramConfig,
    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub api_base: String,
    pub timeout_secs: u64,
    #[serde(skip)] // Never read from or written to the file
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: Option<PathBuf>,
    pub file_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub use_sudo: bool,
}

/// Legacy list files, one entry per line
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListFilesConfig {
    pub services_file: Option<PathBuf>,
    pub containers_file: Option<PathBuf>,
    /// `name=host:port` per line
    pub servers_file: Option<PathBuf>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { interval_minutes: 5 }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("server_states.json"),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 30,
            tcp_timeout_secs: 5,
            tcp_retry_backoff_secs: 5,
            tcp_retry_timeout_secs: 10,
            cpu_threshold_percent: 80.0,
            cpu_resample_delay_secs: 5,
            disk_threshold_percent: 90.0,
            disk_mounts: vec!["/".to_string()],
            top_consumers: 10,
        }
    }
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            service_settle_secs: 0,
            container_settle_secs: 5,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Log,
            repeat_alerts: true,
            telegram: TelegramConfig::default(),
            mqtt: MqttConfig::default(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            timeout_secs: 10,
            token: None,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1883,
            client_id: "hostkeeper-agent".to_string(),
            topic: "hostkeeper/notifications@v1".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "127.0.0.1:8088".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_name: "monitoring.log".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Load, merge list files, apply environment secrets and validate
    pub async fn load() -> MonitorResult<Self> {
        let path = Self::config_file_path()?;
        Self::load_from(&path).await
    }

    pub async fn load_from(path: &Path) -> MonitorResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            MonitorError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::parse(&content)?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        config.merge_list_files(base_dir).await?;
        config.apply_env();
        config.validate()?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn parse(content: &str) -> MonitorResult<Self> {
        toml::from_str(content).map_err(|e| MonitorError::Config(e.to_string()))
    }

    /// `HOSTKEEPER_CONFIG`, then `./hostkeeper.toml`, then the OS config dir
    pub fn config_file_path() -> MonitorResult<PathBuf> {
        if let Ok(path) = std::env::var("HOSTKEEPER_CONFIG") {
            return Ok(PathBuf::from(path));
        }

        let local = PathBuf::from("hostkeeper.toml");
        if local.exists() {
            return Ok(local);
        }

        let mut path = dirs::config_dir()
            .ok_or_else(|| MonitorError::Config("could not find config directory".to_string()))?;
        path.push("hostkeeper");
        path.push("config.toml");
        Ok(path)
    }

    async fn merge_list_files(&mut self, base_dir: &Path) -> MonitorResult<()> {
        if let Some(file) = &self.lists.services_file {
            let entries = read_list_file(&base_dir.join(file)).await?;
            self.services.extend(entries);
        }
        if let Some(file) = &self.lists.containers_file {
            let entries = read_list_file(&base_dir.join(file)).await?;
            self.containers.extend(entries);
        }
        if let Some(file) = &self.lists.servers_file {
            for line in read_list_file(&base_dir.join(file)).await? {
                self.hosts.push(parse_server_line(&line)?);
            }
        }
        Ok(())
    }

    /// Secrets and operator id live outside the file
    fn apply_env(&mut self) {
        let chat_id = std::env::var("HOSTKEEPER_CHAT_ID")
            .or_else(|_| std::env::var("CHAT_ID_PERSON1"))
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok());
        if chat_id.is_some() {
            self.operator.chat_id = chat_id;
        }

        self.notify.telegram.token = std::env::var("HOSTKEEPER_TELEGRAM_TOKEN")
            .or_else(|_| std::env::var("SECRET_TOKEN"))
            .ok()
            .filter(|t| !t.trim().is_empty());
    }

    pub fn validate(&self) -> MonitorResult<()> {
        check_names(EntityKind::Service, self.services.iter())?;
        check_names(EntityKind::Container, self.containers.iter())?;
        check_names(EntityKind::RemoteHost, self.hosts.iter().map(|h| &h.name))?;

        for host in &self.hosts {
            if host.host.trim().is_empty() {
                return Err(MonitorError::Config(format!("server {} has no host", host.name)));
            }
            if host.port == 0 {
                return Err(MonitorError::Config(format!("server {} has port 0", host.name)));
            }
        }

        for (label, value) in [
            ("cpu_threshold_percent", self.probes.cpu_threshold_percent),
            ("disk_threshold_percent", self.probes.disk_threshold_percent),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(MonitorError::Config(format!("{} must be in (0, 100], got {}", label, value)));
            }
        }

        for mount in &self.probes.disk_mounts {
            if !mount.starts_with('/') {
                return Err(MonitorError::Config(format!("disk mount {:?} must be an absolute path", mount)));
            }
        }

        if self.schedule.interval_minutes == 0 || self.schedule.interval_minutes > 24 * 60 {
            return Err(MonitorError::Config(format!(
                "interval_minutes must be between 1 and 1440, got {}",
                self.schedule.interval_minutes
            )));
        }

        match self.notify.sink {
            SinkKind::Telegram => {
                if self.notify.telegram.token.is_none() {
                    return Err(MonitorError::Config(
                        "telegram sink needs HOSTKEEPER_TELEGRAM_TOKEN".to_string(),
                    ));
                }
                if self.operator.chat_id.is_none() {
                    return Err(MonitorError::Config(
                        "telegram sink needs operator.chat_id or HOSTKEEPER_CHAT_ID".to_string(),
                    ));
                }
            }
            SinkKind::Mqtt if self.notify.mqtt.topic.trim().is_empty() => {
                return Err(MonitorError::Config("mqtt sink needs a topic".to_string()));
            }
            _ => {}
        }

        Ok(())
    }

    /// Log what was loaded and warn about shared names
    ///
    /// Called once logging is up; loading happens before the subscriber
    /// exists and its events would be dropped.
    pub fn log_summary(&self) {
        let source = self
            .source
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_string());
        info!(
            "Loaded configuration from {}: {} services, {} containers, {} servers",
            source,
            self.services.len(),
            self.containers.len(),
            self.hosts.len()
        );

        for (name, kinds) in self.shared_names() {
            warn!(
                "{} is configured as {:?}; their stored statuses share one record",
                name, kinds
            );
        }
    }

    /// Names used by more than one kind, sorted by name
    ///
    /// The state file is keyed by name only, so equal names collide there.
    pub fn shared_names(&self) -> Vec<(String, Vec<EntityKind>)> {
        let mut kinds_by_name: HashMap<&str, Vec<EntityKind>> = HashMap::new();
        let named = self
            .services
            .iter()
            .map(|n| (n.as_str(), EntityKind::Service))
            .chain(self.containers.iter().map(|n| (n.as_str(), EntityKind::Container)))
            .chain(self.hosts.iter().map(|h| (h.name.as_str(), EntityKind::RemoteHost)));
        for (name, kind) in named {
            kinds_by_name.entry(name).or_default().push(kind);
        }
        let mut shared: Vec<(String, Vec<EntityKind>)> = kinds_by_name
            .into_iter()
            .filter(|(_, kinds)| kinds.len() > 1)
            .map(|(name, kinds)| (name.to_string(), kinds))
            .collect();
        shared.sort_by(|a, b| a.0.cmp(&b.0));
        shared
    }

    /// Monitored entities in cycle order
    pub fn entities(&self) -> Vec<EntityDescriptor> {
        let mut entities: Vec<EntityDescriptor> = Vec::new();
        entities.extend(self.services.iter().map(EntityDescriptor::service));
        entities.extend(self.containers.iter().map(EntityDescriptor::container));
        entities.extend(
            self.hosts
                .iter()
                .map(|h| EntityDescriptor::remote_host(&h.name, &h.host, h.port)),
        );
        entities.push(EntityDescriptor::cpu(self.probes.cpu_threshold_percent));
        entities.extend(
            self.probes
                .disk_mounts
                .iter()
                .map(|m| EntityDescriptor::disk(m, self.probes.disk_threshold_percent)),
        );
        entities
    }

    pub fn operator_id(&self) -> OperatorId {
        OperatorId(self.operator.chat_id.unwrap_or_default())
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            tcp_timeout: Duration::from_secs(self.probes.tcp_timeout_secs),
            tcp_retry_backoff: Duration::from_secs(self.probes.tcp_retry_backoff_secs),
            tcp_retry_timeout: Duration::from_secs(self.probes.tcp_retry_timeout_secs),
            cpu_resample_delay: Duration::from_secs(self.probes.cpu_resample_delay_secs),
            top_consumers: self.probes.top_consumers,
        }
    }

    pub fn remediation_settings(&self) -> RemediationSettings {
        RemediationSettings {
            service_settle: Duration::from_secs(self.remediation.service_settle_secs),
            container_settle: Duration::from_secs(self.remediation.container_settle_secs),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.schedule.interval_minutes) * 60)
    }
}

fn check_names<'a>(kind: EntityKind, names: impl Iterator<Item = &'a String>) -> MonitorResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(MonitorError::Config(format!("empty {} name", kind)));
        }
        // would be taken as an option by systemctl / docker
        if name.starts_with('-') {
            return Err(MonitorError::Config(format!("{} name {:?} starts with '-'", kind, name)));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(MonitorError::Config(format!("{} name {:?} contains whitespace", kind, name)));
        }
        if !seen.insert(name.as_str()) {
            return Err(MonitorError::Config(format!("duplicate {} name {}", kind, name)));
        }
    }
    Ok(())
}

/// Non-empty, non-comment lines of a list file
async fn read_list_file(path: &Path) -> MonitorResult<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        MonitorError::Config(format!("cannot read list file {}: {}", path.display(), e))
    })?;
    Ok(parse_list(&content))
}

pub fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Parse a `name=host:port` server line
pub fn parse_server_line(line: &str) -> MonitorResult<HostEntry> {
    let invalid = || MonitorError::Config(format!("invalid server line {:?}, expected name=host:port", line));

    let (name, address) = line.split_once('=').ok_or_else(invalid)?;
    let (host, port) = address.trim().rsplit_once(':').ok_or_else(invalid)?;
    let port = port.trim().parse::<u16>().map_err(|_| invalid())?;

    Ok(HostEntry {
        name: name.trim().to_string(),
        host: host.trim().trim_start_matches('[').trim_end_matches(']').to_string(),
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
services = ["nginx", "pihole-FTL"]
containers = ["homeassistant"]

[[hosts]]
name = "db-server"
host = "10.0.0.12"
port = 5432

[operator]
chat_id = 123456789

[probes]
cpu_threshold_percent = 85.0
disk_mounts = ["/", "/mnt/data"]

[notify]
sink = "log"
repeat_alerts = false
"#;

    #[test]
    fn test_default_config() {
        let config = MonitorConfig::default();
        assert_eq!(config.schedule.interval_minutes, 5);
        assert_eq!(config.probes.cpu_threshold_percent, 80.0);
        assert_eq!(config.probes.disk_threshold_percent, 90.0);
        assert_eq!(config.notify.sink, SinkKind::Log);
        assert!(config.notify.repeat_alerts);
        assert_eq!(config.interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_parse_sample() {
        let config = MonitorConfig::parse(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.services, vec!["nginx", "pihole-FTL"]);
        assert_eq!(config.hosts[0].port, 5432);
        assert_eq!(config.operator_id(), OperatorId(123456789));
        assert!(!config.notify.repeat_alerts);
        // untouched sections keep their defaults
        assert_eq!(config.probes.tcp_retry_timeout_secs, 10);
    }

    #[test]
    fn test_entities_in_cycle_order() {
        let config = MonitorConfig::parse(SAMPLE).unwrap();
        let kinds: Vec<EntityKind> = config.entities().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EntityKind::Service,
                EntityKind::Service,
                EntityKind::Container,
                EntityKind::RemoteHost,
                EntityKind::ResourceMetric,
                EntityKind::ResourceMetric,
                EntityKind::ResourceMetric,
            ]
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut config = MonitorConfig::default();
        config.services = vec!["nginx".into(), "nginx".into()];
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));
    }

    #[test]
    fn test_option_like_names_rejected() {
        let mut config = MonitorConfig::default();
        config.containers = vec!["--privileged".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut config = MonitorConfig::default();
        config.probes.disk_threshold_percent = 120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_telegram_sink_requires_token() {
        let mut config = MonitorConfig::default();
        config.notify.sink = SinkKind::Telegram;
        config.operator.chat_id = Some(1);
        assert!(config.validate().is_err());

        config.notify.telegram.token = Some("123:abc".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shared_names_are_reported_not_rejected() {
        let mut config = MonitorConfig::default();
        config.services = vec!["nginx".into(), "backup".into()];
        config.containers = vec!["nginx".into()];
        config.hosts = vec![HostEntry {
            name: "backup".into(),
            host: "10.0.0.9".into(),
            port: 22,
        }];

        assert!(config.validate().is_ok());
        assert_eq!(
            config.shared_names(),
            vec![
                ("backup".to_string(), vec![EntityKind::Service, EntityKind::RemoteHost]),
                ("nginx".to_string(), vec![EntityKind::Service, EntityKind::Container]),
            ]
        );
    }

    #[test]
    fn test_parse_server_line() {
        let entry = parse_server_line("db-server=10.0.0.12:5432").unwrap();
        assert_eq!(
            entry,
            HostEntry {
                name: "db-server".into(),
                host: "10.0.0.12".into(),
                port: 5432
            }
        );
        assert!(parse_server_line("db-server").is_err());
        assert!(parse_server_line("db=10.0.0.12:http").is_err());
        assert_eq!(parse_server_line("v6=[fd00::1]:22").unwrap().host, "fd00::1");
    }

    #[test]
    fn test_parse_list_skips_blanks_and_comments() {
        assert_eq!(parse_list("nginx\n\n# old\n  ssh  \n"), vec!["nginx", "ssh"]);
    }

    #[tokio::test]
    async fn test_load_merges_list_files() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("monitoring_services.txt"), "ssh\n").await.unwrap();
        tokio::fs::write(dir.path().join("monitoring_servers.txt"), "nas=192.168.1.20:445\n").await.unwrap();
        let path = dir.path().join("hostkeeper.toml");
        tokio::fs::write(
            &path,
            r#"
services = ["nginx"]

[lists]
services_file = "monitoring_services.txt"
servers_file = "monitoring_servers.txt"
"#,
        )
        .await
        .unwrap();

        let config = MonitorConfig::load_from(&path).await.unwrap();
        assert_eq!(config.services, vec!["nginx", "ssh"]);
        assert_eq!(config.hosts[0].name, "nas");
    }

    #[tokio::test]
    async fn test_missing_config_is_fatal() {
        let dir = tempdir().unwrap();
        let result = MonitorConfig::load_from(&dir.path().join("absent.toml")).await;
        assert!(matches!(result, Err(MonitorError::Config(_))));
    }
}

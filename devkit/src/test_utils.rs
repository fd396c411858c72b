/*!
Test harness for the monitoring engine

Wires scripted backends and a recording sink into a real `Monitor` whose
state file lives in a temporary directory. All probe and settle delays are
zero so scenarios run instantly.
*/

use crate::backend_stub::StubBackends;
use crate::sink_stub::RecordingSink;
use anyhow::{Context, Result};
use hostkeeper_agent::models::EntityDescriptor;
use hostkeeper_agent::notifier::{Notifier, OperatorId};
use hostkeeper_agent::probe::ProbeSettings;
use hostkeeper_agent::remediate::RemediationSettings;
use hostkeeper_agent::state::StateStore;
use hostkeeper_agent::Monitor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const OPERATOR: OperatorId = OperatorId(424242);

pub struct TestHarness {
    pub stubs: StubBackends,
    pub sink: Arc<RecordingSink>,
    pub probe_settings: ProbeSettings,
    pub remediation_settings: RemediationSettings,
    pub repeat_alerts: bool,
    dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        env_logger::try_init().ok();

        Ok(Self {
            stubs: StubBackends::new(),
            sink: Arc::new(RecordingSink::new()),
            probe_settings: ProbeSettings {
                tcp_timeout: Duration::from_secs(5),
                tcp_retry_backoff: Duration::ZERO,
                tcp_retry_timeout: Duration::from_secs(10),
                cpu_resample_delay: Duration::ZERO,
                top_consumers: 10,
            },
            remediation_settings: RemediationSettings {
                service_settle: Duration::ZERO,
                container_settle: Duration::ZERO,
            },
            repeat_alerts: true,
            dir: tempfile::tempdir().context("Failed to create temp dir")?,
        })
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("server_states.json")
    }

    /// A fresh monitor over the harness stubs; monitors built from the same
    /// harness share the state file like restarts of one process would
    pub fn monitor(&self, entities: Vec<EntityDescriptor>) -> Monitor {
        let notifier = Notifier::new(
            self.sink.clone(),
            OPERATOR,
            self.repeat_alerts,
            self.probe_settings.cpu_resample_delay,
        );
        Monitor::new(
            entities,
            self.stubs.backends(),
            self.probe_settings.clone(),
            self.remediation_settings.clone(),
            notifier,
            Arc::new(StateStore::new(self.state_path())),
        )
    }

    pub fn write_state(&self, json: &str) -> Result<()> {
        std::fs::write(self.state_path(), json).context("Failed to seed state file")
    }

    pub fn read_state_raw(&self) -> Result<String> {
        std::fs::read_to_string(self.state_path()).context("Failed to read state file")
    }

    pub fn read_state(&self) -> Result<serde_json::Value> {
        let raw = self.read_state_raw()?;
        serde_json::from_str(&raw).context("State file is not valid JSON")
    }

    /// Texts sent since the last call
    pub fn take_messages(&self) -> Vec<String> {
        let texts = self.sink.texts();
        self.sink.clear();
        texts
    }
}

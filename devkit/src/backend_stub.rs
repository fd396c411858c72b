/*!
Scripted backends

Every entity gets a queue of states. Each query pops the front of the queue;
the last state stays put, so `set_unit("nginx", [inactive, active])` reads
inactive once and active from then on. Actions are recorded and can switch
the entity to a new state.
*/

use async_trait::async_trait;
use hostkeeper_agent::backends::{
    ActionReport, Backends, ContainerBackend, ContainerState, ResourceSampler, TcpOutcome,
    TcpProber, UnitAction, UnitBackend, UnitState,
};
use hostkeeper_agent::error::{MonitorError, MonitorResult};
use hostkeeper_agent::models::ProcessEntry;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Queue of scripted values per key; the last value is sticky
#[derive(Debug)]
struct Script<S> {
    queues: HashMap<String, VecDeque<S>>,
}

impl<S> Default for Script<S> {
    fn default() -> Self {
        Self { queues: HashMap::new() }
    }
}

impl<S: Clone> Script<S> {
    fn set(&mut self, key: &str, values: impl IntoIterator<Item = S>) {
        self.queues.insert(key.to_string(), values.into_iter().collect());
    }

    fn next(&mut self, key: &str) -> Option<S> {
        let queue = self.queues.get_mut(key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

/// What an action does when invoked
#[derive(Debug, Clone)]
pub struct StubAction<S> {
    /// `Err` simulates a command that could not be executed
    pub outcome: Result<ActionReport, String>,
    /// State reported after the action
    pub then: Option<S>,
}

impl<S> StubAction<S> {
    pub fn succeeds(then: S) -> Self {
        Self {
            outcome: Ok(ActionReport { success: true, output: String::new() }),
            then: Some(then),
        }
    }

    /// Command exits non-zero and the state does not change
    pub fn exits_with(output: &str) -> Self {
        Self {
            outcome: Ok(ActionReport { success: false, output: output.to_string() }),
            then: None,
        }
    }

    pub fn cannot_execute(reason: &str) -> Self {
        Self {
            outcome: Err(reason.to_string()),
            then: None,
        }
    }
}

fn run_action<S: Clone>(
    script: &Mutex<Script<S>>,
    actions: &Mutex<HashMap<String, StubAction<S>>>,
    log: &Mutex<Vec<(String, UnitAction)>>,
    name: &str,
    action: UnitAction,
) -> MonitorResult<ActionReport> {
    log.lock().unwrap().push((name.to_string(), action));
    log::info!("🔧 [STUB] {} {}", action, name);

    let Some(stub) = actions.lock().unwrap().get(name).cloned() else {
        return Ok(ActionReport { success: true, output: String::new() });
    };
    if let Some(then) = stub.then {
        script.lock().unwrap().set(name, [then]);
    }
    stub.outcome.map_err(|reason| MonitorError::RemediationExecution {
        entity: name.to_string(),
        action: action.to_string(),
        reason,
    })
}

#[derive(Default)]
pub struct StubUnits {
    states: Mutex<Script<UnitState>>,
    actions: Mutex<HashMap<String, StubAction<UnitState>>>,
    performed: Mutex<Vec<(String, UnitAction)>>,
}

#[async_trait]
impl UnitBackend for StubUnits {
    async fn query_unit_state(&self, unit: &str) -> UnitState {
        self.states
            .lock()
            .unwrap()
            .next(unit)
            .unwrap_or_else(|| UnitState::Error(format!("unit {} not scripted", unit)))
    }

    async fn unit_action(&self, unit: &str, action: UnitAction) -> MonitorResult<ActionReport> {
        run_action(&self.states, &self.actions, &self.performed, unit, action)
    }
}

#[derive(Default)]
pub struct StubContainers {
    states: Mutex<Script<ContainerState>>,
    actions: Mutex<HashMap<String, StubAction<ContainerState>>>,
    performed: Mutex<Vec<(String, UnitAction)>>,
}

#[async_trait]
impl ContainerBackend for StubContainers {
    async fn query_container_state(&self, container: &str) -> ContainerState {
        self.states
            .lock()
            .unwrap()
            .next(container)
            .unwrap_or(ContainerState::Absent)
    }

    async fn container_action(&self, container: &str, action: UnitAction) -> MonitorResult<ActionReport> {
        run_action(&self.states, &self.actions, &self.performed, container, action)
    }
}

#[derive(Default)]
pub struct StubTcp {
    outcomes: Mutex<Script<TcpOutcome>>,
    attempts: Mutex<Vec<(String, Duration)>>,
}

#[async_trait]
impl TcpProber for StubTcp {
    async fn tcp_probe(&self, host: &str, port: u16, timeout: Duration) -> TcpOutcome {
        let key = format!("{}:{}", host, port);
        self.attempts.lock().unwrap().push((key.clone(), timeout));
        self.outcomes
            .lock()
            .unwrap()
            .next(&key)
            .unwrap_or_else(|| TcpOutcome::Error(format!("{} not scripted", key)))
    }
}

#[derive(Default)]
pub struct StubResources {
    cpu: Mutex<Script<Result<f32, String>>>,
    disks: Mutex<Script<Result<f32, String>>>,
    top: Mutex<Vec<ProcessEntry>>,
    cpu_samples: Mutex<usize>,
}

const CPU_KEY: &str = "cpu";

#[async_trait]
impl ResourceSampler for StubResources {
    async fn cpu_percent(&self) -> MonitorResult<f32> {
        *self.cpu_samples.lock().unwrap() += 1;
        let next = self.cpu.lock().unwrap().next(CPU_KEY).unwrap_or(Ok(5.0));
        next.map_err(|reason| MonitorError::ProbeExecution { entity: "cpu".to_string(), reason })
    }

    async fn disk_percent(&self, mount: &str) -> MonitorResult<f32> {
        let next = self.disks.lock().unwrap().next(mount).unwrap_or(Ok(20.0));
        next.map_err(|reason| MonitorError::ProbeExecution { entity: mount.to_string(), reason })
    }

    async fn top_cpu_consumers(&self, limit: usize) -> MonitorResult<Vec<ProcessEntry>> {
        Ok(self.top.lock().unwrap().iter().take(limit).cloned().collect())
    }
}

/// All four scripted backends, shared with the monitor under test
#[derive(Clone, Default)]
pub struct StubBackends {
    pub units: Arc<StubUnits>,
    pub containers: Arc<StubContainers>,
    pub tcp: Arc<StubTcp>,
    pub resources: Arc<StubResources>,
}

impl StubBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backends(&self) -> Backends {
        Backends {
            units: self.units.clone(),
            containers: self.containers.clone(),
            tcp: self.tcp.clone(),
            resources: self.resources.clone(),
        }
    }

    pub fn set_unit(&self, unit: &str, states: impl IntoIterator<Item = UnitState>) {
        self.units.states.lock().unwrap().set(unit, states);
    }

    pub fn on_unit_action(&self, unit: &str, action: StubAction<UnitState>) {
        self.units.actions.lock().unwrap().insert(unit.to_string(), action);
    }

    pub fn unit_actions(&self) -> Vec<(String, UnitAction)> {
        self.units.performed.lock().unwrap().clone()
    }

    pub fn set_container(&self, container: &str, states: impl IntoIterator<Item = ContainerState>) {
        self.containers.states.lock().unwrap().set(container, states);
    }

    pub fn on_container_action(&self, container: &str, action: StubAction<ContainerState>) {
        self.containers.actions.lock().unwrap().insert(container.to_string(), action);
    }

    pub fn container_actions(&self) -> Vec<(String, UnitAction)> {
        self.containers.performed.lock().unwrap().clone()
    }

    pub fn set_tcp(&self, host: &str, port: u16, outcomes: impl IntoIterator<Item = TcpOutcome>) {
        self.tcp.outcomes.lock().unwrap().set(&format!("{}:{}", host, port), outcomes);
    }

    /// `(host:port, timeout)` of every connection attempt so far
    pub fn tcp_attempts(&self) -> Vec<(String, Duration)> {
        self.tcp.attempts.lock().unwrap().clone()
    }

    pub fn set_cpu(&self, samples: impl IntoIterator<Item = Result<f32, String>>) {
        self.resources.cpu.lock().unwrap().set(CPU_KEY, samples);
    }

    pub fn cpu_samples_taken(&self) -> usize {
        *self.resources.cpu_samples.lock().unwrap()
    }

    pub fn set_disk(&self, mount: &str, samples: impl IntoIterator<Item = Result<f32, String>>) {
        self.resources.disks.lock().unwrap().set(mount, samples);
    }

    pub fn set_top_consumers(&self, processes: Vec<ProcessEntry>) {
        *self.resources.top.lock().unwrap() = processes;
    }
}

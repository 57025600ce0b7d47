//! In-memory collaborators.
//!
//! [`InMemoryCiServer`] and [`RecordingExecutor`] hold their state in
//! memory, log every call into a shared [`CallLog`] in the order it was
//! made, and can be told to fail specific calls. They back the reconciler
//! tests and are usable anywhere a real server or backend is not wanted.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use fleet_core::{Agent, AgentId, AgentState, BuildState, ConfigState, Job, StringSet};

use crate::service::{CiServer, Executor};

/// A collaborator call, as recorded by the in-memory implementations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    ScheduledJobs,
    Agents,
    Agent(AgentId),
    DisableAgent(AgentId),
    EnableAgent(AgentId),
    DeleteAgent(AgentId),
    ScaleUp(u32),
    ScaleDown(Vec<AgentId>),
    ManagedAgents,
}

impl Call {
    /// Whether the call changes server or backend state.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::DisableAgent(_)
                | Call::EnableAgent(_)
                | Call::DeleteAgent(_)
                | Call::ScaleUp(_)
                | Call::ScaleDown(_)
        )
    }
}

/// Ordered record of calls, shareable between collaborators.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: Call) {
        lock(&self.calls).push(call);
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// Only the calls that change state, oldest first.
    pub fn mutations(&self) -> Vec<Call> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        lock(&self.calls).iter().filter(|c| *c == call).count()
    }

    pub fn clear(&self) {
        lock(&self.calls).clear();
    }
}

// ── CI server ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ServerState {
    jobs: Vec<Job>,
    agents: Vec<Agent>,
    /// Agents that pick up a job the moment they are disabled.
    busy_on_disable: HashSet<AgentId>,
}

/// A CI server held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCiServer {
    state: Mutex<ServerState>,
    failing: Mutex<HashSet<Call>>,
    /// Calls that fail only on their n-th occurrence (1-based).
    failing_nth: Mutex<HashMap<Call, usize>>,
    seen: Mutex<HashMap<Call, usize>>,
    log: CallLog,
}

impl InMemoryCiServer {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn with_jobs(self, jobs: Vec<Job>) -> Self {
        lock(&self.state).jobs = jobs;
        self
    }

    pub fn with_agents(self, agents: Vec<Agent>) -> Self {
        lock(&self.state).agents = agents;
        self
    }

    /// Make `call` return an error from now on.
    pub fn fail_on(&self, call: Call) {
        lock(&self.failing).insert(call);
    }

    /// Make only the `n`-th occurrence of `call` (counting from 1) return an
    /// error. Earlier and later occurrences succeed.
    pub fn fail_nth(&self, call: Call, n: usize) {
        lock(&self.failing_nth).insert(call, n);
    }

    /// Simulate the server assigning a job to `id` between the reconciler
    /// observing it idle and re-checking it.
    pub fn start_building_on_disable(&self, id: &str) {
        lock(&self.state).busy_on_disable.insert(id.to_string());
    }

    pub fn agent_snapshot(&self, id: &str) -> Option<Agent> {
        lock(&self.state).agents.iter().find(|a| a.id == id).cloned()
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        lock(&self.state).agents.iter().map(|a| a.id.clone()).collect()
    }

    fn enter(&self, call: Call) -> anyhow::Result<()> {
        self.log.push(call.clone());
        let occurrence = {
            let mut seen = lock(&self.seen);
            let n = seen.entry(call.clone()).or_default();
            *n += 1;
            *n
        };
        if lock(&self.failing).contains(&call)
            || lock(&self.failing_nth).get(&call) == Some(&occurrence)
        {
            anyhow::bail!("injected failure: {call:?}");
        }
        Ok(())
    }

    fn update_agent(&self, id: &str, f: impl FnOnce(&mut Agent)) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        let agent = state
            .agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| anyhow::anyhow!("agent {id} not found"))?;
        f(agent);
        Ok(())
    }
}

#[async_trait]
impl CiServer for InMemoryCiServer {
    async fn scheduled_jobs(&self) -> anyhow::Result<Vec<Job>> {
        self.enter(Call::ScheduledJobs)?;
        Ok(lock(&self.state).jobs.clone())
    }

    async fn agents(&self) -> anyhow::Result<Vec<Agent>> {
        self.enter(Call::Agents)?;
        Ok(lock(&self.state).agents.clone())
    }

    async fn agent(&self, id: &str) -> anyhow::Result<Agent> {
        self.enter(Call::Agent(id.to_string()))?;
        self.agent_snapshot(id)
            .ok_or_else(|| anyhow::anyhow!("agent {id} not found"))
    }

    async fn disable_agent(&self, id: &str) -> anyhow::Result<()> {
        self.enter(Call::DisableAgent(id.to_string()))?;
        let busy = lock(&self.state).busy_on_disable.remove(id);
        self.update_agent(id, |agent| {
            agent.config_state = ConfigState::Disabled;
            if busy {
                agent.agent_state = AgentState::Building;
                agent.build_state = BuildState::Building;
            }
        })
    }

    async fn enable_agent(&self, id: &str) -> anyhow::Result<()> {
        self.enter(Call::EnableAgent(id.to_string()))?;
        self.update_agent(id, |agent| agent.config_state = ConfigState::Enabled)
    }

    async fn delete_agent(&self, id: &str) -> anyhow::Result<()> {
        self.enter(Call::DeleteAgent(id.to_string()))?;
        let mut state = lock(&self.state);
        let before = state.agents.len();
        state.agents.retain(|a| a.id != id);
        if state.agents.len() == before {
            anyhow::bail!("agent {id} not found");
        }
        Ok(())
    }
}

// ── Executor ──────────────────────────────────────────────────────

/// A provisioning backend that only tracks ids.
///
/// `scale_up` adds placeholder ids (`pending-N`) to the managed list, as a
/// real backend would for agents still booting.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    managed: Mutex<Vec<AgentId>>,
    provisioned: Mutex<u32>,
    failing: Mutex<HashSet<Call>>,
    log: CallLog,
}

impl RecordingExecutor {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn with_managed(self, ids: &[&str]) -> Self {
        *lock(&self.managed) = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn fail_on(&self, call: Call) {
        lock(&self.failing).insert(call);
    }

    pub fn managed(&self) -> Vec<AgentId> {
        lock(&self.managed).clone()
    }

    fn enter(&self, call: Call) -> anyhow::Result<()> {
        self.log.push(call.clone());
        if lock(&self.failing).contains(&call) {
            anyhow::bail!("injected failure: {call:?}");
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn scale_up(&self, count: u32) -> anyhow::Result<()> {
        self.enter(Call::ScaleUp(count))?;
        let mut provisioned = lock(&self.provisioned);
        let mut managed = lock(&self.managed);
        for _ in 0..count {
            *provisioned += 1;
            managed.push(format!("pending-{}", *provisioned));
        }
        Ok(())
    }

    async fn scale_down(&self, ids: &[AgentId]) -> anyhow::Result<()> {
        self.enter(Call::ScaleDown(ids.to_vec()))?;
        lock(&self.managed).retain(|id| !ids.contains(id));
        Ok(())
    }

    async fn managed_agents(&self) -> anyhow::Result<Vec<AgentId>> {
        self.enter(Call::ManagedAgents)?;
        Ok(self.managed())
    }
}

// ── Builders ──────────────────────────────────────────────────────

/// An enabled agent tagged with `environments` and `resources`.
pub fn agent(
    id: &str,
    environments: &[&str],
    resources: &[&str],
    agent_state: AgentState,
    build_state: BuildState,
) -> Agent {
    Agent {
        id: id.to_string(),
        hostname: format!("{id}.local"),
        environments: StringSet::from(environments),
        resources: StringSet::from(resources),
        agent_state,
        build_state,
        config_state: ConfigState::Enabled,
    }
}

pub fn idle_agent(id: &str, environments: &[&str], resources: &[&str]) -> Agent {
    agent(id, environments, resources, AgentState::Idle, BuildState::Idle)
}

pub fn building_agent(id: &str, environments: &[&str], resources: &[&str]) -> Agent {
    agent(id, environments, resources, AgentState::Building, BuildState::Building)
}

pub fn job(name: &str, environment: &str, resources: &[&str]) -> Job {
    Job {
        name: name.to_string(),
        environment: environment.to_string(),
        resources: StringSet::from(resources),
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

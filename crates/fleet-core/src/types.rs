//! Read-only views of the CI server's jobs and agents.
//!
//! These are what the reconciler sees; the server client maps its wire
//! format onto them.

use serde::{Deserialize, Serialize};

use crate::sets::StringSet;

/// Unique identifier of a build agent (the server-assigned UUID).
pub type AgentId = String;

// ── Job ───────────────────────────────────────────────────────────

/// A job waiting in the server's queue for an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Build locator, e.g. `pipeline/12/stage/1/job`. Informational.
    pub name: String,
    /// Required environment. Empty means the job has no environment constraint.
    pub environment: String,
    /// Resource tags an agent must carry to run this job.
    pub resources: StringSet,
}

// ── Agent ─────────────────────────────────────────────────────────

/// A build agent registered with the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub hostname: String,
    pub environments: StringSet,
    pub resources: StringSet,
    pub agent_state: AgentState,
    pub build_state: BuildState,
    pub config_state: ConfigState,
}

/// Runtime state of the agent process as seen by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentState {
    Idle,
    Building,
    LostContact,
    Missing,
    Unknown,
    #[serde(other)]
    Other,
}

/// Build state of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildState {
    Idle,
    Building,
    Cancelled,
    Unknown,
    #[serde(other)]
    Other,
}

/// Whether the server will hand work to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigState {
    Enabled,
    Disabled,
    Pending,
    #[serde(other)]
    Other,
}

impl Agent {
    /// Idle for supply purposes: both states are `Idle` or `Unknown`.
    pub fn is_idle(&self) -> bool {
        matches!(self.build_state, BuildState::Idle | BuildState::Unknown)
            && matches!(self.agent_state, AgentState::Idle | AgentState::Unknown)
    }

    /// Building for demand purposes: both states are `Building`.
    pub fn is_building(&self) -> bool {
        self.build_state == BuildState::Building && self.agent_state == AgentState::Building
    }
}

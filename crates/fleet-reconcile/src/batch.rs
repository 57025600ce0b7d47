//! Typed results of a reconciliation cycle.
//!
//! A cycle can partly succeed: some agents get removed while others fail
//! or turn out to be busy. These types keep the per-agent outcomes and the
//! collected errors side by side instead of folding them into one error.

use fleet_core::AgentId;

use crate::error::{CycleError, CycleResult, ReconcileError};

/// What happened to one agent selected for decommissioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentOutcome {
    /// Confirmed not building and deleted from the server.
    Removed,
    /// Picked up work (or could not be checked) and was re-enabled.
    Reinstated,
    /// Deletion failed; the agent is left registered.
    Failed,
}

/// Per-agent results of one decommission pass.
#[derive(Debug, Default)]
pub struct DecommissionBatch {
    pub outcomes: Vec<(AgentId, AgentOutcome)>,
    pub errors: Vec<ReconcileError>,
}

impl DecommissionBatch {
    pub(crate) fn record(&mut self, id: &str, outcome: AgentOutcome) {
        self.outcomes.push((id.to_string(), outcome));
    }

    /// Agents that were deleted from the server, in processing order.
    pub fn removed(&self) -> Vec<AgentId> {
        self.with_outcome(AgentOutcome::Removed)
    }

    pub fn reinstated(&self) -> Vec<AgentId> {
        self.with_outcome(AgentOutcome::Reinstated)
    }

    pub fn failed(&self) -> Vec<AgentId> {
        self.with_outcome(AgentOutcome::Failed)
    }

    fn with_outcome(&self, wanted: AgentOutcome) -> Vec<AgentId> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == wanted)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// The branch a cycle took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A measurement failed; nothing was changed.
    Aborted,
    /// No demand and no supply.
    Idle,
    /// Demand equals supply.
    Balanced,
    /// More demand than supply, but the group is at `max_agents`.
    AtCapacity,
    /// Asked the executor for `count` new agents.
    ScaledUp { count: u32 },
    /// More supply than demand, but no agent is idle.
    AllBusy,
    /// Ran the decommission protocol over the selected idle agents.
    ScaledDown {
        removed: Vec<AgentId>,
        reinstated: Vec<AgentId>,
    },
}

/// Everything one call to `Reconciler::execute` observed and did.
#[derive(Debug)]
pub struct CycleReport {
    pub demand: Option<u32>,
    pub supply: Option<u32>,
    pub decision: Decision,
    pub errors: Vec<ReconcileError>,
}

impl CycleReport {
    pub(crate) fn aborted(
        demand: Option<u32>,
        supply: Option<u32>,
        errors: Vec<ReconcileError>,
    ) -> Self {
        Self {
            demand,
            supply,
            decision: Decision::Aborted,
            errors,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// The decision if no call failed, otherwise every collected error.
    pub fn into_result(self) -> CycleResult<Decision> {
        if self.errors.is_empty() {
            Ok(self.decision)
        } else {
            Err(CycleError::new(self.errors))
        }
    }
}

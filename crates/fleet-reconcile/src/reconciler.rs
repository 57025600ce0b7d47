//! Reconciler — one feedback cycle between CI demand and agent supply.
//!
//! Each cycle measures demand (matching scheduled jobs plus matching agents
//! that are building) and supply (matching idle agents unioned with the
//! agents the executor manages), then scales up, runs the decommission
//! protocol, or does nothing. No state survives from one cycle to the next.
//!
//! # Decommissioning
//!
//! An agent observed idle may pick up a job before it is deleted. Each
//! selected agent therefore goes through:
//!
//! ```text
//! disable ─▶ get ─┬─ not building ─▶ delete ─▶ (removed)
//!                 └─ building     ─▶ enable ─▶ (reinstated)
//! ```
//!
//! Only removed agents are passed to `Executor::scale_down`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use fleet_core::{AgentId, BuildState, MatchConfig, StringSet};

use crate::batch::{AgentOutcome, CycleReport, DecommissionBatch, Decision};
use crate::error::{AgentOp, CycleError, CycleResult, ReconcileError};
use crate::policy;
use crate::service::{CiServer, Executor};

/// Drives one scaling group towards its demand.
pub struct Reconciler {
    config: MatchConfig,
    server: Arc<dyn CiServer>,
    executor: Arc<dyn Executor>,
}

impl Reconciler {
    /// Create a reconciler for the group described by `config`.
    pub fn new(config: MatchConfig, server: Arc<dyn CiServer>, executor: Arc<dyn Executor>) -> Self {
        Self {
            config,
            server,
            executor,
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Matching scheduled jobs plus matching agents that are building.
    ///
    /// Both queries are attempted; if either fails no count is returned.
    pub async fn demand(&self) -> CycleResult<u32> {
        let mut errors = Vec::new();

        let pending = match self.server.scheduled_jobs().await {
            Ok(jobs) => jobs.iter().filter(|job| self.config.matches(job)).count(),
            Err(e) => {
                errors.push(ReconcileError::ScheduledJobs(e));
                0
            }
        };

        let building = match self.server.agents().await {
            Ok(agents) => agents
                .iter()
                .filter(|agent| self.config.matches_agent_view(agent) && agent.is_building())
                .count(),
            Err(e) => {
                errors.push(ReconcileError::Agents(e));
                0
            }
        };

        if !errors.is_empty() {
            return Err(CycleError::new(errors));
        }

        debug!(pending, building, "demand measured");
        Ok(as_count(pending + building))
    }

    /// Size of the union of idle matching agents and executor-managed agents.
    ///
    /// An agent that is both registered-idle and managed is counted once.
    pub async fn supply(&self) -> CycleResult<u32> {
        let mut errors = Vec::new();

        let idle: StringSet = match self.idle_agents().await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                errors.push(e);
                StringSet::new()
            }
        };

        let managed: StringSet = match self.executor.managed_agents().await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                errors.push(ReconcileError::ManagedAgents(e));
                StringSet::new()
            }
        };

        if !errors.is_empty() {
            return Err(CycleError::new(errors));
        }

        debug!(idle = idle.len(), managed = managed.len(), "supply measured");
        Ok(as_count(idle.union(&managed).len()))
    }

    /// Ids of matching idle agents, in the order the server listed them.
    pub async fn idle_agents(&self) -> Result<Vec<AgentId>, ReconcileError> {
        let agents = self.server.agents().await.map_err(ReconcileError::Agents)?;
        Ok(agents
            .into_iter()
            .filter(|agent| self.config.matches_agent_view(agent) && agent.is_idle())
            .map(|agent| agent.id)
            .collect())
    }

    /// Agents to add for the given demand and supply, capped at `max_agents`.
    pub fn compute_scale_up(&self, demand: u32, supply: u32) -> u32 {
        policy::scale_up_count(demand, supply, self.config.max_agents())
    }

    /// Agents to remove for the given demand and supply, bounded by `idle`.
    pub fn compute_scale_down(&self, demand: u32, supply: u32, idle: u32) -> u32 {
        policy::scale_down_count(demand, supply, idle)
    }

    /// Run one full cycle.
    ///
    /// Measurement failures abort before anything is changed. Failures after
    /// that are collected and the cycle carries on.
    pub async fn execute(&self) -> CycleReport {
        let config = &self.config;
        debug!(
            environments = ?config.environments(),
            resources = ?config.resources(),
            "reconciliation cycle started"
        );

        let demand = self.demand().await;
        let supply = self.supply().await;

        let (demand, supply) = match (demand, supply) {
            (Ok(d), Ok(s)) => (d, s),
            (demand, supply) => {
                let mut errors = Vec::new();
                let demand = match demand {
                    Ok(d) => Some(d),
                    Err(e) => {
                        errors.extend(e.into_errors());
                        None
                    }
                };
                let supply = match supply {
                    Ok(s) => Some(s),
                    Err(e) => {
                        errors.extend(e.into_errors());
                        None
                    }
                };
                warn!(
                    errors = errors.len(),
                    "could not measure demand or supply, skipping cycle"
                );
                return CycleReport::aborted(demand, supply, errors);
            }
        };

        info!(demand, supply, "demand and supply measured");

        let mut errors = Vec::new();
        let decision = if demand > supply {
            self.scale_up(demand, supply, &mut errors).await
        } else if supply > demand {
            self.scale_down(demand, supply, &mut errors).await
        } else if demand == 0 {
            info!("no demand or supply");
            Decision::Idle
        } else {
            info!(agents = supply, "busy, waiting");
            Decision::Balanced
        };

        CycleReport {
            demand: Some(demand),
            supply: Some(supply),
            decision,
            errors,
        }
    }

    async fn scale_up(
        &self,
        demand: u32,
        supply: u32,
        errors: &mut Vec<ReconcileError>,
    ) -> Decision {
        let count = self.compute_scale_up(demand, supply);
        if count == 0 {
            info!(
                supply,
                max_agents = self.config.max_agents(),
                "at cap, not scaling up"
            );
            return Decision::AtCapacity;
        }

        info!(count, demand, supply, "scaling up");
        if let Err(e) = self.executor.scale_up(count).await {
            warn!(count, error = %e, "scale up failed");
            errors.push(ReconcileError::ScaleUp { count, source: e });
        }
        Decision::ScaledUp { count }
    }

    async fn scale_down(
        &self,
        demand: u32,
        supply: u32,
        errors: &mut Vec<ReconcileError>,
    ) -> Decision {
        let idle = match self.idle_agents().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "could not list idle agents");
                errors.push(e);
                return Decision::Aborted;
            }
        };

        let count = self.compute_scale_down(demand, supply, as_count(idle.len()));
        if count == 0 {
            info!(supply, demand, "all busy, waiting");
            return Decision::AllBusy;
        }

        info!(count, idle = idle.len(), demand, supply, "scaling down");
        let selected = &idle[..count as usize];
        let batch = self.decommission(selected).await;

        let removed = batch.removed();
        let reinstated = batch.reinstated();
        errors.extend(batch.errors);

        if !removed.is_empty() {
            if let Err(e) = self.executor.scale_down(&removed).await {
                warn!(agents = ?removed, error = %e, "scale down failed");
                errors.push(ReconcileError::ScaleDown {
                    ids: removed.clone(),
                    source: e,
                });
            }
        } else {
            debug!("no agent confirmed safe to remove");
        }

        Decision::ScaledDown {
            removed,
            reinstated,
        }
    }

    /// Run the decommission protocol over `ids`, one agent at a time.
    ///
    /// Every agent is attempted regardless of earlier failures. The executor
    /// is not called here.
    pub async fn decommission(&self, ids: &[AgentId]) -> DecommissionBatch {
        let mut batch = DecommissionBatch::default();
        for id in ids {
            let outcome = self.decommission_one(id, &mut batch.errors).await;
            batch.record(id, outcome);
        }
        batch
    }

    async fn decommission_one(&self, id: &str, errors: &mut Vec<ReconcileError>) -> AgentOutcome {
        info!(agent = %id, "disabling agent");
        if let Err(e) = self.server.disable_agent(id).await {
            warn!(agent = %id, error = %e, "disable failed, continuing");
            errors.push(ReconcileError::agent(id, AgentOp::Disable, e));
        }

        let building = match self.server.agent(id).await {
            Ok(agent) => agent.build_state == BuildState::Building,
            Err(e) => {
                warn!(agent = %id, error = %e, "could not re-check agent, keeping it");
                errors.push(ReconcileError::agent(id, AgentOp::Get, e));
                true
            }
        };

        if building {
            info!(agent = %id, "agent is building, re-enabling");
            if let Err(e) = self.server.enable_agent(id).await {
                warn!(agent = %id, error = %e, "enable failed");
                errors.push(ReconcileError::agent(id, AgentOp::Enable, e));
            }
            return AgentOutcome::Reinstated;
        }

        info!(agent = %id, "deleting agent");
        match self.server.delete_agent(id).await {
            Ok(()) => AgentOutcome::Removed,
            Err(e) => {
                warn!(agent = %id, error = %e, "delete failed");
                errors.push(ReconcileError::agent(id, AgentOp::Delete, e));
                AgentOutcome::Failed
            }
        }
    }

    /// Run cycles every `interval` until `shutdown` flips.
    ///
    /// The first cycle runs immediately. A failed cycle is logged and the
    /// next one proceeds on schedule.
    pub async fn run(&self, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "reconciler started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.execute().await.into_result() {
                        tracing::error!(error = %e, "reconciliation cycle failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    break;
                }
            }
        }
    }
}

fn as_count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

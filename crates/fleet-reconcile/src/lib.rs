//! fleet-reconcile — the autoscaling control loop for one agent group.
//!
//! Compares demand on the CI server with the agent supply and asks the
//! provisioning backend for more agents, or safely retires idle ones.
//!
//! # Architecture
//!
//! ```text
//! Reconciler
//!   ├── MatchConfig (which jobs and agents belong to the group)
//!   ├── CiServer    (jobs, agents, disable/enable/delete)
//!   ├── Executor    (scale up, scale down, managed agents)
//!   └── policy      (how many agents to add or remove per cycle)
//! ```
//!
//! # Scaling
//!
//! ```text
//! demand = matching scheduled jobs + matching building agents
//! supply = |matching idle agents ∪ executor-managed agents|
//!
//! demand > supply:  add ceil((demand - supply) / 2), capped at max_agents
//! supply > demand:  remove min(ceil((supply - demand) / 2), idle)
//! ```
//!
//! Collaborator failures never stop a cycle half-way, except while
//! measuring: without both numbers nothing is changed.

pub mod batch;
pub mod error;
pub mod memory;
pub mod policy;
pub mod reconciler;
pub mod service;

pub use batch::{AgentOutcome, CycleReport, DecommissionBatch, Decision};
pub use error::{AgentOp, CycleError, CycleResult, ReconcileError};
pub use reconciler::Reconciler;
pub use service::{CiServer, Executor};

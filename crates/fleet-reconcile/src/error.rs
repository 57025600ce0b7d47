//! Reconciler error types.
//!
//! Every failing collaborator call becomes one [`ReconcileError`]. A cycle
//! never stops at the first failure; the errors are gathered into a
//! [`CycleError`] and handed back to the poll loop.

use std::fmt;

use thiserror::Error;

use fleet_core::AgentId;

/// Remote call made while decommissioning a single agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentOp {
    Disable,
    Get,
    Delete,
    Enable,
}

impl fmt::Display for AgentOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentOp::Disable => "disable",
            AgentOp::Get => "get",
            AgentOp::Delete => "delete",
            AgentOp::Enable => "enable",
        };
        f.write_str(name)
    }
}

/// A single failed call during a reconciliation cycle.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("fetching scheduled jobs: {0:#}")]
    ScheduledJobs(#[source] anyhow::Error),

    #[error("fetching agents: {0:#}")]
    Agents(#[source] anyhow::Error),

    #[error("listing managed agents: {0:#}")]
    ManagedAgents(#[source] anyhow::Error),

    #[error("scaling up by {count}: {source:#}")]
    ScaleUp {
        count: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("scaling down {ids:?}: {source:#}")]
    ScaleDown {
        ids: Vec<AgentId>,
        #[source]
        source: anyhow::Error,
    },

    #[error("{op} agent {id}: {source:#}")]
    Agent {
        id: AgentId,
        op: AgentOp,
        #[source]
        source: anyhow::Error,
    },
}

impl ReconcileError {
    pub(crate) fn agent(id: &str, op: AgentOp, source: anyhow::Error) -> Self {
        ReconcileError::Agent {
            id: id.to_string(),
            op,
            source,
        }
    }

    /// The agent this error is about, if it came from decommissioning.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            ReconcileError::Agent { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Every error collected during one cycle.
#[derive(Debug)]
pub struct CycleError {
    errors: Vec<ReconcileError>,
}

impl CycleError {
    pub fn new(errors: Vec<ReconcileError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[ReconcileError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ReconcileError> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => write!(f, "reconciliation failed"),
            [only] => write!(f, "1 error occurred: {only}"),
            errors => {
                write!(f, "{} errors occurred:", errors.len())?;
                for e in errors {
                    write!(f, "\n\t* {e}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for CycleError {}

impl From<Vec<ReconcileError>> for CycleError {
    fn from(errors: Vec<ReconcileError>) -> Self {
        Self::new(errors)
    }
}

/// Result type alias for reconciler operations.
pub type CycleResult<T> = Result<T, CycleError>;

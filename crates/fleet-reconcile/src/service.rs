//! Collaborator contracts consumed by the reconciler.
//!
//! The reconciler never talks to the network directly. It is handed a
//! [`CiServer`] (job and agent queries plus agent mutators) and an
//! [`Executor`] (the provisioning backend) at construction.

use async_trait::async_trait;

use fleet_core::{Agent, AgentId, Job};

/// The CI server the agents register with.
#[async_trait]
pub trait CiServer: Send + Sync {
    /// Jobs waiting for an agent.
    async fn scheduled_jobs(&self) -> anyhow::Result<Vec<Job>>;

    /// Every registered agent, in server order.
    async fn agents(&self) -> anyhow::Result<Vec<Agent>>;

    /// Current view of a single agent.
    async fn agent(&self, id: &str) -> anyhow::Result<Agent>;

    /// Stop the server from scheduling new work onto the agent.
    async fn disable_agent(&self, id: &str) -> anyhow::Result<()>;

    /// Undo [`CiServer::disable_agent`].
    async fn enable_agent(&self, id: &str) -> anyhow::Result<()>;

    /// Remove the agent's registration.
    async fn delete_agent(&self, id: &str) -> anyhow::Result<()>;
}

/// Provisioning backend that creates and destroys the compute behind agents.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Begin provisioning `count` agents tagged for this group. May return
    /// before the agents have registered with the server.
    async fn scale_up(&self, count: u32) -> anyhow::Result<()>;

    /// Tear down the compute backing the given agents.
    async fn scale_down(&self, ids: &[AgentId]) -> anyhow::Result<()>;

    /// Ids of agents the backend owns for this group, including ones still
    /// booting and not yet visible to the server.
    async fn managed_agents(&self) -> anyhow::Result<Vec<AgentId>>;
}

//! Scaling-group filters.
//!
//! A `MatchConfig` describes one group of agents: the environments and
//! resource tags every agent in the group is provisioned with, and the
//! most agents the group may hold.
//!
//! Jobs and agents are matched differently:
//!
//! ```text
//! job   matches  ⇔  (env empty ∧ config envs empty ∨ env ∈ config envs)
//!                   ∧ config resources ⊇ job resources
//! agent matches  ⇔  agent envs = config envs ∧ agent resources = config resources
//! ```
//!
//! A job only needs capabilities the group has; an agent belongs to exactly
//! one group.

use serde::{Deserialize, Serialize};

use crate::sets::StringSet;
use crate::types::{Agent, Job};

/// Environment and resource filters for one scaling group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    environments: StringSet,
    resources: StringSet,
    max_agents: u32,
}

impl MatchConfig {
    pub fn new(environments: StringSet, resources: StringSet, max_agents: u32) -> Self {
        Self {
            environments,
            resources,
            max_agents,
        }
    }

    pub fn environments(&self) -> &StringSet {
        &self.environments
    }

    pub fn resources(&self) -> &StringSet {
        &self.resources
    }

    pub fn max_agents(&self) -> u32 {
        self.max_agents
    }

    /// Whether a job with the given requirements can run on this group.
    ///
    /// An empty `job_env` matches only a group that declares no environments.
    pub fn matches_job(&self, job_env: &str, job_resources: &StringSet) -> bool {
        let env_match = if job_env.is_empty() {
            self.environments.is_empty()
        } else {
            self.environments.contains(job_env)
        };

        env_match && self.resources.is_superset_of(job_resources)
    }

    /// Whether an agent with the given tags belongs to this group.
    pub fn matches_agent(&self, agent_env: &StringSet, agent_resources: &StringSet) -> bool {
        self.environments.equal(agent_env) && self.resources.equal(agent_resources)
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.matches_job(&job.environment, &job.resources)
    }

    pub fn matches_agent_view(&self, agent: &Agent) -> bool {
        self.matches_agent(&agent.environments, &agent.resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentState, BuildState, ConfigState};

    fn set(values: &[&str]) -> StringSet {
        StringSet::from(values)
    }

    fn config(envs: &[&str], resources: &[&str]) -> MatchConfig {
        MatchConfig::new(set(envs), set(resources), 3)
    }

    #[test]
    fn job_matches_declared_env_with_covered_resources() {
        let c = config(&["FT", "Staging"], &["FT"]);
        assert!(c.matches_job("FT", &set(&["FT"])));
        assert!(c.matches_job("Staging", &set(&[])));
    }

    #[test]
    fn job_with_undeclared_env_does_not_match() {
        let c = config(&["FT", "Staging"], &["FT"]);
        assert!(!c.matches_job("Production", &set(&["Production"])));
    }

    #[test]
    fn job_needing_missing_resource_does_not_match() {
        let c = config(&["FT", "Staging"], &["FT"]);
        assert!(!c.matches_job("FT", &set(&["Firefox"])));
    }

    #[test]
    fn job_without_env_matches_only_env_less_groups() {
        assert!(config(&[], &[]).matches_job("", &set(&[])));
        assert!(config(&[], &["docker"]).matches_job("", &set(&["docker"])));
        assert!(!config(&["FT"], &[]).matches_job("", &set(&[])));
    }

    #[test]
    fn job_with_env_never_matches_env_less_group() {
        assert!(!config(&[], &[]).matches_job("FT", &set(&[])));
    }

    #[test]
    fn agent_requires_exact_resources() {
        let c = config(&["FT"], &[]);
        assert!(!c.matches_agent(&set(&["FT"]), &set(&["Staging"])));
        assert!(c.matches_agent(&set(&["FT"]), &set(&[])));
    }

    #[test]
    fn agent_requires_exact_environments() {
        let c = config(&["FT"], &["docker"]);
        assert!(!c.matches_agent(&set(&["FT", "Staging"]), &set(&["docker"])));
        assert!(!c.matches_agent(&set(&[]), &set(&["docker"])));
        assert!(c.matches_agent(&set(&["FT"]), &set(&["docker"])));
    }

    #[test]
    fn matches_delegates_to_job_fields() {
        let c = config(&["FT"], &["docker", "java"]);
        let job = Job {
            name: "p/1/s/1/build".to_string(),
            environment: "FT".to_string(),
            resources: set(&["java"]),
        };
        assert!(c.matches(&job));
    }

    #[test]
    fn agent_view_delegates_to_agent_tags() {
        let c = config(&["FT"], &["docker"]);
        let mut agent = Agent {
            id: "a1".to_string(),
            hostname: "a1.local".to_string(),
            environments: set(&["FT"]),
            resources: set(&["docker"]),
            agent_state: AgentState::Idle,
            build_state: BuildState::Idle,
            config_state: ConfigState::Enabled,
        };
        assert!(c.matches_agent_view(&agent));

        agent.resources.add("java");
        assert!(!c.matches_agent_view(&agent));
    }
}

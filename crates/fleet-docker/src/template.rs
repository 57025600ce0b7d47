//! What an agent container looks like.
//!
//! Labels identify the containers of one agent group so the backend can
//! find them again; the environment tells the agent image how to
//! auto-register with the server.
//!
//! The image must register with the server under the `AGENT_GUID` it is
//! given. Supply counting and scale-down both look agents up by that id, so
//! an image that picks its own id is counted twice and never scaled down.
//! Both the `travix/go-agent` variable names (`GO_SERVER`, `AGENT_KEY`, ...)
//! and the `AGENT_AUTO_REGISTER_*` names are set.

use std::collections::HashMap;

use bollard::container::Config;
use bollard::models::HostConfig;

use fleet_core::{FleetConfig, StringSet};

pub const LABEL_MANAGED: &str = "fleet.managed";
pub const LABEL_ENVIRONMENTS: &str = "fleet.environments";
pub const LABEL_RESOURCES: &str = "fleet.resources";
pub const LABEL_AGENT_UUID: &str = "fleet.agent-uuid";

/// Blueprint for the containers of one agent group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentTemplate {
    pub image: String,
    pub server_host: String,
    pub server_port: u16,
    pub server_url: String,
    pub auto_register_key: String,
    pub environments: StringSet,
    pub resources: StringSet,
}

impl AgentTemplate {
    pub fn from_config(config: &FleetConfig) -> Self {
        Self {
            image: config.docker.image.clone(),
            server_host: config.server.host.clone(),
            server_port: config.server.port,
            server_url: format!("{}/go", config.server_url()),
            auto_register_key: config.agent.auto_register_key.clone(),
            environments: config.agent.environments.iter().cloned().collect(),
            resources: config.agent.resources.iter().cloned().collect(),
        }
    }

    /// Labels on the container running agent `agent`.
    pub fn labels(&self, agent: &str) -> HashMap<String, String> {
        let mut labels = self.group_labels();
        labels.insert(LABEL_AGENT_UUID.to_string(), agent.to_string());
        labels
    }

    /// Create request for agent `agent`'s container.
    ///
    /// The daemon removes the container once it stops, so killed agents
    /// leave nothing behind.
    pub fn container_config(&self, agent: &str) -> Config<String> {
        Config {
            image: Some(self.image.clone()),
            hostname: Some(container_name(agent)),
            env: Some(self.env(agent)),
            labels: Some(self.labels(agent)),
            host_config: Some(HostConfig {
                auto_remove: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Container environment for agent `agent`.
    pub fn env(&self, agent: &str) -> Vec<String> {
        let environments = self.environments.join_sorted(",");
        let resources = self.resources.join_sorted(",");
        vec![
            format!("AGENT_GUID={agent}"),
            format!("GO_SERVER={}", self.server_host),
            format!("GO_SERVER_PORT={}", self.server_port),
            format!("AGENT_KEY={}", self.auto_register_key),
            format!("AGENT_ENVIRONMENTS={environments}"),
            format!("AGENT_RESOURCES={resources}"),
            format!("GO_SERVER_URL={}", self.server_url),
            format!("AGENT_AUTO_REGISTER_KEY={}", self.auto_register_key),
            format!("AGENT_AUTO_REGISTER_ENVIRONMENTS={environments}"),
            format!("AGENT_AUTO_REGISTER_RESOURCES={resources}"),
            format!("AGENT_AUTO_REGISTER_HOSTNAME={}", container_name(agent)),
        ]
    }

    /// `list_containers` filters matching the running containers of this group.
    pub fn group_filter(&self) -> HashMap<String, Vec<String>> {
        let labels = self
            .group_labels()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        HashMap::from([
            ("label".to_string(), labels),
            ("status".to_string(), vec!["running".to_string()]),
        ])
    }

    /// Filters matching the running container of one agent in this group.
    pub fn agent_filter(&self, agent: &str) -> HashMap<String, Vec<String>> {
        let mut filter = self.group_filter();
        if let Some(labels) = filter.get_mut("label") {
            labels.push(format!("{LABEL_AGENT_UUID}={agent}"));
        }
        filter
    }

    fn group_labels(&self) -> HashMap<String, String> {
        HashMap::from([
            (LABEL_MANAGED.to_string(), "true".to_string()),
            (
                LABEL_ENVIRONMENTS.to_string(),
                self.environments.join_sorted(","),
            ),
            (LABEL_RESOURCES.to_string(), self.resources.join_sorted(",")),
        ])
    }
}

/// Container (and agent host) name for agent `agent`.
pub fn container_name(agent: &str) -> String {
    format!("fleet-agent-{agent}")
}

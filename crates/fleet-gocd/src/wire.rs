//! GoCD wire formats.
//!
//! Scheduled jobs are only published as XML (`/go/api/jobs/scheduled.xml`);
//! agents come from the versioned JSON agents API. Both are decoded here
//! and mapped onto the `fleet-core` views.

use serde::{Deserialize, Serialize};

use fleet_core::{Agent, AgentState, BuildState, ConfigState, Job, StringSet};

use crate::error::{GocdError, GocdResult};

// ── Scheduled jobs (XML) ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ScheduledJobs {
    #[serde(rename = "job", default)]
    jobs: Vec<ScheduledJob>,
}

#[derive(Debug, Deserialize)]
struct ScheduledJob {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "buildLocator", default)]
    build_locator: String,
    #[serde(default)]
    environment: Option<String>,
    #[serde(default)]
    resources: Option<Resources>,
}

#[derive(Debug, Deserialize)]
struct Resources {
    #[serde(rename = "resource", default)]
    items: Vec<String>,
}

impl From<ScheduledJob> for Job {
    fn from(job: ScheduledJob) -> Self {
        let name = if job.build_locator.trim().is_empty() {
            job.name.trim().to_string()
        } else {
            job.build_locator.trim().to_string()
        };
        Job {
            name,
            environment: job
                .environment
                .map(|e| e.trim().to_string())
                .unwrap_or_default(),
            resources: job
                .resources
                .map(|r| {
                    r.items
                        .iter()
                        .map(|item| item.trim())
                        .filter(|item| !item.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// Decode the body of `GET /go/api/jobs/scheduled.xml`.
pub fn decode_scheduled_jobs(body: &[u8]) -> GocdResult<Vec<Job>> {
    let text = std::str::from_utf8(body).map_err(|e| GocdError::Decode {
        what: "scheduled jobs",
        reason: e.to_string(),
    })?;
    let parsed: ScheduledJobs = quick_xml::de::from_str(text).map_err(|e| GocdError::Decode {
        what: "scheduled jobs",
        reason: e.to_string(),
    })?;
    Ok(parsed.jobs.into_iter().map(Job::from).collect())
}

// ── Agents (JSON) ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AgentList {
    #[serde(rename = "_embedded")]
    embedded: EmbeddedAgents,
}

#[derive(Debug, Deserialize)]
struct EmbeddedAgents {
    #[serde(default)]
    agents: Vec<AgentRecord>,
}

#[derive(Debug, Deserialize)]
struct AgentRecord {
    uuid: String,
    #[serde(default)]
    hostname: String,
    #[serde(default)]
    environments: Vec<EnvironmentRef>,
    #[serde(default)]
    resources: Vec<String>,
    agent_state: AgentState,
    build_state: BuildState,
    agent_config_state: ConfigState,
}

/// Older API versions list environment names; newer ones list objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnvironmentRef {
    Name(String),
    Object { name: String },
}

impl EnvironmentRef {
    fn into_name(self) -> String {
        match self {
            EnvironmentRef::Name(name) | EnvironmentRef::Object { name } => name,
        }
    }
}

impl From<AgentRecord> for Agent {
    fn from(record: AgentRecord) -> Self {
        Agent {
            id: record.uuid,
            hostname: record.hostname,
            environments: record
                .environments
                .into_iter()
                .map(EnvironmentRef::into_name)
                .collect::<StringSet>(),
            resources: record.resources.into_iter().collect(),
            agent_state: record.agent_state,
            build_state: record.build_state,
            config_state: record.agent_config_state,
        }
    }
}

/// Decode the body of `GET /go/api/agents`.
pub fn decode_agents(body: &[u8]) -> GocdResult<Vec<Agent>> {
    let list: AgentList = serde_json::from_slice(body).map_err(|e| GocdError::Decode {
        what: "agent list",
        reason: e.to_string(),
    })?;
    Ok(list.embedded.agents.into_iter().map(Agent::from).collect())
}

/// Decode the body of `GET /go/api/agents/{uuid}`.
pub fn decode_agent(body: &[u8]) -> GocdResult<Agent> {
    let record: AgentRecord = serde_json::from_slice(body).map_err(|e| GocdError::Decode {
        what: "agent",
        reason: e.to_string(),
    })?;
    Ok(record.into())
}

/// Body of `PATCH /go/api/agents/{uuid}`.
#[derive(Debug, Serialize)]
pub struct AgentConfigPatch {
    pub agent_config_state: ConfigState,
}

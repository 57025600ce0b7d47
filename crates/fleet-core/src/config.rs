//! fleet.toml configuration parser.
//!
//! Every section and field is optional; anything left out falls back to
//! the defaults below. Command-line flags are applied on top by `fleetd`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::matcher::MatchConfig;
use crate::sets::StringSet;

pub const DEFAULT_POLL_INTERVAL: &str = "30s";
pub const DEFAULT_SERVER_HOST: &str = "localhost";
pub const DEFAULT_SERVER_PORT: u16 = 8153;
/// Agent image that registers under the `AGENT_GUID` it is started with.
pub const DEFAULT_DOCKER_IMAGE: &str = "travix/go-agent";
pub const DEFAULT_DOCKER_ENDPOINT: &str = "unix:///var/run/docker.sock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// How often a reconciliation cycle runs, e.g. "30s".
    pub poll_interval: String,
    pub agent: AgentGroupConfig,
    pub server: ServerConfig,
    pub docker: DockerConfig,
}

/// The scaling group this process manages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentGroupConfig {
    pub environments: Vec<String>,
    pub resources: Vec<String>,
    pub max_agents: u32,
    /// Key agents present to the server to register without approval.
    pub auto_register_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub image: String,
    /// `unix://` socket path or `tcp://` / `http://` address.
    pub endpoint: String,
    /// Ignore `endpoint` and connect using DOCKER_HOST and friends.
    pub from_env: bool,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL.to_string(),
            agent: AgentGroupConfig::default(),
            server: ServerConfig::default(),
            docker: DockerConfig::default(),
        }
    }
}

impl Default for AgentGroupConfig {
    fn default() -> Self {
        Self {
            environments: Vec::new(),
            resources: Vec::new(),
            max_agents: 1,
            auto_register_key: String::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
            username: String::new(),
            password: String::new(),
        }
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_DOCKER_IMAGE.to_string(),
            endpoint: DEFAULT_DOCKER_ENDPOINT.to_string(),
            from_env: false,
        }
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings the daemon cannot start with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.poll_interval()?.is_zero() {
            return Err(ConfigError::Invalid("poll_interval must be positive".into()));
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".into()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must not be 0".into()));
        }
        if self.docker.image.trim().is_empty() {
            return Err(ConfigError::Invalid("docker.image must not be empty".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> ConfigResult<Duration> {
        parse_duration(&self.poll_interval)
    }

    /// Base URL of the CI server, e.g. `http://localhost:8153`.
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server.host, self.server.port)
    }

    /// The immutable filters for this process's scaling group.
    pub fn match_config(&self) -> MatchConfig {
        MatchConfig::new(
            self.agent.environments.iter().cloned().collect::<StringSet>(),
            self.agent.resources.iter().cloned().collect::<StringSet>(),
            self.agent.max_agents,
        )
    }

    /// A copy safe to print: secrets are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.server.password.is_empty() {
            copy.server.password = "********".to_string();
        }
        if !copy.agent.auto_register_key.is_empty() {
            copy.agent.auto_register_key = "********".to_string();
        }
        copy
    }
}

/// Parse a duration string like "30s", "500ms", "2m", or plain seconds.
pub fn parse_duration(s: &str) -> ConfigResult<Duration> {
    let s = s.trim();
    let parsed = if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.ok_or_else(|| ConfigError::Duration(s.to_string()))
}

//! Command line and how it layers over `fleet.toml`.
//!
//! Precedence: built-in defaults < config file < flags given on the
//! command line. Flags without a value on the command line leave the file
//! (or default) value untouched.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};

use fleet_core::FleetConfig;

#[derive(Parser, Debug)]
#[command(name = "fleetd", version, about = "Autoscaler for GoCD build agents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Watch the server queue and scale the agent group.
    Run {
        #[command(flatten)]
        settings: Settings,

        /// Run a single reconciliation cycle and exit.
        #[arg(long)]
        once: bool,
    },
    /// Load and validate the configuration, then print it as TOML.
    CheckConfig {
        #[command(flatten)]
        settings: Settings,
    },
}

impl Command {
    pub fn settings(&self) -> &Settings {
        match self {
            Command::Run { settings, .. } | Command::CheckConfig { settings } => settings,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Debug, Clone, Default)]
pub struct Settings {
    /// Path to fleet.toml.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Environment of the agent group (repeatable, or comma-separated).
    #[arg(long = "agent-env", value_delimiter = ',')]
    pub agent_env: Vec<String>,

    /// Resources of the agent group (repeatable, or comma-separated).
    #[arg(long = "agent-resources", value_delimiter = ',')]
    pub agent_resources: Vec<String>,

    /// Most agents the group may run at once [default: 1].
    #[arg(long)]
    pub agent_max_count: Option<u32>,

    /// Auto-registration key configured on the server.
    #[arg(long, env = "FLEET_AGENT_AUTO_REGISTER_KEY", hide_env_values = true)]
    pub agent_auto_register_key: Option<String>,

    /// CI server host [default: localhost].
    #[arg(long)]
    pub server_host: Option<String>,

    /// CI server port [default: 8153].
    #[arg(long)]
    pub server_port: Option<u16>,

    #[arg(long)]
    pub server_username: Option<String>,

    #[arg(long, env = "FLEET_SERVER_PASSWORD", hide_env_values = true)]
    pub server_password: Option<String>,

    /// Agent image; must register under its AGENT_GUID [default: travix/go-agent].
    #[arg(long)]
    pub docker_image: Option<String>,

    /// Docker daemon address [default: unix:///var/run/docker.sock].
    #[arg(long)]
    pub docker_endpoint: Option<String>,

    /// Take the Docker connection from DOCKER_HOST and friends.
    #[arg(long, env = "DOCKER_FROM_ENV")]
    pub docker_from_env: bool,

    /// Time between cycles, e.g. 30s, 2m, 500ms [default: 30s].
    #[arg(long)]
    pub poll_interval: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Settings {
    /// Defaults, then the config file if one was given, then flags. Validated.
    pub fn load(&self) -> anyhow::Result<FleetConfig> {
        let mut config = match &self.config {
            Some(path) => FleetConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => FleetConfig::default(),
        };
        self.apply(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// Overlay the flags that were given.
    pub fn apply(&self, config: &mut FleetConfig) {
        if !self.agent_env.is_empty() {
            config.agent.environments = clean(&self.agent_env);
        }
        if !self.agent_resources.is_empty() {
            config.agent.resources = clean(&self.agent_resources);
        }
        if let Some(max) = self.agent_max_count {
            config.agent.max_agents = max;
        }
        if let Some(key) = &self.agent_auto_register_key {
            config.agent.auto_register_key = key.clone();
        }
        if let Some(host) = &self.server_host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.server_port {
            config.server.port = port;
        }
        if let Some(username) = &self.server_username {
            config.server.username = username.clone();
        }
        if let Some(password) = &self.server_password {
            config.server.password = password.clone();
        }
        if let Some(image) = &self.docker_image {
            config.docker.image = image.clone();
        }
        if let Some(endpoint) = &self.docker_endpoint {
            config.docker.endpoint = endpoint.clone();
        }
        if self.docker_from_env {
            config.docker.from_env = true;
        }
        if let Some(interval) = &self.poll_interval {
            config.poll_interval = interval.clone();
        }
    }
}

fn clean(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

//! Docker-backed [`Executor`]: one container per build agent.

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    CreateContainerOptions, KillContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions,
};
use tracing::{debug, info, warn};

use fleet_core::AgentId;
use fleet_reconcile::Executor;

use crate::error::{DockerError, DockerResult, batch};
use crate::template::{AgentTemplate, LABEL_AGENT_UUID, container_name};

/// Seconds bollard waits on a daemon request.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Where the Docker daemon listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `DOCKER_HOST` and friends, else the platform default socket.
    FromEnv,
    Unix(String),
    Http(String),
}

impl Endpoint {
    /// `unix:///path`, `tcp://host:port` or `http://host:port`.
    pub fn parse(endpoint: &str) -> DockerResult<Self> {
        if endpoint.starts_with("unix://") {
            Ok(Endpoint::Unix(endpoint.to_string()))
        } else if let Some(address) = endpoint.strip_prefix("tcp://") {
            Ok(Endpoint::Http(format!("http://{address}")))
        } else if endpoint.starts_with("http://") {
            Ok(Endpoint::Http(endpoint.to_string()))
        } else {
            Err(DockerError::Endpoint {
                endpoint: endpoint.to_string(),
            })
        }
    }

    fn describe(&self) -> String {
        match self {
            Endpoint::FromEnv => "environment defaults".to_string(),
            Endpoint::Unix(path) => path.clone(),
            Endpoint::Http(address) => address.clone(),
        }
    }
}

/// Connect to the daemon and make sure it answers.
pub async fn connect(endpoint: &Endpoint) -> DockerResult<Docker> {
    let connect_error = |source| DockerError::Connect {
        endpoint: endpoint.describe(),
        source,
    };
    let docker = match endpoint {
        Endpoint::FromEnv => Docker::connect_with_local_defaults(),
        Endpoint::Unix(path) => {
            Docker::connect_with_unix(path, REQUEST_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        }
        Endpoint::Http(address) => {
            Docker::connect_with_http(address, REQUEST_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        }
    }
    .map_err(connect_error)?;

    docker.ping().await.map_err(connect_error)?;
    debug!(endpoint = %endpoint.describe(), "connected to docker");
    Ok(docker)
}

/// Runs build agents as labelled containers.
pub struct DockerExecutor {
    docker: Docker,
    template: AgentTemplate,
}

impl DockerExecutor {
    pub fn new(docker: Docker, template: AgentTemplate) -> Self {
        Self { docker, template }
    }

    pub fn template(&self) -> &AgentTemplate {
        &self.template
    }

    /// Start `count` new agent containers. Every container is attempted.
    pub async fn provision(&self, count: u32) -> DockerResult<Vec<AgentId>> {
        let mut started = Vec::new();
        let mut failures = Vec::new();

        for _ in 0..count {
            let agent = uuid::Uuid::new_v4().to_string();
            match self.start_agent(&agent).await {
                Ok(container) => {
                    info!(%agent, %container, image = %self.template.image, "started agent container");
                    started.push(agent);
                }
                Err(e) => {
                    warn!(%agent, error = %e, "failed to start agent container");
                    failures.push(e);
                }
            }
        }

        batch("scale up", count as usize, failures)?;
        Ok(started)
    }

    /// Kill the container of every agent in `ids`. Every id is attempted.
    pub async fn retire(&self, ids: &[AgentId]) -> DockerResult<()> {
        let mut failures = Vec::new();

        for agent in ids {
            if let Err(e) = self.kill_agent(agent).await {
                warn!(%agent, error = %e, "failed to stop agent container");
                failures.push(e);
            }
        }

        batch("scale down", ids.len(), failures)
    }

    /// Agent ids of the group's running containers.
    pub async fn running_agents(&self) -> DockerResult<Vec<AgentId>> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                filters: self.template.group_filter(),
                ..Default::default()
            }))
            .await
            .map_err(DockerError::List)?;

        Ok(containers
            .into_iter()
            .filter_map(|c| c.labels?.remove(LABEL_AGENT_UUID))
            .collect())
    }

    async fn start_agent(&self, agent: &str) -> DockerResult<String> {
        let config = self.template.container_config(agent);
        let options = CreateContainerOptions {
            name: container_name(agent),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|source| DockerError::Create {
                agent: agent.to_string(),
                source,
            })?;

        if let Err(source) = self
            .docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
        {
            let cleanup = self
                .docker
                .remove_container(
                    &created.id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
            if let Err(e) = cleanup {
                warn!(%agent, container = %created.id, error = %e, "failed to remove unstarted container");
            }
            return Err(DockerError::Start {
                agent: agent.to_string(),
                source,
            });
        }

        Ok(created.id)
    }

    async fn kill_agent(&self, agent: &str) -> DockerResult<()> {
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                filters: self.template.agent_filter(agent),
                ..Default::default()
            }))
            .await
            .map_err(DockerError::List)?;

        let ids: Vec<String> = containers.into_iter().filter_map(|c| c.id).collect();
        if ids.is_empty() {
            return Err(DockerError::NotFound {
                agent: agent.to_string(),
            });
        }

        for container in ids {
            self.docker
                .kill_container(&container, None::<KillContainerOptions<String>>)
                .await
                .map_err(|source| DockerError::Kill {
                    agent: agent.to_string(),
                    container: container.clone(),
                    source,
                })?;
            info!(%agent, %container, "killed agent container");
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for DockerExecutor {
    async fn scale_up(&self, count: u32) -> anyhow::Result<()> {
        self.provision(count).await?;
        Ok(())
    }

    async fn scale_down(&self, ids: &[AgentId]) -> anyhow::Result<()> {
        Ok(self.retire(ids).await?)
    }

    async fn managed_agents(&self) -> anyhow::Result<Vec<AgentId>> {
        Ok(self.running_agents().await?)
    }
}

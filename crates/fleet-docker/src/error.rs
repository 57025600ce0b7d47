//! Docker backend error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DockerError {
    #[error("unsupported docker endpoint {endpoint:?}: expected unix://, tcp:// or http://")]
    Endpoint { endpoint: String },

    #[error("connecting to docker at {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("creating container for agent {agent}: {source}")]
    Create {
        agent: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("starting container for agent {agent}: {source}")]
    Start {
        agent: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("no running container for agent {agent}")]
    NotFound { agent: String },

    #[error("killing container {container} of agent {agent}: {source}")]
    Kill {
        agent: String,
        container: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("listing agent containers: {0}")]
    List(#[source] bollard::errors::Error),

    #[error("{op}: {} of {attempted} failed: {}", .failures.len(), join(.failures))]
    Batch {
        op: &'static str,
        attempted: usize,
        failures: Vec<DockerError>,
    },
}

pub type DockerResult<T> = Result<T, DockerError>;

fn join(failures: &[DockerError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Ok when nothing failed, otherwise one [`DockerError::Batch`].
pub(crate) fn batch(op: &'static str, attempted: usize, failures: Vec<DockerError>) -> DockerResult<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(DockerError::Batch {
            op,
            attempted,
            failures,
        })
    }
}

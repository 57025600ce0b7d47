//! HTTP client for the GoCD server.
//!
//! One short-lived HTTP/1.1 connection per request, driven by hyper, with
//! a deadline over the whole exchange (connect, send, read body).

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HOST, USER_AGENT};
use http::uri::Scheme;
use http::{HeaderValue, Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::debug;

use fleet_core::{Agent, ConfigState, Job};
use fleet_reconcile::CiServer;

use crate::error::{GocdError, GocdResult};
use crate::wire::{self, AgentConfigPatch};

/// Deadline for a single request unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const AGENTS_MEDIA_TYPE: &str = "application/vnd.go.cd.v4+json";
const XML_MEDIA_TYPE: &str = "application/xml";
const CLIENT_NAME: &str = concat!("fleetd/", env!("CARGO_PKG_VERSION"));

/// Longest error body kept in [`GocdError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Client for the parts of the GoCD API the autoscaler needs.
#[derive(Debug, Clone)]
pub struct GocdClient {
    base_url: String,
    /// `host:port` to connect to.
    address: String,
    /// Value of the `Host` header.
    host: String,
    /// Path prefix when the server is mounted below `/`.
    base_path: String,
    authorization: Option<HeaderValue>,
    timeout: Duration,
}

impl GocdClient {
    /// Create a client for `server_url` (e.g. `http://localhost:8153`).
    ///
    /// Only plain `http` URLs are accepted.
    pub fn new(server_url: &str) -> GocdResult<Self> {
        let invalid = |reason: &str| GocdError::InvalidUrl {
            url: server_url.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = server_url
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
        match uri.scheme() {
            Some(scheme) if *scheme == Scheme::HTTP => {}
            Some(scheme) => return Err(invalid(&format!("unsupported scheme {scheme}"))),
            None => return Err(invalid("missing scheme")),
        }
        let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
        if authority.host().is_empty() {
            return Err(invalid("missing host"));
        }
        let port = authority.port_u16().unwrap_or(80);

        Ok(Self {
            base_url: server_url.trim_end_matches('/').to_string(),
            address: format!("{}:{port}", authority.host()),
            host: authority.as_str().to_string(),
            base_path: uri.path().trim_end_matches('/').to_string(),
            authorization: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Send HTTP basic credentials with every request.
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> GocdResult<Self> {
        let token = STANDARD.encode(format!("{username}:{password}"));
        let mut value = HeaderValue::from_str(&format!("Basic {token}")).map_err(http::Error::from)?;
        value.set_sensitive(true);
        self.authorization = Some(value);
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /go/api/jobs/scheduled.xml`
    pub async fn fetch_scheduled_jobs(&self) -> GocdResult<Vec<Job>> {
        let body = self
            .send(Method::GET, "/go/api/jobs/scheduled.xml", XML_MEDIA_TYPE, None)
            .await?;
        wire::decode_scheduled_jobs(&body)
    }

    /// `GET /go/api/agents`
    pub async fn fetch_agents(&self) -> GocdResult<Vec<Agent>> {
        let body = self
            .send(Method::GET, "/go/api/agents", AGENTS_MEDIA_TYPE, None)
            .await?;
        wire::decode_agents(&body)
    }

    /// `GET /go/api/agents/{id}`
    pub async fn fetch_agent(&self, id: &str) -> GocdResult<Agent> {
        let body = self
            .send(Method::GET, &agent_path(id)?, AGENTS_MEDIA_TYPE, None)
            .await?;
        wire::decode_agent(&body)
    }

    /// `PATCH /go/api/agents/{id}` with the new config state.
    pub async fn set_agent_config_state(&self, id: &str, state: ConfigState) -> GocdResult<()> {
        let patch = serde_json::to_vec(&AgentConfigPatch {
            agent_config_state: state,
        })
        .map_err(|e| GocdError::Decode {
            what: "agent patch",
            reason: e.to_string(),
        })?;
        self.send(Method::PATCH, &agent_path(id)?, AGENTS_MEDIA_TYPE, Some(patch))
            .await?;
        Ok(())
    }

    /// `DELETE /go/api/agents/{id}`
    pub async fn remove_agent(&self, id: &str) -> GocdResult<()> {
        self.send(Method::DELETE, &agent_path(id)?, AGENTS_MEDIA_TYPE, None)
            .await?;
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        accept: &'static str,
        body: Option<Vec<u8>>,
    ) -> GocdResult<Bytes> {
        let target = format!("{}{path}", self.base_path);

        let exchange = async {
            let stream = TcpStream::connect(&self.address)
                .await
                .map_err(|source| GocdError::Connect {
                    address: self.address.clone(),
                    source,
                })?;

            let io = TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|source| http_error(&method, &target, source))?;

            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "gocd connection closed with error");
                }
            });

            let mut builder = Request::builder()
                .method(method.clone())
                .uri(&target)
                .header(HOST, &self.host)
                .header(ACCEPT, accept)
                .header(USER_AGENT, CLIENT_NAME);
            if let Some(auth) = &self.authorization {
                builder = builder.header(AUTHORIZATION, auth.clone());
            }
            let request = match body {
                Some(bytes) => builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(Full::new(Bytes::from(bytes)))?,
                None => builder.body(Full::new(Bytes::new()))?,
            };

            let response = sender
                .send_request(request)
                .await
                .map_err(|source| http_error(&method, &target, source))?;
            let status = response.status();
            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|source| http_error(&method, &target, source))?
                .to_bytes();
            Ok::<_, GocdError>((status, bytes))
        };

        let (status, bytes) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| GocdError::Timeout {
                method: method.clone(),
                path: target.clone(),
                timeout: self.timeout,
            })??;

        debug!(%method, path = %target, %status, bytes = bytes.len(), "gocd request");

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(GocdError::Status {
                method,
                path: target,
                status,
                body: text.trim().chars().take(MAX_ERROR_BODY).collect(),
            });
        }
        Ok(bytes)
    }
}

/// Agent ids are UUIDs; anything that could leave the path segment is refused.
fn agent_path(id: &str) -> GocdResult<String> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && id != "."
        && id != "..";
    if !valid {
        return Err(GocdError::InvalidAgentId { id: id.to_string() });
    }
    Ok(format!("/go/api/agents/{id}"))
}

fn http_error(method: &Method, path: &str, source: hyper::Error) -> GocdError {
    GocdError::Http {
        method: method.clone(),
        path: path.to_string(),
        source,
    }
}

#[async_trait]
impl CiServer for GocdClient {
    async fn scheduled_jobs(&self) -> anyhow::Result<Vec<Job>> {
        Ok(self.fetch_scheduled_jobs().await?)
    }

    async fn agents(&self) -> anyhow::Result<Vec<Agent>> {
        Ok(self.fetch_agents().await?)
    }

    async fn agent(&self, id: &str) -> anyhow::Result<Agent> {
        Ok(self.fetch_agent(id).await?)
    }

    async fn disable_agent(&self, id: &str) -> anyhow::Result<()> {
        Ok(self.set_agent_config_state(id, ConfigState::Disabled).await?)
    }

    async fn enable_agent(&self, id: &str) -> anyhow::Result<()> {
        Ok(self.set_agent_config_state(id, ConfigState::Enabled).await?)
    }

    async fn delete_agent(&self, id: &str) -> anyhow::Result<()> {
        Ok(self.remove_agent(id).await?)
    }
}

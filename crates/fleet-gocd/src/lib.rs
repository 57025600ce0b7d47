//! fleet-gocd — GoCD server client.
//!
//! Implements [`fleet_reconcile::CiServer`] against a GoCD server's REST
//! API.
//!
//! # Architecture
//!
//! ```text
//! GocdClient
//!   ├── GET    /go/api/jobs/scheduled.xml  → Vec<Job>     (XML)
//!   ├── GET    /go/api/agents              → Vec<Agent>   (JSON, v4)
//!   ├── GET    /go/api/agents/{uuid}       → Agent
//!   ├── PATCH  /go/api/agents/{uuid}       ← agent_config_state
//!   └── DELETE /go/api/agents/{uuid}
//! ```

pub mod client;
pub mod error;
pub mod wire;

pub use client::{DEFAULT_TIMEOUT, GocdClient};
pub use error::{GocdError, GocdResult};

//! fleet-docker — Docker provisioning backend.
//!
//! Implements [`fleet_reconcile::Executor`] by running each build agent in
//! its own container, labelled so the group's agents can be listed and
//! stopped later.
//!
//! # Architecture
//!
//! ```text
//! DockerExecutor
//!   ├── AgentTemplate   (image, registration env, group labels)
//!   ├── scale_up(n)     → create + start n containers, fresh agent UUID each
//!   ├── scale_down(ids) → find by fleet.agent-uuid label, kill
//!   └── managed_agents  → running containers with the group labels
//! ```

pub mod error;
pub mod executor;
pub mod template;

pub use error::{DockerError, DockerResult};
pub use executor::{DockerExecutor, Endpoint, connect};
pub use template::AgentTemplate;

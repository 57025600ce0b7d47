//! fleet-core — shared types for the build-agent autoscaler.
//!
//! - [`StringSet`] for environment/resource tags and agent ids
//! - [`Job`] and [`Agent`] views of the CI server's state
//! - [`MatchConfig`], the per-group job and agent predicates
//! - [`FleetConfig`], the `fleet.toml` configuration

pub mod config;
pub mod error;
pub mod matcher;
pub mod sets;
pub mod types;

pub use config::FleetConfig;
pub use error::{ConfigError, ConfigResult};
pub use matcher::MatchConfig;
pub use sets::StringSet;
pub use types::*;

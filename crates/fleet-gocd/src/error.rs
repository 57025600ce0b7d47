//! GoCD client error types.

use std::time::Duration;

use http::{Method, StatusCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GocdError {
    #[error("invalid server url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid agent id {id:?}")]
    InvalidAgentId { id: String },

    #[error("building request: {0}")]
    Request(#[from] http::Error),

    #[error("connecting to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{method} {path}: {source}")]
    Http {
        method: Method,
        path: String,
        #[source]
        source: hyper::Error,
    },

    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: Method,
        path: String,
        status: StatusCode,
        body: String,
    },

    #[error("{method} {path} timed out after {timeout:?}")]
    Timeout {
        method: Method,
        path: String,
        timeout: Duration,
    },

    #[error("decoding {what}: {reason}")]
    Decode { what: &'static str, reason: String },
}

pub type GocdResult<T> = Result<T, GocdError>;

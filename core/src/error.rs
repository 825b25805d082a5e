//! Error types for the request façade.
//!
//! # Design
//! Only failures that happen *before* a call reaches the network surface as
//! `Error`: a bad upload path, a rejected configuration, or a transport that
//! could not be constructed. Everything that goes wrong on the wire is
//! classified into a `ResultInfo` instead and never reaches the caller as an
//! `Err`.

use std::io;

use thiserror::Error;

/// Errors returned by the façade outside of result classification.
#[derive(Debug, Error)]
pub enum Error {
    /// A request description could not be turned into a protocol request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A configuration value was rejected by `ConfigurationBuilder::build`.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The underlying HTTP client could not be built.
    #[error("failed to build transport client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// The transport's worker pool could not be started.
    #[error("failed to start transport worker pool: {0}")]
    WorkerPool(#[source] io::Error),

    #[error("no save directory configured")]
    NoSaveDir,

    #[error("result carries no body")]
    NoBody,

    #[error("i/o failed: {0}")]
    Io(#[from] io::Error),

    /// The response body could not be deserialized into the expected type.
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

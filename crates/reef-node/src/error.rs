//! Error taxonomy.
//!
//! [`EngineError`] is fatal for the current connection: the caller tears the
//! session down and decides whether to reconnect. [`JobFailure`] is reported to
//! the coordinator as a failed `JobResult` and the node stays usable.

use crate::bridge::codec::CodecError;
use crate::bridge::transport::TransportError;
use crate::dataset::DatasetError;
use crate::executor::ExecutionError;

/// The coordinator (or this node) broke the protocol contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("start command for job `{requested}` while job `{active}` is active")]
    DuplicateStart { active: String, requested: String },

    #[error(
        "abort command for job `{requested}` does not match active job {}",
        display_active(.active)
    )]
    AbortMismatch {
        active: Option<String>,
        requested: String,
    },

    #[error("identity assignment carried no identity")]
    MissingIdentity,
}

fn display_active(active: &Option<String>) -> String {
    match active {
        Some(id) => format!("`{id}`"),
        None => "(none)".to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("protocol invariant violated: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("codec failure: {0}")]
    Codec(#[from] CodecError),

    /// The host lacks a capability the engine needs. Raised before connecting.
    #[error("environment incompatible: {0}")]
    Environment(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub fn environment(message: impl Into<String>) -> Self {
        Self::Environment(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// A job-level failure. Never fatal; becomes `JobResult(success = false)`.
#[derive(Debug, thiserror::Error)]
pub enum JobFailure {
    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("invalid result content type tag {0}")]
    InvalidContentType(u8),

    #[error("dataset unavailable: {0}")]
    Dataset(#[from] DatasetError),

    #[error("checkpoint failed: {0}")]
    Checkpoint(#[source] std::io::Error),

    #[error("aborted")]
    Aborted,
}

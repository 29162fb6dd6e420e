use std::{io, path::PathBuf};

use thiserror::Error;

/// Failure reported by a [`GraphicsContext`](crate::context::GraphicsContext)
/// call. Callers inside the pipeline degrade on these rather than propagate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("out of GPU memory: {0}")]
    OutOfMemory(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("buffer mapping failed: {0}")]
    MapFailed(String),

    #[error("unsupported by this context: {0}")]
    Unsupported(String),

    #[error("graphics context lost")]
    ContextLost,

    #[error("unknown object: {0}")]
    UnknownObject(String),
}

/// Construction failure for a staging backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("persistent buffer mapping is not supported")]
    PersistentMappingUnsupported,

    #[error("staging capacity must be non-zero")]
    ZeroCapacity,

    #[error("staging buffer setup failed: {0}")]
    Context(#[from] ContextError),
}

/// Rejected [`StreamingConfig`](crate::config::StreamingConfig) value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pbo_alignment must be a non-zero power of two (got {0})")]
    InvalidAlignment(u64),

    #[error("{field} must be greater than zero")]
    ZeroLimit { field: &'static str },
}

/// Failure to read a [`StreamingConfig`](crate::config::StreamingConfig)
/// from a file or an environment variable. `origin` names the file path or
/// variable the text came from.
#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("failed to read upload config {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed TOML in upload config {origin}")]
    Toml {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("malformed JSON in upload config {origin}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rejected upload config {origin}")]
    Invalid {
        origin: String,
        #[source]
        source: ConfigError,
    },
}

impl ConfigLoadError {
    /// The validation failure, when the text parsed but its values did not.
    pub fn invalid(&self) -> Option<&ConfigError> {
        match self {
            Self::Invalid { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Contract violations around the deferred-deletion system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    #[error("render thread already marked as {existing}; refusing to re-mark")]
    RenderThreadAlreadyMarked { existing: String },
}

/// Errors that escape the crate's public entry points.
///
/// Only boundary contract violations end up here; recoverable conditions are
/// absorbed inside the pipeline and show up in diagnostics instead.
#[derive(Error, Debug)]
pub enum StreamingError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    ConfigLoad(#[from] ConfigLoadError),

    #[error("resource manager: {0}")]
    Resource(#[from] ResourceError),

    #[error("staging backend: {0}")]
    Backend(#[from] BackendError),

    #[error("graphics context: {0}")]
    Context(#[from] ContextError),
}

pub type Result<T, E = StreamingError> = std::result::Result<T, E>;

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification used by callers that render or log pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid configuration; never retried.
    Configuration,
    /// Caller-supplied arguments failed a check.
    Argument,
    /// The backing store could not be read or written.
    Storage,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Undefined connector: {0}")]
    UndefinedConnector(String),
    #[error("unknown pipeline stage '{0}'")]
    UnknownStage(String),
    #[error("insufficient configuration: {0}")]
    Config(String),
    #[error("invalid arguments: {0}")]
    Arguments(String),
    #[error("storage error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed record file '{path}': {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UndefinedConnector(_) | Self::UnknownStage(_) | Self::Config(_) => ErrorKind::Configuration,
            Self::Arguments(_) => ErrorKind::Argument,
            Self::Io { .. } | Self::Decode { .. } => ErrorKind::Storage,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn arguments(message: impl Into<String>) -> Self {
        Self::Arguments(message.into())
    }
}

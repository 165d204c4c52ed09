//! Error types for wxlake

use thiserror::Error;

/// Result type alias for wxlake operations
pub type Result<T> = std::result::Result<T, WxError>;

/// Coarse error class, for callers that branch on how a failure should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fatal before any network call: fix the configuration and re-run
    Configuration,
    /// API or storage call failed; the run is aborted
    Transport,
    /// Malformed input data; aborts the offending batch
    Parse,
    /// A record shape the flattening engine refuses to render
    Flatten,
    /// Local filesystem or encoding failure
    Internal,
}

/// Main error type for wxlake
#[derive(Error, Debug)]
pub enum WxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Flatten error: {0}")]
    Flatten(String),

    #[error("Columnar encoding error: {0}")]
    Columnar(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WxError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a flatten error
    pub fn flatten(msg: impl Into<String>) -> Self {
        Self::Flatten(msg.into())
    }

    /// Create a columnar encoding error
    pub fn columnar(msg: impl Into<String>) -> Self {
        Self::Columnar(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WxError::Config(_) => ErrorKind::Configuration,
            WxError::Transport(_) => ErrorKind::Transport,
            WxError::Parse(_) | WxError::Serialization(_) => ErrorKind::Parse,
            WxError::Flatten(_) => ErrorKind::Flatten,
            WxError::Columnar(_) | WxError::Io(_) => ErrorKind::Internal,
        }
    }
}

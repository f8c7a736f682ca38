//! Error types for environments and the session registry

use thiserror::Error;

use crate::codec::CodecError;
use crate::sessions::SessionId;

/// Result type alias for environment and registry operations
pub type Result<T> = std::result::Result<T, EnvError>;

/// Main error type for environments and the session registry
#[derive(Debug, Error)]
pub enum EnvError {
    /// No factory is registered under the requested environment type
    #[error("environment type '{name}' not found; registered types: {}", available.join(", "))]
    UnknownEnvType {
        name: String,
        available: Vec<String>,
    },

    /// No live session carries the given id
    #[error("session '{0}' not found")]
    SessionNotFound(SessionId),

    /// The registry refused to create another session
    #[error("session capacity exceeded: at most {max} live sessions")]
    CapacityExceeded { max: usize },

    /// `step` was called before the first `reset`
    #[error("environment has not been reset")]
    NotReset,

    /// `step` was called after the episode reached a terminal state
    #[error("episode is finished; call reset before stepping again")]
    EpisodeFinished,

    /// Constructor options could not be decoded or are out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A serialized room failed re-validation
    #[error("invalid room: {0}")]
    InvalidRoom(String),

    /// Puzzle generation kept producing degenerate layouts
    #[error("puzzle generation failed after {attempts} attempts")]
    GenerationExhausted { attempts: usize },

    /// The tool set is discovered at reset and is not known yet
    #[error("action schema unavailable: {0}")]
    SchemaUnavailable(String),

    /// An external tool provider failed
    #[error("tool provider error: {0}")]
    ToolProvider(String),

    /// Protocol conversion failed
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EnvError {
    /// Whether this error maps to a caller-facing "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EnvError::UnknownEnvType { .. } | EnvError::SessionNotFound(_)
        )
    }
}

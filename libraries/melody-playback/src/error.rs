//! Error types for queue management and playback control

use crate::engine::EngineError;
use thiserror::Error;

/// Player errors
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Nothing to play: no item given and no current item
    #[error("Play list is empty")]
    PlayListEmpty,

    /// Non-local playback on a cellular network while it is disallowed
    #[error("Playback over cellular network is forbidden")]
    CellularForbidden,

    /// Every resolution strategy was exhausted for the item
    #[error("Invalid source for {0}")]
    InvalidSource(String),

    /// The resolution chain observed that a newer request replaced it
    #[error("Superseded by a newer play request")]
    Superseded,

    /// Native engine failure
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlayerError {
    pub fn invalid_source(item: impl std::fmt::Display) -> Self {
        Self::InvalidSource(item.to_string())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the engine asked to be initialised first
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, Self::Engine(EngineError::NotInitialized))
    }
}

impl From<config::ConfigError> for PlayerError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for player operations
pub type Result<T> = std::result::Result<T, PlayerError>;

//! Error types for the Ferris engine

use thiserror::Error;

/// Result type alias for Ferris operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Ferris engine
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A single skill manifest could not be loaded
    #[error("skill error: {0}")]
    Skill(String),

    /// A skill handler signalled failure or could not be run
    #[error("handler error: {0}")]
    Handler(String),

    /// Speech decoder error
    #[error("decoder error: {0}")]
    Decoder(String),

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech synthesis error
    #[error("speech error: {0}")]
    Speech(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

//! Error types for Beruang

use std::path::PathBuf;

/// Result type alias using Beruang's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Beruang operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A model artifact (metadata or weights) is absent
    #[error("artifact missing: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    /// A model artifact exists but required fields are missing or malformed
    #[error("artifact corrupt: {0}")]
    ArtifactCorrupt(String),

    /// The caller supplied no text to classify
    #[error("input text is empty")]
    InputEmpty,

    /// Classifier execution errors
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new missing-artifact error
    pub fn artifact_missing(path: impl Into<PathBuf>) -> Self {
        Self::ArtifactMissing { path: path.into() }
    }

    /// Create a new corrupt-artifact error
    pub fn artifact_corrupt(msg: impl Into<String>) -> Self {
        Self::ArtifactCorrupt(msg.into())
    }

    /// Create a new classifier error
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error should keep a model out of service
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            Self::ArtifactMissing { .. } | Self::ArtifactCorrupt(_) | Self::Config(_)
        )
    }
}

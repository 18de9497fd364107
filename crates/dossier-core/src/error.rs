use thiserror::Error;

/// Top-level error type for the Dossier system.
///
/// Each variant corresponds to a failure class the surrounding transport is
/// expected to map onto its own status codes. Subsystem crates construct the
/// matching variant directly so that the `?` operator works seamlessly across
/// crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DossierError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Index inconsistency: {0}")]
    IndexInconsistency(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for DossierError {
    fn from(err: toml::de::Error) -> Self {
        DossierError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DossierError {
    fn from(err: toml::ser::Error) -> Self {
        DossierError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for DossierError {
    fn from(err: serde_json::Error) -> Self {
        DossierError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Dossier operations.
pub type Result<T> = std::result::Result<T, DossierError>;

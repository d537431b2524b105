//! Error types for PetCast

use thiserror::Error;

/// The main error type for PetCast operations
#[derive(Debug, Error)]
pub enum PetcastError {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("No provider credential: {0}")]
    NoCredential(String),

    #[error("Provider rejected request: {0}")]
    ProviderRejected(String),

    #[error("Transient provider error: {0}")]
    TransientProvider(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Registry error: {0}")]
    RegistryError(String),

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Transcode error: {0}")]
    TranscodeError(String),

    #[error("Encode error: {0}")]
    EncodeError(String),

    #[error("Notification error: {0}")]
    NotifyError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("TOML serialization error: {0}")]
    TomlSerError(String),
}

impl PetcastError {
    /// Whether the error is a temporary provider/network condition that a
    /// later attempt may not hit
    pub fn is_transient(&self) -> bool {
        matches!(self, PetcastError::TransientProvider(_))
    }

    /// Whether the caller sent something unusable (maps to a 4xx)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PetcastError::MissingInput(_) | PetcastError::InvalidSource(_)
        )
    }
}

/// Result type alias for PetCast operations
pub type Result<T> = std::result::Result<T, PetcastError>;

impl From<toml::de::Error> for PetcastError {
    fn from(err: toml::de::Error) -> Self {
        PetcastError::TomlParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for PetcastError {
    fn from(err: toml::ser::Error) -> Self {
        PetcastError::TomlSerError(err.to_string())
    }
}

use std::io;
use thiserror::Error;

/// Result type for bundle operations
pub type Result<T> = std::result::Result<T, BundleError>;

/// Unified error type for all bundle operations
#[derive(Debug, Error)]
pub enum BundleError {
    // Lifecycle errors
    #[error("Bundle filesystem is closed")]
    Closed,

    // Locator errors
    #[error("Can't parse locator: {0}")]
    MalformedLocator(String),

    // Path contract errors
    #[error("Path ownership violation: {0}")]
    Ownership(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    // Container errors
    #[error("No such file in bundle: {0}")]
    NotFound(String),

    #[error("File already exists in bundle: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Bundle is read-only")]
    ReadOnly,

    #[error("Invalid path pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid media type: {0}")]
    InvalidMediaType(String),

    // Manifest errors
    #[error("Manifest not found in bundle")]
    ManifestNotFound,

    #[error("Failed to parse manifest: {0}")]
    ManifestParseFailed(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // Serialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for BundleError {
    fn from(err: toml::de::Error) -> Self {
        BundleError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for BundleError {
    fn from(err: toml::ser::Error) -> Self {
        BundleError::Config(err.to_string())
    }
}

impl From<regex::Error> for BundleError {
    fn from(err: regex::Error) -> Self {
        BundleError::InvalidPattern(err.to_string())
    }
}

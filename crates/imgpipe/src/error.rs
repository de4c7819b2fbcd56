use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImgpipeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to create ledger directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read ledger snapshot '{path}': {source}")]
    ReadSnapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse ledger snapshot '{path}': {source}")]
    ParseSnapshot {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize ledger snapshot: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to write ledger snapshot '{path}': {source}")]
    WriteSnapshot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors reported by the generation, storage and download collaborators.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The provider answered but declined the request.
    #[error("{0}")]
    Rejected(String),

    #[error("Request to '{url}' failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to '{url}' returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures inside a single image resolution. These never escape the
/// resolver; they are turned into a failed `ImageResult`.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Entry has no id")]
    MissingId,

    #[error("Failed to download image from '{url}': {source}")]
    Download {
        url: String,
        #[source]
        source: ServiceError,
    },

    #[error("Upload failed: {0}")]
    Upload(#[source] ServiceError),

    #[error(transparent)]
    Generation(ServiceError),

    #[error("Generation returned neither a local file nor a URL")]
    EmptyGeneration,

    #[error("Failed to prepare scratch directory '{path}': {source}")]
    Scratch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, ImgpipeError>;

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Hindsight application
#[derive(Error, Debug)]
pub enum HindsightError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Query or schema failure inside a backing store
    #[error("{store} store error: {source}")]
    Store {
        store: StoreKind,
        #[source]
        source: rusqlite::Error,
    },

    /// A backing store could not be opened or a pooled connection obtained
    #[error("{store} store unavailable: {message}")]
    StoreUnavailable { store: StoreKind, message: String },

    /// A backing store holds data this core cannot interpret
    #[error("{store} store corrupt: {message}")]
    StoreCorrupt { store: StoreKind, message: String },

    /// Query text rejected before touching any store
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Embedding provider failure; fatal to the whole query
    #[error("Embedding provider error: {message}")]
    Provider { message: String },

    /// Embedding provider exceeded the allowed wall time
    #[error("Embedding provider timed out after {seconds}s")]
    ProviderTimeout { seconds: u64 },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Which backing store an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// The conversation archive holding messages and their full-text index
    Archive,
    /// The embedding store holding vectors and document sidecars
    Semantic,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Archive => write!(f, "archive"),
            StoreKind::Semantic => write!(f, "semantic"),
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Hindsight operations
pub type Result<T> = std::result::Result<T, HindsightError>;

//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::path::PathBuf;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for all cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is empty or contains the filename delimiter
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Cache directory disappeared after construction
    #[error("Cache directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// A file in the cache directory does not follow the naming scheme
    #[error("Malformed cache file name: {}", .0.display())]
    MalformedFileName(PathBuf),

    /// Disk entry body could not be decoded into the requested type
    #[error("Failed to deserialize cache file {}", .path.display())]
    Deserialize {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Value could not be encoded for the disk tier
    #[error("Failed to serialize value for key '{key}'")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },

    /// Memory entry holds a value of a different type than requested
    #[error("Cached value for key '{key}' has a different type than requested")]
    TypeMismatch { key: String },

    /// The supplied compute function failed; nothing was cached
    #[error("Compute function failed for key '{key}'")]
    Compute { key: String, source: anyhow::Error },

    /// Underlying file system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

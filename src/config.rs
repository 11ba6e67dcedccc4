//! Configuration Module
//!
//! Handles resolving the cache root directory from environment variables.

use std::env;
use std::path::PathBuf;

/// Name of the subdirectory created inside the platform data directory.
const CACHE_DIR_NAME: &str = "diskmem-cache";

/// Cache configuration parameters.
///
/// The cache directory can be configured via an environment variable with a
/// platform-appropriate default.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for the disk tier
    pub cache_dir: PathBuf,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DIR` - Cache root directory (default: platform data dir + "diskmem-cache")
    pub fn from_env() -> Self {
        Self {
            cache_dir: env::var("CACHE_DIR")
                .ok()
                .map(PathBuf::from)
                .unwrap_or_else(default_cache_dir),
        }
    }

    /// Creates a Config pointing at an explicit directory.
    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
        }
    }
}

/// Returns the platform-appropriate default cache directory.
///
/// Falls back to the system temp directory when no data directory exists
/// (e.g., stripped-down containers).
fn default_cache_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join(CACHE_DIR_NAME)
}

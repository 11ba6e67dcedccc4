//! Disk Store Module
//!
//! The durable tier: one flat directory of JSON files whose names encode
//! both the key and the insertion timestamp, so no separate index or
//! manifest is needed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::{FILENAME_DELIMITER, FILE_EXTENSION};
use crate::error::{CacheError, Result};

// == Disk Entry ==
/// A decoded disk file: its location plus the key and timestamp recovered
/// from the file name.
#[derive(Debug, Clone)]
pub struct DiskEntry {
    /// Full path to the cache file
    pub path: PathBuf,
    /// Key decoded from the file name
    pub key: String,
    /// Insertion timestamp decoded from the file name
    pub inserted_at: DateTime<Utc>,
}

impl DiskEntry {
    /// Returns the elapsed time between insertion and `now`, clamped to zero
    /// if the clock moved backwards.
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.inserted_at)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

// == Disk Store ==
/// File-backed storage, durable across restarts.
///
/// Lookups are a prefix scan over the directory listing, O(number of files)
/// per call. Acceptable at the expected scale; no secondary index is kept.
#[derive(Debug, Clone)]
pub struct DiskStore {
    /// Root directory holding the cache files
    dir: PathBuf,
}

impl DiskStore {
    // == Constructor ==
    /// Creates a store over `dir`. The directory is not created here; see
    /// [`DiskStore::ensure_dir`].
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // == Ensure Directory ==
    /// Creates the cache directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    // == File Name Encoding ==
    /// Encodes a key and insertion timestamp into a file name:
    /// `<key>___<millis-since-epoch>.json`.
    pub fn encode_file_name(key: &str, inserted_at: DateTime<Utc>) -> String {
        format!(
            "{key}{FILENAME_DELIMITER}{}{FILE_EXTENSION}",
            inserted_at.timestamp_millis()
        )
    }

    // == File Name Decoding ==
    /// Decodes a file name back into its key and insertion timestamp.
    ///
    /// Returns `None` when the name does not follow the encoding scheme
    /// (missing delimiter, missing extension, or non-numeric timestamp).
    pub fn decode_file_name(file_name: &str) -> Option<(String, DateTime<Utc>)> {
        let stem = file_name.strip_suffix(FILE_EXTENSION)?;
        let (key, ticks) = stem.split_once(FILENAME_DELIMITER)?;
        let millis: i64 = ticks.parse().ok()?;
        let inserted_at = DateTime::from_timestamp_millis(millis)?;
        Some((key.to_string(), inserted_at))
    }

    // == Find ==
    /// Scans the directory for a file whose name starts with
    /// `<key>___` and decodes it.
    ///
    /// At most one such file is expected; if the expectation is violated
    /// (raced writers, a bypassed purge) an arbitrary match is returned.
    ///
    /// # Errors
    /// - [`CacheError::DirectoryNotFound`] if the cache directory is missing
    /// - [`CacheError::MalformedFileName`] if the matching name fails to decode
    pub async fn find(&self, key: &str) -> Result<Option<DiskEntry>> {
        let prefix = format!("{key}{FILENAME_DELIMITER}");

        let mut entries = self.read_dir().await?;
        while let Some(dir_entry) = entries.next_entry().await? {
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(&prefix) {
                continue;
            }

            let path = dir_entry.path();
            let (decoded_key, inserted_at) = Self::decode_file_name(name)
                .ok_or_else(|| CacheError::MalformedFileName(path.clone()))?;

            return Ok(Some(DiskEntry {
                path,
                key: decoded_key,
                inserted_at,
            }));
        }

        Ok(None)
    }

    // == Scan ==
    /// Decodes every file in the directory.
    ///
    /// # Errors
    /// - [`CacheError::DirectoryNotFound`] if the cache directory is missing
    /// - [`CacheError::MalformedFileName`] for any file that fails to decode;
    ///   a foreign file in the cache directory is a corruption signal, not
    ///   something to skip silently
    pub async fn scan(&self) -> Result<Vec<DiskEntry>> {
        let mut found = Vec::new();

        let mut entries = self.read_dir().await?;
        while let Some(dir_entry) = entries.next_entry().await? {
            if !dir_entry.file_type().await?.is_file() {
                continue;
            }

            let path = dir_entry.path();
            let name = dir_entry.file_name();
            let (key, inserted_at) = name
                .to_str()
                .and_then(Self::decode_file_name)
                .ok_or_else(|| CacheError::MalformedFileName(path.clone()))?;

            found.push(DiskEntry {
                path,
                key,
                inserted_at,
            });
        }

        Ok(found)
    }

    // == Read ==
    /// Reads and deserializes the value stored at `path`.
    ///
    /// A body that does not decode as `T` is a hard
    /// [`CacheError::Deserialize`], not a cache miss.
    pub async fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let body = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&body).map_err(|source| CacheError::Deserialize {
            path: path.to_path_buf(),
            source,
        })
    }

    // == Write ==
    /// Serializes `value` and writes it as a new file named for `key` and
    /// `inserted_at`. Existing files for the key are not touched; callers
    /// purge before writing a replacement.
    pub async fn write<T: Serialize>(
        &self,
        key: &str,
        inserted_at: DateTime<Utc>,
        value: &T,
    ) -> Result<PathBuf> {
        let body = serde_json::to_string(value).map_err(|source| CacheError::Serialize {
            key: key.to_string(),
            source,
        })?;

        let path = self.dir.join(Self::encode_file_name(key, inserted_at));
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }

    // == Delete ==
    /// Removes the file at `path`.
    pub async fn delete(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    // == Clear ==
    /// Deletes every file in the directory, decoded or not.
    pub async fn clear(&self) -> Result<()> {
        let mut entries = self.read_dir().await?;
        while let Some(dir_entry) = entries.next_entry().await? {
            if dir_entry.file_type().await?.is_file() {
                tokio::fs::remove_file(dir_entry.path()).await?;
            }
        }
        Ok(())
    }

    /// Opens the directory listing, mapping a missing directory to the
    /// fatal configuration error rather than a soft miss.
    async fn read_dir(&self) -> Result<tokio::fs::ReadDir> {
        match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => Ok(entries),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(CacheError::DirectoryNotFound(self.dir.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

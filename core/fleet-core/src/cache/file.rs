use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{FleetError, Result};

/// Bumped whenever the payload shape changes; older files become misses.
const CACHE_FILE_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
struct CacheFile<T> {
    version: u32,
    key: String,
    #[allow(dead_code)]
    captured_at: DateTime<Utc>,
    payload: T,
}

#[derive(Debug, Serialize)]
struct CacheFileRef<'a, T> {
    version: u32,
    key: &'a str,
    captured_at: DateTime<Utc>,
    payload: &'a T,
}

/// Cross-invocation cache backed by one JSON file.
///
/// Freshness is the file's mtime (`now - mtime < ttl`). Writes land in a
/// sibling temp file that is renamed over the target, so readers see either
/// the old payload or the new one. Any read or write problem is a miss.
#[derive(Debug, Clone)]
pub struct FileCache {
    path: PathBuf,
    ttl: Duration,
}

impl FileCache {
    pub fn new(path: PathBuf, ttl: Duration) -> Self {
        Self { path, ttl }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the payload if the file is fresh, parseable and was written for `key`.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let metadata = match fs_err::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(error = %err, "Discovery cache unreadable; treating as miss");
                return None;
            }
        };

        let modified = metadata.modified().ok()?;
        let age = match SystemTime::now().duration_since(modified) {
            Ok(age) => age,
            Err(_) => {
                tracing::debug!(path = %self.path.display(), "Discovery cache mtime is in the future");
                return None;
            }
        };
        if age >= self.ttl {
            return None;
        }

        let content = match fs_err::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(error = %err, "Discovery cache unreadable; treating as miss");
                return None;
            }
        };

        let file: CacheFile<T> = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    path = %self.path.display(),
                    "Discovery cache corrupt; treating as miss"
                );
                return None;
            }
        };

        if file.version != CACHE_FILE_VERSION || file.key != key {
            tracing::debug!(
                version = file.version,
                "Discovery cache written for a different version or key"
            );
            return None;
        }

        Some(file.payload)
    }

    /// Writes the payload atomically. Failures are logged, never returned.
    pub fn store<T: Serialize>(&self, key: &str, payload: &T) {
        if let Err(err) = self.try_store(key, payload) {
            tracing::warn!(error = %err, "Failed to write discovery cache");
        }
    }

    fn try_store<T: Serialize>(&self, key: &str, payload: &T) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| FleetError::Io {
            context: format!("cache path {} has no parent", self.path.display()),
            source: std::io::Error::from(ErrorKind::InvalidInput),
        })?;
        fs_err::create_dir_all(parent).map_err(|source| FleetError::Io {
            context: "creating cache directory".to_string(),
            source,
        })?;

        let content = serde_json::to_vec(&CacheFileRef {
            version: CACHE_FILE_VERSION,
            key,
            captured_at: Utc::now(),
            payload,
        })
        .map_err(|source| FleetError::Json {
            context: "serializing discovery cache".to_string(),
            source,
        })?;

        let mut tmp = NamedTempFile::new_in(parent).map_err(|source| FleetError::Io {
            context: format!("creating temp file in {}", parent.display()),
            source,
        })?;
        tmp.write_all(&content)
            .and_then(|_| tmp.flush())
            .map_err(|source| FleetError::Io {
                context: "writing discovery cache".to_string(),
                source,
            })?;
        tmp.persist(&self.path).map_err(|err| FleetError::Io {
            context: format!("persisting temp file to {}", self.path.display()),
            source: err.error,
        })?;
        Ok(())
    }

    pub fn get_or_compute<T, F>(&self, key: &str, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        if let Some(payload) = self.load(key) {
            tracing::trace!("File cache hit");
            return payload;
        }
        let payload = compute();
        self.store(key, &payload);
        payload
    }

    /// Deletes the cache file; a missing file is fine.
    pub fn clear(&self) {
        match fs_err::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(error = %err, "Failed to remove discovery cache"),
        }
    }
}

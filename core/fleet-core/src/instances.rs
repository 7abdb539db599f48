//! Instance descriptors: the only input the engine takes from outside.
//!
//! Each running daemon drops a small JSON file into `~/.fleet/instances/`
//! describing itself. The engine never writes these; it only reads them to
//! learn which working directories, PIDs and ports to observe.
//!
//! ```json
//! { "work_dir": "/home/me/proj", "daemon_pid": 4100, "worker_pid": 4120,
//!   "host": "127.0.0.1", "port": 4096 }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HOST: &str = "127.0.0.1";

/// What the engine needs to know about one instance before observing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    pub work_dir_key: String,
    pub daemon_pid: Option<u32>,
    pub worker_pid: Option<u32>,
    pub host: String,
    pub port: u16,
}

impl InstanceDescriptor {
    pub fn new(work_dir: &str, port: u16) -> Self {
        Self {
            work_dir_key: normalize_work_dir(work_dir),
            daemon_pid: None,
            worker_pid: None,
            host: DEFAULT_HOST.to_string(),
            port,
        }
    }

    pub fn with_daemon_pid(mut self, pid: u32) -> Self {
        self.daemon_pid = Some(pid);
        self
    }

    pub fn with_worker_pid(mut self, pid: u32) -> Self {
        self.worker_pid = Some(pid);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

/// Supplies the current set of instance descriptors.
pub trait InstanceSource: Send + Sync {
    fn descriptors(&self) -> Vec<InstanceDescriptor>;
}

impl InstanceSource for Vec<InstanceDescriptor> {
    fn descriptors(&self) -> Vec<InstanceDescriptor> {
        self.clone()
    }
}

/// On-disk shape written by daemons.
#[derive(Debug, Deserialize)]
struct MetadataFile {
    work_dir: String,
    #[serde(default)]
    daemon_pid: Option<u32>,
    #[serde(default)]
    worker_pid: Option<u32>,
    #[serde(default)]
    host: Option<String>,
    port: u16,
}

/// Reads one descriptor per `*.json` file in a directory.
#[derive(Debug, Clone)]
pub struct MetadataDirSource {
    dir: PathBuf,
}

impl MetadataDirSource {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl InstanceSource for MetadataDirSource {
    /// Malformed files are skipped. When two files claim the same working
    /// directory, the most recently modified one wins.
    fn descriptors(&self) -> Vec<InstanceDescriptor> {
        let entries = match fs_err::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(error = %err, "Instance metadata directory unreadable");
                }
                return Vec::new();
            }
        };

        let mut by_key: HashMap<String, (SystemTime, InstanceDescriptor)> = HashMap::new();

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let Some(descriptor) = read_metadata_file(&path) else {
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            match by_key.get(&descriptor.work_dir_key) {
                Some((existing, _)) if *existing >= modified => {
                    tracing::debug!(
                        work_dir = %descriptor.work_dir_key,
                        path = %path.display(),
                        "Ignoring older duplicate instance metadata"
                    );
                }
                _ => {
                    by_key.insert(descriptor.work_dir_key.clone(), (modified, descriptor));
                }
            }
        }

        let mut descriptors: Vec<_> = by_key.into_values().map(|(_, d)| d).collect();
        descriptors.sort_by(|a, b| a.work_dir_key.cmp(&b.work_dir_key));
        descriptors
    }
}

fn read_metadata_file(path: &Path) -> Option<InstanceDescriptor> {
    let content = match fs_err::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!(error = %err, "Skipping unreadable instance metadata");
            return None;
        }
    };
    let meta: MetadataFile = match serde_json::from_str(&content) {
        Ok(meta) => meta,
        Err(err) => {
            tracing::warn!(error = %err, path = %path.display(), "Skipping malformed instance metadata");
            return None;
        }
    };
    if meta.work_dir.trim().is_empty() {
        return None;
    }

    let host = meta
        .host
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    Some(InstanceDescriptor {
        work_dir_key: normalize_work_dir(&meta.work_dir),
        daemon_pid: meta.daemon_pid.filter(|pid| *pid > 0),
        worker_pid: meta.worker_pid.filter(|pid| *pid > 0),
        host,
        port: meta.port,
    })
}

/// Strips trailing slashes except for root, so `/proj/` and `/proj` share a key.
pub fn normalize_work_dir(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() && path.trim().starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn normalize_work_dir_handles_slashes() {
        assert_eq!(normalize_work_dir("/proj/"), "/proj");
        assert_eq!(normalize_work_dir("/proj"), "/proj");
        assert_eq!(normalize_work_dir("/"), "/");
        assert_eq!(normalize_work_dir("///"), "/");
    }

    #[test]
    fn missing_directory_yields_nothing() {
        let temp = tempdir().unwrap();
        let source = MetadataDirSource::new(temp.path().join("nope"));
        assert!(source.descriptors().is_empty());
    }

    #[test]
    fn reads_valid_files_and_skips_bad_ones() {
        let temp = tempdir().unwrap();
        write(
            temp.path(),
            "b.json",
            r#"{"work_dir": "/srv/b/", "daemon_pid": 10, "worker_pid": 11, "port": 4100}"#,
        );
        write(
            temp.path(),
            "a.json",
            r#"{"work_dir": "/srv/a", "host": "localhost", "port": 4200, "daemon_pid": 0}"#,
        );
        write(temp.path(), "broken.json", "{not json");
        write(temp.path(), "no-port.json", r#"{"work_dir": "/srv/c"}"#);
        write(temp.path(), "notes.txt", r#"{"work_dir": "/srv/d", "port": 1}"#);

        let descriptors = MetadataDirSource::new(temp.path().to_path_buf()).descriptors();
        assert_eq!(descriptors.len(), 2);

        assert_eq!(descriptors[0].work_dir_key, "/srv/a");
        assert_eq!(descriptors[0].host, "localhost");
        assert_eq!(descriptors[0].daemon_pid, None);

        assert_eq!(descriptors[1].work_dir_key, "/srv/b");
        assert_eq!(descriptors[1].host, DEFAULT_HOST);
        assert_eq!(descriptors[1].daemon_pid, Some(10));
        assert_eq!(descriptors[1].worker_pid, Some(11));
        assert_eq!(descriptors[1].port, 4100);
    }

    #[test]
    fn newest_duplicate_wins() {
        let temp = tempdir().unwrap();
        let old = write(
            temp.path(),
            "old.json",
            r#"{"work_dir": "/srv/x", "daemon_pid": 1, "port": 1000}"#,
        );
        write(
            temp.path(),
            "new.json",
            r#"{"work_dir": "/srv/x/", "daemon_pid": 2, "port": 2000}"#,
        );
        let past = SystemTime::now() - Duration::from_secs(600);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(past)
            .unwrap();

        let descriptors = MetadataDirSource::new(temp.path().to_path_buf()).descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].port, 2000);
    }
}

//! Locked, typed state files
//!
//! Every state file mintd owns (the enclave manifest, the project descriptor,
//! the import recovery snapshot) is read and written through [`StateFile`].
//!
//! ## Concurrency
//!
//! Read-modify-write cycles go through [`StateFile::update`], which holds an
//! exclusive advisory lock on a sibling `<file>.lock` for the whole cycle.
//! Lock acquisition is retried a bounded number of times and then fails with
//! [`CoreError::Locked`]. Writers that bypass `update` (plain `save`) are not
//! serialized against each other.
//!
//! ## Durability
//!
//! Saves write a temporary sibling file and rename it over the target, so a
//! crashed writer leaves either the old or the new file, never a torn one.

use crate::error::{CoreError, CoreResult};
use crate::records::{EnclaveManifest, ENCLAVE_MANIFEST_FILE};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// On-disk encoding of a state file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFormat {
    /// YAML (enclave manifest, catalog entries)
    Yaml,
    /// Pretty-printed JSON (project descriptor, recovery snapshot)
    Json,
}

/// How hard to try for the advisory lock
#[derive(Debug, Clone, Copy)]
pub struct LockPolicy {
    /// Number of `try_lock` attempts before giving up
    pub attempts: u32,
    /// Sleep between attempts
    pub backoff: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            attempts: 50,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Held advisory lock; released on drop
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(target: "mintd::manifest", path = %self.path.display(), error = %e, "Failed to release lock");
        }
    }
}

/// A typed state file on disk
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
    format: StateFormat,
    lock_policy: LockPolicy,
}

impl StateFile {
    /// A YAML state file
    pub fn yaml(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: StateFormat::Yaml,
            lock_policy: LockPolicy::default(),
        }
    }

    /// A JSON state file
    pub fn json(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: StateFormat::Json,
            lock_policy: LockPolicy::default(),
        }
    }

    /// Override the lock retry policy
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the sibling lock file
    pub fn lock_path(&self) -> PathBuf {
        sibling(&self.path, "lock")
    }

    /// Whether the file exists
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read and parse the file.
    ///
    /// # Errors
    ///
    /// `ManifestNotFound` if absent, `ManifestCorrupt` if unparsable.
    pub fn load<T: DeserializeOwned>(&self) -> CoreResult<T> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CoreError::ManifestNotFound {
                    path: self.path.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        match self.format {
            StateFormat::Yaml => serde_yaml::from_str(&content)
                .map_err(|e| CoreError::corrupt(&self.path, e)),
            StateFormat::Json => serde_json::from_str(&content)
                .map_err(|e| CoreError::corrupt(&self.path, e)),
        }
    }

    /// Serialize and write the file (write temp, then rename)
    pub fn save<T: Serialize>(&self, value: &T) -> CoreResult<()> {
        let content = match self.format {
            StateFormat::Yaml => serde_yaml::to_string(value)?,
            StateFormat::Json => {
                let mut s = serde_json::to_string_pretty(value)?;
                s.push('\n');
                s
            }
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = sibling(&self.path, "tmp");
        let result = (|| -> CoreResult<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            fs::rename(&temp_path, &self.path)?;
            Ok(())
        })();
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }

    /// Acquire the advisory lock, retrying per the lock policy
    pub fn lock(&self) -> CoreResult<StateLock> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)?;

        let attempts = self.lock_policy.attempts.max(1);
        for attempt in 1..=attempts {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(StateLock {
                        file,
                        path: lock_path,
                    })
                }
                Err(_) if attempt < attempts => {
                    if attempt == 1 {
                        warn!(
                            target: "mintd::manifest",
                            path = %lock_path.display(),
                            "State file is locked by another process, waiting"
                        );
                    }
                    thread::sleep(self.lock_policy.backoff);
                }
                Err(_) => break,
            }
        }
        Err(CoreError::Locked {
            path: lock_path,
            attempts,
        })
    }

    /// Locked read-modify-write.
    ///
    /// The closure runs on the freshly loaded value; the file is written back
    /// only if the closure returns `Ok`.
    pub fn update<T, R, E, F>(&self, f: F) -> Result<R, E>
    where
        T: DeserializeOwned + Serialize,
        E: From<CoreError>,
        F: FnOnce(&mut T) -> Result<R, E>,
    {
        let _lock = self.lock()?;
        let mut value: T = self.load()?;
        let out = f(&mut value)?;
        self.save(&value)?;
        Ok(out)
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Store for one enclave's manifest
#[derive(Debug, Clone)]
pub struct ManifestStore {
    file: StateFile,
}

impl ManifestStore {
    /// Store for a manifest at an explicit path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: StateFile::yaml(path),
        }
    }

    /// Store for the manifest of the enclave rooted at `root`
    pub fn for_enclave(root: &Path) -> Self {
        Self::new(root.join(ENCLAVE_MANIFEST_FILE))
    }

    /// Override the lock retry policy
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.file = self.file.with_lock_policy(policy);
        self
    }

    /// Path of the manifest file
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Whether the manifest exists
    pub fn exists(&self) -> bool {
        self.file.exists()
    }

    /// Load the manifest
    pub fn load(&self) -> CoreResult<EnclaveManifest> {
        self.file.load()
    }

    /// Save the manifest
    pub fn save(&self, manifest: &EnclaveManifest) -> CoreResult<()> {
        self.file.save(manifest)
    }

    /// Create an empty manifest if none exists. Returns `true` if created.
    pub fn init(&self, enclave_name: &str) -> CoreResult<bool> {
        let _lock = self.file.lock()?;
        if self.file.exists() {
            return Ok(false);
        }
        self.file.save(&EnclaveManifest::new(enclave_name))?;
        Ok(true)
    }

    /// Locked read-modify-write of the manifest
    pub fn update<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<CoreError>,
        F: FnOnce(&mut EnclaveManifest) -> Result<R, E>,
    {
        self.file.update(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::DownloadRecord;
    use tempfile::TempDir;

    fn record(hash: &str) -> DownloadRecord {
        DownloadRecord {
            repo: "data_alpha".into(),
            content_hash: hash.into(),
            source_revision: "abc".into(),
            downloaded_at: "2024-01-01T00:00:00".into(),
            local_path: format!("data/downloads/data_alpha/{}", hash),
        }
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::for_enclave(dir.path());
        let err = store.load().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::for_enclave(dir.path());
        fs::write(store.path(), "downloaded: [unclosed").unwrap();
        let err = store.load().unwrap_err();
        assert!(matches!(err, CoreError::ManifestCorrupt { .. }));
    }

    #[test]
    fn test_init_then_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::for_enclave(dir.path());
        assert!(store.init("lab").unwrap());
        assert!(!store.init("other").unwrap());

        let m = store.load().unwrap();
        assert_eq!(m.enclave_name, "lab");
        assert!(m.downloaded.is_empty());
    }

    #[test]
    fn test_update_persists_on_ok() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::for_enclave(dir.path());
        store.init("lab").unwrap();

        store
            .update(|m| -> CoreResult<()> {
                m.record_download(record("1111111"));
                Ok(())
            })
            .unwrap();

        assert_eq!(store.load().unwrap().downloaded.len(), 1);
        assert!(!sibling(store.path(), "tmp").exists());
    }

    #[test]
    fn test_update_discards_on_err() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::for_enclave(dir.path());
        store.init("lab").unwrap();

        let res: CoreResult<()> = store.update(|m| {
            m.record_download(record("1111111"));
            Err(CoreError::validation("nope"))
        });
        assert!(res.is_err());
        assert!(store.load().unwrap().downloaded.is_empty());
    }

    #[test]
    fn test_lock_contention_gives_up() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::yaml(dir.path().join("m.yaml")).with_lock_policy(LockPolicy {
            attempts: 3,
            backoff: Duration::from_millis(1),
        });
        let held = file.lock().unwrap();

        // fs2 locks are per open file description, so a second open contends
        let err = file.lock().unwrap_err();
        assert!(matches!(err, CoreError::Locked { attempts: 3, .. }));

        drop(held);
        assert!(file.lock().is_ok());
    }

    #[test]
    fn test_json_state_file() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::json(dir.path().join("nested").join("state.json"));
        file.save(&vec![1, 2, 3]).unwrap();
        let back: Vec<i32> = file.load().unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}

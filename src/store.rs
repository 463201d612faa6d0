//! Cumulative support-matrix storage.
//!
//! The store file maps container → release → field record. It is loaded
//! whole, one (container, release) entry is replaced, and it is written back
//! whole. Entries for other containers and releases pass through untouched.
//!
//! There is no locking: only one process may write the file during a run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{Result, SmxError};
use crate::probe::FieldRecord;

/// Release tag → record.
pub type Releases = BTreeMap<String, FieldRecord>;

/// Container name → releases.
pub type Matrix = BTreeMap<String, Releases>;

/// Identifies one entry of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    pub container: String,
    pub release: String,
}

impl RecordKey {
    pub fn new(container: impl Into<String>, release: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            release: release.into(),
        }
    }
}

/// In-memory view of the store file.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
    data: Matrix,
}

impl RecordStore {
    /// Load the store, preparing the entry for `key`.
    ///
    /// A missing file yields an empty store. Otherwise the container entry is
    /// created if absent, and the release entry is reset to empty if it is
    /// absent or `force` is set.
    pub fn load(path: impl Into<PathBuf>, key: &RecordKey, force: bool) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            tracing::debug!("No store at {}, starting empty", path.display());
            return Ok(Self {
                path,
                data: Matrix::new(),
            });
        }

        let content = fs::read_to_string(&path)?;
        let mut data: Matrix =
            serde_json::from_str(&content).map_err(|e| SmxError::StoreParse {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let releases = data.entry(key.container.clone()).or_default();
        if force || !releases.contains_key(&key.release) {
            releases.insert(key.release.clone(), FieldRecord::new());
        }

        Ok(Self { path, data })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whole matrix.
    pub fn matrix(&self) -> &Matrix {
        &self.data
    }

    /// Record for `key`, if one is loaded.
    pub fn record(&self, key: &RecordKey) -> Option<&FieldRecord> {
        self.data.get(&key.container)?.get(&key.release)
    }

    /// Whether the file already holds a non-empty record for `key`.
    pub fn already_present(&self, key: &RecordKey) -> bool {
        self.path.exists() && self.record(key).is_some_and(|record| !record.is_empty())
    }

    /// Replace the record for `key`, leaving every other entry alone.
    pub fn replace(&mut self, key: &RecordKey, record: FieldRecord) {
        self.data
            .entry(key.container.clone())
            .or_default()
            .insert(key.release.clone(), record);
    }

    /// Serialize the whole matrix, keys sorted, two-space indent.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.data).map_err(|e| anyhow::Error::from(e).into())
    }

    /// Write the store to disk.
    ///
    /// Writes a sibling temp file and renames it over the target so a crash
    /// never leaves a half-written store.
    pub fn save(&self) -> Result<()> {
        tracing::debug!("Storing data to file: '{}'", self.path.display());
        let content = self.to_json()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, &self.path)?;

        tracing::debug!("...done.");
        Ok(())
    }
}

/// SHA-256 of the file at `path`, or `None` when it does not exist.
pub fn fingerprint(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    Ok(Some(hex::encode(Sha256::digest(&bytes))))
}

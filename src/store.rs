//! Pipeline Artifact Store
//!
//! Filesystem storage for stage outputs: one immutable JSON file per
//! artifact under an output directory (default `./out`). Files are
//! write-once; the store refuses to overwrite an existing artifact.
//!
//! `latest(prefix)` picks the most recently modified matching file. That is
//! a convenience for chaining local pipeline stages without retyping paths,
//! nothing more: modification time is filesystem metadata, not part of any
//! fingerprint, and every CLI accepts an explicit path that bypasses it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default output directory, relative to the working directory.
pub const DEFAULT_OUT_DIR: &str = "./out";

/// Artifact store failure.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    /// Write-once violation: the target file already exists.
    AlreadyExists(PathBuf),
    /// `latest` found no file with the requested prefix.
    NotFound { prefix: String, dir: PathBuf },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Serialization(e) => write!(f, "serialization error: {}", e),
            Self::AlreadyExists(path) => {
                write!(f, "artifact already exists: {}", path.display())
            }
            Self::NotFound { prefix, dir } => write!(
                f,
                "no artifact with prefix {:?} under {}",
                prefix,
                dir.display()
            ),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e)
    }
}

/// Write-once JSON artifact store rooted at one directory.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open a store, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist an artifact as `<prefix>-<millis>.json`. Pretty-printed so
    /// stored artifacts stay reviewable; fingerprints are computed over
    /// canonical form, never over the stored layout.
    pub fn write_json<T: Serialize>(
        &self,
        prefix: &str,
        timestamp_ms: i64,
        value: &T,
    ) -> Result<PathBuf, StoreError> {
        let path = self.root.join(format!("{}-{}.json", prefix, timestamp_ms));
        self.write_json_at(&path, value)?;
        Ok(path)
    }

    /// Persist an artifact at an explicit path inside the store.
    pub fn write_json_at<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(value)?;

        // create_new fails if the file exists, which is the write-once rule.
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(json.as_bytes())?;
        file.flush()?;
        debug!(path = %path.display(), "artifact written");
        Ok(())
    }

    /// Read and deserialize an artifact from any path.
    pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Most recently modified `<prefix>-*.json` in the store, by mtime.
    pub fn latest(&self, prefix: &str) -> Result<PathBuf, StoreError> {
        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(prefix) || !name.ends_with(".json") {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            let is_newer = match &newest {
                Some((t, _)) => modified > *t,
                None => true,
            };
            if is_newer {
                newest = Some((modified, entry.path()));
            }
        }

        newest
            .map(|(_, path)| path)
            .ok_or_else(|| StoreError::NotFound {
                prefix: prefix.to_string(),
                dir: self.root.clone(),
            })
    }
}

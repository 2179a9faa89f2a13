//! File-backed token store for the interactive flow
//!
//! Pure data access. Writes are atomic (sibling temp file + rename) and the
//! file is owner-only on Unix because it holds a refresh token.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::record::CredentialRecord;
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted record; `Ok(None)` means never authenticated
    pub fn load(&self) -> Result<Option<CredentialRecord>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })
    }

    /// Overwrite the persisted record
    pub fn save(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_vec_pretty(record).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let tmp = self.temp_path();
        write_private(&tmp, &json).map_err(io_err)?;
        if let Err(source) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(source));
        }

        debug!(path = %self.path.display(), "Saved credential record");
        Ok(())
    }

    /// Remove the persisted record. Returns whether a file was removed.
    pub fn delete(&self) -> Result<bool, StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Load, treating an unreadable or malformed file as absent
    pub fn load_or_discard(&self) -> Option<CredentialRecord> {
        match self.load() {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable credential record");
                None
            }
        }
    }

    /// Save without failing the caller
    pub fn persist(&self, record: &CredentialRecord) {
        if let Err(e) = self.save(record) {
            warn!(error = %e, "Failed to persist credential record");
        }
    }

    /// Delete without failing the caller
    pub fn discard(&self) {
        match self.delete() {
            Ok(true) => info!(path = %self.path.display(), "Deleted stored credential"),
            Ok(false) => debug!(path = %self.path.display(), "No stored credential to delete"),
            Err(e) => warn!(error = %e, "Failed to delete stored credential"),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "token.json".into());
        name.push(format!(".{}.tmp", std::process::id()));
        self.path.with_file_name(name)
    }
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

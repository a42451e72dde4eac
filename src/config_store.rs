use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock;
use crate::document;
use crate::error::StoreError;
use crate::fs::ShareFs;
use crate::journal::{Journal, Level};

/// What a successful rewrite changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub old_value: String,
    pub new_value: i32,
    pub backup: PathBuf,
}

/// Reads and rewrites one scalar field of a config document on a share.
///
/// The public operations never fail: problems are journalled and turned into `None`/`false`.
/// All methods block on share I/O; async callers run them through `spawn_blocking`.
#[derive(Clone)]
pub struct ConfigStore {
    fs: Arc<dyn ShareFs>,
    journal: Journal,
}

impl ConfigStore {
    pub fn new(fs: Arc<dyn ShareFs>, journal: Journal) -> Self {
        Self { fs, journal }
    }

    pub fn read_field(&self, path: &Path, field: &str) -> Option<i32> {
        match self.try_read(path, field) {
            Ok(v) => Some(v),
            Err(StoreError::NotFound(_)) => {
                self.journal
                    .warning(format!("Configuration file not found: {}", path.display()));
                None
            }
            Err(e) if e.is_soft() => {
                self.journal.log(
                    Level::Warning,
                    format!("{field} element not found or invalid in: {}", path.display()),
                    Some(e.to_string()),
                );
                None
            }
            Err(e) => {
                self.journal.log(
                    Level::Error,
                    format!("Error reading config file: {}", path.display()),
                    Some(e.to_string()),
                );
                None
            }
        }
    }

    pub fn try_read(&self, path: &Path, field: &str) -> Result<i32, StoreError> {
        if !self.fs.is_file(path)? {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let xml = self.fs.read_to_string(path)?;
        let raw = document::field_text(&xml, field)?;
        raw.trim().parse::<i32>().map_err(|_| StoreError::NotNumeric {
            field: field.to_string(),
            raw,
        })
    }

    /// Back up the document, then set `field` to `value`. `true` only if the new document was
    /// persisted.
    pub fn write_field(&self, path: &Path, field: &str, value: i32) -> bool {
        match self.try_write(path, field, value) {
            Ok(receipt) => {
                self.journal.log(
                    Level::Success,
                    format!("Updated {field}: {} → {}", receipt.old_value, receipt.new_value),
                    Some(format!(
                        "File: {}, Backup: {}",
                        path.display(),
                        receipt.backup.display()
                    )),
                );
                true
            }
            Err(StoreError::NotFound(_)) => {
                self.journal
                    .error(format!("Configuration file not found: {}", path.display()));
                false
            }
            Err(StoreError::Backup { source, .. }) => {
                self.journal.log(
                    Level::Error,
                    format!("Error creating backup for: {}", path.display()),
                    Some(source.to_string()),
                );
                self.journal
                    .error(format!("Failed to create backup for: {}", path.display()));
                false
            }
            Err(StoreError::MissingField { .. }) => {
                self.journal
                    .error(format!("{field} element not found in: {}", path.display()));
                false
            }
            Err(e) => {
                self.journal.log(
                    Level::Error,
                    format!("Error updating config file: {}", path.display()),
                    Some(e.to_string()),
                );
                false
            }
        }
    }

    /// The write steps in order; any error stops before the document is replaced.
    pub fn try_write(&self, path: &Path, field: &str, value: i32) -> Result<WriteReceipt, StoreError> {
        if !self.fs.is_file(path)? {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }

        let backup = self.backup(path)?;

        let xml = self.fs.read_to_string(path)?;
        let (doc, old) = document::replace_field(&xml, field, &value.to_string())?;
        self.fs.write(path, doc.as_bytes())?;

        Ok(WriteReceipt {
            old_value: old.trim().to_string(),
            new_value: value,
            backup,
        })
    }

    /// Copy the document to `{stem}_backup_{yyyyMMdd_HHmmss}{ext}` next to it.
    pub fn backup(&self, path: &Path) -> Result<PathBuf, StoreError> {
        let backup_err = |source| StoreError::Backup { path: path.to_path_buf(), source };
        let target = backup_path(path, &clock::backup_stamp(clock::local_now())).ok_or_else(|| {
            backup_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "document path has no parent directory",
            ))
        })?;
        self.fs.copy(path, &target).map_err(backup_err)?;
        self.journal
            .info(format!("Backup created: {}", target.display()));
        Ok(target)
    }

    /// Structural check: root is `Config` and `field` is present.
    pub fn validate(&self, path: &Path, field: &str) -> bool {
        match self.fs.is_file(path) {
            Ok(true) => {}
            _ => return false,
        }
        self.fs
            .read_to_string(path)
            .ok()
            .is_some_and(|xml| document::field_text(&xml, field).is_ok())
    }
}

/// Sibling path `{stem}_backup_{stamp}{.ext}`; `None` if `path` has no parent or file name.
pub fn backup_path(path: &Path, stamp: &str) -> Option<PathBuf> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty())?;
    let stem = path.file_stem()?.to_string_lossy();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    Some(parent.join(format!("{stem}_backup_{stamp}{ext}")))
}

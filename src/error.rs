use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a whole engine operation before any endpoint is touched.
///
/// Per-endpoint failures never surface here; they become an [`EndpointStatus`](crate::types::EndpointStatus).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store {group:03} is outside the configured range {first:03}-{last:03}")]
    InvalidGroup { group: u16, first: u16, last: u16 },
    #[error("invalid target `{0}` (expected STORE:SCO, e.g. 002:031)")]
    InvalidTarget(String),
    #[error("invalid address space: {0}")]
    AddressSpace(String),
    #[error("cannot open log file {path}: {source}")]
    LogSink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reasons a config document could not be read or rewritten.
///
/// Kept inside [`ConfigStore`](crate::config_store::ConfigStore): callers only ever see a
/// `bool`/`Option` plus a journal entry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to create backup for {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unexpected document structure: {0}")]
    Malformed(String),
    #[error("{field} element not found")]
    MissingField { field: String },
    #[error("{field} value `{raw}` is not an integer")]
    NotNumeric { field: String, raw: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl StoreError {
    /// Missing files and absent fields are expected on some units and log as warnings.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_)
                | StoreError::Malformed(_)
                | StoreError::MissingField { .. }
                | StoreError::NotNumeric { .. }
        )
    }
}

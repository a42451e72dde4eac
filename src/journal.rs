//! The operator-facing activity log.
//!
//! Every entry is appended to a plain text file (`[timestamp] [LEVEL] message - details`),
//! published to subscribers, and mirrored to `tracing`.
use serde::Serialize;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::clock;
use crate::error::EngineError;

const SESSION_RULE_WIDTH: usize = 80;
const SUBSCRIBER_BACKLOG: usize = 1024;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO",
            Level::Success => "SUCCESS",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: Level,
    pub message: String,
    pub details: Option<String>,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] [{}] {}", self.timestamp, self.level, self.message)?;
        match self.details.as_deref() {
            Some(d) if !d.is_empty() => write!(f, " - {d}"),
            _ => Ok(()),
        }
    }
}

/// Cloneable handle to the log sink. All clones share one file and one subscriber channel.
#[derive(Clone)]
pub struct Journal {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    file: Mutex<File>,
    tx: broadcast::Sender<LogEntry>,
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal").field("path", &self.inner.path).finish()
    }
}

impl Journal {
    /// Open (or create) the log file for appending. Failing here is fatal for the engine.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        let sink_err = |source| EngineError::LogSink { path: path.clone(), source };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(sink_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(sink_err)?;
        let (tx, _) = broadcast::channel(SUBSCRIBER_BACKLOG);
        Ok(Self {
            inner: Arc::new(Inner { path, file: Mutex::new(file), tx }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Receive every entry logged from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.inner.tx.subscribe()
    }

    pub fn log(&self, level: Level, message: impl Into<String>, details: Option<String>) {
        let entry = LogEntry {
            timestamp: clock::log_stamp(clock::local_now()),
            level,
            message: message.into(),
            details,
        };

        match level {
            Level::Info | Level::Success => tracing::info!(kind = %level, "{}", entry.message),
            Level::Warning => tracing::warn!("{}", entry.message),
            Level::Error => tracing::error!(details = ?entry.details, "{}", entry.message),
        }

        self.append(&format!("{entry}\n"));
        // No subscribers is fine.
        let _ = self.inner.tx.send(entry);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message, None);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.log(Level::Success, message, None);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(Level::Warning, message, None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message, None);
    }

    /// Write a banner framed by rules of `=`; marks the start of a scan or reset run.
    pub fn session(&self, banner: impl AsRef<str>) {
        let rule = "=".repeat(SESSION_RULE_WIDTH);
        tracing::info!("{}", banner.as_ref());
        self.append(&format!("\n{rule}\n{}\n{rule}\n", banner.as_ref()));
    }

    fn append(&self, text: &str) {
        let mut file = match self.inner.file.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = file.write_all(text.as_bytes()) {
            tracing::warn!(path = %self.inner.path.display(), "failed to write to log file: {e}");
        }
    }
}

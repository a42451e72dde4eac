#![allow(dead_code)]
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use vpos_reset::fs::{LocalFs, ShareFs};
use vpos_reset::Settings;

pub const ZERO_DOC: &str = "<Config><ResetVPOSData>0</ResetVPOSData></Config>";

/// A scratch directory standing in for the store network.
pub struct Network {
    pub dir: TempDir,
}

impl Network {
    pub fn new() -> Self {
        Self { dir: tempfile::tempdir().unwrap() }
    }

    pub fn mount_root(&self) -> PathBuf {
        self.dir.path().join("mnt")
    }

    pub fn log_file(&self) -> PathBuf {
        self.dir.path().join("logs").join("reset.log")
    }

    pub fn share(&self, group: u16, unit: u16) -> PathBuf {
        self.mount_root()
            .join(format!("ld{group:03}scopos{unit:03}"))
            .join("c$")
    }

    pub fn data_dir(&self, group: u16, unit: u16) -> PathBuf {
        self.share(group, unit).join("Robot").join("Data")
    }

    pub fn doc_path(&self, group: u16, unit: u16) -> PathBuf {
        self.data_dir(group, unit).join("vpos_state.cfg")
    }

    /// Create a reachable checkout whose config document holds `contents`.
    pub fn add_checkout(&self, group: u16, unit: u16, contents: &str) -> PathBuf {
        fs::create_dir_all(self.data_dir(group, unit)).unwrap();
        let p = self.doc_path(group, unit);
        fs::write(&p, contents).unwrap();
        p
    }

    /// Share exists but has no `Robot\Data` directory.
    pub fn add_bare_share(&self, group: u16, unit: u16) {
        fs::create_dir_all(self.share(group, unit)).unwrap();
    }

    pub fn settings(&self) -> Settings {
        Settings {
            first_store: 2,
            last_store: 4,
            units: "31-32".into(),
            mount_root: Some(self.mount_root()),
            log_file: self.log_file(),
            probe_timeout_ms: 2000,
            concurrency: 4,
            ..Default::default()
        }
    }

    pub fn log_text(&self) -> String {
        fs::read_to_string(self.log_file()).unwrap_or_default()
    }
}

/// Lists files in `dir` whose name contains `_backup_`.
pub fn backups_in(dir: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains("_backup_"))
        })
        .collect();
    out.sort();
    out
}

/// Real filesystem with injectable faults and call counters.
#[derive(Default)]
pub struct FaultyFs {
    /// Sleep this long inside every directory check.
    pub slow_dirs: Option<Duration>,
    pub fail_copy: bool,
    /// Report writes as successful without touching the file.
    pub drop_writes: bool,
    /// Panic when copying a document whose path contains this text.
    pub panic_on: Option<String>,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl ShareFs for FaultyFs {
    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        if let Some(d) = self.slow_dirs {
            std::thread::sleep(d);
        }
        LocalFs.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> io::Result<bool> {
        LocalFs.is_file(path)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        LocalFs.read_to_string(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(marker) = &self.panic_on {
            if from.to_string_lossy().contains(marker.as_str()) {
                panic!("share driver crashed");
            }
        }
        if self.fail_copy {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only share"));
        }
        LocalFs.copy(from, to)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.drop_writes {
            return Ok(());
        }
        LocalFs.write(path, contents)
    }
}

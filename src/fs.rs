//! Filesystem access to the remote shares.
//!
//! Everything the probe and the config store do to a share goes through [`ShareFs`], so the
//! engine can be driven against a local directory tree, a slow share, or one that refuses writes.
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub trait ShareFs: Send + Sync + 'static {
    fn is_dir(&self, path: &Path) -> io::Result<bool>;
    fn is_file(&self, path: &Path) -> io::Result<bool>;
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
    /// Copy `from` to `to`, replacing `to` if it exists.
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Replace the contents of `path`. Implementations must not leave a partially written file
    /// behind on failure.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// `std::fs` backed implementation; UNC paths on Windows, mounted shares elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl ShareFs for LocalFs {
    fn is_dir(&self, path: &Path) -> io::Result<bool> {
        match fs::metadata(path) {
            Ok(m) => Ok(m.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_file(&self, path: &Path) -> io::Result<bool> {
        match fs::metadata(path) {
            Ok(m) => Ok(m.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let tmp = staging_path(path);
        let res = (|| {
            let mut f = File::create(&tmp)?;
            f.write_all(contents)?;
            f.sync_all()?;
            drop(f);
            fs::rename(&tmp, path)
        })();
        if res.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        res
    }
}

/// Sibling file a new document is staged in before it is renamed over the original.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

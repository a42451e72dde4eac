use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::address::{EndpointAddress, DOCUMENT_NAME};
use crate::clock;
use crate::fs::ShareFs;
use crate::journal::Journal;
use crate::types::ProbeResult;

/// Default deadline for one reachability probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Decides whether an endpoint's share and config document can be reached.
#[derive(Clone)]
pub struct PathProbe {
    fs: Arc<dyn ShareFs>,
    journal: Journal,
    timeout: Duration,
}

impl PathProbe {
    pub fn new(fs: Arc<dyn ShareFs>, journal: Journal, timeout: Duration) -> Self {
        Self { fs, journal, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Share root, then `Robot\Data`, then `vpos_state.cfg`; stops at the first miss.
    ///
    /// Returns within the configured timeout. Permission and I/O errors count as unreachable.
    /// On timeout the blocking check is abandoned: it cannot be interrupted, but its verdict is
    /// dropped together with its join handle and never observed.
    pub async fn check(&self, address: &EndpointAddress) -> ProbeResult {
        let fs = self.fs.clone();
        let root = address.root().clone();
        let data_dir = address.data_dir();
        let task = tokio::task::spawn_blocking(move || {
            probe_paths(fs.as_ref(), &root, &data_dir)
        });

        let reachable = match time::timeout(self.timeout, task).await {
            Ok(Ok(reachable)) => reachable,
            Ok(Err(join_err)) => {
                tracing::debug!(address = %address, "probe task failed: {join_err}");
                false
            }
            Err(_elapsed) => {
                self.journal
                    .warning(format!("Timeout checking path: {address}"));
                false
            }
        };

        ProbeResult { reachable, checked_at: clock::now_rfc3339() }
    }
}

fn probe_paths(fs: &dyn ShareFs, root: &Path, data_dir: &Path) -> bool {
    let exists = |res: std::io::Result<bool>| res.unwrap_or(false);
    exists(fs.is_dir(root))
        && exists(fs.is_dir(data_dir))
        && exists(fs.is_file(&data_dir.join(DOCUMENT_NAME)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        dirs: AtomicUsize,
    }

    impl ShareFs for Counting {
        fn is_dir(&self, _: &Path) -> io::Result<bool> {
            // Root exists, data dir does not.
            Ok(self.dirs.fetch_add(1, Ordering::SeqCst) == 0)
        }
        fn is_file(&self, _: &Path) -> io::Result<bool> {
            panic!("file check must be skipped once a directory is missing")
        }
        fn read_to_string(&self, _: &Path) -> io::Result<String> {
            unreachable!()
        }
        fn copy(&self, _: &Path, _: &Path) -> io::Result<()> {
            unreachable!()
        }
        fn write(&self, _: &Path, _: &[u8]) -> io::Result<()> {
            unreachable!()
        }
    }

    #[test]
    fn short_circuits_on_first_missing_step() {
        let fs = Counting { dirs: AtomicUsize::new(0) };
        assert!(!probe_paths(&fs, Path::new("/r"), Path::new("/r/Robot/Data")));
        assert_eq!(fs.dirs.load(Ordering::SeqCst), 2);
    }

    struct Denied;

    impl ShareFs for Denied {
        fn is_dir(&self, _: &Path) -> io::Result<bool> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "access denied"))
        }
        fn is_file(&self, _: &Path) -> io::Result<bool> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "access denied"))
        }
        fn read_to_string(&self, _: &Path) -> io::Result<String> {
            unreachable!()
        }
        fn copy(&self, _: &Path, _: &Path) -> io::Result<()> {
            unreachable!()
        }
        fn write(&self, _: &Path, _: &[u8]) -> io::Result<()> {
            unreachable!()
        }
    }

    #[test]
    fn permission_errors_mean_unreachable() {
        assert!(!probe_paths(&Denied, Path::new("/r"), Path::new("/r/Robot/Data")));
    }
}

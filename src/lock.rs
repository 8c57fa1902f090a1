use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use crate::error::{GraphError, Result};

/// Default bounded wait for the cross-process lock.
pub const LOCK_WAIT: Duration = Duration::from_secs(2);
const RETRY_INTERVAL: Duration = Duration::from_millis(25);
/// A lock file older than this is presumed abandoned and broken.
const STALE_AFTER: Duration = Duration::from_secs(600);

/// Advisory cross-process write lock: a lock file created with
/// `create_new`, removed on drop. Acquisition waits up to `wait` and
/// then fails with `LockBusy` rather than blocking forever.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    pub fn acquire(path: &Path, wait: Duration) -> Result<FileLock> {
        let deadline = Instant::now() + wait;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut f) => {
                    let _ = writeln!(f, "{}", std::process::id());
                    return Ok(FileLock {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(path) {
                        log::warn!("breaking stale lock {}", path.display());
                        let _ = std::fs::remove_file(path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(GraphError::LockBusy(format!(
                            "{} held by {}",
                            path.display(),
                            holder(path).unwrap_or_else(|| "unknown process".into())
                        )));
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .map(|age| age > STALE_AFTER)
        .unwrap_or(false)
}

fn holder(path: &Path) -> Option<String> {
    let pid = std::fs::read_to_string(path).ok()?;
    let pid = pid.trim();
    (!pid.is_empty()).then(|| format!("pid {pid}"))
}

/// Per-database in-process mutex. Concurrent writers in the same process
/// block here until release; cross-process exclusion is the file lock's
/// job.
pub fn process_lock(db_path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let registry = LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = registry.lock().unwrap_or_else(|p| p.into_inner());
    map.entry(db_path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_and_release() {
        let td = tempdir().unwrap();
        let path = td.path().join(".lock");
        {
            let _lock = FileLock::acquire(&path, LOCK_WAIT).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn contention_surfaces_lock_busy_within_bounded_wait() {
        let td = tempdir().unwrap();
        let path = td.path().join(".lock");
        let _held = FileLock::acquire(&path, LOCK_WAIT).unwrap();
        let start = Instant::now();
        let err = FileLock::acquire(&path, Duration::from_millis(150)).unwrap_err();
        assert!(matches!(err, GraphError::LockBusy(_)));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(err.is_retryable());
    }

    #[test]
    fn same_path_shares_process_mutex() {
        let a = process_lock(Path::new("/tmp/x.db"));
        let b = process_lock(Path::new("/tmp/x.db"));
        let c = process_lock(Path::new("/tmp/y.db"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}

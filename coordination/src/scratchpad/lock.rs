//! Per-path mutual exclusion for the Scratchpad (spec §4.2, §5).
//!
//! Two layers: an in-process `HashMap<String, Mutex<()>>` guarantees
//! exclusion across concurrent callers within one process; a sidecar
//! `.lock` file, advisory-locked with `fs2`, extends that guarantee across
//! processes. Acquisition always respects a deadline.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use fs2::FileExt;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock timeout acquiring {0}")]
    Timeout(String),
    #[error("io error locking {0}: {1}")]
    Io(String, std::io::Error),
}

/// Registry of in-process per-name mutexes, shared by one [`super::Scratchpad`].
#[derive(Default)]
pub struct LockTable {
    mutexes: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut mutexes = self.mutexes.lock().expect("lock table poisoned");
        mutexes
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the in-process mutex for `name`, then the cross-process
    /// advisory lock on `lock_file_path`, run `f`, and release both. The
    /// whole acquisition path respects `deadline`.
    pub fn with_lock<T>(
        &self,
        name: &str,
        lock_file_path: &Path,
        deadline: Duration,
        f: impl FnOnce() -> T,
    ) -> Result<T, LockError> {
        let start = Instant::now();
        let mutex = self.mutex_for(name);
        let guard = loop {
            match mutex.try_lock() {
                Ok(guard) => break guard,
                Err(_) if start.elapsed() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(_) => return Err(LockError::Timeout(name.to_string())),
            }
        };

        let file = acquire_advisory_lock(lock_file_path, deadline.saturating_sub(start.elapsed()))?;
        let result = f();
        let _ = FileExt::unlock(&file);
        drop(guard);
        Ok(result)
    }
}

fn acquire_advisory_lock(
    path: &Path,
    deadline: Duration,
) -> Result<std::fs::File, LockError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LockError::Io(path.display().to_string(), e))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .map_err(|e| LockError::Io(path.display().to_string(), e))?;

    let start = Instant::now();
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(file),
            Err(_) if start.elapsed() < deadline => {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(_) => return Err(LockError::Timeout(path.display().to_string())),
        }
    }
}

/// Default path for an artifact's sidecar lock file: `<dir>/.<name>.lock`.
pub fn sidecar_lock_path(artifact_path: &Path) -> PathBuf {
    let dir = artifact_path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = artifact_path
        .file_name()
        .map(|n| format!(".{}.lock", n.to_string_lossy()))
        .unwrap_or_else(|| ".scratchpad.lock".to_string());
    dir.join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_locks_on_same_name_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let table = LockTable::new();
        let lock_path = dir.path().join(".artifact.lock");
        table
            .with_lock("artifact", &lock_path, Duration::from_secs(1), || {})
            .unwrap();
        table
            .with_lock("artifact", &lock_path, Duration::from_secs(1), || {})
            .unwrap();
    }

    #[test]
    fn distinct_names_do_not_contend() {
        let dir = tempfile::tempdir().unwrap();
        let table = LockTable::new();
        table
            .with_lock(
                "a",
                &dir.path().join(".a.lock"),
                Duration::from_secs(1),
                || {},
            )
            .unwrap();
        table
            .with_lock(
                "b",
                &dir.path().join(".b.lock"),
                Duration::from_secs(1),
                || {},
            )
            .unwrap();
    }

    #[test]
    fn held_in_process_lock_times_out_concurrent_caller() {
        let dir = tempfile::tempdir().unwrap();
        let table = Arc::new(LockTable::new());
        let lock_path = dir.path().join(".artifact.lock");

        let table2 = table.clone();
        let lock_path2 = lock_path.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = std::thread::spawn(move || {
            table2
                .with_lock("artifact", &lock_path2, Duration::from_millis(200), || {
                    tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(100));
                })
                .unwrap();
        });
        rx.recv().unwrap();
        let err = table
            .with_lock("artifact", &lock_path, Duration::from_millis(10), || {})
            .unwrap_err();
        assert!(matches!(err, LockError::Timeout(_)));
        handle.join().unwrap();
    }
}

//! Atomic writes: write to a sibling temp file, then rename onto the
//! final path. The rename is the linearization point (spec §4.2) — a
//! reader observes the artifact in its entirety or not at all, even across
//! a simulated mid-write crash.

use std::io::Write;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum AtomicWriteError {
    #[error("io error writing {0}: {1}")]
    Io(String, #[source] std::io::Error),
}

/// Write `bytes` to `path` atomically.
///
/// Implementation: create `<path>.tmp.<pid>.<random>`, write and `fsync`
/// it, then `rename` over `path`. A process killed mid-write leaves only
/// the stray temp file behind; `path` itself is never observed partially
/// written.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AtomicWriteError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| AtomicWriteError::Io(dir.display().to_string(), e))?;

    let unique = format!(
        "{}.tmp.{}.{}",
        path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
        std::process::id(),
        rand::random::<u32>()
    );
    let temp_path = dir.join(unique);

    {
        let mut file = std::fs::File::create(&temp_path)
            .map_err(|e| AtomicWriteError::Io(temp_path.display().to_string(), e))?;
        file.write_all(bytes)
            .map_err(|e| AtomicWriteError::Io(temp_path.display().to_string(), e))?;
        file.sync_all()
            .map_err(|e| AtomicWriteError::Io(temp_path.display().to_string(), e))?;
    }

    std::fs::rename(&temp_path, path).map_err(|e| AtomicWriteError::Io(path.display().to_string(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.json");
        write_atomic(&path, b"{\"a\":1}").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"a\":1}");
    }

    #[test]
    fn overwrite_replaces_contents_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.json");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn no_leftover_temp_files_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.json");
        write_atomic(&path, b"data").unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}

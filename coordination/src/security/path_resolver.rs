//! Path resolver — canonicalize and contain filesystem access inside a
//! project root (spec §4.1).

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters permitted in a path destined for writing: alphanumeric,
/// `_`, `-`, `/`, `.`, space.
static SAFE_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-./ ]+$").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("path traversal: {0} escapes root {1}")]
    PathTraversal(String, String),
    #[error("unsafe path characters: {0}")]
    UnsafePath(String),
    #[error("io error resolving {0}: {1}")]
    Io(String, std::io::Error),
}

/// Resolves a requested path against a project root, refusing escapes.
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// `root` must already exist; it is canonicalized once at construction.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PathError> {
        let root = root.as_ref();
        let canonical = root
            .canonicalize()
            .map_err(|e| PathError::Io(root.display().to_string(), e))?;
        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `requested` (relative or absolute) against the root,
    /// following symlinks, and fail with [`PathError::PathTraversal`] if
    /// the canonical result is not contained in the root.
    ///
    /// The path need not exist yet: only the longest existing ancestor is
    /// canonicalized and the remaining components are appended lexically,
    /// so this also validates paths about to be created.
    pub fn resolve(&self, requested: impl AsRef<Path>) -> Result<PathBuf, PathError> {
        let requested = requested.as_ref();
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.root.join(requested)
        };

        let (existing_ancestor, remainder) = longest_existing_ancestor(&joined);
        let canonical_ancestor = existing_ancestor
            .canonicalize()
            .map_err(|e| PathError::Io(existing_ancestor.display().to_string(), e))?;

        let mut resolved = canonical_ancestor;
        for component in remainder {
            resolved.push(component);
        }
        let resolved = normalize_lexically(&resolved);

        if !resolved.starts_with(&self.root) {
            return Err(PathError::PathTraversal(
                requested.display().to_string(),
                self.root.display().to_string(),
            ));
        }
        Ok(resolved)
    }

    /// Resolve a path that will be written to; additionally enforces the
    /// "safe path" character class.
    pub fn resolve_for_write(&self, requested: impl AsRef<Path>) -> Result<PathBuf, PathError> {
        let requested = requested.as_ref();
        let as_str = requested.to_string_lossy();
        if !SAFE_PATH.is_match(&as_str) {
            return Err(PathError::UnsafePath(as_str.to_string()));
        }
        self.resolve(requested)
    }
}

fn longest_existing_ancestor(path: &Path) -> (PathBuf, Vec<std::ffi::OsString>) {
    let mut remainder = Vec::new();
    let mut current = path.to_path_buf();
    loop {
        if current.exists() {
            remainder.reverse();
            return (current, remainder);
        }
        match current.file_name() {
            Some(name) => {
                remainder.push(name.to_os_string());
                current = current
                    .parent()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| PathBuf::from("/"));
            }
            None => {
                remainder.reverse();
                return (current, remainder);
            }
        }
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_path_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("scratchpad")).unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();
        let resolved = resolver.resolve("scratchpad/info.yaml").unwrap();
        assert!(resolved.starts_with(resolver.root()));
    }

    #[test]
    fn rejects_traversal_outside_root() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();
        let err = resolver.resolve("../../etc/passwd").unwrap_err();
        assert!(matches!(err, PathError::PathTraversal(_, _)));
    }

    #[test]
    fn rejects_unsafe_write_characters() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();
        let err = resolver.resolve_for_write("evil;rm -rf.yaml").unwrap_err();
        assert!(matches!(err, PathError::UnsafePath(_)));
    }
}

//! Scratchpad (spec §4.2) — the single source of truth for all artifacts,
//! with atomic writes and per-path mutual exclusion.
//!
//! Ownership: the Scratchpad exclusively owns every on-disk artifact; every
//! other component accesses them only through this API (spec §3).

pub mod artifact;
pub mod atomic;
pub mod lock;
pub mod schema;

use std::path::Path;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use self::artifact::{BridgeDirection, Section, ScratchpadLayout};
use self::lock::{sidecar_lock_path, LockError, LockTable};
use self::schema::{SchemaValidationError, SerialFormat};

use crate::error::ErrorKind;

const DEFAULT_LOCK_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ScratchpadError {
    #[error("artifact not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    IoError(String),
    #[error("schema validation failed: {0}")]
    SchemaValidationError(#[from] SchemaValidationError),
    #[error("lock timeout: {0}")]
    LockTimeout(String),
}

impl ScratchpadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScratchpadError::NotFound(_) => ErrorKind::NotFound,
            ScratchpadError::IoError(_) => ErrorKind::IoError,
            ScratchpadError::SchemaValidationError(_) => ErrorKind::SchemaValidation,
            ScratchpadError::LockTimeout(_) => ErrorKind::Timeout,
        }
    }
}

impl From<LockError> for ScratchpadError {
    fn from(e: LockError) -> Self {
        ScratchpadError::LockTimeout(e.to_string())
    }
}

impl From<atomic::AtomicWriteError> for ScratchpadError {
    fn from(e: atomic::AtomicWriteError) -> Self {
        ScratchpadError::IoError(e.to_string())
    }
}

/// Current schema major version stamped by writers and enforced on reads.
pub const SCHEMA_MAJOR: u32 = 1;

/// The Scratchpad: atomic, lock-serialized, file-backed artifact store.
pub struct Scratchpad {
    layout: ScratchpadLayout,
    locks: LockTable,
}

impl Scratchpad {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            layout: ScratchpadLayout::new(root),
            locks: LockTable::new(),
        }
    }

    pub fn layout(&self) -> &ScratchpadLayout {
        &self.layout
    }

    fn lock_key(project_id: &str, section: Section, name: &str) -> String {
        format!("{section}/{project_id}/{name}")
    }

    /// Acquire the per-artifact lock and run `f` inside it (spec
    /// `withLock(name, fn)`).
    pub fn with_lock<T>(
        &self,
        project_id: &str,
        section: Section,
        name: &str,
        f: impl FnOnce() -> T,
    ) -> Result<T, ScratchpadError> {
        let path = self.layout.artifact_path(project_id, section, name);
        let lock_path = sidecar_lock_path(&path);
        let key = Self::lock_key(project_id, section, name);
        self.locks
            .with_lock(&key, &lock_path, DEFAULT_LOCK_DEADLINE, f)
            .map_err(ScratchpadError::from)
    }

    /// Raw read; `Ok(None)` if the artifact does not exist.
    pub fn read(
        &self,
        project_id: &str,
        section: Section,
        name: &str,
    ) -> Result<Option<Vec<u8>>, ScratchpadError> {
        let path = self.layout.artifact_path(project_id, section, name);
        self.with_lock(project_id, section, name, || {
            if !path.exists() {
                return Ok(None);
            }
            std::fs::read(&path)
                .map(Some)
                .map_err(|e| ScratchpadError::IoError(e.to_string()))
        })?
    }

    /// Raw write, atomically, inside the per-artifact lock.
    pub fn write(
        &self,
        project_id: &str,
        section: Section,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), ScratchpadError> {
        let path = self.layout.artifact_path(project_id, section, name);
        self.with_lock(project_id, section, name, || {
            atomic::write_atomic(&path, bytes).map_err(ScratchpadError::from)
        })?
    }

    pub fn exists(&self, project_id: &str, section: Section, name: &str) -> bool {
        self.layout.artifact_path(project_id, section, name).exists()
    }

    /// List logical names present under `section` for `projectId`.
    pub fn list(&self, project_id: &str, section: Section) -> Result<Vec<String>, ScratchpadError> {
        let dir = self.layout.section_dir(project_id, section);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| ScratchpadError::IoError(e.to_string()))? {
            let entry = entry.map_err(|e| ScratchpadError::IoError(e.to_string()))?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                if let Some(name) = entry.file_name().to_str() {
                    if !name.ends_with(".lock") && !name.contains(".tmp.") {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Typed read with schema-version enforcement. A payload missing
    /// `schemaVersion`, or whose major version mismatches
    /// [`SCHEMA_MAJOR`], is rejected (Open Question 1: strict).
    pub fn read_typed<T: DeserializeOwned>(
        &self,
        project_id: &str,
        section: Section,
        name: &str,
        format: SerialFormat,
    ) -> Result<Option<T>, ScratchpadError> {
        let Some(bytes) = self.read(project_id, section, name)? else {
            return Ok(None);
        };
        schema::validate_schema_version(&bytes, SCHEMA_MAJOR, format)?;
        let value = match format {
            SerialFormat::Json => serde_json::from_slice(&bytes)
                .map_err(|e| ScratchpadError::IoError(e.to_string()))?,
            SerialFormat::Yaml => serde_yaml::from_slice(&bytes)
                .map_err(|e| ScratchpadError::IoError(e.to_string()))?,
        };
        Ok(Some(value))
    }

    /// Typed write. The caller's value must already serialize with a
    /// `schemaVersion` field matching [`SCHEMA_MAJOR`]; writers stamp it
    /// themselves rather than relying on [`schema::ensure_schema_version`],
    /// which exists only for one-time migration of legacy data.
    pub fn write_typed<T: Serialize>(
        &self,
        project_id: &str,
        section: Section,
        name: &str,
        value: &T,
        format: SerialFormat,
    ) -> Result<(), ScratchpadError> {
        let bytes = match format {
            SerialFormat::Json => serde_json::to_vec_pretty(value)
                .map_err(|e| ScratchpadError::IoError(e.to_string()))?,
            SerialFormat::Yaml => serde_yaml::to_string(value)
                .map_err(|e| ScratchpadError::IoError(e.to_string()))?
                .into_bytes(),
        };
        self.write(project_id, section, name, &bytes)
    }

    /// Write the request envelope for the file-bridge transport (spec
    /// §4.5, §6).
    pub fn write_bridge_input(&self, agent_type: &str, bytes: &[u8]) -> Result<(), ScratchpadError> {
        let path = self.layout.bridge_path(BridgeDirection::Input, agent_type);
        atomic::write_atomic(&path, bytes).map_err(ScratchpadError::from)
    }

    /// Non-blocking poll of the bridge output file; `Ok(None)` if not yet
    /// written.
    pub fn read_bridge_output(&self, agent_type: &str) -> Result<Option<Vec<u8>>, ScratchpadError> {
        let path = self.layout.bridge_path(BridgeDirection::Output, agent_type);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read(&path)
            .map(Some)
            .map_err(|e| ScratchpadError::IoError(e.to_string()))
    }

    /// Remove a stale bridge output file (called by the Dispatcher before
    /// issuing a new request, so a prior response cannot be mistaken for
    /// the new one).
    pub fn clear_bridge_output(&self, agent_type: &str) -> Result<(), ScratchpadError> {
        let path = self.layout.bridge_path(BridgeDirection::Output, agent_type);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| ScratchpadError::IoError(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Doc {
        #[serde(rename = "schemaVersion")]
        schema_version: String,
        body: String,
    }

    fn pad() -> (tempfile::TempDir, Scratchpad) {
        let dir = tempfile::tempdir().unwrap();
        let pad = Scratchpad::new(dir.path().join("scratchpad"));
        (dir, pad)
    }

    #[test]
    fn missing_artifact_reads_as_none() {
        let (_dir, pad) = pad();
        assert!(pad.read("p1", Section::Info, "missing.yaml").unwrap().is_none());
    }

    #[test]
    fn write_then_read_round_trips_bytes() {
        let (_dir, pad) = pad();
        pad.write("p1", Section::Documents, "prd.md", b"# PRD").unwrap();
        assert_eq!(
            pad.read("p1", Section::Documents, "prd.md").unwrap().unwrap(),
            b"# PRD"
        );
    }

    #[test]
    fn typed_round_trip_normalizes() {
        let (_dir, pad) = pad();
        let doc = Doc {
            schema_version: "1.0.0".to_string(),
            body: "hello".to_string(),
        };
        pad.write_typed("p1", Section::Info, "collected.json", &doc, SerialFormat::Json)
            .unwrap();
        let round_tripped: Doc = pad
            .read_typed("p1", Section::Info, "collected.json", SerialFormat::Json)
            .unwrap()
            .unwrap();
        assert_eq!(round_tripped, doc);
    }

    #[test]
    fn typed_read_rejects_missing_schema_version() {
        let (_dir, pad) = pad();
        pad.write("p1", Section::Info, "raw.json", br#"{"body":"x"}"#)
            .unwrap();
        let err = pad
            .read_typed::<Doc>("p1", Section::Info, "raw.json", SerialFormat::Json)
            .unwrap_err();
        assert!(matches!(
            err,
            ScratchpadError::SchemaValidationError(SchemaValidationError::Missing)
        ));
    }

    #[test]
    fn list_excludes_lock_and_temp_files() {
        let (_dir, pad) = pad();
        pad.write("p1", Section::Issues, "graph.json", b"{}").unwrap();
        let names = pad.list("p1", Section::Issues).unwrap();
        assert_eq!(names, vec!["graph.json".to_string()]);
    }

    #[test]
    fn bridge_round_trip() {
        let (_dir, pad) = pad();
        pad.write_bridge_input("collector", b"{\"agentType\":\"collector\"}").unwrap();
        assert!(pad.read_bridge_output("collector").unwrap().is_none());
    }
}

//! Schema versioning for typed Scratchpad artifacts (spec §4.2, §6).
//!
//! Open Question 1 (see `SPEC_FULL.md` §13) is resolved strictly: a typed
//! value with no `schemaVersion` field is a [`SchemaValidationError`] for
//! readers. [`ensure_schema_version`] exists only for writers migrating
//! pre-existing on-disk data and must never be reached by a reader.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchemaValidationError {
    #[error("missing schemaVersion field")]
    Missing,
    #[error("incompatible schema version: expected major {expected}, found {found}")]
    Incompatible { expected: u32, found: String },
    #[error("malformed schemaVersion string: {0}")]
    Malformed(String),
}

/// Parse the major component out of a semver-like `"MAJOR.MINOR.PATCH"`
/// string.
fn major_of(version: &str) -> Result<u32, SchemaValidationError> {
    version
        .split('.')
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| SchemaValidationError::Malformed(version.to_string()))
}

/// Check that `found`'s major version matches `expected`.
pub fn check_major_version(expected: u32, found: &str) -> Result<(), SchemaValidationError> {
    let found_major = major_of(found)?;
    if found_major != expected {
        return Err(SchemaValidationError::Incompatible {
            expected,
            found: found.to_string(),
        });
    }
    Ok(())
}

/// Minimal envelope every typed artifact embeds, read generically before
/// the caller deserializes the full payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaEnvelope {
    #[serde(rename = "schemaVersion")]
    pub schema_version: Option<String>,
}

/// Inspect raw JSON or YAML bytes for a `schemaVersion` field and enforce
/// the major-version match. Strict per Open Question 1: a missing field is
/// rejected, never silently stamped.
pub fn validate_schema_version(
    bytes: &[u8],
    expected_major: u32,
    format: SerialFormat,
) -> Result<String, SchemaValidationError> {
    let envelope: SchemaEnvelope = match format {
        SerialFormat::Json => serde_json::from_slice(bytes)
            .map_err(|e| SchemaValidationError::Malformed(e.to_string()))?,
        SerialFormat::Yaml => serde_yaml::from_slice(bytes)
            .map_err(|e| SchemaValidationError::Malformed(e.to_string()))?,
    };
    let version = envelope.schema_version.ok_or(SchemaValidationError::Missing)?;
    check_major_version(expected_major, &version)?;
    Ok(version)
}

/// Serialization format used by a Scratchpad artifact (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialFormat {
    Json,
    Yaml,
}

/// Writer-side helper: stamp the current schema version onto a raw JSON
/// value that lacks one. Never used by readers.
pub fn ensure_schema_version(mut value: serde_json::Value, current: &str) -> serde_json::Value {
    if let serde_json::Value::Object(map) = &mut value {
        map.entry("schemaVersion")
            .or_insert_with(|| serde_json::Value::String(current.to_string()));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_schema_version_is_rejected() {
        let bytes = br#"{"name": "x"}"#;
        let err = validate_schema_version(bytes, 1, SerialFormat::Json).unwrap_err();
        assert_eq!(err, SchemaValidationError::Missing);
    }

    #[test]
    fn matching_major_passes() {
        let bytes = br#"{"schemaVersion": "1.2.0"}"#;
        assert_eq!(
            validate_schema_version(bytes, 1, SerialFormat::Json).unwrap(),
            "1.2.0"
        );
    }

    #[test]
    fn mismatched_major_is_rejected() {
        let bytes = br#"{"schemaVersion": "2.0.0"}"#;
        let err = validate_schema_version(bytes, 1, SerialFormat::Json).unwrap_err();
        assert!(matches!(err, SchemaValidationError::Incompatible { .. }));
    }

    #[test]
    fn ensure_schema_version_stamps_missing_field() {
        let value = serde_json::json!({"name": "x"});
        let stamped = ensure_schema_version(value, "1.0.0");
        assert_eq!(stamped["schemaVersion"], "1.0.0");
    }

    #[test]
    fn ensure_schema_version_does_not_overwrite() {
        let value = serde_json::json!({"schemaVersion": "1.5.0"});
        let stamped = ensure_schema_version(value, "2.0.0");
        assert_eq!(stamped["schemaVersion"], "1.5.0");
    }
}

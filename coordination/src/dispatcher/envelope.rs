//! Wire types exchanged with agent transports (spec §4.5, §6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;

/// Request envelope handed to an agent, whichever transport it runs on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub agent_type: String,
    pub input: Value,
    pub scratchpad_dir: String,
    pub project_dir: String,
    #[serde(default)]
    pub prior_stage_outputs: HashMap<String, Value>,
}

/// How much of a dispatched agent's capability was actually available,
/// mirroring `resilience::DegradationLevel` (SPEC_FULL §12.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    Full,
    Partial,
}

/// Attached to a [`BridgeResponse`] when it was served by a fallback
/// transport rather than the primary one registered for an `agentType`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Degradation {
    pub level: DegradationLevel,
    pub served_by: String,
}

/// Response an agent hands back, whichever transport produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub output: Value,
    #[serde(default)]
    pub artifacts: Vec<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The real cause of a failed dispatch (spec §4.7, §7), so the
    /// Controller's retry classifier sees what actually happened instead
    /// of assuming a transient failure. Absent when a transport has no
    /// classification to offer — callers then fall back to treating the
    /// failure as non-retryable rather than guessing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<Degradation>,
}

impl BridgeResponse {
    pub fn success(output: Value) -> Self {
        Self {
            output,
            artifacts: Vec::new(),
            success: true,
            error: None,
            kind: None,
            degraded: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            output: Value::Null,
            artifacts: Vec::new(),
            success: false,
            error: Some(error.into()),
            kind: None,
            degraded: None,
        }
    }

    /// A failure whose cause is already classified (e.g. a Security Gate
    /// denial or a `SchemaValidationError` surfaced through an agent body),
    /// so it reaches the retry classifier as that real kind rather than
    /// `None`.
    pub fn failure_with_kind(error: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            output: Value::Null,
            artifacts: Vec::new(),
            success: false,
            error: Some(error.into()),
            kind: Some(kind),
            degraded: None,
        }
    }

    /// Parse a raw response body per spec §4.5: if it parses as
    /// `{output, artifacts?, success}`, use it as-is; otherwise treat the
    /// whole body as plain-text `output` with `success=true`.
    pub fn parse(body: &[u8]) -> Self {
        if let Ok(parsed) = serde_json::from_slice::<BridgeResponse>(body) {
            return parsed;
        }
        Self::success(Value::String(String::from_utf8_lossy(body).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_json_body_parses_as_response() {
        let body = br#"{"output":{"x":1},"success":true,"artifacts":["a.txt"]}"#;
        let resp = BridgeResponse::parse(body);
        assert!(resp.success);
        assert_eq!(resp.artifacts, vec!["a.txt".to_string()]);
    }

    #[test]
    fn plain_text_body_becomes_successful_string_output() {
        let resp = BridgeResponse::parse(b"just some text");
        assert!(resp.success);
        assert_eq!(resp.output, Value::String("just some text".to_string()));
    }
}

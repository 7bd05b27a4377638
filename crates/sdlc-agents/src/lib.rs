//! Deterministic, inspectable agent bodies for the seven roles named in
//! spec §1/§11 (collector, requirement writer, design writer, issue
//! generator, implementation worker, reviewer, CI-fixer).
//!
//! These are not LLM clients: per spec §1 the real agent bodies are
//! external collaborators whose internals are out of scope, addressable
//! only through the bridge's wire envelope (spec §6). This crate speaks
//! that envelope directly — its own `WireRequest`/`WireResponse` mirror
//! the JSON shape `coordination::dispatcher::envelope` produces and
//! consumes — rather than depending on `coordination`'s Rust types, the
//! same way the SLURM harness and the inference process it drives share
//! a wire format, not a crate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Mirrors `coordination::dispatcher::envelope::BridgeRequest` field for
/// field (spec §6 "Bridge envelope").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRequest {
    #[serde(rename = "agentType")]
    pub agent_type: String,
    pub input: Value,
    #[serde(rename = "scratchpadDir")]
    pub scratchpad_dir: String,
    #[serde(rename = "projectDir")]
    pub project_dir: String,
    #[serde(rename = "priorStageOutputs", default)]
    pub prior_stage_outputs: HashMap<String, Value>,
}

/// Mirrors `coordination::dispatcher::envelope::BridgeResponse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireResponse {
    pub output: Value,
    #[serde(default)]
    pub artifacts: Vec<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Always absent: these bodies are deterministic stand-ins that never
    /// fail, so there is no real cause to classify (mirrors
    /// `coordination::dispatcher::envelope::BridgeResponse::kind`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Always absent: these bodies always run as the sole registered
    /// transport for their agent type, so there is no fallback tier to
    /// report (mirrors `coordination::dispatcher::envelope::Degradation`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<Value>,
}

impl WireResponse {
    fn success(output: Value) -> Self {
        Self {
            output,
            artifacts: Vec::new(),
            success: true,
            error: None,
            kind: None,
            degraded: None,
        }
    }
}

/// The seven known agent types, in the pipeline's natural order.
pub const AGENT_TYPES: &[&str] = &[
    "collector",
    "requirement_writer",
    "design_writer",
    "issue_generator",
    "implementation_worker",
    "reviewer",
    "ci_fixer",
];

#[derive(Debug, thiserror::Error)]
pub enum AgentBodyError {
    #[error("no agent body registered for type {0}")]
    UnknownAgentType(String),
}

/// Run the named agent body over `request`, returning the wire response
/// it would otherwise write to `bridge/output/<agentType>.json`.
pub fn run_agent(agent_type: &str, request: &WireRequest) -> Result<WireResponse, AgentBodyError> {
    let response = match agent_type {
        "collector" => collector(request),
        "requirement_writer" => requirement_writer(request),
        "design_writer" => design_writer(request),
        "issue_generator" => issue_generator(request),
        "implementation_worker" => implementation_worker(request),
        "reviewer" => reviewer(request),
        "ci_fixer" => ci_fixer(request),
        other => return Err(AgentBodyError::UnknownAgentType(other.to_string())),
    };
    Ok(response)
}

fn collector(request: &WireRequest) -> WireResponse {
    WireResponse::success(json!({
        "gatheredAt": chrono::Utc::now().to_rfc3339(),
        "request": request.input,
    }))
}

fn requirement_writer(request: &WireRequest) -> WireResponse {
    let basis = request.prior_stage_outputs.get("collected_info").cloned().unwrap_or(Value::Null);
    WireResponse::success(json!({
        "document": "# Requirements\n\nDerived from collected info.",
        "basis": basis,
    }))
}

fn design_writer(request: &WireRequest) -> WireResponse {
    let srs = request.prior_stage_outputs.get("srs").cloned().unwrap_or(Value::Null);
    WireResponse::success(json!({
        "document": "# Design\n\nDerived from SRS.",
        "srs": srs,
    }))
}

fn issue_generator(_request: &WireRequest) -> WireResponse {
    WireResponse::success(json!({
        "schemaVersion": "1.0.0",
        "nodes": [],
        "edges": [],
    }))
}

fn implementation_worker(request: &WireRequest) -> WireResponse {
    let issue_id = request
        .input
        .get("issueId")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    WireResponse::success(json!({ "prUrl": format!("https://example.invalid/pr/{issue_id}") }))
}

fn reviewer(_request: &WireRequest) -> WireResponse {
    WireResponse::success(json!({ "verdict": "approved", "comments": [] }))
}

fn ci_fixer(_request: &WireRequest) -> WireResponse {
    WireResponse::success(json!({ "fixed": true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(agent_type: &str, input: Value) -> WireRequest {
        WireRequest {
            agent_type: agent_type.to_string(),
            input,
            scratchpad_dir: "scratchpad".to_string(),
            project_dir: ".".to_string(),
            prior_stage_outputs: HashMap::new(),
        }
    }

    #[test]
    fn collector_echoes_input_with_a_timestamp() {
        let response = run_agent("collector", &request("collector", json!({"text": "build a widget"}))).unwrap();
        assert!(response.success);
        assert!(response.output.get("gatheredAt").is_some());
    }

    #[test]
    fn every_known_agent_type_runs() {
        for agent_type in AGENT_TYPES {
            let response = run_agent(agent_type, &request(agent_type, json!({}))).unwrap();
            assert!(response.success, "{agent_type} did not succeed");
        }
    }

    #[test]
    fn unknown_agent_type_is_rejected() {
        assert!(run_agent("not_a_real_agent", &request("not_a_real_agent", json!({}))).is_err());
    }

    #[test]
    fn implementation_worker_embeds_the_issue_id_in_the_pr_url() {
        let response = run_agent("implementation_worker", &request("implementation_worker", json!({"issueId": "iss-7"}))).unwrap();
        assert_eq!(response.output["prUrl"], "https://example.invalid/pr/iss-7");
    }
}

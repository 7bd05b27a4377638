//! Bridge / Dispatcher (spec §4.5): the uniform call surface the
//! Orchestrator and Controller use to ask an agent to run over an input.

pub mod bridge;
pub mod envelope;
pub mod transport;

use std::time::Duration;

pub use bridge::FileBridgeTransport;
pub use envelope::{BridgeRequest, BridgeResponse, Degradation, DegradationLevel};
pub use transport::{AgentBody, InProcessTransport, StubTransport, Transport};

use crate::error::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no transport supports agent type {0}")]
    NoTransport(String),
    #[error("agent dispatch failed for stage {stage}: {cause}")]
    AgentDispatchError { stage: String, cause: String },
    #[error("bridge timed out waiting for {agent_type} after {waited:?}")]
    BridgeTimeout { agent_type: String, waited: Duration },
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::NoTransport(_) => ErrorKind::AgentDispatchError,
            DispatchError::AgentDispatchError { .. } => ErrorKind::AgentDispatchError,
            DispatchError::BridgeTimeout { .. } => ErrorKind::BridgeTimeout,
        }
    }
}

/// Resolves the transport that `supports(agentType)` and dispatches
/// through it, falling back to [`StubTransport`] when none claims the
/// type (spec §4.5).
pub struct Dispatcher {
    transports: Vec<Box<dyn Transport>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            transports: Vec::new(),
        }
    }

    pub fn register_transport(&mut self, transport: Box<dyn Transport>) {
        self.transports.push(transport);
    }

    /// Dispatch `request` through the first registered transport that
    /// supports its `agentType`; if none do, fail closed via
    /// [`StubTransport`]. Any transport other than the first registered one
    /// is treated as a fallback tier: its response is marked
    /// [`Degradation::Partial`] (SPEC_FULL §12.3), so callers can see a
    /// request succeeded on a lower-fidelity path without it surfacing as
    /// an error.
    pub fn dispatch(&self, request: BridgeRequest) -> Result<BridgeResponse, DispatchError> {
        let agent_type = request.agent_type.clone();
        for (tier, transport) in self.transports.iter().enumerate() {
            if transport.supports(&agent_type) {
                let mut response = transport.dispatch(request)?;
                if tier > 0 {
                    response.degraded = Some(Degradation {
                        level: DegradationLevel::Partial,
                        served_by: transport.name().to_string(),
                    });
                }
                return Ok(response);
            }
        }
        StubTransport.dispatch(request)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(agent_type: &str) -> BridgeRequest {
        BridgeRequest {
            agent_type: agent_type.to_string(),
            input: json!({}),
            scratchpad_dir: "x".to_string(),
            project_dir: "y".to_string(),
            prior_stage_outputs: Default::default(),
        }
    }

    #[test]
    fn dispatches_through_matching_transport() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_transport(Box::new(InProcessTransport::new("collector", |_req| {
            Ok(BridgeResponse::success(json!("ok")))
        })));
        let response = dispatcher.dispatch(request("collector")).unwrap();
        assert!(response.success);
        assert!(response.degraded.is_none());
    }

    #[test]
    fn transport_registered_after_the_primary_is_marked_degraded_when_it_serves() {
        let mut dispatcher = Dispatcher::new();
        // Neither supports "reviewer"; only the second one matches, so it
        // serves as a fallback tier rather than the primary.
        dispatcher.register_transport(Box::new(InProcessTransport::new("other", |_req| {
            Ok(BridgeResponse::success(json!("unused")))
        })));
        dispatcher.register_transport(Box::new(InProcessTransport::new("reviewer", |_req| {
            Ok(BridgeResponse::success(json!("fallback-ok")))
        })));
        let response = dispatcher.dispatch(request("reviewer")).unwrap();
        assert!(response.success);
        let degraded = response.degraded.expect("expected a degraded marker");
        assert_eq!(degraded.level, DegradationLevel::Partial);
        assert_eq!(degraded.served_by, "in_process");
    }

    #[test]
    fn falls_back_to_stub_when_no_transport_matches() {
        let dispatcher = Dispatcher::new();
        let err = dispatcher.dispatch(request("unknown")).unwrap_err();
        assert!(matches!(err, DispatchError::NoTransport(_)));
    }

    #[test]
    fn transport_failure_becomes_agent_dispatch_error() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_transport(Box::new(InProcessTransport::new("collector", |_req| {
            Err("boom".to_string())
        })));
        let err = dispatcher.dispatch(request("collector")).unwrap_err();
        assert!(matches!(err, DispatchError::AgentDispatchError { .. }));
    }
}

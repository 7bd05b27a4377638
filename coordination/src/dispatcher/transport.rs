//! Transport contract (spec §4.5): a pluggable way to actually run an
//! agent given a request envelope.

use super::envelope::{BridgeRequest, BridgeResponse};
use super::DispatchError;
use crate::registry::AgentInstance;

/// A transport knows how to run a fixed set of agent types.
pub trait Transport: Send + Sync {
    fn supports(&self, agent_type: &str) -> bool;
    fn dispatch(&self, request: BridgeRequest) -> Result<BridgeResponse, DispatchError>;

    /// Tier name reported on [`super::envelope::Degradation`] when this
    /// transport serves a request as a fallback rather than the primary
    /// (SPEC_FULL §12.3).
    fn name(&self) -> &str {
        "transport"
    }
}

/// Invokes an already-constructed agent instance directly; its return
/// value is the response (spec §4.5: "the agent instance is invoked
/// directly").
pub struct InProcessTransport<F>
where
    F: Fn(BridgeRequest) -> Result<BridgeResponse, String> + Send + Sync,
{
    agent_type: String,
    invoke: F,
}

impl<F> InProcessTransport<F>
where
    F: Fn(BridgeRequest) -> Result<BridgeResponse, String> + Send + Sync,
{
    pub fn new(agent_type: impl Into<String>, invoke: F) -> Self {
        Self {
            agent_type: agent_type.into(),
            invoke,
        }
    }
}

impl<F> Transport for InProcessTransport<F>
where
    F: Fn(BridgeRequest) -> Result<BridgeResponse, String> + Send + Sync,
{
    fn supports(&self, agent_type: &str) -> bool {
        agent_type == self.agent_type
    }

    fn dispatch(&self, request: BridgeRequest) -> Result<BridgeResponse, DispatchError> {
        (self.invoke)(request.clone()).map_err(|cause| DispatchError::AgentDispatchError {
            stage: request.agent_type,
            cause,
        })
    }

    fn name(&self) -> &str {
        "in_process"
    }
}

/// Fail-closed fallback when no transport supports the requested
/// `agentType` (spec §4.5).
pub struct StubTransport;

impl Transport for StubTransport {
    fn supports(&self, _agent_type: &str) -> bool {
        true
    }

    fn dispatch(&self, request: BridgeRequest) -> Result<BridgeResponse, DispatchError> {
        Err(DispatchError::NoTransport(request.agent_type))
    }
}

/// Marker so a registered [`crate::registry::AgentInstance`] can also be
/// dispatched as an in-process agent body, without forcing every agent to
/// implement a second trait.
pub trait AgentBody: AgentInstance {
    fn run(&self, request: BridgeRequest) -> Result<BridgeResponse, String>;
}

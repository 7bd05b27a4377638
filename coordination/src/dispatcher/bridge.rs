//! File-bridge transport (spec §4.5) for agents implemented as an
//! external harness: write the request, poll for the response file at a
//! bounded interval until it appears or a deadline elapses.
//!
//! The poll loop mirrors
//! `slurm::SlurmInferenceManager::wait_for_ready` (fixed-interval polling
//! against wall-clock elapsed time, timing out into a dedicated error
//! variant) substituting a Scratchpad file for a SLURM endpoint file.

use std::time::{Duration, Instant};

use super::envelope::{BridgeRequest, BridgeResponse};
use super::transport::Transport;
use super::DispatchError;
use crate::scratchpad::Scratchpad;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// File-bridge transport for one agent type.
pub struct FileBridgeTransport<'a> {
    agent_type: String,
    scratchpad: &'a Scratchpad,
    deadline: Duration,
    poll_interval: Duration,
}

impl<'a> FileBridgeTransport<'a> {
    pub fn new(agent_type: impl Into<String>, scratchpad: &'a Scratchpad, deadline: Duration) -> Self {
        Self {
            agent_type: agent_type.into(),
            scratchpad,
            deadline,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl<'a> Transport for FileBridgeTransport<'a> {
    fn supports(&self, agent_type: &str) -> bool {
        agent_type == self.agent_type
    }

    fn dispatch(&self, request: BridgeRequest) -> Result<BridgeResponse, DispatchError> {
        let body = serde_json::to_vec(&request)
            .map_err(|e| DispatchError::AgentDispatchError {
                stage: self.agent_type.clone(),
                cause: e.to_string(),
            })?;

        self.scratchpad
            .clear_bridge_output(&self.agent_type)
            .map_err(|e| DispatchError::AgentDispatchError {
                stage: self.agent_type.clone(),
                cause: e.to_string(),
            })?;
        self.scratchpad
            .write_bridge_input(&self.agent_type, &body)
            .map_err(|e| DispatchError::AgentDispatchError {
                stage: self.agent_type.clone(),
                cause: e.to_string(),
            })?;

        let start = Instant::now();
        loop {
            if let Some(bytes) = self
                .scratchpad
                .read_bridge_output(&self.agent_type)
                .map_err(|e| DispatchError::AgentDispatchError {
                    stage: self.agent_type.clone(),
                    cause: e.to_string(),
                })?
            {
                return Ok(BridgeResponse::parse(&bytes));
            }
            if start.elapsed() >= self.deadline {
                return Err(DispatchError::BridgeTimeout {
                    agent_type: self.agent_type.clone(),
                    waited: start.elapsed(),
                });
            }
            std::thread::sleep(self.poll_interval.min(self.deadline.saturating_sub(start.elapsed())));
        }
    }

    fn name(&self) -> &str {
        "file_bridge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pad() -> (tempfile::TempDir, Scratchpad) {
        let dir = tempfile::tempdir().unwrap();
        let pad = Scratchpad::new(dir.path().join("scratchpad"));
        (dir, pad)
    }

    #[test]
    fn missing_output_at_deadline_yields_bridge_timeout() {
        let (_dir, pad) = pad();
        let transport = FileBridgeTransport::new("collector", &pad, Duration::from_millis(50))
            .with_poll_interval(Duration::from_millis(10));
        let request = BridgeRequest {
            agent_type: "collector".to_string(),
            input: json!({}),
            scratchpad_dir: "x".to_string(),
            project_dir: "y".to_string(),
            prior_stage_outputs: Default::default(),
        };
        let err = transport.dispatch(request).unwrap_err();
        assert!(matches!(err, DispatchError::BridgeTimeout { .. }));
    }

    #[test]
    fn response_written_before_deadline_is_picked_up() {
        let (_dir, pad) = pad();
        pad.write_bridge_input("collector", b"ignored").unwrap();
        // Simulate the external harness writing its output directly.
        let layout = pad.layout();
        std::fs::create_dir_all(layout.root().join("bridge/output")).unwrap();
        std::fs::write(
            layout.root().join("bridge/output/collector.json"),
            br#"{"output":"done","success":true}"#,
        )
        .unwrap();

        let transport = FileBridgeTransport::new("collector", &pad, Duration::from_millis(500))
            .with_poll_interval(Duration::from_millis(10));
        let request = BridgeRequest {
            agent_type: "collector".to_string(),
            input: json!({}),
            scratchpad_dir: "x".to_string(),
            project_dir: "y".to_string(),
            prior_stage_outputs: Default::default(),
        };
        let response = transport.dispatch(request).unwrap();
        assert!(response.success);
    }
}

//! Orchestrator (spec §4.8) — stage-granularity driver. Advances a project
//! through `workflow.yaml`'s stage list, one Dispatcher call per stage,
//! transitioning State Manager and persisting a stage-result record so a
//! restarted process resumes from the first non-completed stage.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::PipelineStage;
use crate::dispatcher::{BridgeRequest, DispatchError, Dispatcher};
use crate::error::ErrorKind;
use crate::registry::{AgentRegistry, RegistryError};
use crate::scratchpad::artifact::Section;
use crate::scratchpad::schema::SerialFormat;
use crate::scratchpad::{Scratchpad, ScratchpadError};
use crate::state_manager::{ProjectPhase, StateError, StateManager};

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("missing required input {0} for stage {1}")]
    MissingInput(String, String),
    #[error("no stage named {0}")]
    StageNotFound(String),
    #[error("stage {0} requires approval before it can run")]
    ApprovalRequired(String),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Scratchpad(#[from] ScratchpadError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::MissingInput(..) => ErrorKind::Validation,
            OrchestratorError::StageNotFound(_) => ErrorKind::NotFound,
            OrchestratorError::ApprovalRequired(_) => ErrorKind::Validation,
            OrchestratorError::Dispatch(e) => e.kind(),
            OrchestratorError::State(e) => e.kind(),
            OrchestratorError::Scratchpad(e) => e.kind(),
            OrchestratorError::Registry(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    AwaitingApproval,
    Completed,
    Failed,
}

/// Durable per-stage outcome (spec §4.8: "every stage-result is durable").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    pub stage: String,
    pub status: StageStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// Which logical Scratchpad section an output name lands in. The
/// orchestrator's own defaults (§10.3) only ever name four output kinds;
/// a custom `workflow.yaml` naming others would need this table extended.
fn section_for_output(name: &str) -> Section {
    match name {
        "collected_info" => Section::Info,
        "prd" | "srs" | "sds" => Section::Documents,
        "dependency_graph" => Section::Issues,
        _ => Section::Progress,
    }
}

/// Post-completion phase for each of the orchestrator's default stages
/// (spec §4.8 step 1: "pick the first stage whose `approvalRequired=false`
/// or that has been approved" — since none of the defaults require
/// approval, completing a stage auto-advances through its paired
/// `_approved` phase too).
fn post_phase_for_stage(name: &str) -> Option<ProjectPhase> {
    use ProjectPhase::*;
    match name {
        "collect" => Some(Collecting),
        "clarify" => Some(Clarifying),
        "draft_prd" => Some(PrdApproved),
        "draft_srs" => Some(SrsApproved),
        "draft_sds" => Some(SdsApproved),
        "generate_issues" => Some(IssuesCreated),
        _ => None,
    }
}

pub struct Orchestrator<'a> {
    project_id: String,
    scratchpad: &'a Scratchpad,
    dispatcher: &'a Dispatcher,
    registry: &'a AgentRegistry,
    state: StateManager<'a>,
    stages: Vec<PipelineStage>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        project_id: impl Into<String>,
        scratchpad: &'a Scratchpad,
        dispatcher: &'a Dispatcher,
        registry: &'a AgentRegistry,
        stages: Vec<PipelineStage>,
    ) -> Result<Self, OrchestratorError> {
        let project_id = project_id.into();
        let state = StateManager::load_or_init(scratchpad, &project_id)?;
        Ok(Self {
            project_id,
            scratchpad,
            dispatcher,
            registry,
            state,
            stages,
        })
    }

    pub fn phase(&self) -> ProjectPhase {
        self.state.get_phase()
    }

    fn stage_result_name(stage_name: &str) -> String {
        format!("stage_{stage_name}.json")
    }

    fn approval_marker_name(stage_name: &str) -> String {
        format!("approval_{stage_name}.json")
    }

    fn read_stage_result(&self, stage_name: &str) -> Result<Option<StageResult>, OrchestratorError> {
        Ok(self.scratchpad.read_typed(
            &self.project_id,
            Section::Progress,
            &Self::stage_result_name(stage_name),
            SerialFormat::Json,
        )?)
    }

    fn stage_already_completed(&self, stage_name: &str) -> Result<bool, OrchestratorError> {
        Ok(matches!(self.read_stage_result(stage_name)?, Some(r) if r.status == StageStatus::Completed))
    }

    /// Whether an operator has recorded approval for `stage_name` (spec
    /// §4.8 step 1: "has been approved"). Durable across restarts — a
    /// marker file, not in-memory state.
    fn is_approved(&self, stage_name: &str) -> Result<bool, OrchestratorError> {
        Ok(self.scratchpad.exists(&self.project_id, Section::Progress, &Self::approval_marker_name(stage_name)))
    }

    /// Record operator approval for `stage_name` so [`Self::next_stage`]
    /// and [`Self::run_stage`] will admit it despite `approvalRequired`
    /// (spec §4.8 step 1, driven by the CLI's `approve` subcommand).
    pub fn approve_stage(&self, stage_name: &str) -> Result<(), OrchestratorError> {
        if !self.stages.iter().any(|s| s.name == stage_name) {
            return Err(OrchestratorError::StageNotFound(stage_name.to_string()));
        }
        self.scratchpad.write_typed(
            &self.project_id,
            Section::Progress,
            &Self::approval_marker_name(stage_name),
            &serde_json::json!({"schemaVersion": "1.0.0", "approved": true}),
            SerialFormat::Json,
        )?;
        Ok(())
    }

    /// The first stage not yet recorded `completed` (resumability: spec
    /// §4.8 "the orchestrator can be restarted and will pick up from the
    /// first non-completed stage"), gated by spec §4.8 step 1: "pick the
    /// first stage whose `approvalRequired=false` or that has been
    /// approved". A stage requiring approval that hasn't been approved
    /// blocks the pipeline there — it is recorded `AwaitingApproval` and
    /// [`OrchestratorError::ApprovalRequired`] is returned rather than
    /// silently skipping ahead to a later stage.
    pub fn next_stage(&self) -> Result<Option<&PipelineStage>, OrchestratorError> {
        for stage in &self.stages {
            if self.stage_already_completed(&stage.name)? {
                continue;
            }
            if stage.approval_required && !self.is_approved(&stage.name)? {
                self.persist_stage_result(&stage.name, StageStatus::AwaitingApproval, None)?;
                return Err(OrchestratorError::ApprovalRequired(stage.name.clone()));
            }
            return Ok(Some(stage));
        }
        Ok(None)
    }

    fn collect_prior_outputs(&self, stage: &PipelineStage) -> Result<HashMap<String, Value>, OrchestratorError> {
        let mut outputs = HashMap::new();
        for input in &stage.inputs {
            let section = section_for_output(input);
            let bytes = self
                .scratchpad
                .read(&self.project_id, section, input)?
                .ok_or_else(|| OrchestratorError::MissingInput(input.clone(), stage.name.clone()))?;
            let value = serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
            outputs.insert(input.clone(), value);
        }
        Ok(outputs)
    }

    /// Run one stage end-to-end (spec §4.8 steps 2-5). Does not advance
    /// to the next stage; callers drive the loop via [`Self::next_stage`].
    pub fn run_stage(&mut self, stage: &PipelineStage) -> Result<StageResult, OrchestratorError> {
        if stage.approval_required && !self.is_approved(&stage.name)? {
            self.persist_stage_result(&stage.name, StageStatus::AwaitingApproval, None)?;
            return Err(OrchestratorError::ApprovalRequired(stage.name.clone()));
        }

        self.registry.validate_dependencies(&stage.agent_id)?;

        let prior_outputs = match self.collect_prior_outputs(stage) {
            Ok(outputs) => outputs,
            Err(e @ OrchestratorError::MissingInput(..)) => {
                self.persist_stage_result(&stage.name, StageStatus::Failed, Some(e.to_string()))?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let request = BridgeRequest {
            agent_type: stage.agent_id.clone(),
            input: Value::Object(
                prior_outputs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            scratchpad_dir: "scratchpad".to_string(),
            project_dir: ".".to_string(),
            prior_stage_outputs: prior_outputs,
        };

        let response = match self.dispatcher.dispatch(request) {
            Ok(r) if r.success => r,
            Ok(r) => {
                let cause = r.error.unwrap_or_else(|| "agent reported failure".to_string());
                self.persist_stage_result(&stage.name, StageStatus::Failed, Some(cause.clone()))?;
                return Err(OrchestratorError::Dispatch(DispatchError::AgentDispatchError {
                    stage: stage.name.clone(),
                    cause,
                }));
            }
            Err(e) => {
                self.persist_stage_result(&stage.name, StageStatus::Failed, Some(e.to_string()))?;
                return Err(OrchestratorError::Dispatch(e));
            }
        };

        for output in &stage.outputs {
            let section = section_for_output(output);
            let bytes = match &response.output {
                Value::String(s) => s.clone().into_bytes(),
                other => serde_json::to_vec_pretty(other).unwrap_or_default(),
            };
            self.scratchpad.write(&self.project_id, section, output, &bytes)?;
        }

        if let Some(next_phase) = post_phase_for_stage(&stage.name) {
            self.state.transition(next_phase)?;
        }

        self.persist_stage_result(&stage.name, StageStatus::Completed, None)
    }

    fn persist_stage_result(
        &self,
        stage_name: &str,
        status: StageStatus,
        error: Option<String>,
    ) -> Result<StageResult, OrchestratorError> {
        let result = StageResult {
            schema_version: "1.0.0".to_string(),
            stage: stage_name.to_string(),
            status,
            error,
        };
        self.scratchpad.write_typed(
            &self.project_id,
            Section::Progress,
            &Self::stage_result_name(stage_name),
            &result,
            SerialFormat::Json,
        )?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::dispatcher::{BridgeResponse, InProcessTransport};
    use crate::project::ProjectMode;
    use crate::registry::{AgentMetadata, Lifecycle};
    use serde_json::json;

    fn setup() -> (tempfile::TempDir, Scratchpad, Dispatcher, AgentRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let pad = Scratchpad::new(dir.path());
        let mut dispatcher = Dispatcher::new();
        dispatcher.register_transport(Box::new(InProcessTransport::new("collector", |_req| {
            Ok(BridgeResponse::success(json!("hello world")))
        })));
        let mut registry = AgentRegistry::new();
        registry.register(AgentMetadata::new("collector", "Collector", Lifecycle::Singleton)).unwrap();
        (dir, pad, dispatcher, registry)
    }

    #[test]
    fn successful_stage_writes_output_and_transitions_state() {
        let (_dir, pad, dispatcher, registry) = setup();
        let stages = WorkflowConfig::defaults().stages_for(ProjectMode::Greenfield).to_vec();
        let mut orchestrator = Orchestrator::new("proj1", &pad, &dispatcher, &registry, stages).unwrap();

        let stage = orchestrator.next_stage().unwrap().unwrap().clone();
        assert_eq!(stage.name, "collect");
        let result = orchestrator.run_stage(&stage).unwrap();
        assert_eq!(result.status, StageStatus::Completed);
        assert_eq!(orchestrator.phase(), ProjectPhase::Collecting);
        assert!(pad.exists("proj1", Section::Info, "collected_info"));
    }

    #[test]
    fn missing_input_is_reported_without_transitioning() {
        let (_dir, pad, dispatcher, registry) = setup();
        let stages = WorkflowConfig::defaults().stages_for(ProjectMode::Greenfield).to_vec();
        let mut orchestrator = Orchestrator::new("proj1", &pad, &dispatcher, &registry, stages).unwrap();

        let clarify_stage = orchestrator.stages[1].clone();
        let err = orchestrator.run_stage(&clarify_stage).unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingInput(..)));
        assert_eq!(orchestrator.phase(), ProjectPhase::Collecting);
    }

    #[test]
    fn resumability_skips_completed_stages() {
        let (_dir, pad, dispatcher, registry) = setup();
        let stages = WorkflowConfig::defaults().stages_for(ProjectMode::Greenfield).to_vec();
        let mut orchestrator = Orchestrator::new("proj1", &pad, &dispatcher, &registry, stages.clone()).unwrap();
        let stage = orchestrator.next_stage().unwrap().unwrap().clone();
        orchestrator.run_stage(&stage).unwrap();

        let resumed = Orchestrator::new("proj1", &pad, &dispatcher, &registry, stages).unwrap();
        let next = resumed.next_stage().unwrap().unwrap();
        assert_eq!(next.name, "clarify");
    }

    fn gated_stage() -> PipelineStage {
        PipelineStage {
            name: "collect".to_string(),
            agent_id: "collector".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            next: None,
            approval_required: true,
            parallel: false,
            max_parallel: None,
            depends_on: Vec::new(),
        }
    }

    #[test]
    fn stage_requiring_approval_blocks_next_stage_until_approved() {
        let (_dir, pad, dispatcher, registry) = setup();
        let stages = vec![gated_stage()];
        let orchestrator = Orchestrator::new("proj1", &pad, &dispatcher, &registry, stages).unwrap();

        let err = orchestrator.next_stage().unwrap_err();
        assert!(matches!(err, OrchestratorError::ApprovalRequired(ref s) if s == "collect"));

        orchestrator.approve_stage("collect").unwrap();
        let next = orchestrator.next_stage().unwrap().unwrap();
        assert_eq!(next.name, "collect");
    }

    #[test]
    fn run_stage_refuses_an_unapproved_gated_stage() {
        let (_dir, pad, dispatcher, registry) = setup();
        let stages = vec![gated_stage()];
        let mut orchestrator = Orchestrator::new("proj1", &pad, &dispatcher, &registry, stages).unwrap();

        let stage = orchestrator.stages[0].clone();
        let err = orchestrator.run_stage(&stage).unwrap_err();
        assert!(matches!(err, OrchestratorError::ApprovalRequired(ref s) if s == "collect"));

        orchestrator.approve_stage("collect").unwrap();
        let result = orchestrator.run_stage(&stage).unwrap();
        assert_eq!(result.status, StageStatus::Completed);
    }

    #[test]
    fn approving_an_unknown_stage_is_rejected() {
        let (_dir, pad, dispatcher, registry) = setup();
        let stages = vec![gated_stage()];
        let orchestrator = Orchestrator::new("proj1", &pad, &dispatcher, &registry, stages).unwrap();

        let err = orchestrator.approve_stage("no-such-stage").unwrap_err();
        assert!(matches!(err, OrchestratorError::StageNotFound(_)));
    }
}

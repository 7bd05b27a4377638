//! Configuration (spec §6, §10.3): built-in defaults, overridden by
//! `<AD_SDLC_HOME>/config/{workflow,agents}.yaml`, overridden by
//! environment variables — the same three-tier precedence and
//! `env::var(..).ok().and_then(|v| v.parse().ok()).unwrap_or(default)`
//! pattern used throughout `slurm/mod.rs` and `swarm-agents/config.rs`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::project::ProjectMode;
use crate::registry::{AgentMetadata, Dependency, Lifecycle};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid yaml in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Io { .. } => ErrorKind::IoError,
            ConfigError::Yaml { .. } => ErrorKind::Validation,
        }
    }
}

/// One entry of `workflow.yaml`'s stage list (spec §3, §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStage {
    pub name: String,
    pub agent_id: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub max_parallel: Option<u32>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl PipelineStage {
    fn new(name: &str, agent_id: &str, inputs: &[&str], outputs: &[&str], next: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            agent_id: agent_id.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            next: next.map(str::to_string),
            approval_required: false,
            parallel: false,
            max_parallel: None,
            depends_on: Vec::new(),
        }
    }
}

/// `workflow.yaml`: the `PipelineStage` list per mode (spec §10.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub greenfield: Vec<PipelineStage>,
    pub enhancement: Vec<PipelineStage>,
}

impl WorkflowConfig {
    pub fn stages_for(&self, mode: ProjectMode) -> &[PipelineStage] {
        match mode {
            ProjectMode::Greenfield => &self.greenfield,
            ProjectMode::Enhancement => &self.enhancement,
        }
    }

    /// Built-in default stage list walking the phase progression of spec
    /// §3, one stage per drafting/approval/creation phase.
    pub fn defaults() -> Self {
        let greenfield = vec![
            PipelineStage::new("collect", "collector", &[], &["collected_info"], Some("clarify")),
            PipelineStage::new("clarify", "collector", &["collected_info"], &["collected_info"], Some("draft_prd")),
            PipelineStage::new("draft_prd", "requirement_writer", &["collected_info"], &["prd"], Some("draft_srs")),
            PipelineStage::new("draft_srs", "requirement_writer", &["prd"], &["srs"], Some("draft_sds")),
            PipelineStage::new("draft_sds", "design_writer", &["srs"], &["sds"], Some("generate_issues")),
            PipelineStage::new("generate_issues", "issue_generator", &["sds"], &["dependency_graph"], None),
        ];
        let enhancement = vec![
            PipelineStage::new("collect", "collector", &[], &["collected_info"], Some("draft_srs")),
            PipelineStage::new("draft_srs", "requirement_writer", &["collected_info"], &["srs"], Some("draft_sds")),
            PipelineStage::new("draft_sds", "design_writer", &["srs"], &["sds"], Some("generate_issues")),
            PipelineStage::new("generate_issues", "issue_generator", &["sds"], &["dependency_graph"], None),
        ];
        Self { greenfield, enhancement }
    }
}

/// `agents.yaml`: `Agent` metadata — dependencies, lifecycle (spec §10.3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentsConfig {
    pub agents: Vec<AgentConfigEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfigEntry {
    pub agent_id: String,
    pub name: String,
    #[serde(default)]
    pub lifecycle: AgentLifecycleConfig,
    #[serde(default)]
    pub dependencies: Vec<AgentDependencyConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentLifecycleConfig {
    Singleton,
    Transient,
}

impl Default for AgentLifecycleConfig {
    fn default() -> Self {
        AgentLifecycleConfig::Transient
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDependencyConfig {
    pub agent_id: String,
    #[serde(default)]
    pub optional: bool,
}

impl From<&AgentConfigEntry> for AgentMetadata {
    fn from(entry: &AgentConfigEntry) -> Self {
        let lifecycle = match entry.lifecycle {
            AgentLifecycleConfig::Singleton => Lifecycle::Singleton,
            AgentLifecycleConfig::Transient => Lifecycle::Transient,
        };
        let dependencies = entry
            .dependencies
            .iter()
            .map(|d| Dependency {
                agent_id: d.agent_id.clone(),
                optional: d.optional,
            })
            .collect();
        AgentMetadata::new(entry.agent_id.clone(), entry.name.clone(), lifecycle).with_dependencies(dependencies)
    }
}

impl AgentsConfig {
    /// The seven agent bodies named in spec §1/§11: collector, requirement
    /// writer, design writer, issue generator, implementation worker,
    /// reviewer, CI-fixer.
    pub fn defaults() -> Self {
        let entries = [
            ("collector", "Collector", vec![]),
            ("requirement_writer", "Requirement Writer", vec!["collector"]),
            ("design_writer", "Design Writer", vec!["requirement_writer"]),
            ("issue_generator", "Issue Generator", vec!["design_writer"]),
            ("implementation_worker", "Implementation Worker", vec!["issue_generator"]),
            ("reviewer", "Reviewer", vec!["implementation_worker"]),
            ("ci_fixer", "CI Fixer", vec!["reviewer"]),
        ];
        let agents = entries
            .into_iter()
            .map(|(agent_id, name, deps)| AgentConfigEntry {
                agent_id: agent_id.to_string(),
                name: name.to_string(),
                lifecycle: AgentLifecycleConfig::Singleton,
                dependencies: deps
                    .into_iter()
                    .map(|d: &str| AgentDependencyConfig { agent_id: d.to_string(), optional: false })
                    .collect(),
            })
            .collect();
        Self { agents }
    }
}

/// Recognized environment variables (spec §6).
const ENV_HOME: &str = "AD_SDLC_HOME";
const ENV_MAX_WORKERS: &str = "AD_SDLC_MAX_WORKERS";
const ENV_LOG_LEVEL: &str = "AD_SDLC_LOG_LEVEL";

#[derive(Debug, Clone)]
pub struct Config {
    pub ad_sdlc_home: PathBuf,
    pub max_workers: usize,
    pub log_level: String,
    pub workflow: WorkflowConfig,
    pub agents: AgentsConfig,
    /// `*_TOKEN` secrets captured from the environment at load time, for
    /// the Security Gate's `SecretManager` to ingest (spec §4.1, §6).
    pub secrets: HashMap<String, String>,
}

impl Config {
    /// Load defaults, then `<home>/config/{workflow,agents}.yaml` if
    /// present, then environment variable overrides (spec §10.3).
    pub fn load() -> Result<Self, ConfigError> {
        let home = std::env::var(ENV_HOME)
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./.ad-sdlc"));

        let workflow = load_yaml_or(&home.join("config/workflow.yaml"), WorkflowConfig::defaults)?;
        let agents = load_yaml_or(&home.join("config/agents.yaml"), AgentsConfig::defaults)?;

        let max_workers = std::env::var(ENV_MAX_WORKERS)
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(5);
        let log_level = std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| "INFO".to_string());

        let secrets = std::env::vars().filter(|(k, _)| k.ends_with("_TOKEN")).collect();

        Ok(Self {
            ad_sdlc_home: home,
            max_workers,
            log_level,
            workflow,
            agents,
            secrets,
        })
    }
}

fn load_yaml_or<T: for<'de> Deserialize<'de>>(path: &Path, default: impl FnOnce() -> T) -> Result<T, ConfigError> {
    if !path.exists() {
        return Ok(default());
    }
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    serde_yaml::from_slice(&bytes).map_err(|source| ConfigError::Yaml { path: path.to_path_buf(), source })
}

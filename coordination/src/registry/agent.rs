//! Agent metadata and the instance contract (spec §4.4).

use serde::{Deserialize, Serialize};

/// How the Factory caches instances of an agent (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// One instance is constructed and reused for the process lifetime.
    Singleton,
    /// A fresh instance is constructed for every request.
    Transient,
}

/// A dependency edge: `agentId` depends on `depends_on`, optionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub agent_id: String,
    pub optional: bool,
}

impl Dependency {
    pub fn required(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            optional: false,
        }
    }

    pub fn optional(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            optional: true,
        }
    }
}

/// Static metadata the Registry holds for a registered agent (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub agent_id: String,
    pub name: String,
    pub lifecycle: Lifecycle,
    pub dependencies: Vec<Dependency>,
}

impl AgentMetadata {
    pub fn new(agent_id: impl Into<String>, name: impl Into<String>, lifecycle: Lifecycle) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            lifecycle,
            dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn required_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().filter(|d| !d.optional)
    }
}

/// Contract every constructed agent instance must satisfy (spec §4.4:
/// "Instances must expose at minimum `agentId`, `name`, `initialize()`,
/// `dispose()`").
pub trait AgentInstance: Send + Sync {
    fn agent_id(&self) -> &str;
    fn name(&self) -> &str;
    fn initialize(&mut self) -> Result<(), String>;
    fn dispose(&mut self) -> Result<(), String>;
}

//! Instance lifecycle for registered agents (spec §4.4).

use std::collections::HashMap;

use super::agent::{AgentInstance, Lifecycle};
use super::{AgentRegistry, RegistryError};

/// A constructor produces a fresh, un-initialized instance for an agent id.
pub type AgentConstructor = Box<dyn Fn() -> Box<dyn AgentInstance> + Send + Sync>;

/// Owns instance lifecycle for every agent known to an [`AgentRegistry`].
///
/// For a requested id: compute the dependency chain, then for each id in
/// order — reuse the singleton if one exists, otherwise construct,
/// `initialize()`, and record it. [`Self::dispose_all`] runs in reverse
/// construction order, mirroring the stack-discipline shutdown in
/// `harness::session` (last started, first torn down).
pub struct AgentFactory {
    constructors: HashMap<String, AgentConstructor>,
    singletons: HashMap<String, Box<dyn AgentInstance>>,
    construction_order: Vec<String>,
}

impl AgentFactory {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
            singletons: HashMap::new(),
            construction_order: Vec::new(),
        }
    }

    pub fn register_constructor(&mut self, agent_id: impl Into<String>, constructor: AgentConstructor) {
        self.constructors.insert(agent_id.into(), constructor);
    }

    /// Resolve `id`'s full dependency chain in `registry` and ensure every
    /// agent in it is constructed and initialized, in dependency order.
    pub fn resolve(
        &mut self,
        registry: &AgentRegistry,
        id: &str,
    ) -> Result<(), RegistryError> {
        let chain = registry.get_dependency_chain(id)?;
        for agent_id in chain {
            self.ensure_constructed(registry, &agent_id)?;
        }
        Ok(())
    }

    fn ensure_constructed(&mut self, registry: &AgentRegistry, agent_id: &str) -> Result<(), RegistryError> {
        let meta = registry.get(agent_id)?;
        if meta.lifecycle == Lifecycle::Singleton && self.singletons.contains_key(agent_id) {
            return Ok(());
        }
        let constructor = self
            .constructors
            .get(agent_id)
            .ok_or_else(|| RegistryError::ConstructionFailed {
                agent_id: agent_id.to_string(),
                reason: "no constructor registered".to_string(),
            })?;
        let mut instance = constructor();
        instance.initialize().map_err(|reason| RegistryError::ConstructionFailed {
            agent_id: agent_id.to_string(),
            reason,
        })?;
        if meta.lifecycle == Lifecycle::Singleton {
            self.singletons.insert(agent_id.to_string(), instance);
            self.construction_order.push(agent_id.to_string());
        }
        // Transient instances are initialized to prove the contract works,
        // then dropped immediately: the Factory only caches singletons.
        Ok(())
    }

    pub fn singleton(&self, agent_id: &str) -> Option<&dyn AgentInstance> {
        self.singletons.get(agent_id).map(|b| b.as_ref())
    }

    /// Dispose every cached singleton in reverse construction order.
    pub fn dispose_all(&mut self) -> Vec<(String, Result<(), String>)> {
        let mut results = Vec::new();
        while let Some(agent_id) = self.construction_order.pop() {
            if let Some(mut instance) = self.singletons.remove(&agent_id) {
                let result = instance.dispose();
                results.push((agent_id, result));
            }
        }
        results
    }
}

impl Default for AgentFactory {
    fn default() -> Self {
        Self::new()
    }
}

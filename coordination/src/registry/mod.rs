//! Agent Registry & Factory (spec §4.4).
//!
//! The Registry holds static [`AgentMetadata`] keyed by `agentId` and
//! answers dependency-chain queries via the white/gray/black depth-first
//! traversal used for feature dependency cycles in
//! `harness::feature_registry::detect_cycles`, generalized here to raise
//! on the first cycle found rather than collecting every node involved.
//! The Factory (in [`factory`]) turns a dependency chain into constructed,
//! initialized instances.

pub mod agent;
pub mod factory;

use std::collections::HashMap;

pub use agent::{AgentInstance, AgentMetadata, Dependency, Lifecycle};
pub use factory::{AgentConstructor, AgentFactory};

use crate::error::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("agent already registered: {0}")]
    AlreadyRegistered(String),
    #[error("agent not registered: {0}")]
    NotRegistered(String),
    #[error("circular dependency involving {0}")]
    CircularDependency(String),
    #[error("construction failed for {agent_id}: {reason}")]
    ConstructionFailed { agent_id: String, reason: String },
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::AlreadyRegistered(_) => ErrorKind::AlreadyExists,
            RegistryError::NotRegistered(_) => ErrorKind::NotFound,
            RegistryError::CircularDependency(_) => ErrorKind::CircularDependency,
            RegistryError::ConstructionFailed { .. } => ErrorKind::AgentDispatchError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Gray,
    Black,
}

/// Holds agent metadata keyed by `agentId` (spec §4.4).
#[derive(Default)]
pub struct AgentRegistry {
    entries: HashMap<String, AgentMetadata>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Idempotent by id; re-registration fails.
    pub fn register(&mut self, meta: AgentMetadata) -> Result<(), RegistryError> {
        if self.entries.contains_key(&meta.agent_id) {
            return Err(RegistryError::AlreadyRegistered(meta.agent_id.clone()));
        }
        self.entries.insert(meta.agent_id.clone(), meta);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&AgentMetadata, RegistryError> {
        self.entries.get(id).ok_or_else(|| RegistryError::NotRegistered(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Returns the ids of mandatory dependencies that are not registered.
    pub fn validate_dependencies(&self, id: &str) -> Result<Vec<String>, RegistryError> {
        let meta = self.get(id)?;
        Ok(meta
            .required_dependencies()
            .filter(|d| !self.entries.contains_key(&d.agent_id))
            .map(|d| d.agent_id.clone())
            .collect())
    }

    /// Ids in an order safe for initialization: dependencies before
    /// dependents. Depth-first, marking nodes white (absent)/gray
    /// (in-progress)/black (finished); a gray node reached again is a
    /// cycle (spec §4.4).
    pub fn get_dependency_chain(&self, id: &str) -> Result<Vec<String>, RegistryError> {
        self.get(id)?;
        let mut marks: HashMap<String, Mark> = HashMap::new();
        let mut order = Vec::new();
        self.visit(id, &mut marks, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        id: &str,
        marks: &mut HashMap<String, Mark>,
        order: &mut Vec<String>,
    ) -> Result<(), RegistryError> {
        match marks.get(id) {
            Some(Mark::Black) => return Ok(()),
            Some(Mark::Gray) => return Err(RegistryError::CircularDependency(id.to_string())),
            None => {}
        }
        marks.insert(id.to_string(), Mark::Gray);
        if let Ok(meta) = self.get(id) {
            for dep in &meta.dependencies {
                if self.entries.contains_key(&dep.agent_id) {
                    self.visit(&dep.agent_id, marks, order)?;
                } else if !dep.optional {
                    return Err(RegistryError::NotRegistered(dep.agent_id.clone()));
                }
            }
        }
        marks.insert(id.to_string(), Mark::Black);
        order.push(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, deps: &[&str]) -> AgentMetadata {
        AgentMetadata::new(id, id, Lifecycle::Singleton)
            .with_dependencies(deps.iter().map(|d| Dependency::required(*d)).collect())
    }

    #[test]
    fn register_is_idempotent_by_id() {
        let mut reg = AgentRegistry::new();
        reg.register(meta("a", &[])).unwrap();
        let err = reg.register(meta("a", &[])).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(_)));
    }

    #[test]
    fn get_missing_is_not_registered() {
        let reg = AgentRegistry::new();
        assert!(matches!(reg.get("missing"), Err(RegistryError::NotRegistered(_))));
    }

    #[test]
    fn validate_dependencies_reports_missing() {
        let mut reg = AgentRegistry::new();
        reg.register(meta("a", &["b"])).unwrap();
        let missing = reg.validate_dependencies("a").unwrap();
        assert_eq!(missing, vec!["b".to_string()]);
    }

    #[test]
    fn dependency_chain_orders_dependencies_first() {
        let mut reg = AgentRegistry::new();
        reg.register(meta("a", &["b"])).unwrap();
        reg.register(meta("b", &["c"])).unwrap();
        reg.register(meta("c", &[])).unwrap();
        let chain = reg.get_dependency_chain("a").unwrap();
        assert_eq!(chain, vec!["c".to_string(), "b".to_string(), "a".to_string()]);
    }

    #[test]
    fn cycle_is_detected() {
        let mut reg = AgentRegistry::new();
        reg.register(meta("a", &["b"])).unwrap();
        reg.register(meta("b", &["a"])).unwrap();
        let err = reg.get_dependency_chain("a").unwrap_err();
        assert!(matches!(err, RegistryError::CircularDependency(_)));
    }

    #[test]
    fn optional_missing_dependency_is_not_an_error() {
        let mut reg = AgentRegistry::new();
        reg.register(
            AgentMetadata::new("a", "a", Lifecycle::Singleton)
                .with_dependencies(vec![Dependency::optional("ghost")]),
        )
        .unwrap();
        let chain = reg.get_dependency_chain("a").unwrap();
        assert_eq!(chain, vec!["a".to_string()]);
    }
}

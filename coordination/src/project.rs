//! `Project` (spec §3): the opaque-id root that owns every other entity.

use serde::{Deserialize, Serialize};

/// Opaque project identifier. Newtype so a raw `String` can never be
/// passed where a `ProjectId` is expected, matching the `AgentId`/`ModelId`
/// newtype style used throughout `coordination`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProjectId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Pipeline mode, selecting which `PipelineStage` list `workflow.yaml`
/// applies (spec §6, §10.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectMode {
    Greenfield,
    Enhancement,
}

/// `Project`: identified by `projectId`, created by `init`, terminated by
/// reaching `merged` or `cancelled` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub mode: ProjectMode,
    #[serde(default)]
    pub request: String,
}

impl Project {
    pub fn new(id: impl Into<ProjectId>, mode: ProjectMode, request: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mode,
            request: request.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_round_trips_through_display() {
        let id = ProjectId::new("proj-42");
        assert_eq!(format!("{id}"), "proj-42");
    }

    #[test]
    fn project_id_from_str_and_string() {
        let a: ProjectId = "p1".into();
        let b: ProjectId = "p1".to_string().into();
        assert_eq!(a, b);
    }
}

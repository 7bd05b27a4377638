//! Artifact addressing: `(projectId, section, logicalName)` and the
//! on-disk layout from spec §6.

use std::path::PathBuf;

/// Section an artifact belongs to (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Info,
    Documents,
    Issues,
    Progress,
}

impl Section {
    pub fn dir_name(self) -> &'static str {
        match self {
            Section::Info => "info",
            Section::Documents => "documents",
            Section::Issues => "issues",
            Section::Progress => "progress",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// Root of the on-disk layout, `<AD_SDLC_HOME>/scratchpad` by convention.
#[derive(Debug, Clone)]
pub struct ScratchpadLayout {
    root: PathBuf,
}

impl ScratchpadLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Path to `scratchpad/<section>/<projectId>/<logicalName>`.
    pub fn artifact_path(&self, project_id: &str, section: Section, logical_name: &str) -> PathBuf {
        self.root
            .join(section.dir_name())
            .join(project_id)
            .join(logical_name)
    }

    /// Directory that holds all artifacts of `section` for `projectId`.
    pub fn section_dir(&self, project_id: &str, section: Section) -> PathBuf {
        self.root.join(section.dir_name()).join(project_id)
    }

    /// Path to `scratchpad/bridge/{input,output}/<agentType>.json`.
    pub fn bridge_path(&self, direction: BridgeDirection, agent_type: &str) -> PathBuf {
        self.root
            .join("bridge")
            .join(direction.dir_name())
            .join(format!("{agent_type}.json"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeDirection {
    Input,
    Output,
}

impl BridgeDirection {
    fn dir_name(self) -> &'static str {
        match self {
            BridgeDirection::Input => "input",
            BridgeDirection::Output => "output",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_matches_layout() {
        let layout = ScratchpadLayout::new("/home/.ad-sdlc/scratchpad");
        let path = layout.artifact_path("proj1", Section::Documents, "prd.md");
        assert_eq!(
            path,
            PathBuf::from("/home/.ad-sdlc/scratchpad/documents/proj1/prd.md")
        );
    }

    #[test]
    fn bridge_path_matches_layout() {
        let layout = ScratchpadLayout::new("/home/.ad-sdlc/scratchpad");
        let path = layout.bridge_path(BridgeDirection::Output, "collector");
        assert_eq!(
            path,
            PathBuf::from("/home/.ad-sdlc/scratchpad/bridge/output/collector.json")
        );
    }
}

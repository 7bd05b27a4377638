//! `ControllerState` — durable progress for one project's issue DAG
//! (spec §4.7), persisted through the Scratchpad under
//! `progress/<projectId>/controller.json`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerState {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    pub pending: HashSet<String>,
    pub ready: Vec<String>,
    pub in_progress: HashSet<String>,
    pub completed: Vec<String>,
    pub failed: HashSet<String>,
    pub blocked: HashSet<String>,
    pub attempts: std::collections::HashMap<String, u32>,
}

impl ControllerState {
    pub fn new(all_issue_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            pending: all_issue_ids.into_iter().collect(),
            ready: Vec::new(),
            in_progress: HashSet::new(),
            completed: Vec::new(),
            failed: HashSet::new(),
            blocked: HashSet::new(),
            attempts: std::collections::HashMap::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.pending.is_empty() && self.ready.is_empty() && self.in_progress.is_empty()
    }

    pub fn is_deadlocked(&self) -> bool {
        self.ready.is_empty() && self.in_progress.is_empty() && !self.pending.is_empty()
    }
}

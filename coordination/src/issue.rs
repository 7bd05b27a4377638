//! Shared data model for issues and work orders (spec §3).

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Issue priority tier (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

/// Effort sizing used for quick-win scoring and critical-path weighting
/// (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effort {
    Xs,
    S,
    M,
    L,
    Xl,
}

impl Effort {
    /// Relative weight used when the critical path relaxes edges (larger
    /// effort contributes more to path length).
    pub fn weight(self) -> u32 {
        match self {
            Effort::Xs => 1,
            Effort::S => 2,
            Effort::M => 3,
            Effort::L => 5,
            Effort::Xl => 8,
        }
    }

    pub fn is_quick_win(self) -> bool {
        matches!(self, Effort::Xs | Effort::S)
    }
}

/// Lifecycle state of an issue as it moves through the Controller (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Pending,
    Ready,
    InProgress,
    Completed,
    Blocked,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub priority: Priority,
    pub effort: Effort,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub state: IssueState,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A unit of work handed to an implementation worker by the Controller
/// (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOrder {
    pub issue_id: String,
    pub attempt: u32,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationResult {
    pub issue_id: String,
    pub success: bool,
    #[serde(default)]
    pub pr_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// The classified cause of a failure (spec §4.7, §7), carried from the
    /// dispatch that produced it so the Controller's retry classifier acts
    /// on the real kind instead of assuming one.
    #[serde(default)]
    pub kind: Option<ErrorKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrReviewVerdict {
    Approved,
    RequestChanges,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrReviewResult {
    pub issue_id: String,
    pub verdict: PrReviewVerdict,
    #[serde(default)]
    pub comments: Vec<String>,
}

/// Worker slot state tracked by the Controller's fixed-size pool (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Working,
    Error,
}

#[derive(Debug, Clone)]
pub struct Worker {
    pub id: u32,
    pub state: WorkerState,
    pub current_issue: Option<String>,
}

impl Worker {
    pub fn idle(id: u32) -> Self {
        Self {
            id,
            state: WorkerState::Idle,
            current_issue: None,
        }
    }
}

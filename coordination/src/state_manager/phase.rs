//! `ProjectState` — the typed phase enum and its transition table (spec
//! §3), following the explicit-states-and-guards style of
//! `OrchestratorState` in `crates/swarm-agents/src/state_machine.rs`.

use serde::{Deserialize, Serialize};

/// The project lifecycle phase (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPhase {
    Collecting,
    Clarifying,
    PrdDrafting,
    PrdApproved,
    SrsDrafting,
    SrsApproved,
    SdsDrafting,
    SdsApproved,
    IssuesCreating,
    IssuesCreated,
    Implementing,
    PrReview,
    Merged,
    Cancelled,
}

impl ProjectPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProjectPhase::Merged | ProjectPhase::Cancelled)
    }

    /// Legal successor phases. Forward progression is the default path;
    /// `pr_review -> implementing` is the one explicitly-labelled retry
    /// transition (spec §3 invariant 5, §13 Open Question 2: automatic).
    /// `cancelled` is reachable from every non-terminal phase via explicit
    /// operator action, not modeled here as an automatic transition.
    pub fn legal_successors(self) -> &'static [ProjectPhase] {
        use ProjectPhase::*;
        match self {
            Collecting => &[Clarifying],
            Clarifying => &[PrdDrafting],
            PrdDrafting => &[PrdApproved],
            PrdApproved => &[SrsDrafting],
            SrsDrafting => &[SrsApproved],
            SrsApproved => &[SdsDrafting],
            SdsDrafting => &[SdsApproved],
            SdsApproved => &[IssuesCreating],
            IssuesCreating => &[IssuesCreated],
            IssuesCreated => &[Implementing],
            Implementing => &[PrReview],
            PrReview => &[Merged, Implementing],
            Merged => &[],
            Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, to: ProjectPhase) -> bool {
        self.legal_successors().contains(&to)
    }
}

impl std::fmt::Display for ProjectPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProjectPhase::Collecting => "collecting",
            ProjectPhase::Clarifying => "clarifying",
            ProjectPhase::PrdDrafting => "prd_drafting",
            ProjectPhase::PrdApproved => "prd_approved",
            ProjectPhase::SrsDrafting => "srs_drafting",
            ProjectPhase::SrsApproved => "srs_approved",
            ProjectPhase::SdsDrafting => "sds_drafting",
            ProjectPhase::SdsApproved => "sds_approved",
            ProjectPhase::IssuesCreating => "issues_creating",
            ProjectPhase::IssuesCreated => "issues_created",
            ProjectPhase::Implementing => "implementing",
            ProjectPhase::PrReview => "pr_review",
            ProjectPhase::Merged => "merged",
            ProjectPhase::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProjectPhase::*;

    #[test]
    fn forward_progression_is_legal() {
        assert!(Collecting.can_transition_to(Clarifying));
        assert!(IssuesCreated.can_transition_to(Implementing));
    }

    #[test]
    fn skipping_a_phase_is_illegal() {
        assert!(!Collecting.can_transition_to(PrdDrafting));
    }

    #[test]
    fn pr_review_rework_loop_is_legal() {
        assert!(PrReview.can_transition_to(Implementing));
        assert!(PrReview.can_transition_to(Merged));
    }

    #[test]
    fn terminal_phases_have_no_successors() {
        assert!(Merged.legal_successors().is_empty());
        assert!(Cancelled.legal_successors().is_empty());
        assert!(Merged.is_terminal());
        assert!(Cancelled.is_terminal());
    }
}

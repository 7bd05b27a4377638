//! State Manager (spec §4.3) — a durable, per-project store combining the
//! typed phase enum, arbitrary key/value data with optimistic
//! compare-and-set, and a subscription API for reactive downstream
//! components.

pub mod phase;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use phase::ProjectPhase;

use crate::error::ErrorKind;
use crate::scratchpad::artifact::Section;
use crate::scratchpad::schema::SerialFormat;
use crate::scratchpad::{Scratchpad, ScratchpadError};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: ProjectPhase, to: ProjectPhase },
    #[error("version conflict: expected {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("state file corrupted: {0}")]
    StateCorrupted(String),
    #[error(transparent)]
    Scratchpad(#[from] ScratchpadError),
}

impl StateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StateError::InvalidTransition { .. } => ErrorKind::InvalidState,
            StateError::VersionConflict { .. } => ErrorKind::Validation,
            StateError::KeyNotFound(_) => ErrorKind::NotFound,
            StateError::StateCorrupted(_) => ErrorKind::Internal,
            StateError::Scratchpad(e) => e.kind(),
        }
    }
}

/// An append-only transition record (SPEC_FULL.md §12.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: ProjectPhase,
    pub to: ProjectPhase,
    pub at_unix_secs: u64,
}

/// Durable, on-disk representation of a project's state, written through
/// the Scratchpad under `progress/<projectId>/state.json` (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    pub phase: ProjectPhase,
    pub version: u64,
    pub data: HashMap<String, Value>,
    pub transitions: Vec<TransitionRecord>,
}

impl PersistedState {
    fn new(initial: ProjectPhase) -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            phase: initial,
            version: 0,
            data: HashMap::new(),
            transitions: Vec::new(),
        }
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

type Predicate = Box<dyn Fn(&PersistedState) -> bool + Send + Sync>;
type Callback = Box<dyn Fn(&PersistedState) + Send + Sync>;

struct Subscriber {
    id: u64,
    predicate: Predicate,
    callback: Callback,
}

/// Opaque handle returned by [`StateManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(u64);

/// Durable per-project state store (spec §4.3).
pub struct StateManager<'a> {
    project_id: String,
    scratchpad: &'a Scratchpad,
    inner: Mutex<PersistedState>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscriber_id: Mutex<u64>,
}

const STATE_ARTIFACT: &str = "state.json";

impl<'a> StateManager<'a> {
    /// Load existing state for `project_id` from the Scratchpad, or create
    /// a fresh one at [`ProjectPhase::Collecting`].
    pub fn load_or_init(scratchpad: &'a Scratchpad, project_id: &str) -> Result<Self, StateError> {
        let existing: Option<PersistedState> = scratchpad
            .read_typed(project_id, Section::Progress, STATE_ARTIFACT, SerialFormat::Json)
            .map_err(|e| match e {
                ScratchpadError::SchemaValidationError(se) => {
                    StateError::StateCorrupted(se.to_string())
                }
                other => StateError::Scratchpad(other),
            })?;
        let state = existing.unwrap_or_else(|| PersistedState::new(ProjectPhase::Collecting));
        Ok(Self {
            project_id: project_id.to_string(),
            scratchpad,
            inner: Mutex::new(state),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: Mutex::new(0),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn get_phase(&self) -> ProjectPhase {
        self.inner.lock().expect("state lock poisoned").phase
    }

    fn persist(&self, state: &PersistedState) -> Result<(), StateError> {
        self.scratchpad
            .write_typed(&self.project_id, Section::Progress, STATE_ARTIFACT, state, SerialFormat::Json)
            .map_err(StateError::from)
    }

    /// Attempt a transition; refuses anything not in the transition table
    /// (spec §4.3: "never silently succeeds"). Persists before notifying
    /// subscribers, which run synchronously on this thread after
    /// persistence succeeds (spec §4.3).
    pub fn transition(&self, to: ProjectPhase) -> Result<ProjectPhase, StateError> {
        let mut state = self.inner.lock().expect("state lock poisoned");
        let from = state.phase;
        if from == to {
            // Idempotent: transitioning to the current phase is a no-op (spec §8 property 10).
            return Ok(from);
        }
        if !from.can_transition_to(to) {
            return Err(StateError::InvalidTransition { from, to });
        }
        state.phase = to;
        state.version += 1;
        state.transitions.push(TransitionRecord {
            from,
            to,
            at_unix_secs: unix_now(),
        });
        self.persist(&state)?;
        let snapshot = state.clone();
        drop(state);

        for subscriber in self.subscribers.lock().expect("subscriber lock poisoned").iter() {
            if (subscriber.predicate)(&snapshot) {
                // Subscriber panics are caught so they never unwind the
                // transition back out (spec §4.3: "exceptions in
                // subscribers are logged but never roll back the state").
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    (subscriber.callback)(&snapshot)
                }));
                if result.is_err() {
                    tracing::warn!(subscriber_id = subscriber.id, "state subscriber panicked");
                }
            }
        }
        Ok(to)
    }

    /// Force a transition to `cancelled`, bypassing the normal transition
    /// table: cancellation is reachable from every non-terminal phase via
    /// explicit operator action (spec §3, phase module docs), not as part
    /// of the forward-progression table `can_transition_to` enforces.
    pub fn cancel(&self) -> Result<ProjectPhase, StateError> {
        let mut state = self.inner.lock().expect("state lock poisoned");
        let from = state.phase;
        if from.is_terminal() {
            return Err(StateError::InvalidTransition { from, to: ProjectPhase::Cancelled });
        }
        state.phase = ProjectPhase::Cancelled;
        state.version += 1;
        state.transitions.push(TransitionRecord {
            from,
            to: ProjectPhase::Cancelled,
            at_unix_secs: unix_now(),
        });
        self.persist(&state)?;
        Ok(ProjectPhase::Cancelled)
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().expect("state lock poisoned").data.get(key).cloned()
    }

    /// Set `key` to `value`, enforcing optimistic concurrency: the caller
    /// must supply the version it last observed (via [`Self::version`]).
    pub fn set(&self, key: &str, value: Value, expected_version: u64) -> Result<u64, StateError> {
        let mut state = self.inner.lock().expect("state lock poisoned");
        if state.version != expected_version {
            return Err(StateError::VersionConflict {
                expected: expected_version,
                found: state.version,
            });
        }
        state.data.insert(key.to_string(), value);
        state.version += 1;
        self.persist(&state)?;
        Ok(state.version)
    }

    pub fn version(&self) -> u64 {
        self.inner.lock().expect("state lock poisoned").version
    }

    pub fn transitions(&self) -> Vec<TransitionRecord> {
        self.inner.lock().expect("state lock poisoned").transitions.clone()
    }

    /// Register a callback invoked synchronously after every successful
    /// transition matching `predicate`.
    pub fn subscribe(
        &self,
        predicate: impl Fn(&PersistedState) -> bool + Send + Sync + 'static,
        callback: impl Fn(&PersistedState) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let mut next_id = self.next_subscriber_id.lock().expect("subscriber id lock poisoned");
        let id = *next_id;
        *next_id += 1;
        drop(next_id);
        self.subscribers.lock().expect("subscriber lock poisoned").push(Subscriber {
            id,
            predicate: Box::new(predicate),
            callback: Box::new(callback),
        });
        SubscriptionHandle(id)
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscribers
            .lock()
            .expect("subscriber lock poisoned")
            .retain(|s| s.id != handle.0);
    }
}

/// Convenience alias matching spec naming; `StateManager` owns one project.
pub type SharedStateManager<'a> = Arc<StateManager<'a>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pad() -> (tempfile::TempDir, Scratchpad) {
        let dir = tempfile::tempdir().unwrap();
        let pad = Scratchpad::new(dir.path().join("scratchpad"));
        (dir, pad)
    }

    #[test]
    fn starts_at_collecting() {
        let (_dir, pad) = pad();
        let mgr = StateManager::load_or_init(&pad, "p1").unwrap();
        assert_eq!(mgr.get_phase(), ProjectPhase::Collecting);
    }

    #[test]
    fn legal_transition_persists_and_reloads() {
        let (_dir, pad) = pad();
        {
            let mgr = StateManager::load_or_init(&pad, "p1").unwrap();
            mgr.transition(ProjectPhase::Clarifying).unwrap();
        }
        let mgr = StateManager::load_or_init(&pad, "p1").unwrap();
        assert_eq!(mgr.get_phase(), ProjectPhase::Clarifying);
    }

    #[test]
    fn illegal_transition_is_refused() {
        let (_dir, pad) = pad();
        let mgr = StateManager::load_or_init(&pad, "p1").unwrap();
        let err = mgr.transition(ProjectPhase::Merged).unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
        assert_eq!(mgr.get_phase(), ProjectPhase::Collecting);
    }

    #[test]
    fn transition_to_current_phase_is_noop() {
        let (_dir, pad) = pad();
        let mgr = StateManager::load_or_init(&pad, "p1").unwrap();
        let before = mgr.version();
        mgr.transition(ProjectPhase::Collecting).unwrap();
        assert_eq!(mgr.version(), before);
    }

    #[test]
    fn cas_rejects_stale_version() {
        let (_dir, pad) = pad();
        let mgr = StateManager::load_or_init(&pad, "p1").unwrap();
        mgr.set("k", Value::from(1), 0).unwrap();
        let err = mgr.set("k", Value::from(2), 0).unwrap_err();
        assert!(matches!(err, StateError::VersionConflict { .. }));
    }

    #[test]
    fn cancel_succeeds_from_a_non_terminal_phase() {
        let (_dir, pad) = pad();
        let mgr = StateManager::load_or_init(&pad, "p1").unwrap();
        let before = mgr.version();
        let phase = mgr.cancel().unwrap();
        assert_eq!(phase, ProjectPhase::Cancelled);
        assert_eq!(mgr.get_phase(), ProjectPhase::Cancelled);
        assert!(mgr.version() > before);
        assert_eq!(mgr.transitions().last().unwrap().to, ProjectPhase::Cancelled);
    }

    #[test]
    fn cancel_is_refused_once_already_terminal() {
        let (_dir, pad) = pad();
        let mgr = StateManager::load_or_init(&pad, "p1").unwrap();
        mgr.cancel().unwrap();
        let err = mgr.cancel().unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
    }

    #[test]
    fn subscriber_runs_after_persistence() {
        let (_dir, pad) = pad();
        let mgr = StateManager::load_or_init(&pad, "p1").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        mgr.subscribe(
            |state| state.phase == ProjectPhase::Clarifying,
            move |_| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
            },
        );
        mgr.transition(ProjectPhase::Clarifying).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_future_callbacks() {
        let (_dir, pad) = pad();
        let mgr = StateManager::load_or_init(&pad, "p1").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let handle = mgr.subscribe(|_| true, move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        mgr.transition(ProjectPhase::Clarifying).unwrap();
        mgr.unsubscribe(handle);
        mgr.transition(ProjectPhase::PrdDrafting).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

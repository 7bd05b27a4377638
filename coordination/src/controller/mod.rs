//! Controller / Scheduler (spec §4.7) — "the heart of the core". Converts
//! an immutable issue DAG into a stream of completed work, maintaining
//! durable progress through the Scratchpad.

pub mod circuit_breaker;
pub mod retry;
pub mod state;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use state::ControllerState;

use crate::dispatcher::{BridgeRequest, Dispatcher};
use crate::error::ErrorKind;
use crate::issue::{ImplementationResult, WorkOrder, Worker, WorkerState};
use crate::priority::PriorityAnalyzer;
use crate::scratchpad::artifact::Section;
use crate::scratchpad::schema::SerialFormat;
use crate::scratchpad::Scratchpad;

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("deadlock or blocked: {0:?}")]
    DeadlockOrBlocked(Vec<String>),
    #[error("circuit open for target {0}")]
    CircuitOpen(String),
    #[error("controller cancelled")]
    Cancelled,
    #[error(transparent)]
    Scratchpad(#[from] crate::scratchpad::ScratchpadError),
    #[error("dispatch error: {0}")]
    Dispatch(#[from] crate::dispatcher::DispatchError),
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::DeadlockOrBlocked(_) => ErrorKind::DeadlockOrBlocked,
            ControllerError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            ControllerError::Cancelled => ErrorKind::Cancelled,
            ControllerError::Scratchpad(e) => e.kind(),
            ControllerError::Dispatch(e) => e.kind(),
        }
    }
}

const CONTROLLER_ARTIFACT: &str = "controller.json";

#[derive(Clone)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a single dispatch-loop tick (spec §4.7 steps 1-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Work remains; call `tick` again.
    Continue,
    /// `pending ∪ ready ∪ in_progress` all empty: every issue resolved.
    Terminated,
}

/// The Controller: a fixed-size worker pool draining a project's issue
/// DAG via the Dispatcher, guided by the Priority Analyzer's ordering.
pub struct Controller {
    project_id: String,
    scratchpad: Arc<Scratchpad>,
    dispatcher: Arc<Dispatcher>,
    analyzer: PriorityAnalyzer,
    state: ControllerState,
    workers: Vec<Worker>,
    in_flight: HashMap<String, JoinHandle<ImplementationResult>>,
    retry_policy: RetryPolicy,
    circuit_breaker: CircuitBreaker,
    cancellation: CancellationToken,
}

impl Controller {
    /// `start(projectId)` (spec §4.7): load or create `ControllerState`,
    /// partition nodes into `ready`/`pending` per the Analyzer's
    /// dependency graph.
    pub fn start(
        project_id: impl Into<String>,
        scratchpad: Arc<Scratchpad>,
        dispatcher: Arc<Dispatcher>,
        analyzer: PriorityAnalyzer,
        max_workers: usize,
        cancellation: CancellationToken,
    ) -> Result<Self, ControllerError> {
        let project_id = project_id.into();
        let all_ids: Vec<String> = analyzer.topological_order().to_vec();

        let existing: Option<ControllerState> = scratchpad.read_typed(
            &project_id,
            Section::Progress,
            CONTROLLER_ARTIFACT,
            SerialFormat::Json,
        )?;

        let mut state = existing.unwrap_or_else(|| ControllerState::new(all_ids));

        // An issue left `in_progress` by a prior run has no surviving
        // in-flight task in this process — the worker that held it is gone,
        // so it must be re-dispatched rather than waited on forever.
        for id in state.in_progress.drain().collect::<Vec<_>>() {
            state.ready.push(id);
        }

        let completed: HashSet<String> = state.completed.iter().cloned().collect();
        let ready = analyzer.get_executable_issues(&completed);
        state.pending.retain(|id| !ready.contains(id));
        for id in &ready {
            if !state.ready.contains(id) {
                state.ready.push(id.clone());
            }
        }

        let workers = (0..max_workers as u32).map(Worker::idle).collect();

        let controller = Self {
            project_id,
            scratchpad,
            dispatcher,
            analyzer,
            state,
            workers,
            in_flight: HashMap::new(),
            retry_policy: RetryPolicy::default(),
            circuit_breaker: CircuitBreaker::default(),
            cancellation,
        };
        controller.persist()?;
        Ok(controller)
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    fn idle_worker_count(&self) -> usize {
        self.workers.iter().filter(|w| w.state == WorkerState::Idle).count()
    }

    fn persist(&self) -> Result<(), ControllerError> {
        self.scratchpad
            .write_typed(&self.project_id, Section::Progress, CONTROLLER_ARTIFACT, &self.state, SerialFormat::Json)
            .map_err(ControllerError::from)
    }

    /// One iteration of the dispatch loop (spec §4.7 steps 1-4), inside a
    /// single logical critical section — callers serialize ticks for a
    /// given project (e.g. one task owns the `Controller`).
    pub async fn tick(&mut self) -> Result<TickOutcome, ControllerError> {
        if self.cancellation.is_cancelled() {
            return Err(ControllerError::Cancelled);
        }

        // Step 1: reap completed work.
        let finished_ids: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        for issue_id in finished_ids {
            let handle = self.in_flight.remove(&issue_id).expect("just observed finished");
            let result = handle.await.unwrap_or(ImplementationResult {
                issue_id: issue_id.clone(),
                success: false,
                pr_url: None,
                error: Some("worker task panicked".to_string()),
                kind: Some(ErrorKind::Internal),
            });
            self.state.in_progress.remove(&issue_id);
            self.free_worker(&issue_id);

            if result.success {
                self.circuit_breaker.record_success(&issue_id);
                self.state.completed.push(issue_id.clone());
                let completed: HashSet<String> = self.state.completed.iter().cloned().collect();
                for dependent in self.analyzer.get_dependents(&issue_id).unwrap_or_default() {
                    if !self.state.pending.contains(&dependent) {
                        continue;
                    }
                    let deps = self.analyzer.get_dependencies(&dependent).unwrap_or_default();
                    if deps.iter().all(|d| completed.contains(d)) {
                        self.state.pending.remove(&dependent);
                        self.state.ready.push(dependent);
                    }
                }
            } else {
                self.circuit_breaker.record_failure(&issue_id);
                let attempts = self.state.attempts.entry(issue_id.clone()).or_insert(0);
                *attempts += 1;
                // A classified kind (security denial, schema validation,
                // ...) is honored exactly and never overridden — fatal
                // causes must never be retried regardless of attempts
                // remaining. An unclassified failure (no transport opinion
                // on cause) defaults to `Timeout`, preserving the
                // assume-transient behavior for agent bodies that don't
                // yet report a kind.
                let kind = result.kind.unwrap_or(ErrorKind::Timeout);
                let retryable = self.retry_policy.should_retry(*attempts, kind);
                if retryable {
                    self.state.ready.push(issue_id);
                } else {
                    self.state.failed.insert(issue_id.clone());
                    self.block_dependents(&issue_id);
                }
            }
        }

        // Step 2: dispatch while idle workers and ready issues remain.
        while self.idle_worker_count() > 0 && !self.state.ready.is_empty() {
            let completed: HashSet<String> = self.state.completed.iter().cloned().collect();
            let candidates = self.analyzer.get_executable_issues(&completed);
            let next = self
                .state
                .ready
                .iter()
                .find(|id| candidates.contains(id))
                .cloned()
                .or_else(|| self.state.ready.first().cloned());
            let Some(issue_id) = next else { break };

            if !self.circuit_breaker.is_available(&issue_id) {
                return Err(ControllerError::CircuitOpen(issue_id));
            }

            self.state.ready.retain(|id| id != &issue_id);
            self.state.in_progress.insert(issue_id.clone());
            self.assign_worker(&issue_id);

            let attempt = *self.state.attempts.get(&issue_id).unwrap_or(&0) + 1;
            let work_order = WorkOrder {
                issue_id: issue_id.clone(),
                attempt,
                input: json!({}),
            };
            self.persist_work_order(&work_order)?;

            let dispatcher = self.dispatcher.clone();
            let issue_id_for_task = issue_id.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let request = BridgeRequest {
                    agent_type: "implementation_worker".to_string(),
                    input: serde_json::to_value(&work_order).unwrap_or(json!({})),
                    scratchpad_dir: "scratchpad".to_string(),
                    project_dir: ".".to_string(),
                    prior_stage_outputs: Default::default(),
                };
                match dispatcher.dispatch(request) {
                    Ok(response) if response.success => ImplementationResult {
                        issue_id: issue_id_for_task,
                        success: true,
                        pr_url: response.output.get("prUrl").and_then(|v| v.as_str()).map(String::from),
                        error: None,
                        kind: None,
                    },
                    Ok(response) => ImplementationResult {
                        issue_id: issue_id_for_task,
                        success: false,
                        pr_url: None,
                        error: response.error,
                        kind: response.kind,
                    },
                    Err(e) => ImplementationResult {
                        issue_id: issue_id_for_task,
                        success: false,
                        pr_url: None,
                        error: Some(e.to_string()),
                        kind: Some(e.kind()),
                    },
                }
            });
            self.in_flight.insert(issue_id, handle);
        }

        // Step 3: persist.
        self.persist()?;

        // Step 4: terminate or report deadlock.
        if self.state.is_terminal() {
            return Ok(TickOutcome::Terminated);
        }
        if self.state.is_deadlocked() {
            return Err(ControllerError::DeadlockOrBlocked(self.state.pending.iter().cloned().collect()));
        }
        Ok(TickOutcome::Continue)
    }

    /// `stop()` (spec §4.7): let in-flight workers finish, persist, and
    /// return without starting new dispatches.
    pub async fn stop(mut self) -> Result<ControllerState, ControllerError> {
        self.cancellation.cancel();
        for (issue_id, handle) in self.in_flight.drain() {
            if let Ok(result) = handle.await {
                self.state.in_progress.remove(&issue_id);
                if result.success {
                    self.state.completed.push(issue_id);
                } else {
                    self.state.failed.insert(issue_id);
                }
            }
        }
        self.persist()?;
        Ok(self.state)
    }

    fn assign_worker(&mut self, issue_id: &str) {
        if let Some(worker) = self.workers.iter_mut().find(|w| w.state == WorkerState::Idle) {
            worker.state = WorkerState::Working;
            worker.current_issue = Some(issue_id.to_string());
        }
    }

    fn free_worker(&mut self, issue_id: &str) {
        if let Some(worker) = self.workers.iter_mut().find(|w| w.current_issue.as_deref() == Some(issue_id)) {
            worker.state = WorkerState::Idle;
            worker.current_issue = None;
        }
    }

    /// Propagate a failure to every downstream issue whose dependency
    /// just failed, moving them from `pending` to `blocked` (spec §4.7
    /// deadlock note: "this can only occur if a dependency of a pending
    /// issue transitioned to failed").
    fn block_dependents(&mut self, failed_id: &str) {
        let mut frontier = vec![failed_id.to_string()];
        while let Some(id) = frontier.pop() {
            let dependents = self.analyzer.get_dependents(&id).unwrap_or_default();
            for dependent in dependents {
                if self.state.pending.remove(&dependent) {
                    self.state.blocked.insert(dependent.clone());
                    frontier.push(dependent);
                }
            }
        }
    }

    fn persist_work_order(&self, work_order: &WorkOrder) -> Result<(), ControllerError> {
        self.scratchpad
            .write_typed(
                &self.project_id,
                Section::Progress,
                &format!("work_order_{}.json", work_order.issue_id),
                &serde_json::json!({
                    "schemaVersion": "1.0.0",
                    "issueId": work_order.issue_id,
                    "attempt": work_order.attempt,
                }),
                SerialFormat::Json,
            )
            .map_err(ControllerError::from)
    }
}

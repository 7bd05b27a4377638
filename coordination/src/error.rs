//! Crate-wide error taxonomy.
//!
//! Every component defines its own `thiserror` error enum; this module
//! unifies them behind [`CoreError`] for callers that cross component
//! boundaries (the Controller calling the Dispatcher, the Orchestrator
//! calling the State Manager). [`ErrorKind`] implements the retry/fatal
//! policy from spec §7 without matching on every component variant.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::controller::ControllerError;
use crate::dispatcher::DispatchError;
use crate::priority::AnalyzerError;
use crate::registry::RegistryError;
use crate::scratchpad::ScratchpadError;
use crate::security::SecurityError;
use crate::state_manager::StateError;

/// Unified result type for cross-component call sites.
pub type CoreResult<T> = Result<T, CoreError>;

/// Crate-wide error kind taxonomy, matching spec §7 exactly.
///
/// Serializable so a transport can carry the real cause of a failure
/// across the bridge wire envelope (`dispatcher::envelope::BridgeResponse`)
/// instead of the caller having to guess at a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    SchemaValidation,
    NotFound,
    AlreadyExists,
    InvalidState,
    Timeout,
    Cancelled,
    RateLimitExceeded,
    CircuitOpen,
    SecurityDenied,
    BridgeTimeout,
    AgentDispatchError,
    CircularDependency,
    DeadlockOrBlocked,
    IoError,
    Internal,
}

impl ErrorKind {
    /// Whether the retry wrapper (spec §4.7, §7) should retry this error.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::RateLimitExceeded | ErrorKind::IoError
        )
    }

    /// Whether the error is fatal to the current operation and must never
    /// be retried (security and schema errors, per spec §7).
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::SecurityDenied | ErrorKind::SchemaValidation | ErrorKind::CircularDependency
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::SchemaValidation => "SchemaValidationError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::RateLimitExceeded => "RateLimitExceeded",
            ErrorKind::CircuitOpen => "CircuitOpen",
            ErrorKind::SecurityDenied => "SecurityDenied",
            ErrorKind::BridgeTimeout => "BridgeTimeout",
            ErrorKind::AgentDispatchError => "AgentDispatchError",
            ErrorKind::CircularDependency => "CircularDependency",
            ErrorKind::DeadlockOrBlocked => "DeadlockOrBlocked",
            ErrorKind::IoError => "IOError",
            ErrorKind::Internal => "Internal",
        };
        write!(f, "{s}")
    }
}

/// Crate-wide error, unifying every component's error type.
///
/// Carries a correlation id so a failure can be traced back through the
/// audit log and tracing spans that share the same id.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("security: {0}")]
    Security(#[from] SecurityError),

    #[error("scratchpad: {0}")]
    Scratchpad(#[from] ScratchpadError),

    #[error("state: {0}")]
    State(#[from] StateError),

    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("dispatch: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("analyzer: {0}")]
    Analyzer(#[from] AnalyzerError),

    #[error("controller: {0}")]
    Controller(#[from] ControllerError),

    #[error("{0}")]
    Internal(String),
}

impl CoreError {
    /// Map this error onto the spec §7 error-kind taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Security(_) => ErrorKind::SecurityDenied,
            CoreError::Scratchpad(e) => e.kind(),
            CoreError::State(e) => e.kind(),
            CoreError::Registry(e) => e.kind(),
            CoreError::Dispatch(e) => e.kind(),
            CoreError::Analyzer(e) => e.kind(),
            CoreError::Controller(e) => e.kind(),
            CoreError::Internal(_) => ErrorKind::Internal,
        }
    }
}

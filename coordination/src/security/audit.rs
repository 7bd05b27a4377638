//! Append-only audit log of every command executed, path resolved, secret
//! accessed, and whitelist-denied attempt (spec §4.1).
//!
//! Entries are kept in-memory (a bounded ring buffer) and mirrored onto a
//! dedicated `tracing` target (`ad_sdlc::audit`) so any subscriber layer can
//! persist them without the Security Gate depending on a specific sink.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

const MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at_unix_secs: u64,
    pub correlation_id: String,
    pub category: AuditCategory,
    pub detail: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    CommandExecution,
    PathResolution,
    SecretAccess,
    WhitelistDenied,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Append-only, bounded audit trail.
#[derive(Default)]
pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        correlation_id: impl Into<String>,
        category: AuditCategory,
        detail: impl Into<String>,
        outcome: Outcome,
    ) {
        let entry = AuditEntry {
            at_unix_secs: unix_now(),
            correlation_id: correlation_id.into(),
            category,
            detail: detail.into(),
            outcome,
        };
        match outcome {
            Outcome::Success => {
                tracing::debug!(target: "ad_sdlc::audit", category = ?entry.category, detail = %entry.detail, correlation_id = %entry.correlation_id, "audit")
            }
            Outcome::Failure => {
                tracing::warn!(target: "ad_sdlc::audit", category = ?entry.category, detail = %entry.detail, correlation_id = %entry.correlation_id, "audit")
            }
            Outcome::Blocked => {
                tracing::warn!(target: "ad_sdlc::audit", category = ?entry.category, detail = %entry.detail, correlation_id = %entry.correlation_id, "audit blocked")
            }
        }
        let mut entries = self.entries.lock().expect("audit log lock poisoned");
        entries.push_back(entry);
        if entries.len() > MAX_ENTRIES {
            entries.pop_front();
        }
    }

    /// Snapshot of every entry currently retained.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit log lock poisoned").iter().cloned().collect()
    }

    pub fn count_blocked(&self) -> usize {
        self.entries
            .lock()
            .expect("audit log lock poisoned")
            .iter()
            .filter(|e| e.outcome == Outcome::Blocked)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_counts_blocked() {
        let log = AuditLog::new();
        log.record("corr-1", AuditCategory::CommandExecution, "git status", Outcome::Success);
        log.record(
            "corr-2",
            AuditCategory::WhitelistDenied,
            "rm -rf /",
            Outcome::Blocked,
        );
        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.count_blocked(), 1);
    }

    #[test]
    fn bounds_total_entries() {
        let log = AuditLog::new();
        for i in 0..(MAX_ENTRIES + 10) {
            log.record(
                format!("corr-{i}"),
                AuditCategory::PathResolution,
                "probe",
                Outcome::Success,
            );
        }
        assert_eq!(log.entries().len(), MAX_ENTRIES);
    }
}

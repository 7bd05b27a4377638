//! Security Gate (spec §4.1) — the process-singleton every subprocess
//! invocation and every filesystem write must pass through.
//!
//! Combines a [`whitelist::CommandWhitelist`], a [`path_resolver::PathResolver`]
//! per project root, a [`secrets::SecretManager`], a [`rate_limiter::RateLimiter`],
//! and an [`audit::AuditLog`] behind one facade: [`SecurityGate`].

pub mod audit;
pub mod path_resolver;
pub mod rate_limiter;
pub mod secrets;
pub mod shell_safety;
pub mod whitelist;

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use self::audit::{AuditCategory, AuditLog, Outcome};
use self::path_resolver::{PathError, PathResolver};
use self::rate_limiter::{RateLimitError, RateLimiter};
use self::secrets::{Secret, SecretError, SecretManager};
use self::whitelist::{CommandWhitelist, ValidatedInvocation, WhitelistError, WhitelistUpdateOptions};

use crate::error::ErrorKind;

/// Non-retryable failure taxonomy for the Security Gate (spec §4.1).
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("command injection attempt: {0}")]
    CommandInjection(String),
    #[error("command not allowed: {0}")]
    CommandNotAllowed(String),
    #[error("path traversal: {0}")]
    PathTraversal(String),
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),
    #[error("secret not found: {0}")]
    SecretNotFound(String),
    #[error("whitelist update error: {0}")]
    WhitelistUpdateError(String),
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),
}

impl SecurityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SecurityError::RateLimitExceeded(_) => ErrorKind::RateLimitExceeded,
            _ => ErrorKind::SecurityDenied,
        }
    }
}

impl From<WhitelistError> for SecurityError {
    fn from(e: WhitelistError) -> Self {
        match e {
            WhitelistError::CmdNotWhitelisted(c) => SecurityError::CommandNotAllowed(c),
            WhitelistError::SubcmdNotWhitelisted(c, s) => {
                SecurityError::CommandNotAllowed(format!("{c} {s}"))
            }
            WhitelistError::CommandInjection(e) => SecurityError::CommandInjection(e.to_string()),
            WhitelistError::ArgRejected(pos, c, s, v) => SecurityError::CommandNotAllowed(format!(
                "{c} {s}: argument {pos} rejected ({v})"
            )),
            WhitelistError::WhitelistUpdateError(m) => SecurityError::WhitelistUpdateError(m),
        }
    }
}

impl From<PathError> for SecurityError {
    fn from(e: PathError) -> Self {
        SecurityError::PathTraversal(e.to_string())
    }
}

impl From<RateLimitError> for SecurityError {
    fn from(e: RateLimitError) -> Self {
        SecurityError::RateLimitExceeded(e.to_string())
    }
}

impl From<SecretError> for SecurityError {
    fn from(e: SecretError) -> Self {
        SecurityError::SecretNotFound(e.to_string())
    }
}

/// The Security Gate. Construct one per process at startup and hand down
/// `Arc<SecurityGate>` references rather than reaching for a global.
pub struct SecurityGate {
    whitelist: std::sync::RwLock<CommandWhitelist>,
    path_resolver: PathResolver,
    secrets: SecretManager,
    rate_limiter: RateLimiter,
    audit: AuditLog,
}

impl SecurityGate {
    pub fn new(project_root: impl AsRef<Path>) -> Result<Self, SecurityError> {
        let path_resolver = PathResolver::new(project_root)?;
        let secrets = SecretManager::new();
        secrets.load_from_env();
        Ok(Self {
            whitelist: std::sync::RwLock::new(CommandWhitelist::new()),
            path_resolver,
            secrets,
            rate_limiter: RateLimiter::new(10.0, 1.0),
            audit: AuditLog::new(),
        })
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn update_whitelist(
        &self,
        entry: whitelist::WhitelistEntry,
        options: WhitelistUpdateOptions,
    ) -> Result<(), SecurityError> {
        let actor = options.actor.clone();
        let reason = options.reason.clone();
        let base = entry.base_command.clone();
        let result = self
            .whitelist
            .write()
            .expect("whitelist lock poisoned")
            .upsert(entry, options);
        match &result {
            Ok(()) => self.audit.record(
                &actor,
                AuditCategory::WhitelistDenied,
                format!("whitelist updated for {base}: {reason}"),
                Outcome::Success,
            ),
            Err(e) => self.audit.record(
                &actor,
                AuditCategory::WhitelistDenied,
                format!("whitelist update rejected for {base}: {e}"),
                Outcome::Failure,
            ),
        }
        result.map_err(SecurityError::from)
    }

    /// Validate `argv` against the whitelist without executing anything.
    pub fn validate_command(
        &self,
        correlation_id: &str,
        argv: &[String],
    ) -> Result<ValidatedInvocation, SecurityError> {
        let result = self
            .whitelist
            .read()
            .expect("whitelist lock poisoned")
            .validate(argv)
            .map_err(SecurityError::from);
        match &result {
            Ok(_) => self.audit.record(
                correlation_id,
                AuditCategory::CommandExecution,
                argv.join(" "),
                Outcome::Success,
            ),
            Err(e) => self.audit.record(
                correlation_id,
                AuditCategory::WhitelistDenied,
                format!("{}: {e}", argv.join(" ")),
                Outcome::Blocked,
            ),
        }
        result
    }

    /// Validate and spawn a whitelisted subprocess, with secrets injected
    /// only into the child's environment (never argv).
    pub fn execute(
        &self,
        correlation_id: &str,
        argv: &[String],
        env_secrets: &[&str],
    ) -> Result<Output, SecurityError> {
        let invocation = self.validate_command(correlation_id, argv)?;

        self.rate_limiter
            .acquire(&invocation.base_command, Duration::from_secs(1))
            .map_err(SecurityError::from)?;

        let mut command = std::process::Command::new(&invocation.base_command);
        command.arg(&invocation.subcommand);
        command.args(&invocation.args);
        for name in env_secrets {
            if let Ok(secret) = self.secret(name) {
                command.env(name, secret.expose());
            }
        }

        let output = command.output().map_err(SecurityError::Io);
        match &output {
            Ok(o) if o.status.success() => self.audit.record(
                correlation_id,
                AuditCategory::CommandExecution,
                format!("{} completed", argv.join(" ")),
                Outcome::Success,
            ),
            Ok(_) => self.audit.record(
                correlation_id,
                AuditCategory::CommandExecution,
                format!("{} exited non-zero", argv.join(" ")),
                Outcome::Failure,
            ),
            Err(e) => self.audit.record(
                correlation_id,
                AuditCategory::CommandExecution,
                format!("{}: {e}", argv.join(" ")),
                Outcome::Failure,
            ),
        }
        output
    }

    pub fn resolve_path(
        &self,
        correlation_id: &str,
        requested: impl AsRef<Path>,
    ) -> Result<PathBuf, SecurityError> {
        let requested = requested.as_ref();
        let result = self.path_resolver.resolve(requested).map_err(SecurityError::from);
        match &result {
            Ok(p) => self.audit.record(
                correlation_id,
                AuditCategory::PathResolution,
                p.display().to_string(),
                Outcome::Success,
            ),
            Err(e) => self.audit.record(
                correlation_id,
                AuditCategory::PathResolution,
                format!("{}: {e}", requested.display()),
                Outcome::Blocked,
            ),
        }
        result
    }

    pub fn resolve_path_for_write(
        &self,
        correlation_id: &str,
        requested: impl AsRef<Path>,
    ) -> Result<PathBuf, SecurityError> {
        let requested = requested.as_ref();
        let result = self
            .path_resolver
            .resolve_for_write(requested)
            .map_err(SecurityError::from);
        match &result {
            Ok(p) => self.audit.record(
                correlation_id,
                AuditCategory::PathResolution,
                p.display().to_string(),
                Outcome::Success,
            ),
            Err(e) => self.audit.record(
                correlation_id,
                AuditCategory::PathResolution,
                format!("{}: {e}", requested.display()),
                Outcome::Blocked,
            ),
        }
        result
    }

    pub fn secret(&self, name: &str) -> Result<Secret, SecurityError> {
        let result = self.secrets.get(name).map_err(SecurityError::from);
        self.audit.record(
            "secret-access",
            AuditCategory::SecretAccess,
            name,
            if result.is_ok() { Outcome::Success } else { Outcome::Failure },
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration as StdDuration;

    fn gate() -> SecurityGate {
        let dir = tempfile::tempdir().unwrap();
        let gate = SecurityGate::new(dir.into_path()).unwrap();
        let mut subcommands = HashMap::new();
        subcommands.insert(
            "status".to_string(),
            whitelist::SubcommandRule::new("status", StdDuration::from_secs(5)),
        );
        gate.update_whitelist(
            whitelist::WhitelistEntry {
                base_command: "git".to_string(),
                subcommands,
                provenance: Vec::new(),
            },
            WhitelistUpdateOptions {
                actor: "test".to_string(),
                reason: "seed".to_string(),
            },
        )
        .unwrap();
        gate
    }

    #[test]
    fn validate_command_records_audit() {
        let gate = gate();
        gate.validate_command("corr", &["git".to_string(), "status".to_string()])
            .unwrap();
        assert_eq!(gate.audit().entries().len(), 2); // whitelist seed + validate
    }

    #[test]
    fn blocked_command_is_audited() {
        let gate = gate();
        let err = gate
            .validate_command("corr", &["rm".to_string(), "-rf".to_string()])
            .unwrap_err();
        assert!(matches!(err, SecurityError::CommandNotAllowed(_)));
        assert_eq!(gate.audit().count_blocked(), 1);
    }
}

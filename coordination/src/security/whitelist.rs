//! Command whitelist — base commands, sub-commands, and per-position
//! argument validators (spec §4.1).

use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;

use super::shell_safety::{self, ArgValidationError};

/// Validation rule for a single positional argument.
#[derive(Clone)]
pub enum ArgRule {
    /// Argument must match this regex in its entirety.
    Pattern(Regex),
    /// Argument is accepted unconditionally (still scanned for shell
    /// metacharacters unless `accepts_escapes` is set on the entry).
    Any,
}

impl ArgRule {
    fn matches(&self, value: &str) -> bool {
        match self {
            ArgRule::Pattern(re) => re.is_match(value),
            ArgRule::Any => true,
        }
    }
}

/// A single allowed sub-command of a base command, with per-positional
/// validators and a default timeout.
#[derive(Clone)]
pub struct SubcommandRule {
    pub name: String,
    /// Validators keyed by zero-based position *after* the sub-command.
    /// Positions beyond the declared set fall back to `default_arg_rule`.
    pub positional: HashMap<usize, ArgRule>,
    pub default_arg_rule: ArgRule,
    /// Positions that are allowed to contain shell metacharacters (the
    /// whitelist entry takes responsibility for escaping them, e.g. via
    /// [`shell_safety::escape_for_shell`]).
    pub accepts_escapes: Vec<usize>,
    pub timeout: Duration,
}

impl SubcommandRule {
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            positional: HashMap::new(),
            default_arg_rule: ArgRule::Any,
            accepts_escapes: Vec::new(),
            timeout,
        }
    }

    pub fn with_positional(mut self, position: usize, rule: ArgRule) -> Self {
        self.positional.insert(position, rule);
        self
    }

    pub fn allow_escapes_at(mut self, position: usize) -> Self {
        self.accepts_escapes.push(position);
        self
    }

    fn rule_for(&self, position: usize) -> &ArgRule {
        self.positional.get(&position).unwrap_or(&self.default_arg_rule)
    }
}

/// A whitelist entry for one base command (`git`, `gh`, `npm`, …).
#[derive(Clone)]
pub struct WhitelistEntry {
    pub base_command: String,
    pub subcommands: HashMap<String, SubcommandRule>,
    /// Provenance of the last mutation to this entry (spec §9: global
    /// mutable whitelist mutations must record provenance).
    pub provenance: Vec<WhitelistChange>,
}

/// A recorded mutation to a whitelist entry.
#[derive(Clone, Debug)]
pub struct WhitelistChange {
    pub actor: String,
    pub reason: String,
    pub at_unix_secs: u64,
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Options accompanying a whitelist mutation, carrying provenance.
pub struct WhitelistUpdateOptions {
    pub actor: String,
    pub reason: String,
}

/// Command whitelist keyed by base command name.
#[derive(Clone, Default)]
pub struct CommandWhitelist {
    entries: HashMap<String, WhitelistEntry>,
}

/// Validated, ready-to-spawn invocation.
#[derive(Debug, Clone)]
pub struct ValidatedInvocation {
    pub base_command: String,
    pub subcommand: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

/// Errors raised while checking or mutating the whitelist.
#[derive(Debug, thiserror::Error)]
pub enum WhitelistError {
    #[error("command not whitelisted: {0}")]
    CmdNotWhitelisted(String),
    #[error("subcommand not whitelisted: {0} {1}")]
    SubcmdNotWhitelisted(String, String),
    #[error("command injection: {0}")]
    CommandInjection(#[from] ArgValidationError),
    #[error("argument {0} failed validation for {1} {2}: {3}")]
    ArgRejected(usize, String, String, String),
    #[error("whitelist update error: {0}")]
    WhitelistUpdateError(String),
}

impl CommandWhitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a whitelist entry, recording provenance.
    pub fn upsert(
        &mut self,
        mut entry: WhitelistEntry,
        options: WhitelistUpdateOptions,
    ) -> Result<(), WhitelistError> {
        if entry.base_command.trim().is_empty() {
            return Err(WhitelistError::WhitelistUpdateError(
                "base_command must not be empty".to_string(),
            ));
        }
        entry.provenance.push(WhitelistChange {
            actor: options.actor,
            reason: options.reason,
            at_unix_secs: unix_now(),
        });
        self.entries.insert(entry.base_command.clone(), entry);
        Ok(())
    }

    /// Validate an argv vector (`argv[0]` is the base command, `argv[1]`
    /// the sub-command, the rest positional arguments) against the
    /// whitelist. Never executes anything — pure validation.
    pub fn validate(&self, argv: &[String]) -> Result<ValidatedInvocation, WhitelistError> {
        let base = argv
            .first()
            .ok_or_else(|| WhitelistError::CmdNotWhitelisted(String::new()))?;
        let entry = self
            .entries
            .get(base)
            .ok_or_else(|| WhitelistError::CmdNotWhitelisted(base.clone()))?;

        let subcommand = argv
            .get(1)
            .ok_or_else(|| WhitelistError::SubcmdNotWhitelisted(base.clone(), String::new()))?;
        let rule = entry.subcommands.get(subcommand).ok_or_else(|| {
            WhitelistError::SubcmdNotWhitelisted(base.clone(), subcommand.clone())
        })?;

        let rest = &argv[2..];
        for (position, value) in rest.iter().enumerate() {
            if !rule.accepts_escapes.contains(&position) {
                shell_safety::validate_arg(value)?;
            }
            let arg_rule = rule.rule_for(position);
            if !arg_rule.matches(value) {
                return Err(WhitelistError::ArgRejected(
                    position,
                    base.clone(),
                    subcommand.clone(),
                    value.clone(),
                ));
            }
        }

        Ok(ValidatedInvocation {
            base_command: base.clone(),
            subcommand: subcommand.clone(),
            args: rest.to_vec(),
            timeout: rule.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_whitelist() -> CommandWhitelist {
        let mut wl = CommandWhitelist::new();
        let mut subcommands = HashMap::new();
        subcommands.insert(
            "commit".to_string(),
            SubcommandRule::new("commit", Duration::from_secs(30)).with_positional(
                0,
                ArgRule::Pattern(Regex::new(r"^-m$").unwrap()),
            ),
        );
        subcommands.insert("status".to_string(), SubcommandRule::new("status", Duration::from_secs(10)));
        wl.upsert(
            WhitelistEntry {
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
        wl
    }

    #[test]
    fn unknown_base_command_is_rejected() {
        let wl = git_whitelist();
        let err = wl
            .validate(&["rm".to_string(), "-rf".to_string()])
            .unwrap_err();
        assert!(matches!(err, WhitelistError::CmdNotWhitelisted(_)));
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        let wl = git_whitelist();
        let err = wl
            .validate(&["git".to_string(), "push".to_string()])
            .unwrap_err();
        assert!(matches!(err, WhitelistError::SubcmdNotWhitelisted(_, _)));
    }

    #[test]
    fn injection_attempt_is_rejected() {
        let wl = git_whitelist();
        let err = wl
            .validate(&[
                "git".to_string(),
                "commit".to_string(),
                "-m".to_string(),
                "msg; rm -rf /".to_string(),
            ])
            .unwrap_err();
        assert!(matches!(err, WhitelistError::CommandInjection(_)));
    }

    #[test]
    fn valid_invocation_passes() {
        let wl = git_whitelist();
        let invocation = wl
            .validate(&[
                "git".to_string(),
                "commit".to_string(),
                "-m".to_string(),
                "add widget".to_string(),
            ])
            .unwrap();
        assert_eq!(invocation.base_command, "git");
        assert_eq!(invocation.timeout, Duration::from_secs(30));
    }
}

//! Shell metacharacter validation — command injection prevention.
//!
//! Arguments passed to subprocesses go through [`Command::new(..).args(..)`],
//! never a shell string, so metacharacters are harmless to the OS. We
//! validate anyway because the whitelist's contract (spec §4.1) requires
//! rejecting injection attempts regardless of the execution path, and
//! because some whitelist entries shell out through `ssh` where a joined
//! command string *is* interpreted by a remote shell.

use std::fmt;

/// Shell metacharacters that can cause command injection when interpreted
/// by a shell (bash/sh/zsh).
pub const SHELL_METACHARACTERS: &[char] = &[
    ';', '|', '&', '`', '$', '<', '>', '(', ')', '{', '}', '[', ']', '*', '?', '!', '~', '\n',
    '\r',
];

/// A single offending character found while validating an argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgValidationError {
    pub character: char,
    pub position: usize,
    pub input_preview: String,
}

impl fmt::Display for ArgValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dangerous character '{}' at position {} in: {}",
            self.character.escape_default(),
            self.position,
            self.input_preview
        )
    }
}

impl std::error::Error for ArgValidationError {}

fn preview(input: &str) -> String {
    if input.chars().count() <= 100 {
        input.to_string()
    } else {
        input.chars().take(100).collect::<String>() + "..."
    }
}

/// Validate a single argv element contains no shell metacharacter.
///
/// Whitelist entries may mark a specific positional argument as
/// `accepts_escapes`, in which case this check is skipped for that
/// position — the caller is responsible for deciding that.
pub fn validate_arg(input: &str) -> Result<(), ArgValidationError> {
    if let Some((position, character)) = input
        .char_indices()
        .find(|(_, c)| SHELL_METACHARACTERS.contains(c))
    {
        return Err(ArgValidationError {
            character,
            position,
            input_preview: preview(input),
        });
    }
    Ok(())
}

/// Escape a string for safe inclusion in an SSH (or other shell) command
/// string, for whitelist entries that must join argv into a remote shell
/// invocation. Wraps in single quotes, escaping embedded quotes with the
/// POSIX `'\''` pattern.
pub fn escape_for_shell(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len() + 2);
    escaped.push('\'');
    for c in input.chars() {
        if c == '\'' {
            escaped.push_str("'\\''");
        } else {
            escaped.push(c);
        }
    }
    escaped.push('\'');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_arg_passes() {
        assert!(validate_arg("feature/my-branch_v2").is_ok());
        assert!(validate_arg("commit message without metachars").is_ok());
    }

    #[test]
    fn semicolon_chain_is_rejected() {
        let err = validate_arg("msg; rm -rf /").unwrap_err();
        assert_eq!(err.character, ';');
    }

    #[test]
    fn command_substitution_is_rejected() {
        assert!(validate_arg("$(rm -rf /)").is_err());
        assert!(validate_arg("`rm -rf /`").is_err());
    }

    #[test]
    fn pipe_and_background_are_rejected() {
        assert!(validate_arg("a | b").is_err());
        assert!(validate_arg("a & b").is_err());
    }

    #[test]
    fn escape_for_shell_quotes_embedded_quote() {
        assert_eq!(escape_for_shell("it's"), "'it'\\''s'");
        assert_eq!(escape_for_shell("$(rm -rf /)"), "'$(rm -rf /)'");
    }
}

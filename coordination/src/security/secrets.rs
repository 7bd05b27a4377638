//! Secret manager — lazy-loaded mapping from secret name to value.
//!
//! Secrets are never logged and never passed through argv; they are
//! injected into a subprocess's environment at spawn time only (spec
//! §4.1). [`Secret`] wraps the value so `Debug`/`Display` never leak it.

use std::collections::HashMap;
use std::sync::RwLock;

/// A secret value that redacts itself in `Debug` output.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret(<redacted>)")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret not found: {0}")]
    NotFound(String),
}

/// Process-global secret store. Populated from environment variables
/// matching `*_TOKEN` at startup (spec §6) or explicitly via [`Self::set`].
#[derive(Default)]
pub struct SecretManager {
    secrets: RwLock<HashMap<String, Secret>>,
}

impl SecretManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every environment variable whose name ends in `_TOKEN`.
    pub fn load_from_env(&self) {
        let mut secrets = self.secrets.write().expect("secret lock poisoned");
        for (key, value) in std::env::vars() {
            if key.ends_with("_TOKEN") {
                secrets.insert(key, Secret::new(value));
            }
        }
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut secrets = self.secrets.write().expect("secret lock poisoned");
        secrets.insert(name.into(), Secret::new(value));
    }

    pub fn get(&self, name: &str) -> Result<Secret, SecretError> {
        let secrets = self.secrets.read().expect("secret lock poisoned");
        secrets
            .get(name)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(name.to_string()))
    }

    /// Names of every loaded secret, for audit logging (never the values).
    pub fn names(&self) -> Vec<String> {
        let secrets = self.secrets.read().expect("secret lock poisoned");
        secrets.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_secret_errors() {
        let manager = SecretManager::new();
        assert!(matches!(manager.get("GH_TOKEN"), Err(SecretError::NotFound(_))));
    }

    #[test]
    fn set_and_get_round_trips() {
        let manager = SecretManager::new();
        manager.set("GH_TOKEN", "sekrit");
        assert_eq!(manager.get("GH_TOKEN").unwrap().expose(), "sekrit");
    }

    #[test]
    fn debug_never_prints_value() {
        let secret = Secret::new("sekrit");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("sekrit"));
    }
}

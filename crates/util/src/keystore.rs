//! Secret storage for placeholder values.
//!
//! Placeholders that are neither passed as arguments nor present in the environment are
//! treated as secrets. Their values can be remembered in the OS keychain (`keyring-rs`) or,
//! for CI and headless machines, read from process environment variables instead.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

static SERVICE: &str = "hiproc";

/// Environment variable used to select the secret resolution backend.
pub const SECRETS_BACKEND_ENV_VAR: &str = "HIPROC_SECRETS_BACKEND";

/// Secret resolution backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretsBackend {
    /// Resolve secrets via the OS keychain.
    #[default]
    Keychain,
    /// Resolve secret `NAME` from process environment variable `NAME`.
    #[serde(rename = "env")]
    Environment,
}

impl SecretsBackend {
    fn from_env_var(raw: Option<String>) -> Option<Self> {
        raw.and_then(|value| value.parse().ok())
    }

    /// The env var override when set, otherwise `configured`.
    pub fn effective(configured: Self) -> Self {
        Self::from_env_var(std::env::var(SECRETS_BACKEND_ENV_VAR).ok()).unwrap_or(configured)
    }
}

impl FromStr for SecretsBackend {
    type Err = KeystoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "env" | "environment" => Ok(Self::Environment),
            "keychain" | "keyring" => Ok(Self::Keychain),
            other => Err(KeystoreError::UnknownBackend(other.to_string())),
        }
    }
}

impl fmt::Display for SecretsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keychain => f.write_str("keychain"),
            Self::Environment => f.write_str("env"),
        }
    }
}

/// Determine the backend selected through the environment, defaulting to the keychain.
pub fn secrets_backend() -> SecretsBackend {
    SecretsBackend::effective(SecretsBackend::default())
}

/// Look up a remembered secret. `Ok(None)` means nothing is stored under `name`.
pub fn resolve_secret(backend: SecretsBackend, name: &str) -> Result<Option<String>, KeystoreError> {
    match backend {
        SecretsBackend::Environment => Ok(std::env::var(name).ok()),
        SecretsBackend::Keychain => match entry(name)?.get_password() {
            Ok(value) => {
                debug!("Resolved secret from keychain: {} -> [REDACTED]", name);
                Ok(Some(value))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(KeystoreError::Keyring {
                name: name.to_string(),
                error: error.to_string(),
            }),
        },
    }
}

/// Store a secret in the OS keychain. A no-op for the environment backend.
pub fn store_secret(backend: SecretsBackend, name: &str, value: &str) -> Result<(), KeystoreError> {
    if backend == SecretsBackend::Environment {
        return Ok(());
    }
    entry(name)?.set_password(value).map_err(|error| KeystoreError::Keyring {
        name: name.to_string(),
        error: error.to_string(),
    })?;

    debug!("Stored secret in keychain: {}", name);
    Ok(())
}

/// Remove a secret from the OS keychain. Missing entries are not an error.
pub fn remove_secret(backend: SecretsBackend, name: &str) -> Result<(), KeystoreError> {
    if backend == SecretsBackend::Environment {
        return Ok(());
    }
    match entry(name)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => {
            debug!("Removed secret from keychain: {}", name);
            Ok(())
        }
        Err(error) => Err(KeystoreError::Keyring {
            name: name.to_string(),
            error: error.to_string(),
        }),
    }
}

fn entry(name: &str) -> Result<keyring::Entry, KeystoreError> {
    keyring::Entry::new(SERVICE, name).map_err(|error| KeystoreError::Keyring {
        name: name.to_string(),
        error: error.to_string(),
    })
}

/// Errors raised by secret storage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeystoreError {
    #[error("Keyring error for {name}: {error}")]
    Keyring { name: String, error: String },

    #[error("Unknown secrets backend '{0}' (expected 'keychain' or 'env')")]
    UnknownBackend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_backend_defaults_to_keychain_when_env_var_is_missing() {
        temp_env::with_var(SECRETS_BACKEND_ENV_VAR, None::<&str>, || {
            assert_eq!(secrets_backend(), SecretsBackend::Keychain);
        });
    }

    #[test]
    fn env_var_overrides_configured_backend() {
        temp_env::with_var(SECRETS_BACKEND_ENV_VAR, Some("env"), || {
            assert_eq!(SecretsBackend::effective(SecretsBackend::Keychain), SecretsBackend::Environment);
        });
        temp_env::with_var(SECRETS_BACKEND_ENV_VAR, Some("bogus"), || {
            assert_eq!(SecretsBackend::effective(SecretsBackend::Environment), SecretsBackend::Environment);
        });
    }

    #[test]
    fn resolve_secret_reads_process_environment_in_environment_mode() {
        temp_env::with_var("KEYSTORE_TEST_SECRET", Some("test-secret-value"), || {
            let resolved = resolve_secret(SecretsBackend::Environment, "KEYSTORE_TEST_SECRET").expect("secret lookup");
            assert_eq!(resolved.as_deref(), Some("test-secret-value"));
        });
        temp_env::with_var("KEYSTORE_TEST_SECRET", None::<&str>, || {
            let resolved = resolve_secret(SecretsBackend::Environment, "KEYSTORE_TEST_SECRET").expect("secret lookup");
            assert!(resolved.is_none());
        });
    }

    #[test]
    fn backend_names_parse_and_serialize() {
        assert_eq!("ENV".parse::<SecretsBackend>(), Ok(SecretsBackend::Environment));
        assert!("vault".parse::<SecretsBackend>().is_err());
        assert_eq!(serde_json::to_string(&SecretsBackend::Environment).expect("serialize"), "\"env\"");
    }
}

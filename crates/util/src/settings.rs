//! Layered settings for the hiproc CLI.
//!
//! Settings are read from up to four JSON files, highest precedence first:
//!
//! 1. the file named by `HIPROC_CONFIG_PATH`
//! 2. `./hiproc.json` in the current directory
//! 3. `hiproc.json` next to the running binary
//! 4. `<config dir>/hiproc/config.json`
//!
//! Each file may set any subset of fields. A field is taken from the first layer that sets
//! it; anything left unset falls back to the built-in default.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use dirs_next::config_dir;
use hiproc_types::Scope;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    command_store::{DEFAULT_EXECUTION_HISTORY_LIMIT, default_store_path},
    keystore::SecretsBackend,
    path_processing::expand_tilde,
};

/// Environment variable naming an explicit settings file.
pub const CONFIG_PATH_ENV: &str = "HIPROC_CONFIG_PATH";

/// Filename looked up in the working directory and next to the binary.
pub const LOCAL_CONFIG_FILE_NAME: &str = "hiproc.json";

/// Filename of the global settings file inside `<config dir>/hiproc`.
pub const GLOBAL_CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// How tier-4 locality compares a stored directory with the working directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryMatching {
    /// Same final path component.
    #[default]
    Basename,
    /// Same final path component, or a sibling directory at the same depth.
    BasenameOrSibling,
}

/// One settings file. Every field is optional so layers can be merged.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsLayer {
    pub server_url: Option<String>,
    pub store_path: Option<String>,
    pub secrets_backend: Option<SecretsBackend>,
    pub directory_heuristic: Option<DirectoryMatching>,
    pub default_scope: Option<Scope>,
    pub execution_history_limit: Option<usize>,
}

impl SettingsLayer {
    /// Fill every unset field from `lower`.
    fn or(self, lower: SettingsLayer) -> SettingsLayer {
        SettingsLayer {
            server_url: self.server_url.or(lower.server_url),
            store_path: self.store_path.or(lower.store_path),
            secrets_backend: self.secrets_backend.or(lower.secrets_backend),
            directory_heuristic: self.directory_heuristic.or(lower.directory_heuristic),
            default_scope: self.default_scope.or(lower.default_scope),
            execution_history_limit: self.execution_history_limit.or(lower.execution_history_limit),
        }
    }
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Address handed to remote transports. Unused by the local store.
    pub server_url: Option<String>,
    pub store_path: PathBuf,
    pub secrets_backend: SecretsBackend,
    pub directory_heuristic: DirectoryMatching,
    pub default_scope: Scope,
    pub execution_history_limit: usize,
    /// Files that contributed, highest precedence first.
    pub sources: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_layer(SettingsLayer::default(), Vec::new())
    }
}

impl Settings {
    /// Load settings from the standard locations.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(&candidate_paths())
    }

    /// Load settings from `paths`, highest precedence first. Missing files are skipped.
    pub fn load_from(paths: &[PathBuf]) -> Result<Self, SettingsError> {
        let mut merged = SettingsLayer::default();
        let mut sources = Vec::new();
        for path in paths {
            if let Some(layer) = read_layer(path)? {
                debug!(path = %path.display(), "loaded settings layer");
                merged = merged.or(layer);
                sources.push(path.clone());
            }
        }
        Ok(Self::from_layer(merged, sources))
    }

    fn from_layer(layer: SettingsLayer, sources: Vec<PathBuf>) -> Self {
        Self {
            server_url: layer.server_url.filter(|url| !url.trim().is_empty()),
            store_path: layer
                .store_path
                .filter(|path| !path.trim().is_empty())
                .map(|path| expand_tilde(&path))
                .unwrap_or_else(default_store_path),
            secrets_backend: SecretsBackend::effective(layer.secrets_backend.unwrap_or_default()),
            directory_heuristic: layer.directory_heuristic.unwrap_or_default(),
            default_scope: layer.default_scope.unwrap_or_default(),
            execution_history_limit: layer.execution_history_limit.unwrap_or(DEFAULT_EXECUTION_HISTORY_LIMIT),
            sources,
        }
    }
}

/// Settings files in precedence order.
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        paths.push(expand_tilde(&path));
    }
    if let Ok(cwd) = env::current_dir() {
        paths.push(cwd.join(LOCAL_CONFIG_FILE_NAME));
    }
    if let Ok(binary) = env::current_exe()
        && let Some(dir) = binary.parent()
    {
        paths.push(dir.join(LOCAL_CONFIG_FILE_NAME));
    }
    paths.push(global_config_path());
    paths
}

/// Get the default path for the global settings file.
pub fn global_config_path() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hiproc")
        .join(GLOBAL_CONFIG_FILE_NAME)
}

fn read_layer(path: &Path) -> Result<Option<SettingsLayer>, SettingsError> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).map(Some).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        }),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SettingsError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::keystore::SECRETS_BACKEND_ENV_VAR;

    #[test]
    fn higher_layers_win_field_by_field() {
        let dir = tempdir().unwrap();
        let local = dir.path().join("hiproc.json");
        let global = dir.path().join("config.json");
        fs::write(&local, r#"{"server_url": "http://local:8000"}"#).unwrap();
        fs::write(
            &global,
            r#"{"server_url": "http://global:8000", "directory_heuristic": "basename_or_sibling", "default_scope": "platform"}"#,
        )
        .unwrap();

        temp_env::with_var(SECRETS_BACKEND_ENV_VAR, None::<&str>, || {
            let settings = Settings::load_from(&[local.clone(), dir.path().join("missing.json"), global.clone()]).unwrap();
            assert_eq!(settings.server_url.as_deref(), Some("http://local:8000"));
            assert_eq!(settings.directory_heuristic, DirectoryMatching::BasenameOrSibling);
            assert_eq!(settings.default_scope, Scope::Shared("platform".into()));
            assert_eq!(settings.execution_history_limit, DEFAULT_EXECUTION_HISTORY_LIMIT);
            assert_eq!(settings.sources, vec![local, global]);
        });
    }

    #[test]
    fn malformed_layer_is_reported_with_its_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hiproc.json");
        fs::write(&path, "{ nope").unwrap();

        match Settings::load_from(std::slice::from_ref(&path)) {
            Err(SettingsError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn config_path_override_comes_first() {
        temp_env::with_var(CONFIG_PATH_ENV, Some("~/elsewhere/hiproc.json"), || {
            let paths = candidate_paths();
            assert_eq!(paths[0], expand_tilde("~/elsewhere/hiproc.json"));
            assert_eq!(paths.last(), Some(&global_config_path()));
        });
    }

    #[test]
    fn secrets_backend_env_var_overrides_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hiproc.json");
        fs::write(&path, r#"{"secrets_backend": "keychain", "store_path": "/tmp/hp/commands.json"}"#).unwrap();

        temp_env::with_var(SECRETS_BACKEND_ENV_VAR, Some("env"), || {
            let settings = Settings::load_from(std::slice::from_ref(&path)).unwrap();
            assert_eq!(settings.secrets_backend, SecretsBackend::Environment);
            assert_eq!(settings.store_path, PathBuf::from("/tmp/hp/commands.json"));
        });
    }
}

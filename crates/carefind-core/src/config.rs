//! Layered configuration: defaults, then `carefind.toml`, then environment.
//!
//! The project file (`./carefind.toml`) wins over the user file
//! (`<config_dir>/carefind/config.toml`); only one of them is read.
//! Environment variables override whichever file was loaded.

use crate::error::{CarefindError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const PROJECT_CONFIG_FILE: &str = "carefind.toml";

pub const ENV_DB: &str = "CAREFIND_DB";
pub const ENV_MODEL: &str = "CAREFIND_EMBEDDING_MODEL";
pub const ENV_BATCH_SIZE: &str = "CAREFIND_BATCH_SIZE";
pub const ENV_ENCODE_BATCH_SIZE: &str = "CAREFIND_ENCODE_BATCH_SIZE";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CarefindConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite database file. Relative paths resolve against the project root.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Where downloaded model files live. Defaults to the OS cache directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_encode_batch_size")]
    pub encode_batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            cache_dir: None,
            encode_batch_size: default_encode_batch_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Records committed per transaction.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
        }
    }
}

impl CarefindConfig {
    /// Store path with relative paths resolved against `project_root`.
    #[must_use]
    pub fn store_path(&self, project_root: &Path) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            project_root.join(&self.store.path)
        }
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Takes a lookup function rather than reading the process environment so
    /// callers (and tests) control the source.
    ///
    /// # Errors
    ///
    /// Returns [`CarefindError::Config`] when a numeric override does not parse.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup(ENV_DB).filter(|v| !v.trim().is_empty()) {
            self.store.path = PathBuf::from(path);
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            self.embedding.model = model.trim().to_owned();
        }
        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            self.ingest.batch_size = parse_env_usize(ENV_BATCH_SIZE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_ENCODE_BATCH_SIZE) {
            self.embedding.encode_batch_size = parse_env_usize(ENV_ENCODE_BATCH_SIZE, &raw)?;
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`CarefindError::Config`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("ingest.batch_size", self.ingest.batch_size),
            ("embedding.encode_batch_size", self.embedding.encode_batch_size),
            ("search.default_limit", self.search.default_limit),
        ];
        for (key, value) in checks {
            if value == 0 {
                return Err(CarefindError::Config {
                    origin: key.to_owned(),
                    reason: "must be greater than zero".to_owned(),
                });
            }
        }
        if self.search.default_limit > crate::model::MAX_LIMIT {
            return Err(CarefindError::Config {
                origin: "search.default_limit".to_owned(),
                reason: format!("must not exceed {}", crate::model::MAX_LIMIT),
            });
        }
        if self.embedding.model.trim().is_empty() {
            return Err(CarefindError::Config {
                origin: "embedding.model".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

/// Load a config file. A missing file yields `Ok(None)`.
///
/// # Errors
///
/// Returns [`CarefindError::Config`] if the file exists but cannot be read or
/// parsed.
pub fn load_config_file(path: &Path) -> Result<Option<CarefindConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|err| CarefindError::Config {
        origin: path.display().to_string(),
        reason: format!("failed to read: {err}"),
    })?;

    toml::from_str::<CarefindConfig>(&content)
        .map(Some)
        .map_err(|err| CarefindError::Config {
            origin: path.display().to_string(),
            reason: err.to_string(),
        })
}

/// Path of the per-user config file, if the platform has a config directory.
#[must_use]
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("carefind").join("config.toml"))
}

/// Resolve the effective configuration for `project_root`.
///
/// # Errors
///
/// Returns [`CarefindError::Config`] if a config file is invalid, an
/// environment override does not parse, or the result fails validation.
pub fn resolve_config(project_root: &Path) -> Result<CarefindConfig> {
    let project_file = project_root.join(PROJECT_CONFIG_FILE);
    let mut config = match load_config_file(&project_file)? {
        Some(config) => config,
        None => match user_config_path() {
            Some(path) => load_config_file(&path)?.unwrap_or_default(),
            None => CarefindConfig::default(),
        },
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

fn parse_env_usize(key: &str, raw: &str) -> Result<usize> {
    raw.trim().parse::<usize>().map_err(|err| CarefindError::Config {
        origin: key.to_owned(),
        reason: format!("expected a positive integer, got '{raw}': {err}"),
    })
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".carefind/providers.db")
}

fn default_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

const fn default_encode_batch_size() -> usize {
    512
}

const fn default_batch_size() -> usize {
    500
}

const fn default_limit() -> usize {
    crate::model::DEFAULT_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_project_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let cfg = load_config_file(&dir.path().join(PROJECT_CONFIG_FILE)).expect("load");
        assert!(cfg.is_none());

        let cfg = CarefindConfig::default();
        assert_eq!(cfg.embedding.model, "sentence-transformers/all-MiniLM-L6-v2");
        assert_eq!(cfg.embedding.encode_batch_size, 512);
        assert_eq!(cfg.ingest.batch_size, 500);
        assert_eq!(cfg.search.default_limit, 5);
        assert_eq!(
            cfg.store_path(Path::new("/srv/app")),
            PathBuf::from("/srv/app/.carefind/providers.db")
        );
    }

    #[test]
    fn project_file_overrides_selected_keys() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(PROJECT_CONFIG_FILE);
        std::fs::write(
            &path,
            r#"
[embedding]
model = "hashing-384"

[ingest]
batch_size = 50
"#,
        )
        .expect("write config");

        let cfg = load_config_file(&path).expect("load").expect("present");
        assert_eq!(cfg.embedding.model, "hashing-384");
        assert_eq!(cfg.ingest.batch_size, 50);
        assert_eq!(cfg.embedding.encode_batch_size, 512);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(PROJECT_CONFIG_FILE);
        std::fs::write(&path, "[store]\nurl = \"postgres://\"\n").expect("write config");

        let err = load_config_file(&path).expect_err("unknown key should fail");
        assert!(matches!(err, CarefindError::Config { .. }));
    }

    #[test]
    fn env_overrides_win() {
        let mut cfg = CarefindConfig::default();
        cfg.apply_env(lookup_from(&[
            (ENV_DB, "/tmp/other.db"),
            (ENV_MODEL, " hashing-384 "),
            (ENV_BATCH_SIZE, "25"),
            (ENV_ENCODE_BATCH_SIZE, "64"),
        ]))
        .expect("overrides parse");

        assert_eq!(cfg.store_path(Path::new("/ignored")), PathBuf::from("/tmp/other.db"));
        assert_eq!(cfg.embedding.model, "hashing-384");
        assert_eq!(cfg.ingest.batch_size, 25);
        assert_eq!(cfg.embedding.encode_batch_size, 64);
    }

    #[test]
    fn non_numeric_batch_size_is_a_config_error() {
        let mut cfg = CarefindConfig::default();
        let err = cfg
            .apply_env(lookup_from(&[(ENV_BATCH_SIZE, "lots")]))
            .expect_err("should fail");
        assert!(err.to_string().contains(ENV_BATCH_SIZE));
    }

    #[test]
    fn zero_batch_size_fails_validation() {
        let mut cfg = CarefindConfig::default();
        cfg.ingest.batch_size = 0;
        let err = cfg.validate().expect_err("zero batch");
        assert!(err.to_string().contains("ingest.batch_size"));
    }
}

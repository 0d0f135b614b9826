//! Subcommand handlers.
//!
//! Each handler has the shape `run_x(args, overrides, output, project_root)`
//! and returns `anyhow::Result`; domain failures stay [`CarefindError`]s
//! inside the chain so `main` can surface their codes.
//!
//! [`CarefindError`]: carefind_core::CarefindError

pub mod completions;
pub mod config;
pub mod ingest;
pub mod init;
pub mod search;
pub mod stats;
pub mod tool;
pub mod verify;

use anyhow::Context as _;
use carefind_core::config::{CarefindConfig, resolve_config};
use carefind_core::db::ProviderStore;
use carefind_search::{Encoder, load_encoder};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Global flags that override the layered configuration.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub db: Option<PathBuf>,
    pub model: Option<String>,
}

/// Effective configuration plus the project root it was resolved for.
pub struct Context {
    pub config: CarefindConfig,
    pub project_root: PathBuf,
}

impl Context {
    /// Resolve config files and environment, then apply command-line flags.
    pub fn load(overrides: &Overrides, project_root: &Path) -> anyhow::Result<Self> {
        let mut config = resolve_config(project_root)?;
        if let Some(db) = &overrides.db {
            config.store.path.clone_from(db);
        }
        if let Some(model) = &overrides.model {
            config.embedding.model = model.trim().to_owned();
        }
        config.validate()?;
        Ok(Self {
            config,
            project_root: project_root.to_path_buf(),
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.config.store_path(&self.project_root)
    }

    pub fn open_store(&self) -> anyhow::Result<ProviderStore> {
        let path = self.store_path();
        ProviderStore::open(&path)
            .with_context(|| format!("failed to open provider store at {}", path.display()))
    }

    pub fn load_encoder(&self) -> anyhow::Result<Arc<dyn Encoder>> {
        Ok(load_encoder(&self.config.embedding)?)
    }
}

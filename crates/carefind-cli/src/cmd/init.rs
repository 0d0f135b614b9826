use super::{Context, Overrides};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::{Context as _, Result};
use carefind_core::config::{CarefindConfig, PROJECT_CONFIG_FILE};
use carefind_core::db::migrations::LATEST_SCHEMA_VERSION;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Also write a default `carefind.toml` in the current directory.
    #[arg(long)]
    pub write_config: bool,

    /// Overwrite an existing `carefind.toml` when used with `--write-config`.
    #[arg(long, requires = "write_config")]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitReport {
    store_path: PathBuf,
    schema_version: u32,
    vector_functions: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    config_written: Option<PathBuf>,
}

/// Execute `carefind init`.
///
/// # Errors
///
/// Returns an error if the config file exists without `--force`, or the store
/// cannot be created.
pub fn run_init(
    args: &InitArgs,
    overrides: &Overrides,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let config_written = if args.write_config {
        Some(write_default_config(project_root, args.force)?)
    } else {
        None
    };

    let ctx = Context::load(overrides, project_root)?;
    let store = ctx.open_store()?;
    info!(path = %store.path().display(), "provider store initialized");

    let report = InitReport {
        store_path: store.path().to_path_buf(),
        schema_version: LATEST_SCHEMA_VERSION,
        vector_functions: store.has_vector_functions(),
        config_written,
    };

    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(w, "store\t{}", r.store_path.display())?;
            writeln!(w, "schema_version\t{}", r.schema_version)?;
            if let Some(path) = &r.config_written {
                writeln!(w, "config\t{}", path.display())?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, "Initialized provider store")?;
            pretty_kv(w, "Store", r.store_path.display().to_string())?;
            pretty_kv(w, "Schema", r.schema_version.to_string())?;
            pretty_kv(
                w,
                "Distance",
                if r.vector_functions { "sqlite-vec" } else { "rust" },
            )?;
            if let Some(path) = &r.config_written {
                pretty_kv(w, "Config", path.display().to_string())?;
            }
            Ok(())
        },
    )
}

fn write_default_config(project_root: &Path, force: bool) -> Result<PathBuf> {
    let path = project_root.join(PROJECT_CONFIG_FILE);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use `carefind init --write-config --force` to overwrite.",
            path.display()
        );
    }
    let body = toml::to_string_pretty(&CarefindConfig::default())
        .context("failed to serialize default config")?;
    std::fs::write(&path, body)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

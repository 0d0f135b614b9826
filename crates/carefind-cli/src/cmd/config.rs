use super::{Context, Overrides};
use crate::output::OutputMode;
use anyhow::{Context as _, Result};
use std::io::Write;
use std::path::Path;

/// Execute `carefind config`: print the effective configuration after files,
/// environment and flags are applied. Text and pretty modes print TOML.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or cannot be serialized.
pub fn run_config(overrides: &Overrides, output: OutputMode, project_root: &Path) -> Result<()> {
    let ctx = Context::load(overrides, project_root)?;
    let mut out = std::io::stdout().lock();

    if output.is_json() {
        serde_json::to_writer_pretty(&mut out, &ctx.config)?;
        writeln!(out)?;
    } else {
        let body = toml::to_string_pretty(&ctx.config).context("failed to serialize config")?;
        write!(out, "{body}")?;
        writeln!(out, "# store path resolves to {}", ctx.store_path().display())?;
    }
    Ok(())
}

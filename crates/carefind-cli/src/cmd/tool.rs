use super::{Context, Overrides};
use anyhow::{Context as _, Result};
use carefind_search::tool::descriptor;
use carefind_search::{SearchEngine, SearchTool};
use clap::Args;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

#[derive(Args, Debug)]
pub struct ToolArgs {
    /// Print the tool descriptor (name, description, parameter schema) and exit.
    #[arg(long)]
    pub describe: bool,
}

/// Execute `carefind tool`: serve `search_providers` over stdin/stdout.
///
/// # Errors
///
/// Returns an error if the model or store cannot be loaded, or stdin/stdout
/// fail. Per-request failures are answered in-band.
pub fn run_tool(args: &ToolArgs, overrides: &Overrides, project_root: &Path) -> Result<()> {
    if args.describe {
        let mut out = io::stdout().lock();
        serde_json::to_writer_pretty(&mut out, &descriptor())?;
        writeln!(out)?;
        return Ok(());
    }

    let ctx = Context::load(overrides, project_root)?;
    let engine = SearchEngine::new(ctx.open_store()?, ctx.load_encoder()?);
    let tool = SearchTool::new(engine).with_default_limit(ctx.config.search.default_limit);

    let handled = tool
        .serve_lines(io::stdin().lock(), io::stdout().lock())
        .context("tool bridge I/O failed")?;
    info!(requests = handled, "tool bridge closed");
    Ok(())
}

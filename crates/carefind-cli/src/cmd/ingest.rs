//! `carefind ingest`: embed and upsert a JSON array of provider records.

use super::{Context, Overrides};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::Result;
use carefind_search::IngestPipeline;
use clap::Args;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// JSON file holding an array of provider records.
    #[arg(value_name = "FILE")]
    pub path: PathBuf,

    /// Records per write transaction (overrides config).
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Texts per encoder call (overrides config).
    #[arg(long, value_name = "N")]
    pub encode_batch_size: Option<usize>,
}

/// Execute `carefind ingest`.
///
/// # Errors
///
/// Returns an error if the file is unreadable or malformed, the model cannot
/// be loaded, or the store rejects the writes.
pub fn run_ingest(
    args: &IngestArgs,
    overrides: &Overrides,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let mut ctx = Context::load(overrides, project_root)?;
    if let Some(n) = args.batch_size {
        ctx.config.ingest.batch_size = n;
    }
    if let Some(n) = args.encode_batch_size {
        ctx.config.embedding.encode_batch_size = n;
    }
    ctx.config.validate()?;

    let store = ctx.open_store()?;
    let encoder = ctx.load_encoder()?;
    let pipeline = IngestPipeline::from_config(store, encoder, &ctx.config);
    let report = pipeline.ingest_file(&args.path)?;

    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(
                w,
                "ingested\t{}\tbatches\t{}\tmodel\t{}",
                r.processed, r.batches, r.model
            )
        },
        |r, w| {
            pretty_section(w, "Ingestion complete")?;
            pretty_kv(w, "Records", r.processed.to_string())?;
            pretty_kv(w, "Batches", r.batches.to_string())?;
            pretty_kv(w, "Model", &r.model)?;
            pretty_kv(w, "Elapsed", format!("{} ms", r.elapsed_ms))
        },
    )
}

//! `carefind stats`: row counts and ingestion metadata.

use super::{Context, Overrides};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::Result;
use carefind_core::db::store;
use carefind_core::error::StoreContext;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Report payload for `carefind stats`.
#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub store_path: PathBuf,
    pub providers: i64,
    pub schema_version: u32,
    pub embedding_model: Option<String>,
    pub last_ingest_at: Option<String>,
    pub last_ingest_count: i64,
    pub vector_functions: bool,
}

/// Execute `carefind stats`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or read.
pub fn run_stats(overrides: &Overrides, output: OutputMode, project_root: &Path) -> Result<()> {
    let ctx = Context::load(overrides, project_root)?;
    let provider_store = ctx.open_store()?;
    let conn = provider_store.connect()?;

    let providers = store::count_providers(&conn).store_context("count providers")?;
    let meta = store::read_meta(&conn).store_context("read store metadata")?;

    let payload = StoreStats {
        store_path: provider_store.path().to_path_buf(),
        providers,
        schema_version: meta.schema_version,
        embedding_model: meta.embedding_model,
        last_ingest_at: format_timestamp(meta.last_ingest_at_us),
        last_ingest_count: meta.last_ingest_count,
        vector_functions: provider_store.has_vector_functions(),
    };

    render_mode(
        output,
        &payload,
        |s, w| {
            writeln!(w, "providers\t{}", s.providers)?;
            writeln!(w, "schema_version\t{}", s.schema_version)?;
            writeln!(w, "embedding_model\t{}", s.embedding_model.as_deref().unwrap_or("-"))?;
            writeln!(w, "last_ingest_at\t{}", s.last_ingest_at.as_deref().unwrap_or("-"))?;
            writeln!(w, "last_ingest_count\t{}", s.last_ingest_count)
        },
        |s, w| {
            pretty_section(w, "Provider store")?;
            pretty_kv(w, "Path", s.store_path.display().to_string())?;
            pretty_kv(w, "Providers", s.providers.to_string())?;
            pretty_kv(w, "Schema", s.schema_version.to_string())?;
            pretty_kv(w, "Model", s.embedding_model.as_deref().unwrap_or("(never ingested)"))?;
            pretty_kv(w, "Last ingest", s.last_ingest_at.as_deref().unwrap_or("never"))?;
            pretty_kv(w, "Last count", s.last_ingest_count.to_string())?;
            pretty_kv(
                w,
                "Distance",
                if s.vector_functions { "sqlite-vec" } else { "rust" },
            )
        },
    )
}

/// RFC 3339 timestamp, or `None` for the never-ingested zero value.
fn format_timestamp(at_us: i64) -> Option<String> {
    if at_us <= 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_micros(at_us).map(|dt| dt.to_rfc3339())
}

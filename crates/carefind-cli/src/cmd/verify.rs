//! `carefind verify`: detect embeddings that no longer match their provider.
//!
//! Each row stores a SHA-256 of the descriptive text it was embedded from.
//! A row is stale when recomputing that text today gives a different hash.

use super::{Context, Overrides};
use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use anyhow::Result;
use carefind_core::db::store;
use carefind_core::error::StoreContext;
use carefind_core::model::{ProviderProfile, text_hash_hex};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use tracing::warn;

/// Exit status when at least one row is stale.
const STALE_EXIT_CODE: u8 = 2;

#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub checked: usize,
    pub stale_ids: Vec<i64>,
    pub stored_model: Option<String>,
    pub configured_model: String,
    pub model_matches: bool,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.stale_ids.is_empty()
    }
}

/// Execute `carefind verify`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or read. Stale rows are
/// reported through the exit code, not as an error.
pub fn run_verify(overrides: &Overrides, output: OutputMode, project_root: &Path) -> Result<ExitCode> {
    let ctx = Context::load(overrides, project_root)?;
    let provider_store = ctx.open_store()?;
    let conn = provider_store.connect()?;

    let rows = store::list_profiles_with_hashes(&conn).store_context("list stored providers")?;
    let meta = store::read_meta(&conn).store_context("read store metadata")?;
    let report = check_rows(&rows, meta.embedding_model, &ctx.config.embedding.model);

    if !report.model_matches {
        warn!(
            stored_model = report.stored_model.as_deref().unwrap_or_default(),
            configured_model = %report.configured_model,
            "store was ingested with a different embedding model; re-run `carefind ingest`"
        );
    }

    render_mode(
        output,
        &report,
        |r, w| {
            writeln!(w, "checked\t{}\tstale\t{}", r.checked, r.stale_ids.len())?;
            for id in &r.stale_ids {
                writeln!(w, "stale\t{id}")?;
            }
            Ok(())
        },
        |r, w| {
            pretty_section(w, "Embedding verification")?;
            pretty_kv(w, "Checked", r.checked.to_string())?;
            pretty_kv(w, "Stale", r.stale_ids.len().to_string())?;
            if !r.stale_ids.is_empty() {
                let ids: Vec<String> = r.stale_ids.iter().map(ToString::to_string).collect();
                pretty_kv(w, "Stale ids", ids.join(", "))?;
            }
            pretty_kv(w, "Stored model", r.stored_model.as_deref().unwrap_or("(none)"))?;
            pretty_kv(w, "Config model", &r.configured_model)
        },
    )?;

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(STALE_EXIT_CODE))
    }
}

fn check_rows(
    rows: &[(ProviderProfile, String)],
    stored_model: Option<String>,
    configured_model: &str,
) -> VerifyReport {
    let stale_ids = rows
        .iter()
        .filter(|(profile, hash)| text_hash_hex(&profile.descriptive_text()) != *hash)
        .map(|(profile, _)| profile.id)
        .collect();

    // An empty store has nothing to disagree with.
    let model_matches = stored_model
        .as_deref()
        .is_none_or(|stored| stored == configured_model);

    VerifyReport {
        checked: rows.len(),
        stale_ids,
        stored_model,
        configured_model: configured_model.to_owned(),
        model_matches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: i64, specialty: &str) -> ProviderProfile {
        ProviderProfile {
            id,
            full_name: Some(format!("Dr. {id}")),
            specialty: Some(specialty.to_owned()),
            ..ProviderProfile::default()
        }
    }

    #[test]
    fn matching_hashes_are_clean() {
        let p = profile(1, "Cardiology");
        let hash = text_hash_hex(&p.descriptive_text());
        let report = check_rows(&[(p, hash)], Some("hashing-384".into()), "hashing-384");
        assert!(report.is_clean());
        assert!(report.model_matches);
        assert_eq!(report.checked, 1);
    }

    #[test]
    fn edited_text_is_stale() {
        let before = profile(7, "Cardiology");
        let hash = text_hash_hex(&before.descriptive_text());
        let after = profile(7, "Dermatology");

        let report = check_rows(&[(after, hash)], None, "hashing-384");
        assert_eq!(report.stale_ids, vec![7]);
        assert!(report.model_matches);
    }

    #[test]
    fn model_mismatch_is_reported() {
        let report = check_rows(&[], Some("hashing-384".into()), "sentence-transformers/all-MiniLM-L6-v2");
        assert!(!report.model_matches);
        assert!(report.is_clean());
    }
}

//! `carefind search`: hybrid filtered search from the command line.
//!
//! Flags map one-to-one onto [`SearchQuery`] fields; results come back in
//! ascending distance order with ties broken by provider id.

use super::{Context, Overrides};
use crate::output::{OutputMode, pretty_kv, pretty_rule, render_mode};
use anyhow::Result;
use carefind_core::model::{ProviderMatch, SearchQuery};
use carefind_search::{DistanceBackend, SearchEngine};
use clap::{ArgAction, Args, ValueEnum};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Exact city name.
    #[arg(long)]
    pub city: Option<String>,

    /// Exact two-letter state code.
    #[arg(long)]
    pub state: Option<String>,

    /// Case-insensitive substring of the specialty.
    #[arg(long)]
    pub specialty: Option<String>,

    /// Case-insensitive substring of the provider name.
    #[arg(long = "name", value_name = "TEXT")]
    pub name_contains: Option<String>,

    /// Only providers whose acceptance status equals this value.
    #[arg(long, value_name = "BOOL", action = ArgAction::Set, value_parser = clap::value_parser!(bool))]
    pub accepting: Option<bool>,

    /// Minimum rating, inclusive. Unrated providers never match.
    #[arg(long, value_name = "RATING")]
    pub min_rating: Option<f64>,

    /// Insurance plan the provider must accept.
    #[arg(long)]
    pub insurance: Option<String>,

    /// Language the provider must speak.
    #[arg(long)]
    pub language: Option<String>,

    /// Maximum number of results (defaults to `search.default_limit`).
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Where distances are computed.
    #[arg(long, value_enum, default_value_t = BackendArg::Auto)]
    pub backend: BackendArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    Auto,
    SqliteVec,
    Rust,
}

impl From<BackendArg> for DistanceBackend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Auto => Self::Auto,
            BackendArg::SqliteVec => Self::SqliteVec,
            BackendArg::Rust => Self::Rust,
        }
    }
}

impl SearchArgs {
    pub fn to_query(&self, default_limit: usize) -> SearchQuery {
        SearchQuery {
            city: self.city.clone(),
            state: self.state.clone(),
            specialty: self.specialty.clone(),
            name_contains: self.name_contains.clone(),
            accepting_new_patients: self.accepting,
            min_rating: self.min_rating,
            insurance: self.insurance.clone(),
            language: self.language.clone(),
            limit: self.limit.unwrap_or(default_limit),
        }
    }
}

/// JSON envelope for search output.
#[derive(Debug, Serialize)]
pub struct SearchOutput {
    /// Text that was embedded for ranking.
    pub query_text: String,
    pub count: usize,
    /// Nearest first.
    pub results: Vec<ProviderMatch>,
}

/// Execute `carefind search`.
///
/// # Errors
///
/// Returns an error if the query is invalid, the model or store is
/// unavailable, or writing output fails.
pub fn run_search(
    args: &SearchArgs,
    overrides: &Overrides,
    output: OutputMode,
    project_root: &Path,
) -> Result<()> {
    let ctx = Context::load(overrides, project_root)?;
    let query = args.to_query(ctx.config.search.default_limit);

    let engine = SearchEngine::new(ctx.open_store()?, ctx.load_encoder()?)
        .with_backend(args.backend.into());
    let results = engine.search(&query)?;

    let payload = SearchOutput {
        query_text: query.query_text(),
        count: results.len(),
        results,
    };

    render_mode(output, &payload, render_text, render_pretty)
}

fn render_text(payload: &SearchOutput, w: &mut dyn Write) -> std::io::Result<()> {
    for hit in &payload.results {
        let p = &hit.provider;
        writeln!(
            w,
            "{}\t{:.4}\t{}\t{}\t{}\t{}\t{}",
            p.id,
            hit.distance,
            p.full_name.as_deref().unwrap_or("-"),
            p.specialty.as_deref().unwrap_or("-"),
            p.address.city.as_deref().unwrap_or("-"),
            p.address.state.as_deref().unwrap_or("-"),
            p.rating.map_or_else(|| "-".to_owned(), |r| format!("{r:.1}")),
        )?;
    }
    Ok(())
}

fn render_pretty(payload: &SearchOutput, w: &mut dyn Write) -> std::io::Result<()> {
    if payload.results.is_empty() {
        return writeln!(w, "No providers match \"{}\".", payload.query_text);
    }

    writeln!(
        w,
        "{} provider(s) for \"{}\"",
        payload.count, payload.query_text
    )?;
    pretty_rule(w)?;
    for hit in &payload.results {
        let p = &hit.provider;
        writeln!(
            w,
            "#{}  {}",
            p.id,
            p.full_name.as_deref().unwrap_or("(unnamed)")
        )?;
        if let Some(specialty) = &p.specialty {
            pretty_kv(w, "  Specialty", specialty)?;
        }
        let place = [p.address.city.as_deref(), p.address.state.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");
        if !place.is_empty() {
            pretty_kv(w, "  Location", place)?;
        }
        if let Some(rating) = p.rating {
            pretty_kv(w, "  Rating", format!("{rating:.1}"))?;
        }
        if let Some(accepting) = p.accepting_new_patients {
            pretty_kv(w, "  Accepting", if accepting { "yes" } else { "no" })?;
        }
        if !p.languages.is_empty() {
            pretty_kv(w, "  Languages", p.languages.join(", "))?;
        }
        if !p.insurance_accepted.is_empty() {
            pretty_kv(w, "  Insurance", p.insurance_accepted.join(", "))?;
        }
        pretty_kv(w, "  Distance", format!("{:.4}", hit.distance))?;
        pretty_rule(w)?;
    }
    Ok(())
}

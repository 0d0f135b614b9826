//! Hybrid search: structured filters plus nearest-neighbour ranking.

use crate::rank::{DistanceBackend, rank_providers};
use crate::semantic::Encoder;
use carefind_core::db::ProviderStore;
use carefind_core::db::filter::ProviderFilter;
use carefind_core::db::store;
use carefind_core::error::StoreContext;
use carefind_core::model::{EMBEDDING_DIM, MAX_LIMIT, ProviderMatch, SearchQuery};
use carefind_core::{CarefindError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// Search engine over one store, embedding queries with one encoder.
///
/// Cheap to share across threads: every search opens its own connection.
pub struct SearchEngine {
    store: ProviderStore,
    encoder: Arc<dyn Encoder>,
    backend: DistanceBackend,
    model_checked: AtomicBool,
}

impl SearchEngine {
    #[must_use]
    pub fn new(store: ProviderStore, encoder: Arc<dyn Encoder>) -> Self {
        Self {
            store,
            encoder,
            backend: DistanceBackend::Auto,
            model_checked: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn with_backend(mut self, backend: DistanceBackend) -> Self {
        self.backend = backend;
        self
    }

    #[must_use]
    pub const fn store(&self) -> &ProviderStore {
        &self.store
    }

    #[must_use]
    pub fn encoder(&self) -> &Arc<dyn Encoder> {
        &self.encoder
    }

    /// Run a search.
    ///
    /// Results satisfy every supplied filter, are ordered by ascending
    /// distance (then id), and number at most `query.limit`.
    ///
    /// # Errors
    ///
    /// - [`CarefindError::InvalidQuery`] for a zero or oversized limit, or a
    ///   non-finite `min_rating`
    /// - [`CarefindError::ModelUnavailable`] if the query cannot be embedded
    /// - [`CarefindError::StoreUnavailable`] if the store cannot be queried
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<ProviderMatch>> {
        validate(query)?;
        let started = Instant::now();

        let text = query.query_text();
        let embedding = self.encoder.encode_one(&text)?;
        if embedding.len() != EMBEDDING_DIM {
            return Err(CarefindError::model(
                self.encoder.model_id(),
                format!("query vector has {} dimensions, expected {EMBEDDING_DIM}", embedding.len()),
            ));
        }

        let filter = ProviderFilter::from_query(query);
        let conn = self.store.connect()?;
        self.warn_on_model_mismatch(&conn);

        let matches = rank_providers(
            &conn,
            self.store.has_vector_functions(),
            self.backend,
            &filter,
            &embedding,
            query.limit,
        )?;

        debug!(
            query_text = %text,
            filters = ?filter.fields(),
            limit = query.limit,
            hits = matches.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "provider search"
        );
        Ok(matches)
    }

    fn warn_on_model_mismatch(&self, conn: &rusqlite::Connection) {
        if self.model_checked.swap(true, Ordering::Relaxed) {
            return;
        }
        match store::read_meta(conn).store_context("read store metadata") {
            Ok(meta) => match meta.embedding_model.as_deref() {
                Some(stored) if stored != self.encoder.model_id() => warn!(
                    stored_model = stored,
                    query_model = self.encoder.model_id(),
                    "store was ingested with a different embedding model; distances are not comparable"
                ),
                _ => {}
            },
            Err(err) => debug!("skipping embedding model check: {err}"),
        }
    }
}

fn validate(query: &SearchQuery) -> Result<()> {
    if query.limit == 0 {
        return Err(CarefindError::invalid_query("limit", "must be at least 1"));
    }
    if query.limit > MAX_LIMIT {
        return Err(CarefindError::invalid_query(
            "limit",
            format!("must not exceed {MAX_LIMIT}, got {}", query.limit),
        ));
    }
    if query.min_rating.is_some_and(|rating| !rating.is_finite()) {
        return Err(CarefindError::invalid_query(
            "min_rating",
            "must be a finite number",
        ));
    }
    Ok(())
}

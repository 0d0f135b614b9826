//! Filtered nearest-neighbour ranking over the provider table.
//!
//! Filters are applied first, then the surviving rows are ordered by
//! Euclidean distance to the query vector (ties broken by ascending id), and
//! only then is the limit applied. A vec0 KNN index would apply its own
//! `k` before the substring and membership filters run, so it is not used.

use carefind_core::db::filter::ProviderFilter;
use carefind_core::db::store::{SUMMARY_COLUMNS, SUMMARY_COLUMN_COUNT, decode_embedding, encode_embedding, read_summary};
use carefind_core::error::StoreContext;
use carefind_core::model::ProviderMatch;
use carefind_core::{CarefindError, Result};
use rusqlite::Connection;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::semantic::l2_distance;

/// Where distances are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistanceBackend {
    /// sqlite-vec when the store has it, otherwise Rust.
    #[default]
    Auto,
    /// `vec_distance_l2` inside SQLite.
    SqliteVec,
    /// Load filtered embeddings and compute distances in Rust.
    Rust,
}

impl DistanceBackend {
    fn resolve(self, vector_functions: bool) -> Result<Self> {
        match self {
            Self::Auto if vector_functions => Ok(Self::SqliteVec),
            Self::Auto | Self::Rust => Ok(Self::Rust),
            Self::SqliteVec if vector_functions => Ok(Self::SqliteVec),
            Self::SqliteVec => Err(CarefindError::store(
                "sqlite-vec distance requested",
                "vec_distance_l2 is not registered on this connection",
            )),
        }
    }
}

/// Rank providers matching `filter` by distance to `query`, nearest first.
///
/// # Errors
///
/// Returns [`CarefindError::StoreUnavailable`] if the query fails or the
/// requested backend is not available.
pub fn rank_providers(
    conn: &Connection,
    vector_functions: bool,
    backend: DistanceBackend,
    filter: &ProviderFilter,
    query: &[f32],
    limit: usize,
) -> Result<Vec<ProviderMatch>> {
    match backend.resolve(vector_functions)? {
        DistanceBackend::SqliteVec => rank_in_sqlite(conn, filter, query, limit),
        DistanceBackend::Rust | DistanceBackend::Auto => rank_in_rust(conn, filter, query, limit),
    }
}

fn rank_in_sqlite(
    conn: &Connection,
    filter: &ProviderFilter,
    query: &[f32],
    limit: usize,
) -> Result<Vec<ProviderMatch>> {
    let sql = format!(
        "SELECT {SUMMARY_COLUMNS}, vec_distance_l2(p.embedding, ?) AS distance
         FROM providers p
         {}
         ORDER BY distance ASC, p.id ASC
         LIMIT ?",
        filter.where_sql()
    );

    let mut params = Vec::with_capacity(filter.clauses().len() + 2);
    params.push(Value::Blob(encode_embedding(query)));
    params.extend(filter.params());
    params.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));

    let mut stmt = conn
        .prepare_cached(&sql)
        .store_context("prepare sqlite-vec ranking query")?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), |row| {
            let provider = read_summary(row)?;
            let distance: f64 = row.get(SUMMARY_COLUMN_COUNT)?;
            #[allow(clippy::cast_possible_truncation)]
            let distance = distance as f32;
            Ok(ProviderMatch { provider, distance })
        })
        .store_context("run sqlite-vec ranking query")?;

    let matches = rows
        .collect::<rusqlite::Result<Vec<_>>>()
        .store_context("read sqlite-vec ranking row")?;
    debug!(backend = "sqlite-vec", rows = matches.len(), "ranked providers");
    Ok(matches)
}

fn rank_in_rust(
    conn: &Connection,
    filter: &ProviderFilter,
    query: &[f32],
    limit: usize,
) -> Result<Vec<ProviderMatch>> {
    let sql = format!(
        "SELECT {SUMMARY_COLUMNS}, p.embedding FROM providers p {}",
        filter.where_sql()
    );

    let mut stmt = conn
        .prepare_cached(&sql)
        .store_context("prepare ranking query")?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(filter.params()), |row| {
            Ok((read_summary(row)?, row.get::<_, Vec<u8>>(SUMMARY_COLUMN_COUNT)?))
        })
        .store_context("run ranking query")?;

    let mut matches = Vec::new();
    for row in rows {
        let (provider, blob) = row.store_context("read ranking row")?;
        let Some(embedding) = decode_embedding(&blob) else {
            return Err(CarefindError::store(
                format!("decode embedding of provider {}", provider.id),
                format!("embedding blob has {} bytes", blob.len()),
            ));
        };
        let distance = l2_distance(query, &embedding);
        matches.push(ProviderMatch { provider, distance });
    }

    matches.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.provider.id.cmp(&b.provider.id))
    });
    matches.truncate(limit);
    debug!(backend = "rust", rows = matches.len(), "ranked providers");
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_prefers_sqlite_vec_when_present() {
        assert_eq!(
            DistanceBackend::Auto.resolve(true).expect("resolve"),
            DistanceBackend::SqliteVec
        );
        assert_eq!(
            DistanceBackend::Auto.resolve(false).expect("resolve"),
            DistanceBackend::Rust
        );
        assert_eq!(
            DistanceBackend::Rust.resolve(true).expect("resolve"),
            DistanceBackend::Rust
        );
    }

    #[test]
    fn forced_sqlite_vec_without_functions_is_store_error() {
        let err = DistanceBackend::SqliteVec
            .resolve(false)
            .expect_err("missing functions");
        assert_eq!(err.code(), carefind_core::ErrorCode::StoreUnavailable);
    }

    #[test]
    fn backend_names_are_kebab_case() {
        let json = serde_json::to_string(&DistanceBackend::SqliteVec).expect("serialize");
        assert_eq!(json, "\"sqlite-vec\"");
    }

    #[test]
    fn malformed_embedding_is_store_error_on_rust_path() {
        use carefind_core::db::{ProviderStore, store};
        use carefind_core::model::{EMBEDDING_DIM, ProviderProfile, ProviderRecord, SearchQuery};

        let dir = tempfile::tempdir().expect("create temp dir");
        let store = ProviderStore::open(&dir.path().join("providers.db")).expect("open store");
        let mut conn = store.connect().expect("connect");
        let profile = ProviderProfile {
            id: 1,
            ..ProviderProfile::default()
        };
        let tx = conn.transaction().expect("begin");
        store::upsert_providers(&tx, &[ProviderRecord::new(profile, vec![0.5; EMBEDDING_DIM])], 1)
            .expect("upsert");
        tx.commit().expect("commit");

        // Bypass the length CHECK to simulate a truncated blob on disk.
        conn.execute_batch(
            "PRAGMA ignore_check_constraints = ON;
             UPDATE providers SET embedding = x'00000000' WHERE id = 1;
             PRAGMA ignore_check_constraints = OFF;",
        )
        .expect("corrupt embedding");

        let filter = ProviderFilter::from_query(&SearchQuery::default());
        let err = rank_providers(
            &conn,
            false,
            DistanceBackend::Rust,
            &filter,
            &[0.0; EMBEDDING_DIM],
            5,
        )
        .expect_err("malformed blob");
        assert_eq!(err.code(), carefind_core::ErrorCode::StoreUnavailable);
    }
}

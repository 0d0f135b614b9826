//! Row-level reads and writes against the provider tables.
//!
//! Functions take a plain `&Connection`; pass a `&Transaction` (it derefs)
//! when several calls must commit together.

use crate::model::{Address, EMBEDDING_DIM, ProviderProfile, ProviderRecord, ProviderSummary, StoreMeta};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::trace;

/// Columns needed to build a [`ProviderSummary`], in [`read_summary`] order.
/// Expects `providers` aliased as `p`.
pub const SUMMARY_COLUMNS: &str = "p.id, p.full_name, p.specialty, p.phone, p.email, \
     p.address_street, p.address_city, p.address_state, p.address_postal_code, \
     p.accepting_new_patients, p.rating, p.insurance_accepted, p.languages";

/// Number of columns in [`SUMMARY_COLUMNS`].
pub const SUMMARY_COLUMN_COUNT: usize = 13;

const PROFILE_COLUMNS: &str = "p.id, p.full_name, p.specialty, p.phone, p.email, \
     p.address_street, p.address_city, p.address_state, p.address_postal_code, \
     p.accepting_new_patients, p.rating, p.insurance_accepted, p.languages, \
     p.years_experience, p.license_number, p.board_certified, p.embedding_text_hash";

const UPSERT_SQL: &str = "INSERT INTO providers (
        id, full_name, specialty, phone, email,
        address_street, address_city, address_state, address_postal_code,
        years_experience, accepting_new_patients, insurance_accepted, rating,
        license_number, board_certified, languages,
        embedding, embedding_text_hash, updated_at_us
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
    ON CONFLICT(id) DO UPDATE SET
        full_name = excluded.full_name,
        specialty = excluded.specialty,
        phone = excluded.phone,
        email = excluded.email,
        address_street = excluded.address_street,
        address_city = excluded.address_city,
        address_state = excluded.address_state,
        address_postal_code = excluded.address_postal_code,
        years_experience = excluded.years_experience,
        accepting_new_patients = excluded.accepting_new_patients,
        insurance_accepted = excluded.insurance_accepted,
        rating = excluded.rating,
        license_number = excluded.license_number,
        board_certified = excluded.board_certified,
        languages = excluded.languages,
        embedding = excluded.embedding,
        embedding_text_hash = excluded.embedding_text_hash,
        updated_at_us = excluded.updated_at_us";

/// Current wall-clock time in microseconds since the Unix epoch.
#[must_use]
pub fn now_us() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// Serialize an embedding as little-endian `f32` bytes.
#[must_use]
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Parse a little-endian `f32` blob of exactly [`EMBEDDING_DIM`] floats.
#[must_use]
pub fn decode_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() != EMBEDDING_DIM * 4 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Insert or update each record by id, then rewrite its membership rows.
///
/// Uses `ON CONFLICT DO UPDATE` rather than `REPLACE` so the provider row is
/// never deleted (a delete would cascade through the membership tables).
///
/// # Errors
///
/// Returns the first SQLite error; the caller's transaction should then be
/// dropped so nothing from the batch is kept.
pub fn upsert_providers(
    conn: &Connection,
    records: &[ProviderRecord],
    updated_at_us: i64,
) -> rusqlite::Result<usize> {
    let mut upsert = conn.prepare_cached(UPSERT_SQL)?;
    let mut clear_insurance =
        conn.prepare_cached("DELETE FROM provider_insurance WHERE provider_id = ?1")?;
    let mut clear_languages =
        conn.prepare_cached("DELETE FROM provider_languages WHERE provider_id = ?1")?;
    let mut add_insurance = conn.prepare_cached(
        "INSERT OR IGNORE INTO provider_insurance (provider_id, plan) VALUES (?1, ?2)",
    )?;
    let mut add_language = conn.prepare_cached(
        "INSERT OR IGNORE INTO provider_languages (provider_id, language) VALUES (?1, ?2)",
    )?;

    for record in records {
        let profile = &record.profile;
        upsert.execute(params![
            profile.id,
            profile.full_name,
            profile.specialty,
            profile.phone,
            profile.email,
            profile.address.street,
            profile.address.city,
            profile.address.state,
            profile.address.postal_code,
            profile.years_experience,
            profile.accepting_new_patients,
            json_list(&profile.insurance_accepted)?,
            profile.rating,
            profile.license_number,
            profile.board_certified,
            json_list(&profile.languages)?,
            encode_embedding(&record.embedding),
            record.embedding_text_hash,
            updated_at_us,
        ])?;

        clear_insurance.execute([profile.id])?;
        clear_languages.execute([profile.id])?;
        for plan in &profile.insurance_accepted {
            add_insurance.execute(params![profile.id, plan])?;
        }
        for language in &profile.languages {
            add_language.execute(params![profile.id, language])?;
        }
        trace!(id = profile.id, "upserted provider");
    }

    Ok(records.len())
}

/// Build a [`ProviderSummary`] from a row selected with [`SUMMARY_COLUMNS`]
/// as its leading columns.
///
/// # Errors
///
/// Returns an error when a column has an unexpected type or a list column
/// holds invalid JSON.
pub fn read_summary(row: &Row<'_>) -> rusqlite::Result<ProviderSummary> {
    Ok(ProviderSummary {
        id: row.get(0)?,
        full_name: row.get(1)?,
        specialty: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        address: Address {
            street: row.get(5)?,
            city: row.get(6)?,
            state: row.get(7)?,
            postal_code: row.get(8)?,
        },
        accepting_new_patients: row.get(9)?,
        rating: row.get(10)?,
        insurance_accepted: list_column(row, 11)?,
        languages: list_column(row, 12)?,
    })
}

fn read_profile(row: &Row<'_>) -> rusqlite::Result<(ProviderProfile, String)> {
    let summary = read_summary(row)?;
    let profile = ProviderProfile {
        id: summary.id,
        full_name: summary.full_name,
        specialty: summary.specialty,
        phone: summary.phone,
        email: summary.email,
        address: summary.address,
        years_experience: row.get(13)?,
        accepting_new_patients: summary.accepting_new_patients,
        insurance_accepted: summary.insurance_accepted,
        rating: summary.rating,
        license_number: row.get(14)?,
        board_certified: row.get(15)?,
        languages: summary.languages,
    };
    Ok((profile, row.get(16)?))
}

/// Fetch one provider's full profile by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_provider(conn: &Connection, id: i64) -> rusqlite::Result<Option<ProviderProfile>> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM providers p WHERE p.id = ?1");
    conn.query_row(&sql, [id], read_profile)
        .optional()
        .map(|found| found.map(|(profile, _)| profile))
}

/// Every stored profile with its recorded embedding-text hash, ordered by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list_profiles_with_hashes(conn: &Connection) -> rusqlite::Result<Vec<(ProviderProfile, String)>> {
    let sql = format!("SELECT {PROFILE_COLUMNS} FROM providers p ORDER BY p.id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], read_profile)?;
    rows.collect()
}

/// # Errors
///
/// Returns an error if the query fails.
pub fn count_providers(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM providers", [], |row| row.get(0))
}

/// Read the single `store_meta` row.
///
/// # Errors
///
/// Returns an error if the row is missing or has unexpected types.
pub fn read_meta(conn: &Connection) -> rusqlite::Result<StoreMeta> {
    conn.query_row(
        "SELECT schema_version, embedding_model, last_ingest_at_us, last_ingest_count
         FROM store_meta WHERE id = 1",
        [],
        |row| {
            let version: i64 = row.get(0)?;
            Ok(StoreMeta {
                schema_version: u32::try_from(version).map_err(|err| {
                    rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(err))
                })?,
                embedding_model: row.get(1)?,
                last_ingest_at_us: row.get(2)?,
                last_ingest_count: row.get(3)?,
            })
        },
    )
}

/// Stamp the metadata row after an ingestion run.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn record_ingest(
    conn: &Connection,
    embedding_model: &str,
    at_us: i64,
    count: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE store_meta
         SET embedding_model = ?1, last_ingest_at_us = ?2, last_ingest_count = ?3
         WHERE id = 1",
        params![embedding_model, at_us, count],
    )?;
    Ok(())
}

fn json_list(values: &[String]) -> rusqlite::Result<String> {
    serde_json::to_string(values).map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))
}

fn list_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(Vec::new()),
        Some(text) => serde_json::from_str(&text)
            .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;

    fn store() -> Connection {
        let mut conn = Connection::open_in_memory().expect("open in-memory sqlite");
        conn.pragma_update(None, "foreign_keys", "ON").expect("enable fk");
        migrations::migrate(&mut conn).expect("migrate");
        conn
    }

    fn record(id: i64, city: &str, languages: &[&str]) -> ProviderRecord {
        let profile = ProviderProfile {
            id,
            full_name: Some(format!("Dr. Number {id}")),
            specialty: Some("Cardiology".into()),
            address: Address {
                city: Some(city.into()),
                state: Some("TX".into()),
                ..Address::default()
            },
            accepting_new_patients: Some(true),
            rating: Some(4.5),
            insurance_accepted: vec!["Aetna".into()],
            languages: languages.iter().map(|l| (*l).to_string()).collect(),
            years_experience: Some(12),
            ..ProviderProfile::default()
        };
        let mut embedding = vec![0.0; EMBEDDING_DIM];
        embedding[0] = 1.0;
        ProviderRecord::new(profile, embedding)
    }

    fn languages_of(conn: &Connection, id: i64) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT language FROM provider_languages WHERE provider_id = ?1 ORDER BY language")
            .expect("prepare");
        stmt.query_map([id], |row| row.get(0))
            .expect("query")
            .collect::<rusqlite::Result<_>>()
            .expect("collect")
    }

    #[test]
    fn embedding_blob_round_trips_and_rejects_wrong_length() {
        let vector: Vec<f32> = (0..EMBEDDING_DIM).map(|i| i as f32 / 10.0).collect();
        let blob = encode_embedding(&vector);
        assert_eq!(blob.len(), EMBEDDING_DIM * 4);
        assert_eq!(decode_embedding(&blob), Some(vector));
        assert_eq!(decode_embedding(&blob[..12]), None);
    }

    #[test]
    fn upsert_twice_keeps_one_row_with_latest_values() {
        let conn = store();
        upsert_providers(&conn, &[record(1, "Austin", &["English"])], 10).expect("first");
        upsert_providers(&conn, &[record(1, "Dallas", &["Spanish"])], 20).expect("second");

        assert_eq!(count_providers(&conn).expect("count"), 1);
        let profile = get_provider(&conn, 1).expect("get").expect("present");
        assert_eq!(profile.address.city.as_deref(), Some("Dallas"));
        assert_eq!(profile.languages, vec!["Spanish".to_string()]);
        assert_eq!(profile.years_experience, Some(12));
    }

    #[test]
    fn upsert_rewrites_membership_rows() {
        let conn = store();
        upsert_providers(&conn, &[record(5, "Austin", &["English", "Spanish"])], 1).expect("first");
        assert_eq!(languages_of(&conn, 5), vec!["English", "Spanish"]);

        upsert_providers(&conn, &[record(5, "Austin", &["French"])], 2).expect("second");
        assert_eq!(languages_of(&conn, 5), vec!["French"]);
    }

    #[test]
    fn duplicate_list_values_keep_order_in_row_but_dedupe_membership() {
        let conn = store();
        upsert_providers(&conn, &[record(9, "Austin", &["Spanish", "English", "Spanish"])], 1)
            .expect("upsert");

        let profile = get_provider(&conn, 9).expect("get").expect("present");
        assert_eq!(profile.languages, vec!["Spanish", "English", "Spanish"]);
        assert_eq!(languages_of(&conn, 9), vec!["English", "Spanish"]);
    }

    #[test]
    fn summary_reader_handles_null_lists() {
        let conn = store();
        upsert_providers(&conn, &[record(3, "Austin", &[])], 1).expect("upsert");
        conn.execute(
            "UPDATE providers SET full_name = NULL, rating = NULL WHERE id = 3",
            [],
        )
        .expect("null out");

        let sql = format!("SELECT {SUMMARY_COLUMNS} FROM providers p WHERE p.id = 3");
        let summary = conn.query_row(&sql, [], read_summary).expect("read summary");
        assert_eq!(summary.full_name, None);
        assert_eq!(summary.rating, None);
        assert!(summary.languages.is_empty());
        assert_eq!(summary.insurance_accepted, vec!["Aetna"]);
    }

    #[test]
    fn missing_provider_is_none() {
        let conn = store();
        assert!(get_provider(&conn, 404).expect("get").is_none());
    }

    #[test]
    fn meta_records_last_ingest() {
        let conn = store();
        let fresh = read_meta(&conn).expect("meta");
        assert_eq!(fresh.schema_version, migrations::LATEST_SCHEMA_VERSION);
        assert_eq!(fresh.embedding_model, None);

        record_ingest(&conn, "hashing-384", 1_700_000_000_000_000, 3).expect("record");
        let meta = read_meta(&conn).expect("meta");
        assert_eq!(meta.embedding_model.as_deref(), Some("hashing-384"));
        assert_eq!(meta.last_ingest_count, 3);
        assert_eq!(meta.last_ingest_at_us, 1_700_000_000_000_000);
    }

    #[test]
    fn profiles_with_hashes_are_ordered_by_id() {
        let conn = store();
        upsert_providers(
            &conn,
            &[record(2, "Dallas", &[]), record(1, "Austin", &[])],
            1,
        )
        .expect("upsert");

        let listed = list_profiles_with_hashes(&conn).expect("list");
        let ids: Vec<i64> = listed.iter().map(|(p, _)| p.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(listed[0].1, record(1, "Austin", &[]).embedding_text_hash);
    }
}

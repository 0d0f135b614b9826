//! Provider ingestion: validate, derive text, embed, upsert.
//!
//! The whole input is validated before anything is written, so a malformed
//! record never leaves a half-applied run behind. Writes then happen in
//! batches, one transaction each. If a later batch fails, earlier batches
//! stay committed; re-running the same input is idempotent.

use crate::semantic::{Encoder, encode_checked};
use carefind_core::config::CarefindConfig;
use carefind_core::db::ProviderStore;
use carefind_core::db::store;
use carefind_core::error::StoreContext;
use carefind_core::model::{Address, ProviderProfile, ProviderRecord};
use carefind_core::{CarefindError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Outcome of one ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Records processed: the input length, duplicates included.
    pub processed: usize,
    pub batches: usize,
    pub model: String,
    pub elapsed_ms: u64,
}

/// Batch embed-and-upsert pipeline bound to one store and one encoder.
pub struct IngestPipeline {
    store: ProviderStore,
    encoder: Arc<dyn Encoder>,
    batch_size: usize,
    encode_batch_size: usize,
}

impl IngestPipeline {
    #[must_use]
    pub fn new(store: ProviderStore, encoder: Arc<dyn Encoder>) -> Self {
        let defaults = CarefindConfig::default();
        Self {
            store,
            encoder,
            batch_size: defaults.ingest.batch_size,
            encode_batch_size: defaults.embedding.encode_batch_size,
        }
    }

    /// Pipeline using the batch sizes from `config`.
    #[must_use]
    pub fn from_config(
        store: ProviderStore,
        encoder: Arc<dyn Encoder>,
        config: &CarefindConfig,
    ) -> Self {
        Self::new(store, encoder)
            .with_batch_size(config.ingest.batch_size)
            .with_encode_batch_size(config.embedding.encode_batch_size)
    }

    /// Records per write transaction. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Texts per encoder call. Zero is treated as one.
    #[must_use]
    pub fn with_encode_batch_size(mut self, encode_batch_size: usize) -> Self {
        self.encode_batch_size = encode_batch_size.max(1);
        self
    }

    /// Validate and upsert raw JSON provider records.
    ///
    /// # Errors
    ///
    /// - [`CarefindError::MalformedRecord`] before any write if a record is invalid
    /// - [`CarefindError::ModelUnavailable`] if encoding fails
    /// - [`CarefindError::StoreUnavailable`] if a write fails
    pub fn upsert(&self, records: &[Value]) -> Result<IngestReport> {
        let profiles = records
            .iter()
            .enumerate()
            .map(|(position, raw)| parse_record(position, raw))
            .collect::<Result<Vec<_>>>()?;
        self.upsert_profiles(&profiles)
    }

    /// Upsert already-validated profiles.
    ///
    /// # Errors
    ///
    /// Same as [`Self::upsert`], minus validation.
    pub fn upsert_profiles(&self, profiles: &[ProviderProfile]) -> Result<IngestReport> {
        let started = Instant::now();
        let mut conn = self.store.connect()?;
        let mut batches = 0;

        for batch in profiles.chunks(self.batch_size) {
            let records = self.embed_batch(batch)?;

            let tx = conn
                .transaction()
                .store_context("begin ingestion transaction")?;
            store::upsert_providers(&tx, &records, store::now_us())
                .store_context("upsert provider batch")?;
            tx.commit().store_context("commit provider batch")?;

            batches += 1;
            debug!(batch = batches, records = records.len(), "committed provider batch");
        }

        let processed = profiles.len();
        store::record_ingest(
            &conn,
            self.encoder.model_id(),
            store::now_us(),
            i64::try_from(processed).unwrap_or(i64::MAX),
        )
        .store_context("update store metadata")?;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            processed,
            batches,
            model = self.encoder.model_id(),
            elapsed_ms,
            "ingestion complete"
        );

        Ok(IngestReport {
            processed,
            batches,
            model: self.encoder.model_id().to_owned(),
            elapsed_ms,
        })
    }

    /// Read a JSON array of provider records from `path` and upsert it.
    ///
    /// # Errors
    ///
    /// An unreadable file or a document that is not a JSON array is reported
    /// as [`CarefindError::MalformedRecord`] at position 0. Otherwise as
    /// [`Self::upsert`].
    pub fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let records = read_records(path)?;
        info!(path = %path.display(), records = records.len(), "ingesting provider file");
        self.upsert(&records)
    }

    fn embed_batch(&self, batch: &[ProviderProfile]) -> Result<Vec<ProviderRecord>> {
        let texts: Vec<String> = batch.iter().map(ProviderProfile::descriptive_text).collect();
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.encode_batch_size) {
            let refs: Vec<&str> = chunk.iter().map(String::as_str).collect();
            vectors.extend(encode_checked(self.encoder.as_ref(), &refs)?);
        }

        Ok(batch
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(profile, embedding)| ProviderRecord::new(profile, embedding))
            .collect())
    }
}

/// Read the raw records of a JSON array file.
///
/// # Errors
///
/// Returns [`CarefindError::MalformedRecord`] at position 0 when the file
/// cannot be read or is not a JSON array.
pub fn read_records(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        CarefindError::malformed(0, None, format!("cannot read {}: {err}", path.display()))
    })?;
    let document: Value = serde_json::from_str(&content).map_err(|err| {
        CarefindError::malformed(0, None, format!("invalid JSON in {}: {err}", path.display()))
    })?;
    match document {
        Value::Array(records) => Ok(records),
        other => Err(CarefindError::malformed(
            0,
            None,
            format!("expected a JSON array of records, found {}", json_kind(&other)),
        )),
    }
}

/// Validate one raw record and convert it to a [`ProviderProfile`].
///
/// Unknown fields are ignored. List items that are `null` are dropped;
/// non-string items are kept as their JSON text.
///
/// # Errors
///
/// Returns [`CarefindError::MalformedRecord`] naming `position`, the id when
/// one could be read, and the offending field.
pub fn parse_record(position: usize, raw: &Value) -> Result<ProviderProfile> {
    let Some(obj) = raw.as_object() else {
        return Err(CarefindError::malformed(
            position,
            None,
            format!("expected a JSON object, found {}", json_kind(raw)),
        ));
    };

    let id = match obj.get("id") {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
            CarefindError::malformed(position, None, format!("'id' must be an integer, found {n}"))
        })?,
        Some(other) => {
            return Err(CarefindError::malformed(
                position,
                None,
                format!("'id' must be an integer, found {}", json_kind(other)),
            ));
        }
        None => return Err(CarefindError::malformed(position, None, "missing 'id'")),
    };

    let fields = Fields {
        obj,
        position,
        id,
    };
    let address = match obj.get("address") {
        None | Some(Value::Null) => Address::default(),
        Some(Value::Object(addr)) => {
            let nested = Fields {
                obj: addr,
                position,
                id,
            };
            Address {
                street: nested.text("street", "address.street")?,
                city: nested.text("city", "address.city")?,
                state: nested.text("state", "address.state")?,
                postal_code: nested.text("postal_code", "address.postal_code")?,
            }
        }
        Some(other) => return Err(fields.wrong_type("address", "an object", other)),
    };

    Ok(ProviderProfile {
        id,
        full_name: fields.text("full_name", "full_name")?,
        specialty: fields.text("specialty", "specialty")?,
        phone: fields.text("phone", "phone")?,
        email: fields.text("email", "email")?,
        address,
        years_experience: fields.integer("years_experience")?,
        accepting_new_patients: fields.boolean("accepting_new_patients")?,
        insurance_accepted: fields.list("insurance_accepted")?,
        rating: fields.number("rating")?,
        license_number: fields.text("license_number", "license_number")?,
        board_certified: fields.boolean("board_certified")?,
        languages: fields.list("languages")?,
    })
}

struct Fields<'a> {
    obj: &'a Map<String, Value>,
    position: usize,
    id: i64,
}

impl Fields<'_> {
    fn present(&self, key: &str) -> Option<&Value> {
        self.obj.get(key).filter(|v| !v.is_null())
    }

    fn wrong_type(&self, label: &str, expected: &str, found: &Value) -> CarefindError {
        CarefindError::malformed(
            self.position,
            Some(self.id),
            format!(
                "'{label}' must be {expected} or null, found {}",
                json_kind(found)
            ),
        )
    }

    fn text(&self, key: &str, label: &str) -> Result<Option<String>> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.wrong_type(label, "a string", other)),
        }
    }

    fn integer(&self, key: &str) -> Result<Option<i64>> {
        match self.present(key) {
            None => Ok(None),
            Some(value @ Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.wrong_type(key, "an integer", value)),
            Some(other) => Err(self.wrong_type(key, "an integer", other)),
        }
    }

    fn number(&self, key: &str) -> Result<Option<f64>> {
        match self.present(key) {
            None => Ok(None),
            Some(value @ Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.wrong_type(key, "a number", value)),
            Some(other) => Err(self.wrong_type(key, "a number", other)),
        }
    }

    fn boolean(&self, key: &str) -> Result<Option<bool>> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.wrong_type(key, "a boolean", other)),
        }
    }

    fn list(&self, key: &str) -> Result<Vec<String>> {
        match self.present(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items
                .iter()
                .filter_map(|item| match item {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => Some(other.to_string()),
                })
                .collect()),
            Some(other) => Err(self.wrong_type(key, "an array", other)),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "an integer",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

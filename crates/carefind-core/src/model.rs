//! Provider data model.
//!
//! Three shapes of a provider exist:
//! - [`ProviderProfile`]: the source fields, as read from the ingestion input.
//! - [`ProviderRecord`]: the storage row, a profile plus its derived embedding.
//! - [`ProviderSummary`]: the caller-facing projection returned by search.
//!
//! The embedding vector never leaves [`ProviderRecord`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Dimensionality of every stored and query embedding.
pub const EMBEDDING_DIM: usize = 384;

/// Default number of search results.
pub const DEFAULT_LIMIT: usize = 5;

/// Largest `limit` a single search may request.
pub const MAX_LIMIT: usize = 100;

/// Query text used when a search carries no free-text signal at all.
pub const FALLBACK_QUERY_TEXT: &str = "providers";

/// Postal address. Every component is optional in the source data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

/// Source fields of one provider, prior to embedding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub id: i64,
    pub full_name: Option<String>,
    pub specialty: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Address,
    pub years_experience: Option<i64>,
    pub accepting_new_patients: Option<bool>,
    pub insurance_accepted: Vec<String>,
    pub rating: Option<f64>,
    pub license_number: Option<String>,
    pub board_certified: Option<bool>,
    pub languages: Vec<String>,
}

impl ProviderProfile {
    /// Text the provider's embedding is computed from.
    ///
    /// Name, specialty, city, state, comma-joined languages and comma-joined
    /// insurance plans, space-separated in that order. Missing components
    /// contribute an empty string; the result is trimmed.
    #[must_use]
    pub fn descriptive_text(&self) -> String {
        let parts = [
            self.full_name.as_deref().unwrap_or_default().to_owned(),
            self.specialty.as_deref().unwrap_or_default().to_owned(),
            self.address.city.as_deref().unwrap_or_default().to_owned(),
            self.address.state.as_deref().unwrap_or_default().to_owned(),
            self.languages.join(","),
            self.insurance_accepted.join(","),
        ];
        parts.join(" ").trim().to_owned()
    }
}

/// A provider row as persisted, including the derived embedding.
///
/// Only [`ProviderRecord::new`] builds one, so `embedding_text_hash` always
/// describes the text the caller embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRecord {
    pub profile: ProviderProfile,
    pub embedding: Vec<f32>,
    pub embedding_text_hash: String,
}

impl ProviderRecord {
    #[must_use]
    pub fn new(profile: ProviderProfile, embedding: Vec<f32>) -> Self {
        let embedding_text_hash = text_hash_hex(&profile.descriptive_text());
        Self {
            profile,
            embedding,
            embedding_text_hash,
        }
    }

    #[must_use]
    pub const fn id(&self) -> i64 {
        self.profile.id
    }
}

/// Caller-visible projection of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub id: i64,
    pub full_name: Option<String>,
    pub specialty: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Address,
    pub accepting_new_patients: Option<bool>,
    pub rating: Option<f64>,
    #[serde(default)]
    pub insurance_accepted: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
}

impl From<&ProviderProfile> for ProviderSummary {
    fn from(profile: &ProviderProfile) -> Self {
        Self {
            id: profile.id,
            full_name: profile.full_name.clone(),
            specialty: profile.specialty.clone(),
            phone: profile.phone.clone(),
            email: profile.email.clone(),
            address: profile.address.clone(),
            accepting_new_patients: profile.accepting_new_patients,
            rating: profile.rating,
            insurance_accepted: profile.insurance_accepted.clone(),
            languages: profile.languages.clone(),
        }
    }
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderMatch {
    pub provider: ProviderSummary,
    /// Euclidean distance between the provider and query embeddings.
    pub distance: f32,
}

/// A provider search request.
///
/// Every filter is optional; supplied filters combine with AND. Blank
/// strings count as "not supplied".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchQuery {
    /// Exact match on the address city.
    pub city: Option<String>,
    /// Exact match on the two-letter address state.
    pub state: Option<String>,
    /// Case-insensitive substring of the specialty.
    pub specialty: Option<String>,
    /// Case-insensitive substring of the full name.
    pub name_contains: Option<String>,
    pub accepting_new_patients: Option<bool>,
    /// Inclusive lower bound on rating; unrated providers never match.
    pub min_rating: Option<f64>,
    /// Plan that must appear in `insurance_accepted`.
    pub insurance: Option<String>,
    /// Language that must appear in `languages`.
    pub language: Option<String>,
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            city: None,
            state: None,
            specialty: None,
            name_contains: None,
            accepting_new_patients: None,
            min_rating: None,
            insurance: None,
            language: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl SearchQuery {
    /// Synthetic text to embed for this query.
    ///
    /// Non-blank values of name, specialty, city, state, insurance and
    /// language, space-joined in that order, or [`FALLBACK_QUERY_TEXT`].
    #[must_use]
    pub fn query_text(&self) -> String {
        let parts: Vec<&str> = [
            &self.name_contains,
            &self.specialty,
            &self.city,
            &self.state,
            &self.insurance,
            &self.language,
        ]
        .into_iter()
        .filter_map(|value| non_blank(value.as_deref()))
        .collect();

        if parts.is_empty() {
            FALLBACK_QUERY_TEXT.to_owned()
        } else {
            parts.join(" ")
        }
    }
}

/// Trimmed value, or `None` when absent or blank.
#[must_use]
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Single-row store metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreMeta {
    pub schema_version: u32,
    /// Model identifier used by the most recent ingestion.
    pub embedding_model: Option<String>,
    pub last_ingest_at_us: i64,
    pub last_ingest_count: i64,
}

/// SHA-256 hex digest of a descriptive text.
#[must_use]
pub fn text_hash_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> ProviderProfile {
        ProviderProfile {
            id: 7,
            full_name: Some("Dr. Ana Ruiz".into()),
            specialty: Some("Cardiology".into()),
            address: Address {
                city: Some("Austin".into()),
                state: Some("TX".into()),
                ..Address::default()
            },
            languages: vec!["English".into(), "Spanish".into()],
            insurance_accepted: vec!["Aetna".into(), "Cigna".into()],
            ..ProviderProfile::default()
        }
    }

    #[test]
    fn descriptive_text_joins_fields_in_order() {
        assert_eq!(
            sample_profile().descriptive_text(),
            "Dr. Ana Ruiz Cardiology Austin TX English,Spanish Aetna,Cigna"
        );
    }

    #[test]
    fn descriptive_text_keeps_empty_slots_as_empty_strings() {
        let profile = ProviderProfile {
            id: 1,
            specialty: Some("Dermatology".into()),
            languages: vec!["French".into()],
            ..ProviderProfile::default()
        };

        // Missing name/city/state/insurance leave their separators behind
        // but are never rendered as "None".
        assert_eq!(profile.descriptive_text(), "Dermatology   French");
    }

    #[test]
    fn descriptive_text_of_empty_profile_is_empty() {
        assert_eq!(ProviderProfile::default().descriptive_text(), "");
    }

    #[test]
    fn record_hash_tracks_descriptive_text() {
        let record = ProviderRecord::new(sample_profile(), vec![0.0; EMBEDDING_DIM]);
        assert_eq!(
            record.embedding_text_hash,
            text_hash_hex(&sample_profile().descriptive_text())
        );

        let mut moved = sample_profile();
        moved.address.city = Some("Dallas".into());
        let moved = ProviderRecord::new(moved, vec![0.0; EMBEDDING_DIM]);
        assert_ne!(record.embedding_text_hash, moved.embedding_text_hash);
    }

    #[test]
    fn query_text_uses_fixed_precedence() {
        let query = SearchQuery {
            city: Some("Austin".into()),
            specialty: Some("cardio".into()),
            name_contains: Some("Ruiz".into()),
            language: Some("Spanish".into()),
            insurance: Some("Aetna".into()),
            state: Some("TX".into()),
            ..SearchQuery::default()
        };
        assert_eq!(query.query_text(), "Ruiz cardio Austin TX Aetna Spanish");
    }

    #[test]
    fn query_text_skips_blank_values_and_falls_back() {
        let blank = SearchQuery {
            city: Some("   ".into()),
            specialty: Some(String::new()),
            accepting_new_patients: Some(true),
            ..SearchQuery::default()
        };
        assert_eq!(blank.query_text(), FALLBACK_QUERY_TEXT);

        let padded = SearchQuery {
            city: Some("  Austin ".into()),
            ..SearchQuery::default()
        };
        assert_eq!(padded.query_text(), "Austin");
    }

    #[test]
    fn search_query_deserializes_with_defaults() {
        let query: SearchQuery =
            serde_json::from_str(r#"{"city": "Austin"}"#).expect("valid query json");
        assert_eq!(query.city.as_deref(), Some("Austin"));
        assert_eq!(query.limit, DEFAULT_LIMIT);

        let unknown = serde_json::from_str::<SearchQuery>(r#"{"zip": "78701"}"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn summary_serializes_nested_address() {
        let summary = ProviderSummary::from(&sample_profile());
        let json = serde_json::to_value(&summary).expect("serialize summary");
        assert_eq!(json["address"]["city"], "Austin");
        assert_eq!(json["languages"][1], "Spanish");
        assert!(json.get("embedding").is_none());
    }
}

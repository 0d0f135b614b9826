//! Canonical SQLite schema for the provider store.
//!
//! - `providers` holds one row per provider id with scalar columns, the
//!   list-valued fields as JSON arrays (source order preserved), and the
//!   384-float embedding as a little-endian `f32` blob
//! - `provider_insurance` / `provider_languages` are membership tables,
//!   one row per (provider, value), used by containment filters
//! - `store_meta` records schema version and the last ingestion run

/// Migration v1: provider, membership and metadata tables.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS providers (
    id INTEGER PRIMARY KEY,
    full_name TEXT,
    specialty TEXT,
    phone TEXT,
    email TEXT,
    address_street TEXT,
    address_city TEXT,
    address_state TEXT,
    address_postal_code TEXT,
    years_experience INTEGER,
    accepting_new_patients INTEGER
        CHECK (accepting_new_patients IS NULL OR accepting_new_patients IN (0, 1)),
    insurance_accepted TEXT NOT NULL DEFAULT '[]',
    rating REAL,
    license_number TEXT,
    board_certified INTEGER
        CHECK (board_certified IS NULL OR board_certified IN (0, 1)),
    languages TEXT NOT NULL DEFAULT '[]',
    embedding BLOB NOT NULL CHECK (length(embedding) = 1536),
    embedding_text_hash TEXT NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS provider_insurance (
    provider_id INTEGER NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
    plan TEXT NOT NULL,
    PRIMARY KEY (provider_id, plan)
);

CREATE TABLE IF NOT EXISTS provider_languages (
    provider_id INTEGER NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
    language TEXT NOT NULL,
    PRIMARY KEY (provider_id, language)
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    embedding_model TEXT,
    last_ingest_at_us INTEGER NOT NULL DEFAULT 0,
    last_ingest_count INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (
    id,
    schema_version,
    embedding_model,
    last_ingest_at_us,
    last_ingest_count
) VALUES (1, 1, NULL, 0, 0);
"#;

/// Migration v2: filter and membership indexes.
pub const MIGRATION_V2_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_providers_city
    ON providers(address_city);

CREATE INDEX IF NOT EXISTS idx_providers_state
    ON providers(address_state);

CREATE INDEX IF NOT EXISTS idx_providers_specialty
    ON providers(specialty);

CREATE INDEX IF NOT EXISTS idx_providers_accepting
    ON providers(accepting_new_patients);

CREATE INDEX IF NOT EXISTS idx_providers_rating
    ON providers(rating);

CREATE INDEX IF NOT EXISTS idx_provider_insurance_plan
    ON provider_insurance(plan, provider_id);

CREATE INDEX IF NOT EXISTS idx_provider_languages_language
    ON provider_languages(language, provider_id);
"#;

/// Indexes expected by the filter query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_providers_city",
    "idx_providers_state",
    "idx_providers_specialty",
    "idx_providers_accepting",
    "idx_providers_rating",
    "idx_provider_insurance_plan",
    "idx_provider_languages_language",
];

/// Tables every migrated store must contain.
pub const REQUIRED_TABLES: &[&str] = &[
    "providers",
    "provider_insurance",
    "provider_languages",
    "store_meta",
];

//! SQLite provider store.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so concurrent searches never block each other
//! - `busy_timeout = 5s` to absorb short write locks during ingestion
//! - `foreign_keys = ON` so membership rows follow their provider

pub mod filter;
pub mod migrations;
pub mod schema;
pub mod store;

use crate::error::{Result, StoreContext};
use rusqlite::Connection;
use rusqlite::functions::FunctionFlags;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to an on-disk provider store.
///
/// Holds no open connection: each operation opens its own through
/// [`ProviderStore::connect`], so the handle is `Send + Sync` and searches on
/// different threads do not share SQLite state.
#[derive(Debug, Clone)]
pub struct ProviderStore {
    path: PathBuf,
    vector_functions: bool,
}

impl ProviderStore {
    /// Open (or create) the store at `path` and migrate it to the latest schema.
    ///
    /// Also registers sqlite-vec for the process. When that fails the store
    /// still works; distance ranking then happens in Rust.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CarefindError::StoreUnavailable`] if the directory,
    /// database, pragmas or migrations fail.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_store_context(|| format!("create store directory {}", parent.display()))?;
        }

        if let Err(reason) = carefind_sqlite_vec::register_auto_extension() {
            warn!("sqlite-vec unavailable, ranking will use the Rust distance path: {reason}");
        }

        let mut conn = open_connection(path)?;
        let version = migrations::migrate(&mut conn).store_context("apply store migrations")?;
        let vector_functions = carefind_sqlite_vec::vec_version(&conn).is_some();
        debug!(
            path = %path.display(),
            schema_version = version,
            vector_functions,
            "provider store ready"
        );

        Ok(Self {
            path: path.to_path_buf(),
            vector_functions,
        })
    }

    /// Open a fresh, configured connection to the store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CarefindError::StoreUnavailable`] if SQLite cannot open
    /// or configure the database.
    pub fn connect(&self) -> Result<Connection> {
        open_connection(&self.path)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether sqlite-vec distance functions were available at open time.
    #[must_use]
    pub const fn has_vector_functions(&self) -> bool {
        self.vector_functions
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_store_context(|| format!("open provider store {}", path.display()))?;
    configure_connection(&conn).store_context("configure sqlite pragmas")?;
    Ok(conn)
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    register_casefold(conn)
}

/// `casefold(text)`: Unicode lowercase. SQLite's built-in `lower()` only
/// folds ASCII, so the substring filters use this instead. NULL stays NULL.
fn register_casefold(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "casefold",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

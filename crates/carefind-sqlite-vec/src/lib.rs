//! Registers the sqlite-vec extension so every new `rusqlite` connection in
//! the process gets `vec_distance_l2` and friends.

use std::sync::OnceLock;

/// Set to `0`, `false` or `off` to skip registration entirely.
pub const AUTO_ENABLE_ENV: &str = "CAREFIND_SQLITE_VEC_AUTO";

static REGISTRATION: OnceLock<Result<(), String>> = OnceLock::new();

/// Returns `true` when the environment opts out of sqlite-vec.
#[must_use]
pub fn disabled_by_env() -> bool {
    matches!(
        std::env::var(AUTO_ENABLE_ENV).ok().as_deref(),
        Some("0" | "false" | "off")
    )
}

/// Register sqlite-vec as an auto-extension for connections opened afterwards.
///
/// Registration happens at most once per process; later calls return the
/// cached outcome.
///
/// # Errors
///
/// Returns a description of the failure when the extension is disabled via
/// [`AUTO_ENABLE_ENV`] or `sqlite3_auto_extension` rejects the entrypoint.
pub fn register_auto_extension() -> Result<(), String> {
    if disabled_by_env() {
        return Err(format!(
            "sqlite-vec auto-extension disabled by {AUTO_ENABLE_ENV}"
        ));
    }

    REGISTRATION.get_or_init(register_once).clone()
}

/// Check a connection for a working sqlite-vec build.
///
/// Returns the reported version, or `None` when the functions are missing.
#[must_use]
pub fn vec_version(conn: &rusqlite::Connection) -> Option<String> {
    conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
        .ok()
}

fn register_once() -> Result<(), String> {
    #[allow(clippy::transmute_ptr_to_ptr)]
    let entrypoint: unsafe extern "C" fn(
        *mut rusqlite::ffi::sqlite3,
        *mut *const std::os::raw::c_char,
        *const rusqlite::ffi::sqlite3_api_routines,
    ) -> std::os::raw::c_int =
        unsafe { std::mem::transmute(sqlite_vec::sqlite3_vec_init as *const ()) };

    let rc = unsafe { rusqlite::ffi::sqlite3_auto_extension(Some(entrypoint)) };
    if rc == rusqlite::ffi::SQLITE_OK {
        Ok(())
    } else {
        Err(format!("sqlite3_auto_extension failed with rc={rc}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn registration_exposes_l2_distance() {
        let result = register_auto_extension();
        assert!(result.is_ok(), "registration failed: {result:?}");

        let conn = Connection::open_in_memory().expect("open in-memory sqlite");
        assert!(vec_version(&conn).is_some());

        let distance: f64 = conn
            .query_row(
                "SELECT vec_distance_l2(vec_f32('[0.0, 0.0]'), vec_f32('[3.0, 4.0]'))",
                [],
                |row| row.get(0),
            )
            .expect("vec_distance_l2 should be callable");
        assert!((distance - 5.0).abs() < 1e-6);
    }

    #[test]
    fn registration_is_cached() {
        let first = register_auto_extension();
        let second = register_auto_extension();
        assert_eq!(first, second);
    }
}

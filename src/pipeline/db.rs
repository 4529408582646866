//! Schema migrations for the local SQLite database
//!
//! Every file in `sql/` uses `IF NOT EXISTS`, so running the migrations on an
//! existing database is a no-op.

use super::PipelineError;
use rusqlite::Connection;
use std::fs;
use std::path::Path;

/// Run every `.sql` file in `schema_dir`, in file-name order
///
/// Example:
/// ```no_run
/// # use trenchfeed::pipeline::run_schema_migrations;
/// let mut conn = rusqlite::Connection::open("data/trenchfeed.db").unwrap();
/// run_schema_migrations(&mut conn, "sql").unwrap();
/// ```
pub fn run_schema_migrations(
    conn: &mut Connection,
    schema_dir: impl AsRef<Path>,
) -> Result<(), PipelineError> {
    let schema_path = schema_dir.as_ref();

    if !schema_path.is_dir() {
        return Err(PipelineError::SchemaNotFound(schema_path.display().to_string()));
    }

    // PRAGMA journal_mode returns the resulting mode as a row
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    log::info!("📊 SQLite journal mode: {}", mode);

    // 00_, 01_, 02_ ... ordering
    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();
    sql_files.sort();

    log::info!("🔧 Running schema migrations from: {}", schema_path.display());

    let tx = conn.transaction()?;
    for path in &sql_files {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        log::info!("   ├─ Executing: {}", filename);
        let sql_content = fs::read_to_string(path)?;
        tx.execute_batch(&sql_content)?;
        log::info!("   └─ ✅ Success: {}", filename);
    }
    tx.commit()?;

    log::info!("✅ All schema migrations completed successfully ({} files)", sql_files.len());

    Ok(())
}

/// Schema files in the crate source tree, for tests and tools run from a checkout
pub fn default_schema_dir() -> &'static Path {
    Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/sql"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<String>, _>>()
            .unwrap()
    }

    #[test]
    fn test_migrations_create_all_tables() {
        let dir = tempdir().unwrap();
        let mut conn = Connection::open(dir.path().join("schema.db")).unwrap();

        run_schema_migrations(&mut conn, default_schema_dir()).unwrap();

        let tables = table_names(&conn);
        for expected in [
            "early_scores",
            "liquidity_events",
            "pair_window_metrics",
            "pairs",
            "swaps",
            "tokens",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let dir = tempdir().unwrap();
        let mut conn = Connection::open(dir.path().join("schema.db")).unwrap();

        run_schema_migrations(&mut conn, default_schema_dir()).unwrap();
        run_schema_migrations(&mut conn, default_schema_dir()).unwrap();
    }

    #[test]
    fn test_missing_schema_dir() {
        let dir = tempdir().unwrap();
        let mut conn = Connection::open_in_memory().unwrap();

        let result = run_schema_migrations(&mut conn, dir.path().join("nope"));
        assert!(matches!(result, Err(PipelineError::SchemaNotFound(_))));
    }
}

//! Shared SQLite connection tuning
//!
//! Applied to every connection the crate opens, before any query runs.

use rusqlite::Connection;

/// WAL journal, NORMAL sync, in-memory temp tables, 256MB mmap, ~64MB page cache
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "mmap_size", 268_435_456_i64)?;
    conn.pragma_update(None, "cache_size", -64_000_i64)?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000_i64)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::time::Duration;

/// How long a writer waits on a locked database before giving up.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Applies the pragmas every cache connection runs with: write-ahead logging,
/// enforced foreign keys and a bounded wait on lock contention.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)
        .context("Failed to set busy timeout")?;
    // In-memory databases report "memory" and ignore the request.
    let journal_mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .context("Failed to set WAL mode")?;
    if journal_mode != "wal" && journal_mode != "memory" {
        tracing::warn!("Database refused WAL mode, running with {}", journal_mode);
    }
    conn.pragma_update(None, "foreign_keys", "ON")
        .context("Failed to enable foreign keys")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn enables_wal_and_foreign_keys_on_file_database() {
        let dir = TempDir::new().unwrap();
        let conn = Connection::open(dir.path().join("pragmas.db")).unwrap();
        configure_connection(&conn).unwrap();

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |r| r.get(0))
            .unwrap();
        assert_eq!(mode, "wal");

        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fk, 1);

        let timeout: i64 = conn
            .query_row("PRAGMA busy_timeout", [], |r| r.get(0))
            .unwrap();
        assert_eq!(timeout, 10_000);
    }

    #[test]
    fn in_memory_database_is_accepted() {
        let conn = Connection::open_in_memory().unwrap();
        configure_connection(&conn).unwrap();
    }
}

//! Schema migrations for the local store.
//!
//! SQL files under `migrations/` are embedded at compile time and applied in
//! version order, each inside its own transaction. Applied versions are
//! recorded in `schema_version`.

use rusqlite::{params, Connection};

use crate::db::DbError;

/// `(version, sql)`, ascending.
const MIGRATIONS: &[(i32, &str)] = &[(1, include_str!("migrations/001_baseline.sql"))];

fn applied_version(conn: &Connection) -> Result<i32, DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?)
}

/// Bring the schema up to date. Returns how many migrations ran.
///
/// A store written by a newer RIVUS is refused rather than touched.
pub fn run_migrations(conn: &Connection) -> Result<usize, DbError> {
    let applied = applied_version(conn)?;
    let latest = MIGRATIONS.last().map(|(v, _)| *v).unwrap_or(0);
    if applied > latest {
        return Err(DbError::SchemaTooNew {
            found: applied,
            supported: latest,
        });
    }

    let mut ran = 0;
    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > applied) {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![version],
        )?;
        tx.commit()?;
        log::info!("Local store schema upgraded to v{version}");
        ran += 1;
    }
    Ok(ran)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_store_gets_kv_table() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 1);
        assert_eq!(applied_version(&conn).unwrap(), 1);
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES ('rivus-theme', 'dark', '2025-01-01')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 0);
        assert_eq!(applied_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_newer_store_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        applied_version(&conn).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (7)", [])
            .unwrap();
        match run_migrations(&conn) {
            Err(DbError::SchemaTooNew { found, supported }) => {
                assert_eq!(found, 7);
                assert_eq!(supported, 1);
            }
            other => panic!("expected SchemaTooNew, got {other:?}"),
        }
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rivus.db");
        {
            let conn = Connection::open(&path).unwrap();
            assert_eq!(run_migrations(&conn).unwrap(), 1);
        }
        let conn = Connection::open(&path).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 0);
    }
}

//! Versioned schema migrations.
//!
//! Applied versions are recorded in `schema_version`. Each pending migration
//! runs in its own transaction together with its version row, so a failed
//! migration leaves the database at the previous version.

use crate::Error;
use tokio_rusqlite::{Connection, params};

/// A migration: (version, SQL). Versions must be listed in increasing order.
pub type Migration = (u32, &'static str);

/// Apply every migration newer than the recorded version.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` naming the first version whose SQL
/// failed, or if the list is out of order.
pub async fn run(conn: &Connection, migrations: &'static [Migration]) -> Result<(), Error> {
    if migrations.windows(2).any(|w| w[0].0 >= w[1].0) {
        return Err(Error::MigrationFailed("migration versions are not increasing".into()));
    }

    let applied = conn
        .call(move |conn| -> Result<Vec<u32>, Error> {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_version (
                    version INTEGER PRIMARY KEY,
                    applied_at TEXT NOT NULL
                )",
            )?;
            let current: u32 =
                conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))?;

            let mut applied = Vec::new();
            for &(version, sql) in migrations.iter().filter(|(v, _)| *v > current) {
                let tx = conn.transaction()?;
                tx.execute_batch(sql)
                    .map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
                tx.execute(
                    "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                    params![version, chrono::Utc::now().to_rfc3339()],
                )?;
                tx.commit()?;
                applied.push(version);
            }
            Ok(applied)
        })
        .await?;

    for version in applied {
        tracing::debug!(version, "applied migration");
    }
    Ok(())
}

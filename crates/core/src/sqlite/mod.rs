//! Shared SQLite plumbing for the cache database and the location store.
//!
//! Opens tokio-rusqlite connections with the pragmas every geocensus
//! database runs under (WAL, foreign keys) and applies versioned migrations.

pub mod migrations;

pub use migrations::Migration;

use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Open a database file, apply pragmas and run pending migrations.
///
/// Creates the file if it doesn't exist.
pub async fn open(path: impl AsRef<Path>, migrations: &'static [Migration]) -> Result<Connection, Error> {
    let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
    prepare(&conn, migrations).await?;
    Ok(conn)
}

/// Open an in-memory database with the same configuration as file-based ones.
pub async fn open_in_memory(migrations: &'static [Migration]) -> Result<Connection, Error> {
    let conn = Connection::open_in_memory()
        .await
        .map_err(|e| Error::Database(e.into()))?;
    prepare(&conn, migrations).await?;
    Ok(conn)
}

async fn prepare(conn: &Connection, migrations: &'static [Migration]) -> Result<(), Error> {
    conn.call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
    })
    .await
    .map_err(Error::Database)?;

    migrations::run(conn, migrations).await
}

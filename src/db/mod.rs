//! SQLite persistence layer.
//!
//! All state lives in a single database file at `~/.momentum/momentum.db`
//! (overridable via config). Connections run in WAL mode. Migrations are
//! applied on open.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

pub mod activity;
pub mod insights;
pub mod stats;
pub mod types;
pub mod users;

pub use types::*;

use crate::migrations;

/// Owned database handle. Callers hold this behind a `Mutex` in shared state;
/// every query method takes `&self` and goes through the single connection.
pub struct StatsDb {
    conn: Connection,
}

/// Get the canonical database file path (~/.momentum/momentum.db).
pub fn db_path() -> Result<PathBuf, DbError> {
    let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
    Ok(home.join(".momentum").join("momentum.db"))
}

impl StatsDb {
    /// Open (creating if necessary) the database at the default path.
    pub fn open() -> Result<Self, DbError> {
        Self::open_at(&db_path()?)
    }

    /// Open (creating if necessary) the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        Ok(Self { conn })
    }

    /// Borrow the underlying connection for query modules.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

// Jamrank — Rank Store
// Durable member stats, referral edges and invite ownership in SQLite via rusqlite.
//
// Module layout:
//   schema         — idempotent table creation
//   members        — member stats CRUD + atomic read-modify-write + leaderboard
//   referrals      — referral edge insert (uniqueness enforced by SQLite) + queries
//   invite_owners  — invite code → owner mapping
//
// Every write goes through the single connection mutex, so a
// read-modify-write issued inside one lock is atomic with respect to every
// other writer in the process.

use crate::atoms::error::EngineResult;
use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

mod invite_owners;
mod members;
mod referrals;
mod schema;

/// Default location of the bot database.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jamrank")
        .join("jamrank.db")
}

/// Thread-safe database wrapper.
pub struct RankStore {
    pub(crate) conn: Mutex<Connection>,
}

impl RankStore {
    /// Open (or create) the database at `path` and initialize tables.
    pub fn open(path: &Path) -> EngineResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!("[store] Opening rank store at {:?}", path);

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        schema::run_migrations(&conn)?;

        Ok(RankStore { conn: Mutex::new(conn) })
    }

    /// Fresh in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(RankStore { conn: Mutex::new(conn) })
    }
}

// SQLite integers are signed; snowflakes stay below 2^63.
pub(crate) fn sql_id(id: u64) -> i64 {
    id as i64
}

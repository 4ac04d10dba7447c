//! Pooled sqlite access shared by [`crate::config`] and [`crate::cache`].
//!
//! Generalizes the teacher's `context.sql` access pattern
//! (`query_map`/`execute`/`get_config`/`get_config_int`, see `context.rs`)
//! from a single connection to a small `r2d2` pool, since the cache allows
//! concurrent read snapshots from the UI thread (§5) while its writer
//! thread owns all mutation.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, NO_PARAMS};

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<SqliteConnectionManager>,
}

impl Storage {
    /// Opens (creating if absent) the sqlite database at `path`, applying
    /// migrations and recording `schema_version` (§6: "Cache database schema
    /// is implementation-private but MUST survive upgrades via a monotonic
    /// `schema_version` row").
    pub fn open(path: &Path) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::new(manager)?;
        let storage = Storage { pool };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT);

             CREATE TABLE IF NOT EXISTS config (keyname TEXT PRIMARY KEY, value TEXT);

             CREATE TABLE IF NOT EXISTS contacts (
                 id TEXT PRIMARY KEY,
                 name TEXT NOT NULL,
                 phone TEXT,
                 is_self INTEGER NOT NULL
             );

             CREATE TABLE IF NOT EXISTS chats (
                 id TEXT PRIMARY KEY,
                 is_unread INTEGER NOT NULL,
                 is_unread_mention INTEGER NOT NULL,
                 is_muted INTEGER NOT NULL,
                 is_pinned INTEGER NOT NULL,
                 last_message_time INTEGER NOT NULL,
                 has_oldest INTEGER NOT NULL DEFAULT 0
             );

             CREATE TABLE IF NOT EXISTS messages (
                 chat_id TEXT NOT NULL,
                 id TEXT NOT NULL,
                 sender_id TEXT NOT NULL,
                 text TEXT NOT NULL,
                 quoted_id TEXT,
                 quoted_text TEXT,
                 quoted_sender TEXT,
                 file_info TEXT NOT NULL,
                 time_sent INTEGER NOT NULL,
                 is_outgoing INTEGER NOT NULL,
                 is_read INTEGER NOT NULL,
                 PRIMARY KEY (chat_id, id)
             );
             CREATE INDEX IF NOT EXISTS messages_time_sent
                 ON messages (chat_id, time_sent);

             CREATE TABLE IF NOT EXISTS reactions (
                 chat_id TEXT NOT NULL,
                 msg_id TEXT NOT NULL,
                 sender_id TEXT NOT NULL,
                 emoji TEXT NOT NULL,
                 PRIMARY KEY (chat_id, msg_id, sender_id)
             );",
        )?;

        let found: Option<i64> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                NO_PARAMS,
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|s| s.parse().ok());

        match found {
            None => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('schema_version', ?)",
                    params![SCHEMA_VERSION.to_string()],
                )?;
            }
            Some(v) if v == SCHEMA_VERSION => {}
            Some(v) => {
                crate::bail!(
                    "cache schema version mismatch: on-disk {} vs. expected {}",
                    v,
                    SCHEMA_VERSION
                );
            }
        }
        Ok(())
    }

    pub(crate) fn pool(&self) -> &Pool<SqliteConnectionManager> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reopening_an_existing_db_does_not_fail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sqlite");
        Storage::open(&path).unwrap();
        Storage::open(&path).unwrap();
    }
}

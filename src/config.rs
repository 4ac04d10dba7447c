//! C9: per-profile key/value config store with typed accessors (§4.9).
//!
//! Generalizes the teacher's `context.sql.get_config`/`set_config`/
//! `get_config_int` family (`context.rs`) into a small typed API backed by
//! the shared `config` table in [`crate::storage::Storage`].

use rusqlite::{params, OptionalExtension};

use crate::error::Result;
use crate::storage::Storage;

#[derive(Clone)]
pub struct Config {
    storage: Storage,
}

impl Config {
    pub fn new(storage: Storage) -> Self {
        Config { storage }
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>> {
        let conn = self.storage.pool().get()?;
        Ok(conn
            .query_row(
                "SELECT value FROM config WHERE keyname = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.storage.pool().get()?;
        conn.execute(
            "INSERT INTO config (keyname, value) VALUES (?, ?)
             ON CONFLICT(keyname) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_num(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.get_string(key)?.and_then(|v| v.parse().ok()))
    }

    pub fn set_num(&self, key: &str, value: i64) -> Result<()> {
        self.set_string(key, &value.to_string())
    }

    /// Idempotent: writes `value` only the first time `key` is absent.
    pub fn init_default_string(&self, key: &str, value: &str) -> Result<()> {
        if self.get_string(key)?.is_none() {
            self.set_string(key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> Config {
        let dir = tempdir().unwrap();
        let storage = Storage::open(&dir.path().join("cache.sqlite")).unwrap();
        std::mem::forget(dir);
        Config::new(storage)
    }

    #[test]
    fn round_trips_strings_and_numbers() {
        let config = config();
        assert_eq!(config.get_string("foo").unwrap(), None);
        config.set_string("foo", "bar").unwrap();
        assert_eq!(config.get_string("foo").unwrap(), Some("bar".to_string()));

        config.set_num("count", 42).unwrap();
        assert_eq!(config.get_num("count").unwrap(), Some(42));
    }

    #[test]
    fn init_default_is_idempotent() {
        let config = config();
        config.init_default_string("last_seen", "0").unwrap();
        config.set_string("last_seen", "100").unwrap();
        config.init_default_string("last_seen", "0").unwrap();
        assert_eq!(config.get_string("last_seen").unwrap(), Some("100".to_string()));
    }
}

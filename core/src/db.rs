use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, params};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::models::{LogEntry, Settings};

/// Slot holding the entry list as a JSON array.
pub const LOGS_SLOT: &str = "cat_health_logs";
/// Slot holding the settings as a JSON object.
pub const SETTINGS_SLOT: &str = "cat_health_settings";

/// Key-value slot storage backed by SQLite.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS slots (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Raw slots ---

    pub fn set_slot(&self, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO slots (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        tracing::debug!(slot = key, bytes = value.len(), "slot written");
        Ok(())
    }

    pub fn get_slot(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM slots WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    // --- Typed slots ---

    fn save_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize slot '{key}'"))?;
        self.set_slot(key, &json)
    }

    /// Read a JSON slot. Missing or unreadable data yields `None`; the failure
    /// is logged rather than returned.
    fn load_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.get_slot(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(slot = key, "failed to read slot: {e:#}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(slot = key, "ignoring malformed slot data: {e}");
                None
            }
        }
    }

    pub fn save_entries(&self, entries: &[LogEntry]) -> Result<()> {
        self.save_json(LOGS_SLOT, entries)
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.save_json(SETTINGS_SLOT, settings)
    }

    /// Write whichever of the two slots are given in one transaction.
    pub fn save_snapshot(
        &self,
        entries: Option<&[LogEntry]>,
        settings: Option<&Settings>,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        if let Some(entries) = entries {
            self.save_entries(entries)?;
        }
        if let Some(settings) = settings {
            self.save_settings(settings)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Stored entries, or an empty list when the slot is missing or malformed.
    #[must_use]
    pub fn load_entries(&self) -> Vec<LogEntry> {
        self.load_json(LOGS_SLOT).unwrap_or_default()
    }

    /// Stored settings merged over defaults, or defaults when the slot is
    /// missing or malformed.
    #[must_use]
    pub fn load_settings(&self) -> Settings {
        self.load_json(SETTINGS_SLOT).unwrap_or_default()
    }
}

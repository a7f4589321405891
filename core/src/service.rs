use std::path::Path;

use anyhow::{Result, bail};
use chrono::{Local, Utc};

use crate::aggregate;
use crate::backup::{self, BackupError, ImportSummary};
use crate::db::Database;
use crate::models::{
    Category, Dashboard, DailyIntake, LogEntry, NewLogEntry, ReadingPoint, Settings,
    SettingsPatch, StatusLevel,
};
use crate::store::{EntryStore, SettingsStore};

/// Application state: both stores plus the storage they are mirrored to.
///
/// Every mutation writes the affected store to its slot before the in-memory
/// copy changes, so a storage failure leaves the state as it was.
pub struct CareService {
    db: Database,
    entries: EntryStore,
    settings: SettingsStore,
}

impl CareService {
    pub fn open(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self::from_database(db))
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self::from_database(db))
    }

    #[must_use]
    pub fn from_database(db: Database) -> Self {
        let entries = EntryStore::new(db.load_entries());
        let settings = SettingsStore::new(db.load_settings());
        tracing::debug!(entries = entries.len(), "state loaded");
        Self {
            db,
            entries,
            settings,
        }
    }

    // --- Entries ---

    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        self.entries.entries()
    }

    #[must_use]
    pub fn get_entry(&self, id: &str) -> Option<&LogEntry> {
        self.entries.get(id)
    }

    pub fn add_entry(&mut self, new: NewLogEntry) -> Result<LogEntry> {
        self.add_entry_at(new, Utc::now().timestamp_millis())
    }

    /// Add with an explicit creation clock value, which becomes the entry id.
    pub fn add_entry_at(&mut self, new: NewLogEntry, created_at_ms: i64) -> Result<LogEntry> {
        if !new.value.is_finite() {
            bail!("Value must be a finite number");
        }
        let entry = LogEntry::from_new(new, created_at_ms);
        let mut next = self.entries.clone();
        next.add(entry.clone());
        self.db.save_entries(next.entries())?;
        self.entries = next;
        Ok(entry)
    }

    pub fn remove_entry(&mut self, id: &str) -> Result<bool> {
        let mut next = self.entries.clone();
        if !next.remove(id) {
            return Ok(false);
        }
        self.db.save_entries(next.entries())?;
        self.entries = next;
        Ok(true)
    }

    // --- Settings ---

    #[must_use]
    pub fn settings(&self) -> &Settings {
        self.settings.get()
    }

    pub fn patch_settings(&mut self, patch: &SettingsPatch) -> Result<Settings> {
        let mut next = self.settings;
        next.patch(patch);
        self.db.save_settings(next.get())?;
        self.settings = next;
        Ok(*self.settings.get())
    }

    // --- Derived views ---

    #[must_use]
    pub fn status_of(&self, category: Category, value: f64) -> StatusLevel {
        aggregate::status(category, value, self.settings())
    }

    #[must_use]
    pub fn daily_total(&self, category: Category) -> f64 {
        aggregate::daily_total(self.entries(), category, &Local::now())
    }

    #[must_use]
    pub fn dashboard(&self) -> Dashboard {
        aggregate::dashboard(self.entries(), self.settings(), &Local::now())
    }

    #[must_use]
    pub fn intake_series(&self) -> Vec<DailyIntake> {
        aggregate::daily_intake_series(self.entries(), &Local)
    }

    #[must_use]
    pub fn trend(&self, category: Category, limit: usize) -> Vec<ReadingPoint> {
        aggregate::reading_series(self.entries(), category, limit)
    }

    #[must_use]
    pub fn alerts(&self) -> Vec<&LogEntry> {
        aggregate::abnormal_entries(self.entries(), self.settings())
    }

    // --- Backup / Restore ---

    pub fn export_backup(&self) -> Result<String> {
        backup::export_json(self.entries(), self.settings())
    }

    /// Restore from backup text. On any error both stores are left unchanged.
    pub fn import_backup(&mut self, text: &str) -> Result<ImportSummary, BackupError> {
        let payload = backup::parse_backup(text)?;

        let next_entries = payload.logs.map(EntryStore::new);
        let next_settings = payload.settings.as_ref().map(|patch| {
            let mut store = self.settings;
            store.replace_all(patch);
            store
        });

        self.db
            .save_snapshot(
                next_entries.as_ref().map(EntryStore::entries),
                next_settings.as_ref().map(SettingsStore::get),
            )
            .map_err(BackupError::Storage)?;

        let summary = ImportSummary {
            entries_imported: next_entries.as_ref().map(EntryStore::len),
            settings_imported: next_settings.is_some(),
        };
        if let Some(entries) = next_entries {
            self.entries = entries;
        }
        if let Some(settings) = next_settings {
            self.settings = settings;
        }
        tracing::info!(
            entries = ?summary.entries_imported,
            settings = summary.settings_imported,
            "backup imported"
        );
        Ok(summary)
    }
}

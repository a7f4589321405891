use crate::models::{LogEntry, Settings, SettingsPatch};

/// Log entries kept newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryStore {
    entries: Vec<LogEntry>,
}

impl EntryStore {
    #[must_use]
    pub fn new(entries: Vec<LogEntry>) -> Self {
        let mut store = Self::default();
        store.replace_all(entries);
        store
    }

    /// Insert keeping descending timestamp order. Among equal timestamps the
    /// new entry goes first.
    pub fn add(&mut self, entry: LogEntry) {
        let idx = self
            .entries
            .partition_point(|e| e.timestamp > entry.timestamp);
        self.entries.insert(idx, entry);
    }

    /// Remove every entry with this id. Returns false when nothing matched.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub fn replace_all(&mut self, mut entries: Vec<LogEntry>) {
        for entry in &mut entries {
            entry.normalize_unit();
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.entries = entries;
    }

    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&LogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SettingsStore {
    settings: Settings,
}

impl SettingsStore {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn patch(&mut self, patch: &SettingsPatch) {
        self.settings.apply(patch);
    }

    /// Replace wholesale; fields absent from `patch` take their defaults.
    pub fn replace_all(&mut self, patch: &SettingsPatch) {
        self.settings = Settings::merged_over_defaults(patch);
    }
}

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::{LogEntry, Settings, SettingsPatch};

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backup file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("backup file must contain a JSON object")]
    NotAnObject,

    #[error("backup field '{field}' is malformed: {source}")]
    Field {
        field: &'static str,
        source: serde_json::Error,
    },

    #[error("failed to save imported data")]
    Storage(#[source] anyhow::Error),
}

/// Combined state written to a backup file.
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    pub logs: &'a [LogEntry],
    pub settings: &'a Settings,
}

/// What a backup file asked to restore. `None` means the key was absent and
/// the matching store stays as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportPayload {
    pub logs: Option<Vec<LogEntry>>,
    pub settings: Option<SettingsPatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries_imported: Option<usize>,
    pub settings_imported: bool,
}

pub fn export_json(logs: &[LogEntry], settings: &Settings) -> Result<String> {
    Ok(serde_json::to_string_pretty(&Snapshot { logs, settings })?)
}

#[must_use]
pub fn backup_file_name(date: NaiveDate) -> String {
    format!("cat-health-backup-{}.json", date.format("%Y-%m-%d"))
}

fn take_field(map: &mut serde_json::Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .find_map(|key| map.remove(*key))
        .filter(|v| !v.is_null())
}

/// Parse backup text without touching any state.
pub fn parse_backup(text: &str) -> Result<ImportPayload, BackupError> {
    let Value::Object(mut map) = serde_json::from_str::<Value>(text)? else {
        return Err(BackupError::NotAnObject);
    };

    let logs = take_field(&mut map, &["logs", "entries"])
        .map(|v| {
            serde_json::from_value::<Vec<LogEntry>>(v)
                .map_err(|source| BackupError::Field { field: "logs", source })
        })
        .transpose()?;

    let settings = take_field(&mut map, &["settings"])
        .map(|v| {
            serde_json::from_value::<SettingsPatch>(v)
                .map_err(|source| BackupError::Field {
                    field: "settings",
                    source,
                })
        })
        .transpose()?;

    Ok(ImportPayload { logs, settings })
}

use std::fmt;

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Glucose,
    Ketone,
    Feeding,
    Saline,
    Meds,
}

/// Display unit for every category. Entries always carry the unit listed here.
pub const CATEGORY_UNITS: &[(Category, &str)] = &[
    (Category::Glucose, "mg/dL"),
    (Category::Ketone, "mmol/L"),
    (Category::Feeding, "ml"),
    (Category::Saline, "ml"),
    (Category::Meds, "ml"),
];

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Glucose,
        Category::Ketone,
        Category::Feeding,
        Category::Saline,
        Category::Meds,
    ];

    #[must_use]
    pub fn unit(self) -> &'static str {
        CATEGORY_UNITS
            .iter()
            .find(|(c, _)| *c == self)
            .map_or("", |(_, unit)| unit)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Glucose => "glucose",
            Category::Ketone => "ketone",
            Category::Feeding => "feeding",
            Category::Saline => "saline",
            Category::Meds => "meds",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Category::Glucose => "Glucose",
            Category::Ketone => "Ketone",
            Category::Feeding => "Feeding",
            Category::Saline => "Saline",
            Category::Meds => "Meds",
        }
    }

    /// Categories whose daily amounts are summed for the intake chart.
    #[must_use]
    pub fn is_intake(self) -> bool {
        matches!(self, Category::Feeding | Category::Saline)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn parse_category(s: &str) -> Result<Category> {
    let lower = s.trim().to_lowercase();
    Category::ALL
        .into_iter()
        .find(|c| c.as_str() == lower)
        .ok_or_else(|| {
            let names: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
            anyhow!("Invalid category '{s}'. Must be one of: {}", names.join(", "))
        })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    /// Epoch milliseconds of the measurement.
    pub timestamp: i64,
    #[serde(alias = "type")]
    pub category: Category,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub note: String,
}

impl LogEntry {
    /// Build an entry from user input. `created_at_ms` doubles as the id and,
    /// when no explicit timestamp was given, as the measurement time.
    #[must_use]
    pub fn from_new(new: NewLogEntry, created_at_ms: i64) -> Self {
        Self {
            id: created_at_ms.to_string(),
            timestamp: new.timestamp.unwrap_or(created_at_ms),
            category: new.category,
            value: new.value,
            unit: new.category.unit().to_string(),
            note: new.note.unwrap_or_default(),
        }
    }

    pub(crate) fn normalize_unit(&mut self) {
        let unit = self.category.unit();
        if self.unit != unit {
            self.unit = unit.to_string();
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub category: Category,
    pub value: f64,
    pub timestamp: Option<i64>,
    pub note: Option<String>,
}

/// Thresholds and daily targets. Missing fields deserialize to their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub glucose_low: f64,
    pub glucose_high: f64,
    pub ketone_warning: f64,
    pub ketone_danger: f64,
    /// 0 means no target.
    pub daily_feeding_target: f64,
    /// 0 means no target.
    pub daily_saline_target: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            glucose_low: 70.0,
            glucose_high: 250.0,
            ketone_warning: 0.6,
            ketone_danger: 1.5,
            daily_feeding_target: 0.0,
            daily_saline_target: 0.0,
        }
    }
}

impl Settings {
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(v) = patch.glucose_low {
            self.glucose_low = v;
        }
        if let Some(v) = patch.glucose_high {
            self.glucose_high = v;
        }
        if let Some(v) = patch.ketone_warning {
            self.ketone_warning = v;
        }
        if let Some(v) = patch.ketone_danger {
            self.ketone_danger = v;
        }
        if let Some(v) = patch.daily_feeding_target {
            self.daily_feeding_target = v;
        }
        if let Some(v) = patch.daily_saline_target {
            self.daily_saline_target = v;
        }
    }

    #[must_use]
    pub fn merged_over_defaults(patch: &SettingsPatch) -> Self {
        let mut settings = Self::default();
        settings.apply(patch);
        settings
    }

    /// Daily target for an intake category, `None` when unset (0) or not applicable.
    #[must_use]
    pub fn target_for(&self, category: Category) -> Option<f64> {
        let target = match category {
            Category::Feeding => self.daily_feeding_target,
            Category::Saline => self.daily_saline_target,
            _ => return None,
        };
        (target > 0.0).then_some(target)
    }

    /// Human-readable notes for threshold pairs that are configured backwards.
    /// Such settings are still accepted as-is.
    #[must_use]
    pub fn inverted_thresholds(&self) -> Vec<String> {
        let mut notes = Vec::new();
        if self.glucose_low > self.glucose_high {
            notes.push(format!(
                "glucose low ({}) is above glucose high ({})",
                self.glucose_low, self.glucose_high
            ));
        }
        if self.ketone_warning > self.ketone_danger {
            notes.push(format!(
                "ketone warning ({}) is above ketone danger ({})",
                self.ketone_warning, self.ketone_danger
            ));
        }
        notes
    }
}

/// Partial settings update. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glucose_low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glucose_high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ketone_warning: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ketone_danger: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_feeding_target: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_saline_target: Option<f64>,
}

impl SettingsPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Every present value must be a finite, non-negative number.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("glucoseLow", self.glucose_low),
            ("glucoseHigh", self.glucose_high),
            ("ketoneWarning", self.ketone_warning),
            ("ketoneDanger", self.ketone_danger),
            ("dailyFeedingTarget", self.daily_feeding_target),
            ("dailySalineTarget", self.daily_saline_target),
        ];
        for (name, value) in fields {
            if let Some(v) = value.filter(|v| !v.is_finite() || *v < 0.0) {
                return Err(anyhow!("{name} must be a non-negative number, got {v}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Normal,
    Low,
    High,
    Warning,
    Danger,
}

impl StatusLevel {
    #[must_use]
    pub fn is_alert(self) -> bool {
        self != StatusLevel::Normal
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StatusLevel::Normal => "normal",
            StatusLevel::Low => "low",
            StatusLevel::High => "high",
            StatusLevel::Warning => "warning",
            StatusLevel::Danger => "danger",
        }
    }
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Derived views ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyIntake {
    pub date: NaiveDate,
    pub feeding: f64,
    pub saline: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingPoint {
    pub timestamp: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCard {
    pub category: Category,
    pub unit: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<LogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
    pub today_total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub generated_at: String,
    pub cards: Vec<DashboardCard>,
    pub alerts: usize,
}

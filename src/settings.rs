//! User settings, stored as a JSON document next to the state file.
//!
//! Loading merges the file over the defaults key by key, so older files gain
//! new settings and keys this version does not know about survive a save.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub const DEFAULT_HOURS_PER_DAY: u32 = 4;
pub const DEFAULT_RISK_THRESHOLD: u32 = 20;
pub const DEFAULT_NOTIFICATION_LEAD_DAYS: u32 = 3;
pub const DEFAULT_POLL_SECONDS: u64 = 60;
pub const MIN_POLL_SECONDS: u64 = 10;

pub const STATE_FILE: &str = "data.json";
pub const SETTINGS_FILE: &str = "settings.json";
pub const CALENDAR_FILE: &str = "coursesync_calendar.ics";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub hours_per_day: u32,
    pub risk_threshold: u32,
    pub notification_lead_days: u32,
    pub calendar_filename: PathBuf,
    pub email_enabled: bool,
    pub email_to: String,
    pub email_schedule_enabled: bool,
    pub notification_poll_seconds: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Settings {
    pub fn defaults(data_dir: &Path) -> Self {
        Self {
            hours_per_day: DEFAULT_HOURS_PER_DAY,
            risk_threshold: DEFAULT_RISK_THRESHOLD,
            notification_lead_days: DEFAULT_NOTIFICATION_LEAD_DAYS,
            calendar_filename: data_dir.join(CALENDAR_FILE),
            email_enabled: false,
            email_to: String::new(),
            email_schedule_enabled: false,
            notification_poll_seconds: DEFAULT_POLL_SECONDS,
            extra: Map::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.hours_per_day == 0 {
            return Err(Error::InvalidInput("hours_per_day must be greater than 0".into()));
        }
        if self.risk_threshold == 0 {
            return Err(Error::InvalidInput("risk_threshold must be greater than 0".into()));
        }
        if self.notification_poll_seconds < MIN_POLL_SECONDS {
            return Err(Error::InvalidInput(format!(
                "notification_poll_seconds must be at least {MIN_POLL_SECONDS}"
            )));
        }
        if self.email_enabled && !self.email_to.is_empty() && !self.email_to.contains('@') {
            return Err(Error::InvalidInput(format!(
                "'{}' is not an email address",
                self.email_to
            )));
        }
        Ok(())
    }

    /// Pulls out-of-range values loaded from disk back into range, so an old
    /// or hand-edited file never locks the user out. Returns whether anything
    /// changed.
    pub fn repair(&mut self) -> bool {
        let mut repaired = false;
        if self.hours_per_day == 0 {
            tracing::warn!(default = DEFAULT_HOURS_PER_DAY, "hours_per_day was 0, using the default");
            self.hours_per_day = DEFAULT_HOURS_PER_DAY;
            repaired = true;
        }
        if self.risk_threshold == 0 {
            tracing::warn!(default = DEFAULT_RISK_THRESHOLD, "risk_threshold was 0, using the default");
            self.risk_threshold = DEFAULT_RISK_THRESHOLD;
            repaired = true;
        }
        if self.notification_poll_seconds < MIN_POLL_SECONDS {
            tracing::warn!(
                loaded = self.notification_poll_seconds,
                minimum = MIN_POLL_SECONDS,
                "notification_poll_seconds below the minimum, raising it"
            );
            self.notification_poll_seconds = MIN_POLL_SECONDS;
            repaired = true;
        }
        if self.email_enabled && !self.email_to.is_empty() && !self.email_to.contains('@') {
            tracing::warn!(email_to = %self.email_to, "email_to is not an address, disabling email");
            self.email_enabled = false;
            repaired = true;
        }
        repaired
    }

    /// Email can go out at all.
    pub fn email_ready(&self) -> bool {
        self.email_enabled && !self.email_to.trim().is_empty()
    }

    /// The background worker only delivers when scheduling is switched on too.
    pub fn scheduler_active(&self) -> bool {
        self.email_ready() && self.email_schedule_enabled
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.notification_poll_seconds.max(MIN_POLL_SECONDS))
    }
}

/// Partial update applied by `settings set`; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub hours_per_day: Option<u32>,
    pub risk_threshold: Option<u32>,
    pub notification_lead_days: Option<u32>,
    pub calendar_filename: Option<PathBuf>,
    pub email_enabled: Option<bool>,
    pub email_to: Option<String>,
    pub email_schedule_enabled: Option<bool>,
    pub notification_poll_seconds: Option<u64>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.hours_per_day.is_none()
            && self.risk_threshold.is_none()
            && self.notification_lead_days.is_none()
            && self.calendar_filename.is_none()
            && self.email_enabled.is_none()
            && self.email_to.is_none()
            && self.email_schedule_enabled.is_none()
            && self.notification_poll_seconds.is_none()
    }

    /// Returns the patched settings, or an error without touching `base`.
    pub fn apply(&self, base: &Settings) -> Result<Settings> {
        let mut next = base.clone();
        if let Some(value) = self.hours_per_day {
            next.hours_per_day = value;
        }
        if let Some(value) = self.risk_threshold {
            next.risk_threshold = value;
        }
        if let Some(value) = self.notification_lead_days {
            next.notification_lead_days = value;
        }
        if let Some(value) = &self.calendar_filename {
            next.calendar_filename = value.clone();
        }
        if let Some(value) = self.email_enabled {
            next.email_enabled = value;
        }
        if let Some(value) = &self.email_to {
            next.email_to = value.trim().to_string();
        }
        if let Some(value) = self.email_schedule_enabled {
            next.email_schedule_enabled = value;
        }
        if let Some(value) = self.notification_poll_seconds {
            next.notification_poll_seconds = value;
        }
        next.validate()?;
        Ok(next)
    }
}

/// Accepts the spellings the old prompt accepted: true/1/yes/y.
pub fn parse_flag(input: &str) -> std::result::Result<bool, String> {
    match input.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Ok(true),
        "false" | "0" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected true or false, got '{other}'")),
    }
}

#[derive(Debug, Clone)]
pub struct DataPaths {
    pub data_dir: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn platform_default() -> Result<Self> {
        let dirs = ProjectDirs::from("", "", "coursesync").ok_or_else(|| {
            Error::InvalidInput("could not determine a data directory; pass --data-dir".into())
        })?;
        Ok(Self::new(dirs.data_dir()))
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }
}

/// Loads settings merged over defaults. The flag is true when the merge
/// filled in keys the file did not have, i.e. the file should be rewritten.
pub fn load_settings(paths: &DataPaths) -> Result<(Settings, bool)> {
    let path = paths.settings_file();
    let defaults = Settings::defaults(&paths.data_dir);

    if !path.exists() {
        return Ok((defaults, true));
    }

    let contents = std::fs::read_to_string(&path).map_err(|source| Error::Read {
        path: path.clone(),
        source,
    })?;
    let loaded: Map<String, Value> =
        serde_json::from_str(&contents).map_err(|source| Error::Malformed {
            path: path.clone(),
            source,
        })?;

    let mut settings =
        merge_over_defaults(&defaults, &loaded).map_err(|source| Error::Malformed {
            path: path.clone(),
            source,
        })?;
    let repaired = settings.repair();

    let missing_keys = match serde_json::to_value(&defaults) {
        Ok(Value::Object(map)) => map.keys().any(|key| !loaded.contains_key(key)),
        _ => false,
    };

    Ok((settings, missing_keys || repaired))
}

pub fn merge_over_defaults(
    defaults: &Settings,
    loaded: &Map<String, Value>,
) -> std::result::Result<Settings, serde_json::Error> {
    let mut merged = match serde_json::to_value(defaults)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (key, value) in loaded {
        merged.insert(key.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(merged))
}

pub fn save_settings(paths: &DataPaths, settings: &Settings) -> Result<()> {
    let json = serde_json::to_string_pretty(settings).map_err(|err| Error::Persist {
        path: paths.settings_file(),
        reason: err.to_string(),
    })?;
    crate::store::write_atomically(&paths.settings_file(), json.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::defaults(Path::new("/data"));
        assert_eq!(settings.hours_per_day, 4);
        assert_eq!(settings.risk_threshold, 20);
        assert_eq!(settings.notification_lead_days, 3);
        assert_eq!(settings.calendar_filename, PathBuf::from("/data/coursesync_calendar.ics"));
        assert!(!settings.email_enabled);
        assert_eq!(settings.notification_poll_seconds, 60);
    }

    #[test]
    fn merge_keeps_unknown_keys_and_fills_missing() {
        let defaults = Settings::defaults(Path::new("/data"));
        let loaded = json!({ "hours_per_day": 6, "theme": "dark" });
        let merged = merge_over_defaults(&defaults, loaded.as_object().unwrap()).unwrap();

        assert_eq!(merged.hours_per_day, 6);
        assert_eq!(merged.risk_threshold, 20);
        assert_eq!(merged.extra.get("theme"), Some(&json!("dark")));

        let written = serde_json::to_value(&merged).unwrap();
        assert_eq!(written["theme"], "dark");
        assert_eq!(written["risk_threshold"], 20);
    }

    #[test]
    fn patch_rejects_invalid_values_without_mutating() {
        let base = Settings::defaults(Path::new("/data"));
        let patch = SettingsPatch {
            hours_per_day: Some(0),
            ..Default::default()
        };
        assert!(patch.apply(&base).is_err());
        assert_eq!(base.hours_per_day, 4);

        let patch = SettingsPatch {
            notification_poll_seconds: Some(5),
            ..Default::default()
        };
        assert!(patch.apply(&base).is_err());
    }

    #[test]
    fn patch_applies_email_settings() {
        let base = Settings::defaults(Path::new("/data"));
        let patch = SettingsPatch {
            email_enabled: Some(true),
            email_to: Some(" student@example.edu ".to_string()),
            email_schedule_enabled: Some(true),
            ..Default::default()
        };
        let next = patch.apply(&base).unwrap();
        assert_eq!(next.email_to, "student@example.edu");
        assert!(next.scheduler_active());
    }

    #[test]
    fn poll_interval_never_drops_below_minimum() {
        let mut settings = Settings::defaults(Path::new("/data"));
        settings.notification_poll_seconds = 3;
        assert_eq!(settings.poll_interval(), Duration::from_secs(10));
    }

    #[test]
    fn flags_accept_prompt_spellings() {
        assert_eq!(parse_flag("Yes"), Ok(true));
        assert_eq!(parse_flag("0"), Ok(false));
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn load_reports_missing_file_as_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let (settings, needs_write) = load_settings(&paths).unwrap();
        assert!(needs_write);
        assert_eq!(settings, Settings::defaults(dir.path()));
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        std::fs::write(paths.settings_file(), "{ not json").unwrap();
        assert!(matches!(load_settings(&paths), Err(Error::Malformed { .. })));
    }

    #[test]
    fn load_repairs_out_of_range_values() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let file = json!({
            "hours_per_day": 0,
            "risk_threshold": 25,
            "notification_lead_days": 3,
            "calendar_filename": "cal.ics",
            "email_enabled": true,
            "email_to": "not-an-address",
            "email_schedule_enabled": false,
            "notification_poll_seconds": 5
        });
        std::fs::write(paths.settings_file(), file.to_string()).unwrap();

        let (settings, needs_write) = load_settings(&paths).unwrap();
        assert!(needs_write);
        assert_eq!(settings.hours_per_day, DEFAULT_HOURS_PER_DAY);
        assert_eq!(settings.risk_threshold, 25);
        assert_eq!(settings.notification_poll_seconds, MIN_POLL_SECONDS);
        assert!(!settings.email_enabled);
        assert!(settings.validate().is_ok());
    }
}

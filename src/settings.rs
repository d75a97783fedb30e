use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::matcher::MatchOptions;

/// Default similarity threshold for the fuzzy tier.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;
/// Default minimum interval between two fired interception events.
pub const DEFAULT_COOLDOWN_MS: u64 = 1500;
/// Default beep length pushed to the actuator alongside each keyword.
pub const DEFAULT_BEEP_DURATION_MS: u64 = 200;
/// Default number of transcript entries kept for review.
pub const DEFAULT_TRANSCRIPT_CAPACITY: usize = 15;

const SETTINGS_FILE: &str = "settings.json";
const DICTIONARY_FILE: &str = "dictionary.json";
const HISTORY_FILE: &str = "history.sqlite";
const LOG_DIR: &str = "logs";

/// User-tunable knobs, persisted as pretty JSON in the config directory.
/// Unknown or missing fields fall back to defaults so older files keep
/// loading after upgrades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub similarity_threshold: f64,
    pub cooldown_ms: u64,
    pub exact_match: bool,
    pub phonetic_match: bool,
    /// Fold Traditional Chinese transcript text to Simplified before
    /// normalization, for recognizers that emit Traditional output.
    pub fold_traditional: bool,
    pub transcript_capacity: usize,
    pub beep_duration_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            exact_match: true,
            phonetic_match: true,
            fold_traditional: false,
            transcript_capacity: DEFAULT_TRANSCRIPT_CAPACITY,
            beep_duration_ms: DEFAULT_BEEP_DURATION_MS,
        }
    }
}

impl AppSettings {
    /// Scan options derived from these settings.
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            exact_match: self.exact_match,
            phonetic_match: self.phonetic_match,
            similarity_threshold: self.similarity_threshold,
        }
    }

    /// Pulls out-of-range values back to defaults. A threshold outside
    /// (0, 1] would either match everything or nothing, so it is treated
    /// as a corrupt setting rather than honored.
    fn sanitized(mut self) -> Self {
        if !self.similarity_threshold.is_finite()
            || self.similarity_threshold <= 0.0
            || self.similarity_threshold > 1.0
        {
            warn!(
                threshold = self.similarity_threshold,
                "similarity threshold out of range, using default"
            );
            self.similarity_threshold = DEFAULT_SIMILARITY_THRESHOLD;
        }
        if self.transcript_capacity == 0 {
            self.transcript_capacity = DEFAULT_TRANSCRIPT_CAPACITY;
        }
        self
    }
}

/// Default config directory: `~/.config/silenceguard`.
pub fn default_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set, pass --config-dir")?;
    Ok(PathBuf::from(home).join(".config").join("silenceguard"))
}

pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE)
}

pub fn dictionary_path(config_dir: &Path) -> PathBuf {
    config_dir.join(DICTIONARY_FILE)
}

pub fn history_path(config_dir: &Path) -> PathBuf {
    config_dir.join(HISTORY_FILE)
}

pub fn log_dir(config_dir: &Path) -> PathBuf {
    config_dir.join(LOG_DIR)
}

/// Loads settings from the config directory. Missing file means first run
/// and yields defaults silently; an unreadable or corrupt file is reported
/// and also yields defaults so the tool still starts.
pub fn load_settings(config_dir: &Path) -> AppSettings {
    let path = settings_path(config_dir);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => return AppSettings::default(),
    };
    match serde_json::from_str::<AppSettings>(&raw) {
        Ok(settings) => settings.sanitized(),
        Err(error) => {
            warn!(path = %path.display(), %error, "failed to parse settings, using defaults");
            AppSettings::default()
        }
    }
}

/// Writes settings as pretty JSON, holding an exclusive advisory lock on
/// the file while writing.
pub fn save_settings(config_dir: &Path, settings: &AppSettings) -> Result<()> {
    fs::create_dir_all(config_dir)
        .with_context(|| format!("failed to create {}", config_dir.display()))?;
    let path = settings_path(config_dir);
    let file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("failed to lock {}", path.display()))?;
    let result = serde_json::to_writer_pretty(&file, settings)
        .with_context(|| format!("failed to write {}", path.display()));
    if let Err(error) = fs2::FileExt::unlock(&file) {
        warn!(%error, "failed to unlock settings file");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_tuning() {
        let settings = AppSettings::default();
        assert_eq!(settings.similarity_threshold, 0.85);
        assert_eq!(settings.cooldown_ms, 1500);
        assert_eq!(settings.transcript_capacity, 15);
        assert_eq!(settings.beep_duration_ms, 200);
        assert!(settings.exact_match);
        assert!(settings.phonetic_match);
        assert!(!settings.fold_traditional);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = AppSettings::default();
        settings.similarity_threshold = 0.9;
        settings.fold_traditional = true;
        save_settings(dir.path(), &settings).unwrap();
        assert_eq!(load_settings(dir.path()), settings);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_settings(dir.path()), AppSettings::default());
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(settings_path(dir.path()), "{\"similarity_threshold\": oops").unwrap();
        assert_eq!(load_settings(dir.path()), AppSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(settings_path(dir.path()), "{\"cooldown_ms\": 500}").unwrap();
        let settings = load_settings(dir.path());
        assert_eq!(settings.cooldown_ms, 500);
        assert_eq!(settings.similarity_threshold, DEFAULT_SIMILARITY_THRESHOLD);
    }

    #[test]
    fn out_of_range_threshold_resets_to_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(settings_path(dir.path()), "{\"similarity_threshold\": 7.5}").unwrap();
        let settings = load_settings(dir.path());
        assert_eq!(settings.similarity_threshold, DEFAULT_SIMILARITY_THRESHOLD);

        fs::write(settings_path(dir.path()), "{\"similarity_threshold\": 0.0}").unwrap();
        assert_eq!(
            load_settings(dir.path()).similarity_threshold,
            DEFAULT_SIMILARITY_THRESHOLD
        );
    }

    #[test]
    fn match_options_reflect_settings() {
        let mut settings = AppSettings::default();
        settings.exact_match = false;
        settings.similarity_threshold = 0.7;
        let options = settings.match_options();
        assert!(!options.exact_match);
        assert!(options.phonetic_match);
        assert_eq!(options.similarity_threshold, 0.7);
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ExclusionError, Result};
use crate::types::ExcludeMode;

pub const CONFIG_FILENAME: &str = "exclusion.json";
pub const PRIMARY_RULE_FILE: &str = ".obsidianignore";
pub const SECONDARY_RULE_FILE: &str = ".gitignore";

const DEFAULT_MIN_INDICATOR_DURATION_MS: u64 = 2_000;
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 5_000;

/// User-facing exclusion options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExclusionSettings {
    pub exclude_mode: ExcludeMode,
    /// Also evaluate the host's native exclude-filter list.
    pub should_ignore_excluded_files: bool,
    /// Append the secondary rule file to the compiled rule set.
    pub should_include_git_ignore_patterns: bool,
}

impl Default for ExclusionSettings {
    fn default() -> Self {
        Self {
            exclude_mode: ExcludeMode::Full,
            should_ignore_excluded_files: false,
            should_include_git_ignore_patterns: true,
        }
    }
}

impl ExclusionSettings {
    /// True when switching from `self` to `other` changes which paths are
    /// ignored, as opposed to only how they are applied.
    pub fn affects_decisions(&self, other: &Self) -> bool {
        self.should_ignore_excluded_files != other.should_ignore_excluded_files
            || self.should_include_git_ignore_patterns != other.should_include_git_ignore_patterns
    }
}

/// Settings plus engine tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExclusionConfig {
    pub settings: ExclusionSettings,
    pub primary_rule_file: String,
    pub secondary_rule_file: String,
    pub min_indicator_duration_ms: u64,
    pub flush_interval_ms: u64,
    pub reconcile_on_start: bool,
    /// Location of the persisted decision cache. Persistence is off when unset.
    pub cache_path: Option<PathBuf>,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            settings: ExclusionSettings::default(),
            primary_rule_file: PRIMARY_RULE_FILE.to_string(),
            secondary_rule_file: SECONDARY_RULE_FILE.to_string(),
            min_indicator_duration_ms: DEFAULT_MIN_INDICATOR_DURATION_MS,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            reconcile_on_start: true,
            cache_path: None,
        }
    }
}

impl ExclusionConfig {
    pub fn min_indicator_duration(&self) -> Duration {
        Duration::from_millis(self.min_indicator_duration_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.primary_rule_file.trim().is_empty() {
            return Err(ExclusionError::InvalidInput(
                "primaryRuleFile must not be empty".to_string(),
            ));
        }
        if self.primary_rule_file == self.secondary_rule_file {
            return Err(ExclusionError::InvalidInput(format!(
                "primaryRuleFile and secondaryRuleFile are both {}",
                self.primary_rule_file
            )));
        }
        Ok(())
    }
}

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILENAME)
}

/// Loads the config from `dir`, writing defaults when the file is missing.
pub fn load_or_create_config(dir: &Path) -> Result<ExclusionConfig> {
    std::fs::create_dir_all(dir).map_err(|error| {
        ExclusionError::Internal(format!(
            "failed to create config directory {}: {error}",
            dir.display()
        ))
    })?;

    let path = config_path(dir);
    if !path.exists() {
        let config = ExclusionConfig::default();
        write_config(&path, &config)?;
        return Ok(config);
    }

    let data = std::fs::read_to_string(&path).map_err(|error| {
        ExclusionError::Internal(format!(
            "failed to read config {}: {error}",
            path.display()
        ))
    })?;
    let config: ExclusionConfig = serde_json::from_str(&data).map_err(|error| {
        ExclusionError::Serialization(format!(
            "failed to parse config {}: {error}",
            path.display()
        ))
    })?;
    config.validate()?;
    Ok(config)
}

pub fn write_config(path: &Path, config: &ExclusionConfig) -> Result<()> {
    config.validate()?;
    let data = serde_json::to_string_pretty(config).map_err(|error| {
        ExclusionError::Serialization(format!(
            "failed to serialize config {}: {error}",
            path.display()
        ))
    })?;
    std::fs::write(path, data).map_err(|error| {
        ExclusionError::Internal(format!(
            "failed to write config {}: {error}",
            path.display()
        ))
    })?;
    Ok(())
}

//! Process-wide settings for Quest
//!
//! Settings are layered: every value remembers where it came from and is only
//! replaced by a source of equal or higher precedence.

use crate::error::{QuestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const BASE_DIR: &str = "BASE_DIR";
pub const CACHE_DIR: &str = "CACHE_DIR";
pub const PROJECTS_DIR: &str = "PROJECTS_DIR";
pub const USER_SERVICES: &str = "USER_SERVICES";

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from a settings file
    File,
    /// Loaded from environment variable
    Environment,
    /// Set explicitly by the caller (CLI argument or API update)
    Cli,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Cli => 3,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T: PartialEq> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has equal or higher precedence.
    ///
    /// Returns true when the stored value changed.
    pub fn update(&mut self, value: T, source: ConfigSource) -> bool {
        if source.precedence() < self.source.precedence() {
            return false;
        }
        let changed = self.value != value;
        self.value = value;
        self.source = source;
        changed
    }
}

/// Layered settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub base_dir: ConfigValue<PathBuf>,
    pub cache_dir: ConfigValue<PathBuf>,
    pub projects_dir: ConfigValue<PathBuf>,
    pub user_services: ConfigValue<Vec<String>>,
}

/// Which process-wide state must be rebuilt after a settings change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    /// The projects location moved; the active database must be rebound
    pub rebind_database: bool,
    /// The user provider list changed; the provider cache must be dropped
    pub reload_providers: bool,
}

impl SettingsChange {
    pub fn merge(self, other: SettingsChange) -> SettingsChange {
        SettingsChange {
            rebind_database: self.rebind_database || other.rebind_database,
            reload_providers: self.reload_providers || other.reload_providers,
        }
    }
}

/// Explicit settings overrides
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub base_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub projects_dir: Option<PathBuf>,
    pub user_services: Option<Vec<String>>,
}

impl Settings {
    /// Create settings with default values
    pub fn with_defaults() -> Self {
        Self {
            base_dir: ConfigValue::new(default_base_dir(), ConfigSource::Default),
            cache_dir: ConfigValue::new(PathBuf::from("cache"), ConfigSource::Default),
            projects_dir: ConfigValue::new(PathBuf::from("projects"), ConfigSource::Default),
            user_services: ConfigValue::new(Vec::new(), ConfigSource::Default),
        }
    }

    /// Settings rooted at an explicit base directory (used by tests and embedders)
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let mut settings = Self::with_defaults();
        settings.base_dir.update(base_dir.into(), ConfigSource::Cli);
        settings
    }

    /// Load settings from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        self.merge_file(path.as_ref())?;
        Ok(self)
    }

    /// Merge a YAML settings file into these settings
    pub fn merge_file(&mut self, path: &Path) -> Result<SettingsChange> {
        let content = fs::read_to_string(path).map_err(|e| QuestError::ConfigInvalid {
            key: "file".to_string(),
            reason: format!("Failed to read settings file {}: {}", path.display(), e),
        })?;

        let file: FileSettings =
            serde_yaml::from_str(&content).map_err(|e| QuestError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse YAML in {}: {}", path.display(), e),
            })?;

        Ok(self.apply(file.into_update(), ConfigSource::File))
    }

    /// Load settings from environment variables
    pub fn load_from_env(mut self) -> Self {
        if let Ok(dir) = env::var("QUEST_BASE_DIR") {
            self.base_dir.update(PathBuf::from(dir), ConfigSource::Environment);
        }

        if let Ok(dir) = env::var("QUEST_CACHE_DIR") {
            self.cache_dir.update(PathBuf::from(dir), ConfigSource::Environment);
        }

        if let Ok(dir) = env::var("QUEST_PROJECTS_DIR") {
            self.projects_dir.update(PathBuf::from(dir), ConfigSource::Environment);
        }

        if let Ok(services) = env::var("QUEST_USER_SERVICES") {
            let services = parse_user_services(&services);
            if services.is_empty() {
                tracing::warn!("QUEST_USER_SERVICES is set but lists no services");
            }
            self.user_services.update(services, ConfigSource::Environment);
        }

        self
    }

    /// Apply explicit updates and report what must be rebuilt
    pub fn update(&mut self, update: SettingsUpdate) -> SettingsChange {
        self.apply(update, ConfigSource::Cli)
    }

    fn apply(&mut self, update: SettingsUpdate, source: ConfigSource) -> SettingsChange {
        let mut change = SettingsChange::default();

        if let Some(base_dir) = update.base_dir {
            change.rebind_database |= self.base_dir.update(base_dir, source);
        }

        if let Some(cache_dir) = update.cache_dir {
            self.cache_dir.update(cache_dir, source);
        }

        if let Some(projects_dir) = update.projects_dir {
            change.rebind_database |= self.projects_dir.update(projects_dir, source);
        }

        if let Some(user_services) = update.user_services {
            change.reload_providers |= self.user_services.update(user_services, source);
        }

        change
    }

    /// Absolute base directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir.value
    }

    /// Absolute cache directory
    pub fn cache_dir(&self) -> PathBuf {
        resolve_under(&self.base_dir.value, &self.cache_dir.value)
    }

    /// Absolute projects directory
    pub fn projects_dir(&self) -> PathBuf {
        resolve_under(&self.base_dir.value, &self.projects_dir.value)
    }

    /// Configured user provider roots
    pub fn user_services(&self) -> &[String] {
        &self.user_services.value
    }

    /// Write the current settings to a YAML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = FileSettings {
            base_dir: Some(self.base_dir.value.clone()),
            cache_dir: Some(self.cache_dir.value.clone()),
            projects_dir: Some(self.projects_dir.value.clone()),
            user_services: Some(self.user_services.value.clone()),
        };
        let yaml = serde_yaml::to_string(&file)?;
        crate::fs::write_atomic(path, yaml.as_bytes())
    }

    /// Get all settings as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert(
            BASE_DIR.to_string(),
            (self.base_dir.value.display().to_string(), self.base_dir.source),
        );
        map.insert(
            CACHE_DIR.to_string(),
            (self.cache_dir().display().to_string(), self.cache_dir.source),
        );
        map.insert(
            PROJECTS_DIR.to_string(),
            (self.projects_dir().display().to_string(), self.projects_dir.source),
        );
        map.insert(
            USER_SERVICES.to_string(),
            (self.user_services.value.join(","), self.user_services.source),
        );

        map
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Settings as stored in YAML files
#[derive(Debug, Default, Deserialize, Serialize)]
struct FileSettings {
    #[serde(rename = "BASE_DIR", default, skip_serializing_if = "Option::is_none")]
    base_dir: Option<PathBuf>,
    #[serde(rename = "CACHE_DIR", default, skip_serializing_if = "Option::is_none")]
    cache_dir: Option<PathBuf>,
    #[serde(rename = "PROJECTS_DIR", default, skip_serializing_if = "Option::is_none")]
    projects_dir: Option<PathBuf>,
    #[serde(rename = "USER_SERVICES", default, skip_serializing_if = "Option::is_none")]
    user_services: Option<Vec<String>>,
}

impl FileSettings {
    fn into_update(self) -> SettingsUpdate {
        SettingsUpdate {
            base_dir: self.base_dir,
            cache_dir: self.cache_dir,
            projects_dir: self.projects_dir,
            user_services: self.user_services,
        }
    }
}

/// OS-appropriate user data directory for Quest
pub fn default_base_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(env::temp_dir)
        .join("quest")
}

/// Split a comma-separated list of user service roots
pub fn parse_user_services(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn resolve_under(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_settings() {
        let settings = Settings::with_defaults();
        assert_eq!(settings.base_dir.source, ConfigSource::Default);
        assert!(settings.base_dir().ends_with("quest"));
        assert_eq!(settings.cache_dir(), settings.base_dir().join("cache"));
        assert_eq!(settings.projects_dir(), settings.base_dir().join("projects"));
        assert!(settings.user_services().is_empty());
    }

    #[test]
    fn test_config_precedence() {
        let mut value = ConfigValue::new(100, ConfigSource::Default);

        // File should override default
        assert!(value.update(200, ConfigSource::File));
        assert_eq!(value.value, 200);

        // Environment should override file
        value.update(300, ConfigSource::Environment);
        assert_eq!(value.value, 300);
        assert_eq!(value.source, ConfigSource::Environment);

        // Explicit updates override environment and may be repeated
        value.update(400, ConfigSource::Cli);
        value.update(450, ConfigSource::Cli);
        assert_eq!(value.value, 450);

        // Lower precedence should not override
        assert!(!value.update(500, ConfigSource::File));
        assert_eq!(value.value, 450);
        assert_eq!(value.source, ConfigSource::Cli);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
BASE_DIR: /data/quest
CACHE_DIR: /tmp/quest-cache
USER_SERVICES:
  - /srv/services/*
  - https://example.org/provider
"#
        )
        .unwrap();

        let settings = Settings::with_defaults().load_from_file(file.path()).unwrap();

        assert_eq!(settings.base_dir(), Path::new("/data/quest"));
        assert_eq!(settings.base_dir.source, ConfigSource::File);
        assert_eq!(settings.cache_dir(), PathBuf::from("/tmp/quest-cache"));
        assert_eq!(settings.projects_dir(), PathBuf::from("/data/quest/projects"));
        assert_eq!(settings.user_services().len(), 2);
    }

    #[test]
    fn test_update_reports_required_rebinding() {
        let mut settings = Settings::with_base_dir("/data/quest");

        let change = settings.update(SettingsUpdate {
            user_services: Some(vec!["/srv/a".to_string()]),
            ..Default::default()
        });
        assert!(change.reload_providers);
        assert!(!change.rebind_database);

        let change = settings.update(SettingsUpdate {
            projects_dir: Some(PathBuf::from("elsewhere")),
            ..Default::default()
        });
        assert!(change.rebind_database);
        assert!(!change.reload_providers);

        // Same value again changes nothing
        let change = settings.update(SettingsUpdate {
            projects_dir: Some(PathBuf::from("elsewhere")),
            ..Default::default()
        });
        assert_eq!(change, SettingsChange::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yml");

        let mut settings = Settings::with_base_dir(dir.path());
        settings.update(SettingsUpdate {
            user_services: Some(vec!["/srv/services/*".to_string()]),
            ..Default::default()
        });
        settings.save(&path).unwrap();

        let reloaded = Settings::with_defaults().load_from_file(&path).unwrap();
        assert_eq!(reloaded.base_dir(), dir.path());
        assert_eq!(reloaded.user_services(), &["/srv/services/*".to_string()]);
    }

    #[test]
    fn test_parse_user_services() {
        assert_eq!(parse_user_services("a, b ,,c"), vec!["a", "b", "c"]);
        assert!(parse_user_services("  ").is_empty());
    }

    #[test]
    fn test_inspection_map() {
        let settings = Settings::with_base_dir("/data/quest");
        let map = settings.to_inspection_map();

        assert!(map.contains_key(BASE_DIR));
        assert!(map.contains_key(CACHE_DIR));
        assert!(map.contains_key(PROJECTS_DIR));
        assert!(map.contains_key(USER_SERVICES));

        let (value, source) = &map[BASE_DIR];
        assert_eq!(value, "/data/quest");
        assert_eq!(*source, ConfigSource::Cli);
    }
}

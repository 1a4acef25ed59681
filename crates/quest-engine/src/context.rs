//! The `Quest` context object
//!
//! Holds the process-wide state: layered settings, the plugin registry, the
//! lazily built provider set and the lazily bound database of the active
//! project. All of it lives behind one `Arc`, so clones are cheap and can be
//! moved into spawned tasks.

use quest_core::config::{Settings, SettingsChange, SettingsUpdate};
use quest_core::error::{QuestError, Result};
use quest_core::models::Project;
use quest_core::ports::Provider;
use quest_store::MetadataStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::projects;
use crate::registry::{PluginRegistry, ProviderSet};
use crate::tasks::TaskEngine;

/// Name of the settings file written by `save_settings` when no path is given
pub const SETTINGS_FILE: &str = "quest_settings.yml";

/// The database binding of the active project
#[derive(Clone)]
pub(crate) struct ActiveProject {
    pub project: Project,
    pub store: Arc<dyn MetadataStore>,
}

struct Inner {
    settings: RwLock<Settings>,
    registry: PluginRegistry,
    providers: RwLock<Option<Arc<ProviderSet>>>,
    active: RwLock<Option<ActiveProject>>,
    tasks: TaskEngine,
}

/// Entry point of the library
#[derive(Clone)]
pub struct Quest {
    inner: Arc<Inner>,
}

/// Builder for [`Quest`]
#[derive(Default)]
pub struct QuestBuilder {
    settings: Option<Settings>,
    registry: Option<PluginRegistry>,
}

impl QuestBuilder {
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Quest {
        Quest {
            inner: Arc::new(Inner {
                settings: RwLock::new(
                    self.settings
                        .unwrap_or_else(|| Settings::with_defaults().load_from_env()),
                ),
                registry: self.registry.unwrap_or_else(PluginRegistry::with_builtin),
                providers: RwLock::new(None),
                active: RwLock::new(None),
                tasks: TaskEngine::new(),
            }),
        }
    }
}

impl Quest {
    pub fn builder() -> QuestBuilder {
        QuestBuilder::default()
    }

    /// Context with default settings (environment overrides applied) and the built-in plugins
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.inner.registry
    }

    pub(crate) fn task_engine(&self) -> &TaskEngine {
        &self.inner.tasks
    }

    // Settings

    pub async fn get_settings(&self) -> Settings {
        self.inner.settings.read().await.clone()
    }

    /// Apply explicit setting overrides and drop whatever state they invalidate
    pub async fn update_settings(&self, update: SettingsUpdate) -> SettingsChange {
        let change = self.inner.settings.write().await.update(update);
        self.apply_change(change).await;
        change
    }

    /// Merge a YAML settings file into the current settings
    pub async fn load_settings(&self, path: &Path) -> Result<SettingsChange> {
        let change = self.inner.settings.write().await.merge_file(path)?;
        self.apply_change(change).await;
        Ok(change)
    }

    /// Write the current settings to `path`, or to `<BASE_DIR>/quest_settings.yml`
    pub async fn save_settings(&self, path: Option<&Path>) -> Result<PathBuf> {
        let settings = self.inner.settings.read().await;
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| settings.base_dir().join(SETTINGS_FILE));
        settings.save(&path)?;
        info!(path = %path.display(), "Saved settings");
        Ok(path)
    }

    async fn apply_change(&self, change: SettingsChange) {
        if change.rebind_database {
            self.unbind().await;
        }
        if change.reload_providers {
            self.invalidate_providers().await;
        }
    }

    pub(crate) async fn projects_dir(&self) -> PathBuf {
        self.inner.settings.read().await.projects_dir()
    }

    pub(crate) async fn cache_dir(&self) -> PathBuf {
        self.inner.settings.read().await.cache_dir()
    }

    // Providers

    /// The loaded provider set, building it on first use
    pub async fn providers(&self) -> Arc<ProviderSet> {
        if let Some(set) = self.inner.providers.read().await.as_ref() {
            return set.clone();
        }

        let mut guard = self.inner.providers.write().await;
        if let Some(set) = guard.as_ref() {
            return set.clone();
        }

        let user_services = self.inner.settings.read().await.user_services().to_vec();
        let set = Arc::new(self.inner.registry.load_providers(&user_services).await);
        debug!(count = set.len(), "Provider cache built");
        *guard = Some(set.clone());
        set
    }

    /// Drop the cached provider set and rebuild it
    pub async fn reload_providers(&self) -> Arc<ProviderSet> {
        self.invalidate_providers().await;
        self.providers().await
    }

    pub(crate) async fn invalidate_providers(&self) {
        *self.inner.providers.write().await = None;
        debug!("Provider cache invalidated");
    }

    pub async fn provider(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.providers()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| QuestError::ProviderNotFound {
                name: name.to_string(),
            })
    }

    // Active project binding

    /// The active project and its database, binding it on first use
    pub(crate) async fn active(&self) -> Result<ActiveProject> {
        if let Some(active) = self.inner.active.read().await.as_ref() {
            return Ok(active.clone());
        }

        let mut guard = self.inner.active.write().await;
        if let Some(active) = guard.as_ref() {
            return Ok(active.clone());
        }

        let projects_dir = self.projects_dir().await;
        let (project, store) = projects::open_active(&projects_dir).await?;

        let config_path = project.config_path();
        if config_path.exists() {
            let change = self.inner.settings.write().await.merge_file(&config_path)?;
            if change.reload_providers {
                self.invalidate_providers().await;
            }
            if change.rebind_database {
                debug!(project = %project.name, "Project config moved the projects directory");
            }
        }

        debug!(
            project = %project.name,
            db = %project.database_path().display(),
            "Bound project database"
        );
        let active = ActiveProject {
            project,
            store: Arc::new(store),
        };
        *guard = Some(active.clone());
        Ok(active)
    }

    pub(crate) async fn store(&self) -> Result<Arc<dyn MetadataStore>> {
        Ok(self.active().await?.store)
    }

    /// Drop the active database binding; the next operation rebinds it
    pub(crate) async fn unbind(&self) {
        if self.inner.active.write().await.take().is_some() {
            debug!("Unbound project database");
        }
    }

    /// Replace the cached project row after it was updated in the database
    pub(crate) async fn refresh_active_project(&self, project: Project) {
        if let Some(active) = self.inner.active.write().await.as_mut() {
            if active.project.name == project.name {
                active.project = project;
            }
        }
    }
}

impl Default for Quest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quest(tmp: &TempDir) -> Quest {
        Quest::builder()
            .settings(Settings::with_base_dir(tmp.path()))
            .registry(PluginRegistry::with_builtin())
            .build()
    }

    #[tokio::test]
    async fn test_default_project_is_created_on_first_use() {
        let tmp = TempDir::new().unwrap();
        let quest = quest(&tmp);

        let active = quest.active().await.unwrap();
        assert_eq!(active.project.name, "default");
        assert!(active.project.database_path().exists());
    }

    #[tokio::test]
    async fn test_projects_dir_change_unbinds() {
        let tmp = TempDir::new().unwrap();
        let quest = quest(&tmp);
        quest.active().await.unwrap();

        let change = quest
            .update_settings(SettingsUpdate {
                projects_dir: Some(PathBuf::from("elsewhere")),
                ..Default::default()
            })
            .await;
        assert!(change.rebind_database);
        assert!(quest.inner.active.read().await.is_none());

        let active = quest.active().await.unwrap();
        assert!(active.project.folder.starts_with(tmp.path().join("elsewhere")));
    }

    #[tokio::test]
    async fn test_save_and_load_settings() {
        let tmp = TempDir::new().unwrap();
        let quest = quest(&tmp);
        quest
            .update_settings(SettingsUpdate {
                cache_dir: Some(PathBuf::from("my-cache")),
                ..Default::default()
            })
            .await;

        let path = quest.save_settings(None).await.unwrap();
        assert_eq!(path, tmp.path().join(SETTINGS_FILE));

        let other = Quest::builder()
            .settings(Settings::with_defaults())
            .build();
        other.load_settings(&path).await.unwrap();
        assert_eq!(other.get_settings().await.cache_dir(), tmp.path().join("my-cache"));
    }
}

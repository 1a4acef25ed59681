//! Project lifecycle and the project index
//!
//! Projects are folders holding a `metadata.db`. They are listed in
//! `<PROJECTS_DIR>/project_index.yml`, which also records the active one.

use quest_core::error::{QuestError, Result};
use quest_core::models::project::{PROJECT_DB_FILE, PROJECT_INDEX_FILE};
use quest_core::models::{Metadata, Project, ProjectIndex, ProjectIndexEntry, DEFAULT_PROJECT};
use quest_core::uri::is_valid_collection_name;
use quest_store::{ProjectStore, SqliteStore};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::context::Quest;

/// Optional attributes of a new project
#[derive(Debug, Clone, Default)]
pub struct ProjectOptions {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub metadata: Metadata,
    /// Folder of the project; defaults to `<PROJECTS_DIR>/<name>`
    pub folder: Option<PathBuf>,
    /// Make the new project the active one
    pub activate: bool,
}

impl ProjectOptions {
    pub fn activate() -> Self {
        Self {
            activate: true,
            ..Default::default()
        }
    }
}

fn index_path(projects_dir: &Path) -> PathBuf {
    projects_dir.join(PROJECT_INDEX_FILE)
}

/// Folder as recorded in the index: relative when it lives under `projects_dir`
fn index_folder(folder: &Path, projects_dir: &Path) -> PathBuf {
    folder
        .strip_prefix(projects_dir)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| folder.to_path_buf())
}

async fn create_project(
    projects_dir: &Path,
    index: &mut ProjectIndex,
    name: &str,
    options: &ProjectOptions,
) -> Result<Project> {
    if !is_valid_collection_name(name) {
        return Err(QuestError::InvalidUri {
            uri: name.to_string(),
            reason: "project names may only contain letters, digits, '-', '_' and '.'".to_string(),
        });
    }
    if index.contains(name) {
        return Err(QuestError::ProjectExists {
            name: name.to_string(),
        });
    }

    let folder = match &options.folder {
        Some(folder) if folder.is_absolute() => folder.clone(),
        Some(folder) => projects_dir.join(folder),
        None => projects_dir.join(name),
    };
    std::fs::create_dir_all(&folder)?;

    let mut project = Project::new(name, &folder);
    if let Some(display_name) = &options.display_name {
        project.display_name = display_name.clone();
    }
    if let Some(description) = &options.description {
        project.description = description.clone();
    }
    project.metadata = options.metadata.clone();

    let store = SqliteStore::open(&project.database_path()).await?;
    store.save_project(&project).await?;
    store.close().await;

    index.projects.insert(
        name.to_string(),
        ProjectIndexEntry {
            folder: index_folder(&folder, projects_dir),
        },
    );
    info!(project = %name, folder = %folder.display(), "Created project");
    Ok(project)
}

/// Read a project's row, falling back to a bare record if the database is unreadable
async fn read_project(name: &str, folder: &Path) -> Project {
    let fallback = || Project::new(name, folder);
    let store = match SqliteStore::open(&folder.join(PROJECT_DB_FILE)).await {
        Ok(store) => store,
        Err(e) => {
            warn!(project = %name, error = %e, "Could not open project database");
            return fallback();
        }
    };
    let project = match store.get_project().await {
        Ok(Some(mut project)) => {
            project.folder = folder.to_path_buf();
            project
        }
        Ok(None) => fallback(),
        Err(e) => {
            warn!(project = %name, error = %e, "Could not read project row");
            fallback()
        }
    };
    store.close().await;
    project
}

/// Resolve the active project, creating `default` when needed, and open its database
pub(crate) async fn open_active(projects_dir: &Path) -> Result<(Project, SqliteStore)> {
    let path = index_path(projects_dir);
    let mut index = ProjectIndex::load(&path)?;
    let mut dirty = false;

    let name = match index.active_project.clone() {
        Some(name) if index.contains(&name) => name,
        _ => {
            if !index.contains(DEFAULT_PROJECT) {
                let options = ProjectOptions::default();
                create_project(projects_dir, &mut index, DEFAULT_PROJECT, &options).await?;
            }
            index.active_project = Some(DEFAULT_PROJECT.to_string());
            dirty = true;
            DEFAULT_PROJECT.to_string()
        }
    };
    if dirty {
        index.save(&path)?;
    }

    let folder = index
        .project_folder(&name, projects_dir)
        .ok_or_else(|| QuestError::ProjectNotFound { name: name.clone() })?;
    std::fs::create_dir_all(&folder)?;

    let store = SqliteStore::open(&folder.join(PROJECT_DB_FILE)).await?;
    let project = ensure_project_row(&store, &name, &folder).await?;
    Ok((project, store))
}

/// The project row of a database, written when missing or registered under another name
async fn ensure_project_row(store: &SqliteStore, name: &str, folder: &Path) -> Result<Project> {
    match store.get_project().await? {
        Some(mut project) if project.name == name => {
            project.folder = folder.to_path_buf();
            Ok(project)
        }
        Some(mut project) => {
            project.name = name.to_string();
            project.folder = folder.to_path_buf();
            store.save_project(&project).await?;
            Ok(project)
        }
        None => {
            let project = Project::new(name, folder);
            store.save_project(&project).await?;
            Ok(project)
        }
    }
}

impl Quest {
    /// Create a project folder and database and register it in the index
    pub async fn new_project(&self, name: &str, options: ProjectOptions) -> Result<Project> {
        let projects_dir = self.projects_dir().await;
        let path = index_path(&projects_dir);
        let mut index = ProjectIndex::load(&path)?;

        let project = create_project(&projects_dir, &mut index, name, &options).await?;
        if options.activate {
            index.active_project = Some(name.to_string());
        }
        index.save(&path)?;

        if options.activate {
            self.unbind().await;
        }
        Ok(project)
    }

    /// Register an existing project folder under `name`
    pub async fn add_project(&self, name: &str, folder: &Path, activate: bool) -> Result<Project> {
        let projects_dir = self.projects_dir().await;
        let path = index_path(&projects_dir);
        let mut index = ProjectIndex::load(&path)?;

        if index.contains(name) {
            return Err(QuestError::ProjectExists {
                name: name.to_string(),
            });
        }
        let folder = if folder.is_absolute() {
            folder.to_path_buf()
        } else {
            projects_dir.join(folder)
        };
        if !folder.is_dir() {
            return Err(QuestError::ProjectNotFound {
                name: folder.display().to_string(),
            });
        }

        let store = SqliteStore::open(&folder.join(PROJECT_DB_FILE)).await?;
        let project = ensure_project_row(&store, name, &folder).await?;
        store.close().await;

        index.projects.insert(
            name.to_string(),
            ProjectIndexEntry {
                folder: index_folder(&folder, &projects_dir),
            },
        );
        if activate {
            index.active_project = Some(name.to_string());
        }
        index.save(&path)?;
        if activate {
            self.unbind().await;
        }

        info!(project = %name, folder = %folder.display(), "Added existing project");
        Ok(project)
    }

    /// All registered projects, ordered by name
    pub async fn get_projects(&self) -> Result<Vec<Project>> {
        // Make sure the default project exists before listing
        self.active().await?;

        let projects_dir = self.projects_dir().await;
        let index = ProjectIndex::load(&index_path(&projects_dir))?;

        let mut projects = Vec::with_capacity(index.projects.len());
        for name in index.projects.keys() {
            if let Some(folder) = index.project_folder(name, &projects_dir) {
                projects.push(read_project(name, &folder).await);
            }
        }
        Ok(projects)
    }

    pub async fn get_active_project(&self) -> Result<Project> {
        Ok(self.active().await?.project)
    }

    /// Make `name` the active project and rebind the database
    pub async fn set_active_project(&self, name: &str) -> Result<Project> {
        let projects_dir = self.projects_dir().await;
        let path = index_path(&projects_dir);
        let mut index = ProjectIndex::load(&path)?;

        if !index.contains(name) {
            return Err(QuestError::ProjectNotFound {
                name: name.to_string(),
            });
        }
        index.active_project = Some(name.to_string());
        index.save(&path)?;

        self.unbind().await;
        info!(project = %name, "Activated project");
        self.get_active_project().await
    }

    /// Remove a project from the index, optionally deleting its folder
    ///
    /// Deleting the active project re-activates `default`.
    pub async fn delete_project(&self, name: &str, delete_folder: bool) -> Result<()> {
        let projects_dir = self.projects_dir().await;
        let path = index_path(&projects_dir);
        let mut index = ProjectIndex::load(&path)?;

        let folder = index
            .project_folder(name, &projects_dir)
            .ok_or_else(|| QuestError::ProjectNotFound {
                name: name.to_string(),
            })?;

        let was_active = index.active_project.as_deref() == Some(name);
        if was_active {
            self.unbind().await;
            index.active_project = None;
        }
        index.projects.remove(name);
        index.save(&path)?;

        if delete_folder {
            quest_core::fs::remove_path(&folder)?;
        }
        info!(project = %name, delete_folder, "Deleted project");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::PluginRegistry;
    use quest_core::config::Settings;
    use tempfile::TempDir;

    fn quest(tmp: &TempDir) -> Quest {
        Quest::builder()
            .settings(Settings::with_base_dir(tmp.path()))
            .registry(PluginRegistry::empty())
            .build()
    }

    fn names(projects: &[Project]) -> Vec<String> {
        projects.iter().map(|p| p.name.clone()).collect()
    }

    #[tokio::test]
    async fn test_new_then_delete_restores_listing() {
        let tmp = TempDir::new().unwrap();
        let quest = quest(&tmp);
        let before = names(&quest.get_projects().await.unwrap());
        assert_eq!(before, vec!["default"]);

        quest.new_project("p1", ProjectOptions::activate()).await.unwrap();
        assert_eq!(quest.get_active_project().await.unwrap().name, "p1");

        quest.delete_project("p1", true).await.unwrap();
        assert_eq!(names(&quest.get_projects().await.unwrap()), before);
        assert_eq!(quest.get_active_project().await.unwrap().name, "default");
        assert!(!tmp.path().join("projects").join("p1").exists());
    }

    #[tokio::test]
    async fn test_duplicate_project_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let quest = quest(&tmp);
        quest.new_project("p1", ProjectOptions::default()).await.unwrap();

        let err = quest.new_project("p1", ProjectOptions::default()).await.unwrap_err();
        assert!(matches!(err, QuestError::ProjectExists { .. }));

        let err = quest.set_active_project("missing").await.unwrap_err();
        assert!(matches!(err, QuestError::ProjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_add_existing_project_folder() {
        let tmp = TempDir::new().unwrap();
        let quest = quest(&tmp);
        let project = quest
            .new_project(
                "original",
                ProjectOptions {
                    description: Some("river gauges".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        quest.delete_project("original", false).await.unwrap();

        let added = quest.add_project("restored", &project.folder, true).await.unwrap();
        assert_eq!(added.description, "river gauges");
        assert_eq!(quest.get_active_project().await.unwrap().folder, project.folder);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::Metadata;
use crate::error::Result;
use crate::fs::write_atomic;

/// Name of the project that is created when no other project exists
pub const DEFAULT_PROJECT: &str = "default";

/// File name of the project index inside `PROJECTS_DIR`
pub const PROJECT_INDEX_FILE: &str = "project_index.yml";

/// File name of the per-project database
pub const PROJECT_DB_FILE: &str = "metadata.db";

/// File name of the optional per-project settings overlay
pub const PROJECT_CONFIG_FILE: &str = "quest_config.yml";

/// A workspace with its own folder and metadata database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub folder: PathBuf,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: String::new(),
            folder: folder.into(),
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.folder.join(PROJECT_DB_FILE)
    }

    pub fn config_path(&self) -> PathBuf {
        self.folder.join(PROJECT_CONFIG_FILE)
    }

    /// Folder of a collection inside this project
    pub fn collection_path(&self, collection: &str) -> PathBuf {
        self.folder.join(collection)
    }
}

/// One project entry in the index file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectIndexEntry {
    pub folder: PathBuf,
}

/// The `project_index.yml` file kept in `PROJECTS_DIR`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectIndex {
    #[serde(default)]
    pub active_project: Option<String>,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectIndexEntry>,
}

impl ProjectIndex {
    /// Load the index, returning an empty one if the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        write_atomic(path, yaml.as_bytes())
    }

    /// Absolute folder of a project; relative folders resolve against `projects_dir`
    pub fn project_folder(&self, name: &str, projects_dir: &Path) -> Option<PathBuf> {
        self.projects.get(name).map(|entry| {
            if entry.folder.is_absolute() {
                entry.folder.clone()
            } else {
                projects_dir.join(&entry.folder)
            }
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.projects.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROJECT_INDEX_FILE);

        let mut index = ProjectIndex::load(&path).unwrap();
        assert!(index.projects.is_empty());

        index.projects.insert(
            "p1".to_string(),
            ProjectIndexEntry {
                folder: PathBuf::from("p1"),
            },
        );
        index.active_project = Some("p1".to_string());
        index.save(&path).unwrap();

        let loaded = ProjectIndex::load(&path).unwrap();
        assert_eq!(loaded, index);
        assert_eq!(
            loaded.project_folder("p1", dir.path()),
            Some(dir.path().join("p1"))
        );
        assert_eq!(loaded.project_folder("missing", dir.path()), None);
    }

    #[test]
    fn test_index_file_format() {
        let yaml = "active_project: default\n\
                    projects:\n  default:\n    folder: /tmp/quest/default\n";
        let index: ProjectIndex = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(index.active_project.as_deref(), Some("default"));
        assert_eq!(
            index.project_folder("default", Path::new("/ignored")),
            Some(PathBuf::from("/tmp/quest/default"))
        );
    }

    #[test]
    fn test_project_paths() {
        let project = Project::new("p1", "/data/p1");
        assert_eq!(project.display_name, "p1");
        assert_eq!(project.database_path(), PathBuf::from("/data/p1/metadata.db"));
        assert_eq!(project.collection_path("c1"), PathBuf::from("/data/p1/c1"));
    }
}

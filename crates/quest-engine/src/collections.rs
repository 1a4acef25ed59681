//! Collections of the active project

use quest_core::error::{QuestError, Result};
use quest_core::models::{Collection, Metadata};
use quest_core::uri::is_valid_collection_name;
use tracing::info;

use crate::context::Quest;

impl Quest {
    /// Create a collection and its folder in the active project
    pub async fn new_collection(
        &self,
        name: &str,
        display_name: Option<&str>,
        description: Option<&str>,
        metadata: Option<Metadata>,
    ) -> Result<Collection> {
        if !is_valid_collection_name(name) {
            return Err(QuestError::InvalidUri {
                uri: name.to_string(),
                reason: "collection names may only contain letters, digits, '-', '_' and '.'"
                    .to_string(),
            });
        }

        let active = self.active().await?;
        let mut collection = Collection::new(name);
        if let Some(display_name) = display_name {
            collection = collection.with_display_name(display_name);
        }
        if let Some(description) = description {
            collection = collection.with_description(description);
        }
        if let Some(metadata) = metadata {
            collection = collection.with_metadata(metadata);
        }

        active.store.insert_collection(&collection).await?;
        std::fs::create_dir_all(active.project.collection_path(name))?;

        info!(collection = %name, project = %active.project.name, "Created collection");
        Ok(collection)
    }

    pub async fn get_collections(&self) -> Result<Vec<Collection>> {
        self.store().await?.list_collections().await
    }

    pub async fn get_collection(&self, name: &str) -> Result<Collection> {
        self.store()
            .await?
            .get_collection(name)
            .await?
            .ok_or_else(|| QuestError::CollectionNotFound {
                name: name.to_string(),
            })
    }

    /// Delete a collection, its datasets and its folder
    ///
    /// Returns the names of the deleted datasets.
    pub async fn delete_collection(&self, name: &str) -> Result<Vec<String>> {
        let active = self.active().await?;
        let deletions = active.store.delete_collection(name).await?;
        quest_core::fs::remove_path(&active.project.collection_path(name))?;

        for deletion in &deletions {
            if let Some(entry) = &deletion.removed_catalog_entry {
                info!(catalog_entry = %entry, "Removed catalog entry with no remaining datasets");
            }
        }
        info!(collection = %name, datasets = deletions.len(), "Deleted collection");
        Ok(deletions.into_iter().map(|d| d.dataset.name).collect())
    }
}

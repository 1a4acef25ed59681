//! Reading and updating metadata of anything addressable by URI

use quest_core::error::{QuestError, Result};
use quest_core::models::{merge_metadata, DatasetUpdate, Metadata, Project};
use quest_core::uri::{classify_uris, ClassifyOptions, PublisherUri, ServiceUri, UriKind};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;

use crate::context::Quest;

/// Fields to change; `metadata` is merged into the existing mapping
#[derive(Debug, Clone, Default)]
pub struct MetadataUpdate {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Metadata>,
}

impl MetadataUpdate {
    pub fn metadata(metadata: Metadata) -> Self {
        Self {
            metadata: Some(metadata),
            ..Default::default()
        }
    }

    fn apply(&self, display_name: &mut String, description: &mut String, metadata: &mut Metadata) {
        if let Some(v) = &self.display_name {
            *display_name = v.clone();
        }
        if let Some(v) = &self.description {
            *description = v.clone();
        }
        if let Some(update) = &self.metadata {
            merge_metadata(metadata, update);
        }
    }
}

impl Quest {
    /// Metadata of services, catalog entries, collections, datasets and publishers, keyed by URI
    pub async fn get_metadata<S: AsRef<str>>(&self, uris: &[S]) -> Result<BTreeMap<String, Value>> {
        let grouped = classify_uris(uris, &ClassifyOptions::default())?;
        let mut result = BTreeMap::new();

        for (kind, uris) in grouped {
            for uri in uris {
                let value = match kind {
                    UriKind::Service => self.service_metadata(&uri).await?,
                    UriKind::Publisher => self.publisher_metadata(&uri).await?,
                    UriKind::Collection => serde_json::to_value(self.get_collection(&uri).await?)?,
                    UriKind::Dataset => serde_json::to_value(self.get_dataset(&uri).await?)?,
                };
                result.insert(uri, value);
            }
        }
        Ok(result)
    }

    async fn service_metadata(&self, uri: &str) -> Result<Value> {
        let service: ServiceUri = uri.parse()?;
        if service.catalog_id.is_some() {
            let entry = self.catalog_entry(&service, false).await?;
            return Ok(Value::Object(entry.to_row()));
        }

        let (provider, info) = self.resolve_service(&service).await?;
        let mut value = serde_json::to_value(info)?;
        if let Value::Object(map) = &mut value {
            map.insert("uri".to_string(), json!(service.service_uri()));
            map.insert("provider".to_string(), json!(provider.name()));
        }
        Ok(value)
    }

    async fn publisher_metadata(&self, uri: &str) -> Result<Value> {
        let publisher: PublisherUri = uri.parse()?;
        let provider = self.resolve_publisher(&publisher).await?;
        let info = provider
            .publishers()
            .into_iter()
            .find(|p| p.publisher_name == publisher.publisher)
            .ok_or_else(|| QuestError::PublisherNotFound {
                uri: uri.to_string(),
            })?;

        let mut value = serde_json::to_value(info)?;
        if let Value::Object(map) = &mut value {
            map.insert("uri".to_string(), json!(uri));
            map.insert("provider".to_string(), json!(provider.name()));
        }
        Ok(value)
    }

    /// Update collections, datasets and persisted (`svc://quest:`) catalog entries
    ///
    /// Returns the updated metadata mapping of each URI.
    pub async fn update_metadata<S: AsRef<str>>(
        &self,
        uris: &[S],
        update: &MetadataUpdate,
    ) -> Result<BTreeMap<String, Metadata>> {
        let grouped = classify_uris(uris, &ClassifyOptions::excluding(&[UriKind::Publisher]))?;
        let store = self.store().await?;
        let mut result = BTreeMap::new();

        for (kind, uris) in grouped {
            for uri in uris {
                let metadata = match kind {
                    UriKind::Collection => {
                        let mut collection = self.get_collection(&uri).await?;
                        update.apply(
                            &mut collection.display_name,
                            &mut collection.description,
                            &mut collection.metadata,
                        );
                        store.update_collection(&collection).await?;
                        collection.metadata
                    }
                    UriKind::Dataset => {
                        let current = self.get_dataset(&uri).await?;
                        let mut metadata = current.metadata;
                        if let Some(changes) = &update.metadata {
                            merge_metadata(&mut metadata, changes);
                        }
                        let changes = DatasetUpdate {
                            display_name: update.display_name.clone(),
                            description: update.description.clone(),
                            metadata: Some(metadata),
                            ..Default::default()
                        };
                        store.update_dataset(&uri, changes).await?.metadata
                    }
                    UriKind::Service => {
                        let service: ServiceUri = uri.parse()?;
                        if !service.is_quest() || service.catalog_id.is_none() {
                            return Err(QuestError::invalid_options(
                                &uri,
                                "only collections, datasets and svc://quest: catalog entries \
                                 can be updated",
                            ));
                        }
                        let mut entry = store.get_catalog_entry(&uri).await?.ok_or_else(|| {
                            QuestError::CatalogEntryNotFound { uri: uri.clone() }
                        })?;
                        update.apply(
                            &mut entry.display_name,
                            &mut entry.description,
                            &mut entry.metadata,
                        );
                        store.update_catalog_entry(&entry).await?;
                        entry.metadata
                    }
                    UriKind::Publisher => continue,
                };
                result.insert(uri, metadata);
            }
        }

        info!(count = result.len(), "Updated metadata");
        Ok(result)
    }

    /// Update the active project's display name, description and metadata
    pub async fn update_project_metadata(&self, update: &MetadataUpdate) -> Result<Project> {
        let active = self.active().await?;
        let mut project = active.project;
        update.apply(&mut project.display_name, &mut project.description, &mut project.metadata);
        active.store.save_project(&project).await?;
        self.refresh_active_project(project.clone()).await;
        info!(project = %project.name, "Updated project metadata");
        Ok(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewCatalogEntry;
    use crate::registry::PluginRegistry;
    use quest_core::config::Settings;
    use tempfile::TempDir;

    fn quest(tmp: &TempDir) -> Quest {
        Quest::builder()
            .settings(Settings::with_base_dir(tmp.path()))
            .registry(PluginRegistry::empty())
            .build()
    }

    fn metadata(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_collection_metadata_is_merged() {
        let tmp = TempDir::new().unwrap();
        let quest = quest(&tmp);
        quest
            .new_collection("c1", None, None, Some(metadata(json!({"a": 1, "nested": {"x": 1}}))))
            .await
            .unwrap();

        let update = MetadataUpdate {
            display_name: Some("First".to_string()),
            metadata: Some(metadata(json!({"b": 2, "nested": {"y": 2}}))),
            ..Default::default()
        };
        quest.update_metadata(&["c1"], &update).await.unwrap();

        let all = quest.get_metadata(&["c1"]).await.unwrap();
        let c1 = &all["c1"];
        assert_eq!(c1["display_name"], "First");
        assert_eq!(c1["metadata"], json!({"a": 1, "b": 2, "nested": {"x": 1, "y": 2}}));
    }

    #[tokio::test]
    async fn test_quest_catalog_entry_update() {
        let tmp = TempDir::new().unwrap();
        let quest = quest(&tmp);
        let uri = quest
            .new_catalog_entry(NewCatalogEntry {
                display_name: Some("gauge".to_string()),
                metadata: metadata(json!({"site": "a"})),
                ..Default::default()
            })
            .await
            .unwrap();

        let update = MetadataUpdate::metadata(metadata(json!({"river": "b"})));
        quest.update_metadata(&[uri.as_str()], &update).await.unwrap();

        let all = quest.get_metadata(&[uri.as_str()]).await.unwrap();
        assert_eq!(all[&uri]["display_name"], "gauge");
        assert_eq!(all[&uri]["metadata"], json!({"site": "a", "river": "b"}));
    }

    #[tokio::test]
    async fn test_project_metadata_update() {
        let tmp = TempDir::new().unwrap();
        let quest = quest(&tmp);
        let update = MetadataUpdate {
            description: Some("Streamflow study".to_string()),
            ..Default::default()
        };
        quest.update_project_metadata(&update).await.unwrap();
        assert_eq!(
            quest.get_active_project().await.unwrap().description,
            "Streamflow study"
        );
    }
}

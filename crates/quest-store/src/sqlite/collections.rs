use async_trait::async_trait;
use quest_core::error::{QuestError, Result};
use quest_core::models::{Collection, Dataset};

use super::catalog::remove_if_orphaned;
use super::rows::{metadata_to_json, timestamp_to_text, CollectionRow, DatasetRow};
use super::{db_error, is_unique_violation, SqliteStore};
use crate::ports::{CollectionStore, DatasetDeletion};

#[async_trait]
impl CollectionStore for SqliteStore {
    async fn insert_collection(&self, collection: &Collection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO collections (name, display_name, description, metadata, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&collection.name)
        .bind(&collection.display_name)
        .bind(&collection.description)
        .bind(metadata_to_json(&collection.metadata)?)
        .bind(timestamp_to_text(&collection.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                QuestError::CollectionExists {
                    name: collection.name.clone(),
                }
            } else {
                db_error("Failed to create collection", e)
            }
        })?;
        Ok(())
    }

    async fn get_collection(&self, name: &str) -> Result<Option<Collection>> {
        let row = sqlx::query_as::<_, CollectionRow>("SELECT * FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get collection", e))?;

        row.map(Collection::try_from).transpose()
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let rows = sqlx::query_as::<_, CollectionRow>("SELECT * FROM collections ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list collections", e))?;

        rows.into_iter().map(Collection::try_from).collect()
    }

    async fn update_collection(&self, collection: &Collection) -> Result<()> {
        let result = sqlx::query(
            "UPDATE collections SET display_name = ?, description = ?, metadata = ? WHERE name = ?",
        )
        .bind(&collection.display_name)
        .bind(&collection.description)
        .bind(metadata_to_json(&collection.metadata)?)
        .bind(&collection.name)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update collection", e))?;

        if result.rows_affected() == 0 {
            return Err(QuestError::CollectionNotFound {
                name: collection.name.clone(),
            });
        }
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<Vec<DatasetDeletion>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let exists: Option<(String,)> =
            sqlx::query_as("SELECT name FROM collections WHERE name = ?")
                .bind(name)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to get collection", e))?;
        if exists.is_none() {
            return Err(QuestError::CollectionNotFound {
                name: name.to_string(),
            });
        }

        let rows = sqlx::query_as::<_, DatasetRow>("SELECT * FROM datasets WHERE collection = ?")
            .bind(name)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to list collection datasets", e))?;
        let datasets = rows
            .into_iter()
            .map(Dataset::try_from)
            .collect::<Result<Vec<_>>>()?;

        sqlx::query("DELETE FROM datasets WHERE collection = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to delete collection datasets", e))?;

        let mut deletions = Vec::with_capacity(datasets.len());
        for dataset in datasets {
            let removed_catalog_entry = remove_if_orphaned(&mut tx, &dataset.catalog_entry).await?;
            deletions.push(DatasetDeletion {
                dataset,
                removed_catalog_entry,
            });
        }

        sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to delete collection", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit collection deletion", e))?;
        Ok(deletions)
    }
}

use async_trait::async_trait;
use quest_core::error::{QuestError, Result};
use quest_core::models::{CatalogEntry, Dataset, DatasetUpdate};
use sqlx::{Sqlite, Transaction};

use super::catalog::{insert_entry, remove_if_orphaned};
use super::rows::{metadata_to_json, path_to_text, timestamp_to_text, DatasetRow};
use super::{db_error, is_unique_violation, SqliteStore};
use crate::ports::{DatasetDeletion, DatasetQuery, DatasetStore};

async fn insert_row(tx: &mut Transaction<'_, Sqlite>, dataset: &Dataset) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO datasets
            (name, collection, catalog_entry, source, status, options, parameter, unit,
             datatype, file_format, file_path, visualization_path, message, display_name,
             description, metadata, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&dataset.name)
    .bind(&dataset.collection)
    .bind(&dataset.catalog_entry)
    .bind(dataset.source.as_str())
    .bind(dataset.status.as_str())
    .bind(metadata_to_json(&dataset.options)?)
    .bind(&dataset.parameter)
    .bind(&dataset.unit)
    .bind(&dataset.datatype)
    .bind(&dataset.file_format)
    .bind(path_to_text(&dataset.file_path))
    .bind(path_to_text(&dataset.visualization_path))
    .bind(&dataset.message)
    .bind(&dataset.display_name)
    .bind(&dataset.description)
    .bind(metadata_to_json(&dataset.metadata)?)
    .bind(timestamp_to_text(&dataset.created_at))
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            QuestError::invalid_options("dataset", format!("{} already exists", dataset.name))
        } else if matches!(&e, sqlx::Error::Database(db) if db.is_foreign_key_violation()) {
            QuestError::CollectionNotFound {
                name: dataset.collection.clone(),
            }
        } else {
            db_error("Failed to insert dataset", e)
        }
    })?;
    Ok(())
}

async fn fetch_row(tx: &mut Transaction<'_, Sqlite>, name: &str) -> Result<Dataset> {
    let row = sqlx::query_as::<_, DatasetRow>("SELECT * FROM datasets WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to get dataset", e))?;

    row.map(Dataset::try_from)
        .transpose()?
        .ok_or_else(|| QuestError::DatasetNotFound {
            name: name.to_string(),
        })
}

#[async_trait]
impl DatasetStore for SqliteStore {
    async fn insert_dataset(&self, dataset: &Dataset) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;
        insert_row(&mut tx, dataset).await?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit dataset", e))
    }

    async fn insert_derived(&self, entry: &CatalogEntry, dataset: &Dataset) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;
        insert_entry(&mut tx, entry).await?;
        insert_row(&mut tx, dataset).await?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit derived dataset", e))
    }

    async fn get_dataset(&self, name: &str) -> Result<Option<Dataset>> {
        let row = sqlx::query_as::<_, DatasetRow>("SELECT * FROM datasets WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get dataset", e))?;

        row.map(Dataset::try_from).transpose()
    }

    async fn list_datasets(&self, query: &DatasetQuery) -> Result<Vec<Dataset>> {
        let rows = sqlx::query_as::<_, DatasetRow>(
            r#"
            SELECT * FROM datasets
            WHERE (?1 IS NULL OR collection = ?1)
              AND (?2 IS NULL OR catalog_entry = ?2)
              AND (?3 IS NULL OR status = ?3)
              AND (?4 IS NULL OR source = ?4)
            ORDER BY created_at, name
            "#,
        )
        .bind(&query.collection)
        .bind(&query.catalog_entry)
        .bind(query.status.map(|s| s.as_str()))
        .bind(query.source.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list datasets", e))?;

        let datasets = rows
            .into_iter()
            .map(Dataset::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(datasets.into_iter().filter(|d| query.matches(d)).collect())
    }

    async fn update_dataset(&self, name: &str, update: DatasetUpdate) -> Result<Dataset> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let mut dataset = fetch_row(&mut tx, name).await?;
        update.apply(&mut dataset);

        sqlx::query(
            r#"
            UPDATE datasets SET
                collection = ?, status = ?, options = ?, parameter = ?, unit = ?, datatype = ?,
                file_format = ?, file_path = ?, visualization_path = ?, message = ?,
                display_name = ?, description = ?, metadata = ?
            WHERE name = ?
            "#,
        )
        .bind(&dataset.collection)
        .bind(dataset.status.as_str())
        .bind(metadata_to_json(&dataset.options)?)
        .bind(&dataset.parameter)
        .bind(&dataset.unit)
        .bind(&dataset.datatype)
        .bind(&dataset.file_format)
        .bind(path_to_text(&dataset.file_path))
        .bind(path_to_text(&dataset.visualization_path))
        .bind(&dataset.message)
        .bind(&dataset.display_name)
        .bind(&dataset.description)
        .bind(metadata_to_json(&dataset.metadata)?)
        .bind(name)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if matches!(&e, sqlx::Error::Database(db) if db.is_foreign_key_violation()) {
                QuestError::CollectionNotFound {
                    name: dataset.collection.clone(),
                }
            } else {
                db_error("Failed to update dataset", e)
            }
        })?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit dataset update", e))?;
        Ok(dataset)
    }

    async fn delete_dataset(&self, name: &str) -> Result<DatasetDeletion> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        let dataset = fetch_row(&mut tx, name).await?;

        sqlx::query("DELETE FROM datasets WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to delete dataset", e))?;

        let removed_catalog_entry = remove_if_orphaned(&mut tx, &dataset.catalog_entry).await?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit dataset deletion", e))?;

        Ok(DatasetDeletion {
            dataset,
            removed_catalog_entry,
        })
    }
}

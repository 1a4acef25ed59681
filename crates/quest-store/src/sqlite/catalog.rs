use async_trait::async_trait;
use chrono::Utc;
use quest_core::error::{QuestError, Result};
use quest_core::models::CatalogEntry;
use sqlx::{Sqlite, Transaction};

use super::rows::{metadata_to_json, timestamp_to_text, CatalogEntryRow};
use super::{db_error, is_unique_violation, SqliteStore};
use crate::ports::CatalogStore;

/// Insert a catalog entry inside an open transaction
pub(super) async fn insert_entry(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &CatalogEntry,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO catalog_entries
            (name, service, service_id, publisher_id, display_name, description,
             geometry, parameters, metadata, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.name)
    .bind(&entry.service)
    .bind(&entry.service_id)
    .bind(&entry.publisher_id)
    .bind(&entry.display_name)
    .bind(&entry.description)
    .bind(&entry.geometry)
    .bind(&entry.parameters)
    .bind(metadata_to_json(&entry.metadata)?)
    .bind(timestamp_to_text(&Utc::now()))
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            QuestError::invalid_options("catalog entry", format!("{} already exists", entry.name))
        } else {
            db_error("Failed to insert catalog entry", e)
        }
    })?;
    Ok(())
}

/// Delete a persisted catalog entry if no dataset references it any more
pub(super) async fn remove_if_orphaned(
    tx: &mut Transaction<'_, Sqlite>,
    uri: &str,
) -> Result<Option<String>> {
    let (remaining,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM datasets WHERE catalog_entry = ?")
            .bind(uri)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| db_error("Failed to count catalog entry references", e))?;
    if remaining > 0 {
        return Ok(None);
    }

    let result = sqlx::query("DELETE FROM catalog_entries WHERE name = ?")
        .bind(uri)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("Failed to delete catalog entry", e))?;

    Ok((result.rows_affected() > 0).then(|| uri.to_string()))
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn insert_catalog_entry(&self, entry: &CatalogEntry) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;
        insert_entry(&mut tx, entry).await?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit catalog entry", e))
    }

    async fn get_catalog_entry(&self, name: &str) -> Result<Option<CatalogEntry>> {
        let row =
            sqlx::query_as::<_, CatalogEntryRow>("SELECT * FROM catalog_entries WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("Failed to get catalog entry", e))?;

        row.map(CatalogEntry::try_from).transpose()
    }

    async fn list_catalog_entries(&self, names: Option<&[String]>) -> Result<Vec<CatalogEntry>> {
        let rows =
            sqlx::query_as::<_, CatalogEntryRow>("SELECT * FROM catalog_entries ORDER BY name")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("Failed to list catalog entries", e))?;

        rows.into_iter()
            .filter(|row| names.map_or(true, |names| names.contains(&row.name)))
            .map(CatalogEntry::try_from)
            .collect()
    }

    async fn update_catalog_entry(&self, entry: &CatalogEntry) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE catalog_entries
            SET display_name = ?, description = ?, geometry = ?, parameters = ?, metadata = ?
            WHERE name = ?
            "#,
        )
        .bind(&entry.display_name)
        .bind(&entry.description)
        .bind(&entry.geometry)
        .bind(&entry.parameters)
        .bind(metadata_to_json(&entry.metadata)?)
        .bind(&entry.name)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update catalog entry", e))?;

        if result.rows_affected() == 0 {
            return Err(QuestError::CatalogEntryNotFound {
                uri: entry.name.clone(),
            });
        }
        Ok(())
    }

    async fn delete_catalog_entry(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM catalog_entries WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete catalog entry", e))?;
        Ok(result.rows_affected() > 0)
    }
}

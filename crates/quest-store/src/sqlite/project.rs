use async_trait::async_trait;
use quest_core::error::Result;
use quest_core::models::Project;

use super::rows::{metadata_to_json, timestamp_to_text, ProjectRow};
use super::{db_error, SqliteStore};
use crate::ports::ProjectStore;

#[async_trait]
impl ProjectStore for SqliteStore {
    async fn get_project(&self) -> Result<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>("SELECT * FROM project LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get project", e))?;

        row.map(Project::try_from).transpose()
    }

    async fn save_project(&self, project: &Project) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        // A project database holds exactly one project row
        sqlx::query("DELETE FROM project WHERE name != ?")
            .bind(&project.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to save project", e))?;

        sqlx::query(
            r#"
            INSERT INTO project (name, display_name, description, folder, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                display_name = excluded.display_name,
                description = excluded.description,
                folder = excluded.folder,
                metadata = excluded.metadata
            "#,
        )
        .bind(&project.name)
        .bind(&project.display_name)
        .bind(&project.description)
        .bind(project.folder.to_string_lossy().into_owned())
        .bind(metadata_to_json(&project.metadata)?)
        .bind(timestamp_to_text(&project.created_at))
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to save project", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit project", e))
    }
}

use async_trait::async_trait;
use quest_core::error::Result;
use quest_core::models::ProviderCredentials;

use super::rows::CredentialsRow;
use super::{db_error, SqliteStore};
use crate::ports::CredentialStore;

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn set_credentials(&self, credentials: &ProviderCredentials) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO provider_credentials (provider, username, password)
            VALUES (?, ?, ?)
            ON CONFLICT(provider) DO UPDATE SET
                username = excluded.username,
                password = excluded.password
            "#,
        )
        .bind(&credentials.provider)
        .bind(&credentials.username)
        .bind(&credentials.password)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to store credentials", e))?;
        Ok(())
    }

    async fn get_credentials(&self, provider: &str) -> Result<Option<ProviderCredentials>> {
        let row = sqlx::query_as::<_, CredentialsRow>(
            "SELECT * FROM provider_credentials WHERE provider = ?",
        )
        .bind(provider)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get credentials", e))?;

        Ok(row.map(ProviderCredentials::from))
    }

    async fn delete_credentials(&self, provider: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM provider_credentials WHERE provider = ?")
            .bind(provider)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete credentials", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_credential_providers(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT provider FROM provider_credentials ORDER BY provider")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| db_error("Failed to list credentials", e))?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }
}

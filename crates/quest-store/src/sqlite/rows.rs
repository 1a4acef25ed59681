//! Row types as stored in SQLite and their conversions to domain models
//!
//! Mappings are stored as JSON text, timestamps as RFC 3339 text and paths as text.

use chrono::{DateTime, Utc};
use quest_core::error::{QuestError, Result};
use quest_core::models::{
    CatalogEntry, Collection, Dataset, Metadata, Project, ProviderCredentials,
};
use sqlx::FromRow;
use std::path::PathBuf;

#[derive(Debug, FromRow)]
pub(crate) struct ProjectRow {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub folder: String,
    pub metadata: String,
    pub created_at: String,
}

impl TryFrom<ProjectRow> for Project {
    type Error = QuestError;

    fn try_from(row: ProjectRow) -> Result<Self> {
        Ok(Project {
            name: row.name,
            display_name: row.display_name,
            description: row.description,
            folder: PathBuf::from(row.folder),
            metadata: metadata_from_json(&row.metadata)?,
            created_at: timestamp_from_text(&row.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct CollectionRow {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub metadata: String,
    pub created_at: String,
}

impl TryFrom<CollectionRow> for Collection {
    type Error = QuestError;

    fn try_from(row: CollectionRow) -> Result<Self> {
        Ok(Collection {
            name: row.name,
            display_name: row.display_name,
            description: row.description,
            metadata: metadata_from_json(&row.metadata)?,
            created_at: timestamp_from_text(&row.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct CatalogEntryRow {
    pub name: String,
    pub service: String,
    pub service_id: String,
    pub publisher_id: Option<String>,
    pub display_name: String,
    pub description: String,
    pub geometry: Option<String>,
    pub parameters: String,
    pub metadata: String,
}

impl TryFrom<CatalogEntryRow> for CatalogEntry {
    type Error = QuestError;

    fn try_from(row: CatalogEntryRow) -> Result<Self> {
        Ok(CatalogEntry {
            name: row.name,
            service: row.service,
            service_id: row.service_id,
            publisher_id: row.publisher_id,
            display_name: row.display_name,
            description: row.description,
            geometry: row.geometry,
            parameters: row.parameters,
            metadata: metadata_from_json(&row.metadata)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct DatasetRow {
    pub name: String,
    pub collection: String,
    pub catalog_entry: String,
    pub source: String,
    pub status: String,
    pub options: String,
    pub parameter: Option<String>,
    pub unit: Option<String>,
    pub datatype: Option<String>,
    pub file_format: Option<String>,
    pub file_path: Option<String>,
    pub visualization_path: Option<String>,
    pub message: Option<String>,
    pub display_name: String,
    pub description: String,
    pub metadata: String,
    pub created_at: String,
}

impl TryFrom<DatasetRow> for Dataset {
    type Error = QuestError;

    fn try_from(row: DatasetRow) -> Result<Self> {
        Ok(Dataset {
            name: row.name,
            collection: row.collection,
            catalog_entry: row.catalog_entry,
            source: row.source.parse()?,
            status: row.status.parse()?,
            options: metadata_from_json(&row.options)?,
            parameter: row.parameter,
            unit: row.unit,
            datatype: row.datatype,
            file_format: row.file_format,
            file_path: row.file_path.map(PathBuf::from),
            visualization_path: row.visualization_path.map(PathBuf::from),
            message: row.message,
            display_name: row.display_name,
            description: row.description,
            metadata: metadata_from_json(&row.metadata)?,
            created_at: timestamp_from_text(&row.created_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct CredentialsRow {
    pub provider: String,
    pub username: String,
    pub password: String,
}

impl From<CredentialsRow> for ProviderCredentials {
    fn from(row: CredentialsRow) -> Self {
        ProviderCredentials::new(row.provider, row.username, row.password)
    }
}

pub(crate) fn metadata_to_json(metadata: &Metadata) -> Result<String> {
    Ok(serde_json::to_string(metadata)?)
}

pub(crate) fn metadata_from_json(text: &str) -> Result<Metadata> {
    if text.trim().is_empty() {
        return Ok(Metadata::new());
    }
    Ok(serde_json::from_str(text)?)
}

pub(crate) fn timestamp_to_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn timestamp_from_text(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| QuestError::Database(format!("Invalid timestamp '{}': {}", text, e)))
}

pub(crate) fn path_to_text(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().into_owned())
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::Metadata;
use crate::error::{QuestError, Result};

/// Where a dataset's bytes come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetSource {
    #[serde(rename = "webservice")]
    WebService,
    #[serde(rename = "derived")]
    Derived,
    #[serde(rename = "user")]
    User,
}

impl DatasetSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetSource::WebService => "webservice",
            DatasetSource::Derived => "derived",
            DatasetSource::User => "user",
        }
    }
}

impl fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetSource {
    type Err = QuestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "webservice" => Ok(DatasetSource::WebService),
            "derived" => Ok(DatasetSource::Derived),
            "user" => Ok(DatasetSource::User),
            other => Err(QuestError::invalid_options(
                "dataset source",
                format!("unknown source '{}'", other),
            )),
        }
    }
}

/// Lifecycle state of a dataset
///
/// `NotStaged -> Staged -> Pending -> Downloaded | FailedDownload`; `Derived` and
/// `Filtered` are terminal states reached from tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatasetStatus {
    #[serde(rename = "not staged")]
    NotStaged,
    #[serde(rename = "staged for download")]
    Staged,
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "downloaded")]
    Downloaded,
    #[serde(rename = "failed download")]
    FailedDownload,
    #[serde(rename = "filter applied")]
    Filtered,
    #[serde(rename = "derived")]
    Derived,
}

impl DatasetStatus {
    pub const ALL: [DatasetStatus; 7] = [
        DatasetStatus::NotStaged,
        DatasetStatus::Staged,
        DatasetStatus::Pending,
        DatasetStatus::Downloaded,
        DatasetStatus::FailedDownload,
        DatasetStatus::Filtered,
        DatasetStatus::Derived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::NotStaged => "not staged",
            DatasetStatus::Staged => "staged for download",
            DatasetStatus::Pending => "pending",
            DatasetStatus::Downloaded => "downloaded",
            DatasetStatus::FailedDownload => "failed download",
            DatasetStatus::Filtered => "filter applied",
            DatasetStatus::Derived => "derived",
        }
    }

    /// Whether the dataset has a file on disk
    pub fn has_file(&self) -> bool {
        matches!(
            self,
            DatasetStatus::Downloaded | DatasetStatus::Derived | DatasetStatus::Filtered
        )
    }
}

impl fmt::Display for DatasetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetStatus {
    type Err = QuestError;

    fn from_str(s: &str) -> Result<Self> {
        DatasetStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| {
                QuestError::invalid_options("dataset status", format!("unknown status '{}'", s))
            })
    }
}

/// A local materialization of a catalog entry inside a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub collection: String,
    pub catalog_entry: String,
    pub source: DatasetSource,
    pub status: DatasetStatus,
    #[serde(default)]
    pub options: Metadata,
    pub parameter: Option<String>,
    pub unit: Option<String>,
    pub datatype: Option<String>,
    pub file_format: Option<String>,
    pub file_path: Option<PathBuf>,
    pub visualization_path: Option<PathBuf>,
    pub message: Option<String>,
    pub display_name: String,
    pub description: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Dataset {
    /// Flat column view used by dataset filters and tabular output
    pub fn to_row(&self) -> serde_json::Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }

    /// Provider name of the dataset's catalog entry, if it is a service URI
    pub fn provider(&self) -> Option<&str> {
        self.catalog_entry
            .strip_prefix(crate::uri::SERVICE_SCHEME)
            .and_then(|rest| rest.split(':').next())
    }
}

/// Parameters for inserting a dataset row
#[derive(Debug, Clone)]
pub struct NewDataset {
    pub catalog_entry: String,
    pub collection: String,
    pub source: DatasetSource,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub metadata: Metadata,
    pub file_path: Option<PathBuf>,
    pub file_format: Option<String>,
}

impl NewDataset {
    pub fn new(
        catalog_entry: impl Into<String>,
        collection: impl Into<String>,
        source: DatasetSource,
    ) -> Self {
        Self {
            catalog_entry: catalog_entry.into(),
            collection: collection.into(),
            source,
            display_name: None,
            description: None,
            metadata: Metadata::new(),
            file_path: None,
            file_format: None,
        }
    }

    /// Initial status of the row; derived datasets start out derived
    pub fn initial_status(&self) -> DatasetStatus {
        match self.source {
            DatasetSource::Derived => DatasetStatus::Derived,
            DatasetSource::WebService | DatasetSource::User => DatasetStatus::NotStaged,
        }
    }

    /// Materialize the row under `name`; the display name defaults to the name
    pub fn into_dataset(self, name: String) -> Dataset {
        let status = self.initial_status();
        Dataset {
            display_name: self.display_name.unwrap_or_else(|| name.clone()),
            description: self.description.unwrap_or_default(),
            name,
            collection: self.collection,
            catalog_entry: self.catalog_entry,
            source: self.source,
            status,
            options: Metadata::new(),
            parameter: None,
            unit: None,
            datatype: None,
            file_format: self.file_format,
            file_path: self.file_path,
            visualization_path: None,
            message: None,
            metadata: self.metadata,
            created_at: Utc::now(),
        }
    }
}

/// Partial update of a dataset row; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct DatasetUpdate {
    pub collection: Option<String>,
    pub status: Option<DatasetStatus>,
    pub options: Option<Metadata>,
    pub parameter: Option<String>,
    pub unit: Option<String>,
    pub datatype: Option<String>,
    pub file_format: Option<String>,
    pub file_path: Option<PathBuf>,
    pub visualization_path: Option<PathBuf>,
    pub message: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<Metadata>,
}

impl DatasetUpdate {
    pub fn status(status: DatasetStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Apply this update to an in-memory dataset
    pub fn apply(self, dataset: &mut Dataset) {
        if let Some(v) = self.collection {
            dataset.collection = v;
        }
        if let Some(v) = self.status {
            dataset.status = v;
        }
        if let Some(v) = self.options {
            dataset.options = v;
        }
        if let Some(v) = self.parameter {
            dataset.parameter = Some(v);
        }
        if let Some(v) = self.unit {
            dataset.unit = Some(v);
        }
        if let Some(v) = self.datatype {
            dataset.datatype = Some(v);
        }
        if let Some(v) = self.file_format {
            dataset.file_format = Some(v);
        }
        if let Some(v) = self.file_path {
            dataset.file_path = Some(v);
        }
        if let Some(v) = self.visualization_path {
            dataset.visualization_path = Some(v);
        }
        if let Some(v) = self.message {
            dataset.message = Some(v);
        }
        if let Some(v) = self.display_name {
            dataset.display_name = v;
        }
        if let Some(v) = self.description {
            dataset.description = v;
        }
        if let Some(v) = self.metadata {
            dataset.metadata = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(DatasetStatus::Staged.to_string(), "staged for download");
        assert_eq!(
            serde_json::to_value(DatasetStatus::Filtered).unwrap(),
            serde_json::json!("filter applied")
        );
        for status in DatasetStatus::ALL {
            assert_eq!(status.as_str().parse::<DatasetStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<DatasetStatus>().is_err());
    }

    #[test]
    fn test_source_strings() {
        assert_eq!(DatasetSource::WebService.to_string(), "webservice");
        assert_eq!("derived".parse::<DatasetSource>().unwrap(), DatasetSource::Derived);
    }

    #[test]
    fn test_new_dataset_defaults() {
        let dataset = NewDataset::new("svc://a:b/1", "c1", DatasetSource::WebService)
            .into_dataset("d0000000000000000000000000000001".to_string());

        assert_eq!(dataset.status, DatasetStatus::NotStaged);
        assert_eq!(dataset.display_name, dataset.name);
        assert_eq!(dataset.provider(), Some("a"));

        let derived = NewDataset::new("svc://quest:quest/1", "c1", DatasetSource::Derived)
            .into_dataset("d0000000000000000000000000000002".to_string());
        assert_eq!(derived.status, DatasetStatus::Derived);
    }

    #[test]
    fn test_update_apply() {
        let mut dataset = NewDataset::new("svc://a:b/1", "c1", DatasetSource::WebService)
            .into_dataset("d0000000000000000000000000000001".to_string());

        DatasetUpdate {
            status: Some(DatasetStatus::Downloaded),
            message: Some("success".to_string()),
            ..Default::default()
        }
        .apply(&mut dataset);

        assert_eq!(dataset.status, DatasetStatus::Downloaded);
        assert_eq!(dataset.message.as_deref(), Some("success"));
        assert_eq!(dataset.collection, "c1");
    }

    #[test]
    fn test_row_uses_wire_strings() {
        let dataset = NewDataset::new("svc://a:b/1", "c1", DatasetSource::WebService)
            .into_dataset("d0000000000000000000000000000001".to_string());
        let row = dataset.to_row();
        assert_eq!(row["status"], "not staged");
        assert_eq!(row["source"], "webservice");
    }
}

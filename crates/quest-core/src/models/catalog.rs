use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Metadata;
use crate::error::Result;
use crate::uri::ServiceUri;

/// Columns that belong to the common catalog schema. Everything else a provider
/// returns is folded into `metadata`.
pub const RESERVED_CATALOG_FIELDS: &[&str] = &[
    "name",
    "service",
    "service_id",
    "publisher_id",
    "display_name",
    "description",
    "reserved",
    "geometry",
    "parameters",
];

/// A referenceable geospatial or temporal record
///
/// `name` is the canonical URI `svc://<provider>:<service>/<service_id>`.
/// `geometry` is WKT, or `None` for entries without a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub service: String,
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_id: Option<String>,
    pub display_name: String,
    pub description: String,
    pub geometry: Option<String>,
    pub parameters: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl CatalogEntry {
    /// Build an entry for `service_id` of `service`, deriving `name` from the service URI
    pub fn new(service: &ServiceUri, service_id: impl Into<String>) -> Self {
        let service_id = service_id.into();
        Self {
            name: service.catalog_entry_uri(&service_id),
            service: service.service_uri(),
            display_name: service_id.clone(),
            service_id,
            publisher_id: None,
            description: String::new(),
            geometry: None,
            parameters: String::new(),
            metadata: Metadata::new(),
        }
    }

    /// Recompute `service` and `name` against `service`
    pub fn relabel(&mut self, service: &ServiceUri) {
        self.service = service.service_uri();
        self.name = service.catalog_entry_uri(&self.service_id);
    }

    pub fn service_uri(&self) -> Result<ServiceUri> {
        self.service.parse()
    }

    /// Individual parameters from the comma-joined `parameters` string
    pub fn parameter_list(&self) -> Vec<&str> {
        self.parameters
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Flat column view used by filters, queries and tabular output
    pub fn to_row(&self) -> serde_json::Map<String, Value> {
        let mut row = serde_json::Map::new();
        row.insert("name".into(), Value::String(self.name.clone()));
        row.insert("service".into(), Value::String(self.service.clone()));
        row.insert("service_id".into(), Value::String(self.service_id.clone()));
        if let Some(publisher_id) = &self.publisher_id {
            row.insert("publisher_id".into(), Value::String(publisher_id.clone()));
        }
        row.insert("display_name".into(), Value::String(self.display_name.clone()));
        row.insert("description".into(), Value::String(self.description.clone()));
        row.insert(
            "geometry".into(),
            self.geometry.clone().map(Value::String).unwrap_or(Value::Null),
        );
        row.insert("parameters".into(), Value::String(self.parameters.clone()));
        row.insert("metadata".into(), Value::Object(self.metadata.clone()));
        row
    }

    /// Look up a `:`-separated path inside `metadata`
    pub fn metadata_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split(':');
        let first = parts.next()?;
        let mut current = self.metadata.get(first)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }
}

//! Tool plugins and their execution
//!
//! A tool reads existing datasets, computes something and writes new derived
//! datasets. Each output gets a fresh catalog entry under the quest
//! pseudo-provider, and the run is recorded on the output dataset as
//! `{tool_applied, tool_options}`.

mod remove_outliers;

pub use remove_outliers::RemoveOutliers;

use async_trait::async_trait;
use quest_core::error::{QuestError, Result};
use quest_core::formats::DatasetData;
use quest_core::models::{
    CatalogEntry, Dataset, DatasetSource, DatasetStatus, DatasetUpdate, Metadata, NewDataset,
    OptionSchema, ParamKind,
};
use quest_core::uri::{new_catalog_id, new_dataset_name, ServiceUri};
use quest_geo::{geometry_type_name, parse_wkt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::context::Quest;

/// Values a tool accepts or produces; `None` means any
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataKinds {
    pub datatype: Option<Vec<String>>,
    pub geotype: Option<Vec<String>>,
    pub parameters: Option<Vec<String>>,
}

fn accepts(allowed: &Option<Vec<String>>, value: Option<&str>) -> bool {
    match (allowed, value) {
        (Some(allowed), Some(value)) => allowed.iter().any(|a| a.eq_ignore_ascii_case(value)),
        _ => true,
    }
}

impl DataKinds {
    pub fn accepts(
        &self,
        datatype: Option<&str>,
        geotype: Option<&str>,
        parameter: Option<&str>,
    ) -> bool {
        accepts(&self.datatype, datatype)
            && accepts(&self.geotype, geotype)
            && accepts(&self.parameters, parameter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolMetadata {
    pub group: String,
    pub display_name: String,
    pub description: String,
    pub operates_on: DataKinds,
    pub produces: DataKinds,
    /// Outputs are marked `filter applied` instead of `derived`
    #[serde(default)]
    pub marks_filtered: bool,
}

/// What a tool run created
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolOutput {
    pub datasets: Vec<String>,
    pub catalog_entries: Vec<String>,
}

/// Transformation plugin
#[async_trait]
pub trait Tool: Send + Sync {
    /// Short unique name, e.g. `ts-remove-outliers`
    fn name(&self) -> &str;

    fn metadata(&self) -> ToolMetadata;

    /// Declared options; selectors name datasets or catalog entries
    fn parameters(&self) -> OptionSchema;

    /// Execute with validated options
    async fn run(&self, ctx: &ToolContext, options: &Metadata) -> Result<ToolOutput>;
}

/// A derived dataset to be created by [`ToolContext::create_new_dataset`]
#[derive(Debug, Clone)]
pub struct DerivedDataset {
    pub file_format: String,
    /// Geometry (WKT) of the new catalog entry; defaults to the input's
    pub geometry: Option<String>,
    pub metadata: Metadata,
    pub catalog_entry_metadata: Metadata,
    pub parameter: Option<String>,
    pub unit: Option<String>,
}

impl DerivedDataset {
    pub fn new(file_format: impl Into<String>) -> Self {
        Self {
            file_format: file_format.into(),
            geometry: None,
            metadata: Metadata::new(),
            catalog_entry_metadata: Metadata::new(),
            parameter: None,
            unit: None,
        }
    }
}

/// Services handed to a running tool
pub struct ToolContext {
    quest: Quest,
    tool: String,
}

impl ToolContext {
    pub(crate) fn new(quest: Quest, tool: impl Into<String>) -> Self {
        Self {
            quest,
            tool: tool.into(),
        }
    }

    pub fn tool_name(&self) -> &str {
        &self.tool
    }

    pub async fn dataset(&self, name: &str) -> Result<Dataset> {
        self.quest.get_dataset(name).await
    }

    /// The catalog entry a dataset points at, if it can be resolved
    pub async fn catalog_entry(&self, dataset: &Dataset) -> Option<CatalogEntry> {
        let uri: ServiceUri = dataset.catalog_entry.parse().ok()?;
        match self.quest.catalog_entry(&uri, false).await {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(dataset = %dataset.name, error = %e, "Could not resolve catalog entry");
                None
            }
        }
    }

    pub async fn read_dataset(&self, dataset: &Dataset) -> Result<DatasetData> {
        let (Some(path), Some(format)) = (&dataset.file_path, &dataset.file_format) else {
            return Err(self.incompatible(format!("{} has no file to read", dataset.name)));
        };
        self.quest.registry().io().get(format)?.read(path).await
    }

    pub async fn write_dataset(&self, dataset: &Dataset, data: &DatasetData) -> Result<()> {
        let (Some(path), Some(format)) = (&dataset.file_path, &dataset.file_format) else {
            return Err(self.incompatible(format!("{} has no file path", dataset.name)));
        };
        self.quest.registry().io().get(format)?.write(path, data).await
    }

    pub fn incompatible(&self, reason: impl Into<String>) -> QuestError {
        QuestError::IncompatibleInputs {
            tool: self.tool.clone(),
            reason: reason.into(),
        }
    }

    /// Multi-dataset tools need inputs with one parameter and one unit
    pub fn check_compatible(&self, datasets: &[Dataset]) -> Result<()> {
        let Some(first) = datasets.first() else {
            return Ok(());
        };
        for other in &datasets[1..] {
            if other.parameter != first.parameter {
                return Err(self.incompatible(format!(
                    "parameters differ: {:?} vs {:?}",
                    first.parameter, other.parameter
                )));
            }
            if other.unit != first.unit {
                return Err(self.incompatible(format!(
                    "units differ: {:?} vs {:?}",
                    first.unit, other.unit
                )));
            }
        }
        Ok(())
    }

    /// Create the catalog entry and dataset row of a tool output
    ///
    /// The file itself is written by the tool at the returned `file_path`.
    pub async fn create_new_dataset(
        &self,
        input: &Dataset,
        derived: DerivedDataset,
    ) -> Result<Dataset> {
        let active = self.quest.active().await?;
        let extension = self
            .quest
            .registry()
            .io()
            .get(&derived.file_format)?
            .extension()
            .to_string();

        let source_entry = self.catalog_entry(input).await;
        let mut entry = CatalogEntry::new(&ServiceUri::quest(), new_catalog_id());
        entry.geometry = derived
            .geometry
            .or_else(|| source_entry.as_ref().and_then(|e| e.geometry.clone()));
        entry.parameters = derived
            .parameter
            .clone()
            .or_else(|| input.parameter.clone())
            .or_else(|| source_entry.as_ref().map(|e| e.parameters.clone()))
            .unwrap_or_default();
        entry.metadata = derived.catalog_entry_metadata;

        let name = new_dataset_name();
        entry.display_name = format!("{}-{}", self.tool, &entry.service_id[..7]);
        entry.description = format!("Created by tool {}", self.tool);

        let mut new = NewDataset::new(&entry.name, &input.collection, DatasetSource::Derived);
        new.display_name = Some(format!("{}-{}", self.tool, &name[..7]));
        new.description = Some(format!("Created by tool {}", self.tool));
        new.metadata = derived.metadata;
        new.file_format = Some(derived.file_format);
        new.file_path = Some(
            active
                .project
                .collection_path(&input.collection)
                .join(format!("{}{}", name, extension)),
        );

        let mut dataset = new.into_dataset(name);
        dataset.parameter = derived.parameter.or_else(|| input.parameter.clone());
        dataset.unit = derived.unit.or_else(|| input.unit.clone());
        dataset.datatype = input.datatype.clone();

        active.store.insert_derived(&entry, &dataset).await?;
        Ok(dataset)
    }
}

/// Filters for `get_tools`
#[derive(Debug, Clone, Default)]
pub struct ToolFilters {
    pub group: Option<String>,
    pub datatype: Option<String>,
    pub geotype: Option<String>,
    pub parameter: Option<String>,
    /// Replace the other filters with this dataset's datatype, parameter and geometry type
    pub dataset: Option<String>,
}

fn selected_names(value: &Value) -> Vec<&str> {
    match value {
        Value::String(name) => vec![name.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

impl Quest {
    /// Registered tools matching `filters`
    pub async fn get_tools(&self, filters: &ToolFilters) -> Result<BTreeMap<String, ToolMetadata>> {
        let mut filters = filters.clone();
        if let Some(name) = &filters.dataset {
            let dataset = self.get_dataset(name).await?;
            let ctx = ToolContext::new(self.clone(), "");
            let geotype = ctx
                .catalog_entry(&dataset)
                .await
                .and_then(|e| e.geometry)
                .and_then(|wkt| parse_wkt(&wkt).ok())
                .map(|g| geometry_type_name(&g).to_string());
            filters = ToolFilters {
                group: None,
                datatype: dataset.datatype,
                geotype,
                parameter: dataset.parameter,
                dataset: filters.dataset,
            };
        }

        Ok(self
            .registry()
            .tools()
            .iter()
            .map(|(name, tool)| (name.clone(), tool.metadata()))
            .filter(|(_, metadata)| {
                filters
                    .group
                    .as_ref()
                    .map_or(true, |g| metadata.group.eq_ignore_ascii_case(g))
                    && metadata.operates_on.accepts(
                        filters.datatype.as_deref(),
                        filters.geotype.as_deref(),
                        filters.parameter.as_deref(),
                    )
            })
            .collect())
    }

    pub fn get_tool_options(&self, name: &str) -> Result<OptionSchema> {
        self.registry()
            .tool(name)
            .map(|tool| tool.parameters())
            .ok_or_else(|| QuestError::ToolNotFound {
                name: name.to_string(),
            })
    }

    /// Validate options, run a tool and stamp its outputs with provenance
    pub async fn run_tool(&self, name: &str, options: &Metadata) -> Result<ToolOutput> {
        let tool = self.registry().tool(name).ok_or_else(|| QuestError::ToolNotFound {
            name: name.to_string(),
        })?;
        let schema = tool.parameters();
        let validated = schema.validate(name, options)?;

        let store = self.store().await?;
        for param in schema.properties.iter().filter(|p| p.kind.is_selector()) {
            let Some(value) = validated.get(&param.name) else {
                continue;
            };
            for selected in selected_names(value) {
                match param.kind {
                    ParamKind::DatasetSelector => {
                        self.get_dataset(selected).await?;
                    }
                    _ => {
                        let uri: ServiceUri = selected.parse()?;
                        if uri.is_quest() && store.get_catalog_entry(selected).await?.is_none() {
                            return Err(QuestError::CatalogEntryNotFound {
                                uri: selected.to_string(),
                            });
                        }
                    }
                }
            }
        }

        let ctx = ToolContext::new(self.clone(), name);
        let output = tool.run(&ctx, &validated).await?;

        let status = if tool.metadata().marks_filtered {
            DatasetStatus::Filtered
        } else {
            DatasetStatus::Derived
        };
        let provenance = json!({"tool_applied": name, "tool_options": validated});
        let provenance = provenance.as_object().cloned().unwrap_or_default();
        for dataset in &output.datasets {
            store
                .update_dataset(
                    dataset,
                    DatasetUpdate {
                        status: Some(status),
                        options: Some(provenance.clone()),
                        ..Default::default()
                    },
                )
                .await?;
        }

        info!(tool = %name, datasets = output.datasets.len(), "Tool finished");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_kinds_accept() {
        let kinds = DataKinds {
            datatype: Some(vec!["timeseries".to_string()]),
            geotype: None,
            parameters: Some(vec!["streamflow".to_string()]),
        };
        assert!(kinds.accepts(Some("timeseries"), Some("Point"), Some("streamflow")));
        assert!(kinds.accepts(None, None, None));
        assert!(!kinds.accepts(Some("raster"), None, None));
        assert!(!kinds.accepts(Some("timeseries"), None, Some("precipitation")));
    }

    #[test]
    fn test_selected_names() {
        assert_eq!(selected_names(&json!("dabc")), vec!["dabc"]);
        assert_eq!(selected_names(&json!(["a", "b"])), vec!["a", "b"]);
        assert!(selected_names(&json!(3)).is_empty());
    }
}

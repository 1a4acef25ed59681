//! Dataset lifecycle
//!
//! Datasets are created against a catalog entry inside a collection, staged
//! with download options, downloaded by their provider into the collection
//! folder and then opened, visualized, moved, copied or deleted.

use quest_core::error::{QuestError, Result};
use quest_core::formats::{OpenFormat, OpenedData};
use quest_core::fs::{move_file, remove_path};
use quest_core::models::{
    merge_metadata, Dataset, DatasetSource, DatasetStatus, DatasetUpdate, Metadata, NewDataset,
    OptionSchema, ServiceType,
};
use quest_core::ports::DownloadRequest;
use quest_core::uri::{classify_uris, new_dataset_name, ClassifyOptions, ServiceUri, UriKind};
use quest_store::DatasetQuery;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog::tags::display_value;
use crate::catalog::{SearchOptions, SearchOutput};
use crate::context::{ActiveProject, Quest};

/// Tool invoked by `get_seamless_data` to merge tiles
pub const MERGE_TOOL: &str = "raster-merge";

/// Sub-folder of a collection holding visualizations
pub const VISUALIZATION_FOLDER: &str = "viz";

/// Download options for `stage_for_download`
#[derive(Debug, Clone)]
pub enum StageOptions {
    /// The same options for every dataset
    Broadcast(Metadata),
    /// One mapping per dataset, parallel to the dataset list
    PerDataset(Vec<Metadata>),
}

impl StageOptions {
    fn for_index(&self, index: usize, count: usize) -> Result<&Metadata> {
        match self {
            StageOptions::Broadcast(options) => Ok(options),
            StageOptions::PerDataset(list) if list.len() == count => Ok(&list[index]),
            StageOptions::PerDataset(list) => Err(QuestError::invalid_options(
                "stage_for_download",
                format!("{} option mappings given for {} datasets", list.len(), count),
            )),
        }
    }
}

impl From<Metadata> for StageOptions {
    fn from(options: Metadata) -> Self {
        StageOptions::Broadcast(options)
    }
}

impl From<Vec<Metadata>> for StageOptions {
    fn from(options: Vec<Metadata>) -> Self {
        StageOptions::PerDataset(options)
    }
}

/// Filters for `get_datasets`; `columns` matches any other dataset column by value
#[derive(Debug, Clone, Default)]
pub struct DatasetFilters {
    pub collection: Option<String>,
    pub status: Option<DatasetStatus>,
    pub source: Option<DatasetSource>,
    pub catalog_entry: Option<String>,
    pub columns: Metadata,
}

impl DatasetFilters {
    fn query(&self) -> DatasetQuery {
        DatasetQuery {
            names: None,
            collection: self.collection.clone(),
            catalog_entry: self.catalog_entry.clone(),
            status: self.status,
            source: self.source,
        }
    }

    fn matches_columns(&self, dataset: &Dataset) -> bool {
        if self.columns.is_empty() {
            return true;
        }
        let row = dataset.to_row();
        self.columns.iter().all(|(key, wanted)| {
            row.get(key).is_some_and(|found| {
                found == wanted || display_value(found) == display_value(wanted)
            })
        })
    }
}

/// Arguments of `get_data` and `get_seamless_data`
#[derive(Debug, Clone)]
pub struct DataRequest {
    pub service_uri: String,
    pub filters: Metadata,
    pub queries: Vec<String>,
    pub download_options: Metadata,
    pub collection: String,
    /// Reuse downloaded datasets of the collection with the same entry and options
    pub use_cache: bool,
    pub max_catalog_entries: usize,
    pub raise_on_error: bool,
}

impl DataRequest {
    pub fn new(service_uri: impl Into<String>) -> Self {
        Self {
            service_uri: service_uri.into(),
            filters: Metadata::new(),
            queries: Vec::new(),
            download_options: Metadata::new(),
            collection: "default".to_string(),
            use_cache: true,
            max_catalog_entries: 10,
            raise_on_error: false,
        }
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.queries.push(query.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.download_options.insert(key.into(), value.into());
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn max_catalog_entries(mut self, max: usize) -> Self {
        self.max_catalog_entries = max;
        self
    }

    pub fn raise_on_error(mut self, raise_on_error: bool) -> Self {
        self.raise_on_error = raise_on_error;
        self
    }
}

fn short_name(name: &str) -> &str {
    &name[..name.len().min(7)]
}

/// Readable label for a staged dataset: `<provider>-<parameter>-<first 7 of name>`
fn staged_display_name(dataset: &Dataset, options: &Metadata) -> String {
    let provider = dataset.provider().unwrap_or("quest");
    let parameter = options
        .get("parameter")
        .and_then(Value::as_str)
        .unwrap_or("no_parameter");
    format!("{}-{}-{}", provider, parameter, short_name(&dataset.name))
}

/// Copy a file or a directory tree
fn copy_path(from: &Path, to: &Path) -> Result<()> {
    if from.is_file() {
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(from, to)?;
        return Ok(());
    }

    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| QuestError::Io(e.into()))?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Only `Normal` components, so joining it cannot leave the base folder
fn is_plain_relative(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// Where a download lands inside the collection folder
///
/// Files keep their layout relative to the scratch folder. When the provider
/// reports the scratch folder itself, or the path is taken by another
/// dataset, the download goes into a folder named after the dataset.
fn download_target(collection_path: &Path, relative: &Path, dataset: &Dataset) -> PathBuf {
    if relative.as_os_str().is_empty() {
        return collection_path.join(&dataset.name);
    }
    let target = collection_path.join(relative);
    let owned = dataset.file_path.as_deref() == Some(target.as_path());
    if target.exists() && !owned {
        collection_path.join(&dataset.name).join(relative)
    } else {
        target
    }
}

fn file_name_for(name: &str, source: &Path) -> String {
    match source.extension().and_then(|e| e.to_str()) {
        Some(ext) if source.is_file() => format!("{}.{}", name, ext),
        _ => name.to_string(),
    }
}

impl Quest {
    pub async fn get_dataset(&self, name: &str) -> Result<Dataset> {
        self.store()
            .await?
            .get_dataset(name)
            .await?
            .ok_or_else(|| QuestError::DatasetNotFound {
                name: name.to_string(),
            })
    }

    /// Insert one dataset row and return its name
    pub async fn new_dataset(&self, dataset: NewDataset) -> Result<String> {
        let store = self.store().await?;
        if store.get_collection(&dataset.collection).await?.is_none() {
            return Err(QuestError::CollectionNotFound {
                name: dataset.collection.clone(),
            });
        }

        let dataset = dataset.into_dataset(new_dataset_name());
        store.insert_dataset(&dataset).await?;
        debug!(dataset = %dataset.name, catalog_entry = %dataset.catalog_entry, "Created dataset");
        Ok(dataset.name)
    }

    /// Create one dataset per catalog entry in `collection`
    ///
    /// Entries of the quest pseudo-provider become user datasets, everything
    /// else a web-service dataset. The same entry may be added more than once.
    pub async fn add_datasets<S: AsRef<str>>(
        &self,
        collection: &str,
        catalog_entries: &[S],
    ) -> Result<Vec<String>> {
        let store = self.store().await?;
        if store.get_collection(collection).await?.is_none() {
            return Err(QuestError::CollectionNotFound {
                name: collection.to_string(),
            });
        }

        let mut created = Vec::with_capacity(catalog_entries.len());
        for entry in catalog_entries {
            let entry = entry.as_ref();
            let uri: ServiceUri = entry.parse()?;
            if uri.catalog_id.is_none() {
                return Err(QuestError::InvalidUri {
                    uri: entry.to_string(),
                    reason: "expected a catalog entry URI".to_string(),
                });
            }

            let source = if uri.is_quest() {
                if store.get_catalog_entry(entry).await?.is_none() {
                    return Err(QuestError::CatalogEntryNotFound {
                        uri: entry.to_string(),
                    });
                }
                DatasetSource::User
            } else {
                self.resolve_service(&uri).await?;
                DatasetSource::WebService
            };

            created.push(self.new_dataset(NewDataset::new(entry, collection, source)).await?);
        }

        info!(collection = %collection, count = created.len(), "Added datasets");
        Ok(created)
    }

    /// Download options as they would be stored, defaults filled in
    async fn resolve_download_options(
        &self,
        dataset: &Dataset,
        options: &Metadata,
    ) -> Result<Metadata> {
        let uri: ServiceUri = dataset.catalog_entry.parse()?;
        let (provider, _) = self.resolve_service(&uri).await?;
        match provider.download_options(&uri.service) {
            Some(schema) => schema.validate(&uri.service_uri(), options),
            None => Ok(options.clone()),
        }
    }

    /// Record download options and mark datasets as staged
    pub async fn stage_for_download<S: AsRef<str>>(
        &self,
        datasets: &[S],
        options: impl Into<StageOptions>,
    ) -> Result<Vec<Dataset>> {
        let options = options.into();
        let store = self.store().await?;
        let mut staged = Vec::with_capacity(datasets.len());

        for (index, name) in datasets.iter().enumerate() {
            let dataset = self.get_dataset(name.as_ref()).await?;
            if dataset.source != DatasetSource::WebService {
                return Err(QuestError::invalid_options(
                    "stage_for_download",
                    format!(
                        "{} is a {} dataset and has nothing to download",
                        dataset.name, dataset.source
                    ),
                ));
            }

            let options = self
                .resolve_download_options(&dataset, options.for_index(index, datasets.len())?)
                .await?;
            let display_name = (dataset.display_name == dataset.name)
                .then(|| staged_display_name(&dataset, &options));

            let updated = store
                .update_dataset(
                    &dataset.name,
                    DatasetUpdate {
                        status: Some(DatasetStatus::Staged),
                        options: Some(options),
                        display_name,
                        ..Default::default()
                    },
                )
                .await?;
            debug!(dataset = %updated.name, "Staged for download");
            staged.push(updated);
        }
        Ok(staged)
    }

    /// Expand dataset and collection URIs into dataset names
    async fn expand_datasets<S: AsRef<str>>(&self, uris: &[S]) -> Result<Vec<String>> {
        let grouped = classify_uris(
            uris,
            &ClassifyOptions::excluding(&[UriKind::Service, UriKind::Publisher]),
        )?;
        let store = self.store().await?;

        let mut names = grouped.get(&UriKind::Dataset).cloned().unwrap_or_default();
        for collection in grouped.get(&UriKind::Collection).into_iter().flatten() {
            if store.get_collection(collection).await?.is_none() {
                return Err(QuestError::CollectionNotFound {
                    name: collection.clone(),
                });
            }
            names.extend(
                store
                    .list_datasets(&DatasetQuery::in_collection(collection))
                    .await?
                    .into_iter()
                    .map(|d| d.name),
            );
        }
        Ok(names)
    }

    /// Download web-service datasets, returning the final status of each
    ///
    /// A failed download is recorded on the dataset and the batch continues,
    /// unless `raise_on_error` is set.
    pub async fn download_datasets<S: AsRef<str>>(
        &self,
        datasets: &[S],
        raise_on_error: bool,
    ) -> Result<BTreeMap<String, DatasetStatus>> {
        let active = self.active().await?;
        let mut statuses = BTreeMap::new();

        for name in self.expand_datasets(datasets).await? {
            let dataset = self.get_dataset(&name).await?;
            if dataset.source != DatasetSource::WebService {
                debug!(
                    dataset = %name,
                    source = %dataset.source,
                    "Skipping dataset without a web source"
                );
                continue;
            }

            active
                .store
                .update_dataset(&name, DatasetUpdate::status(DatasetStatus::Pending))
                .await?;

            match self.download_one(&active, &dataset).await {
                Ok(update) => {
                    let updated = active.store.update_dataset(&name, update).await?;
                    info!(dataset = %name, path = ?updated.file_path, "Downloaded dataset");
                    statuses.insert(name, updated.status);
                }
                Err(e) => {
                    warn!(dataset = %name, error = %e, "Download failed");
                    active
                        .store
                        .update_dataset(
                            &name,
                            DatasetUpdate {
                                status: Some(DatasetStatus::FailedDownload),
                                message: Some(e.to_string()),
                                ..Default::default()
                            },
                        )
                        .await?;
                    if raise_on_error {
                        return Err(e);
                    }
                    statuses.insert(name, DatasetStatus::FailedDownload);
                }
            }
        }
        Ok(statuses)
    }

    /// Run the provider download in a scratch folder and move the result into the collection
    async fn download_one(
        &self,
        active: &ActiveProject,
        dataset: &Dataset,
    ) -> Result<DatasetUpdate> {
        let uri: ServiceUri = dataset.catalog_entry.parse()?;
        let catalog_id = uri.catalog_id.clone().ok_or_else(|| QuestError::InvalidUri {
            uri: dataset.catalog_entry.clone(),
            reason: "expected a catalog entry URI".to_string(),
        })?;
        let (provider, _) = self.resolve_service(&uri).await?;
        let credentials = self.credentials_for(provider.as_ref()).await?;

        let collection_path = active.project.collection_path(&dataset.collection);
        std::fs::create_dir_all(&collection_path)?;
        let scratch = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(&collection_path)?;

        let outcome = provider
            .download(DownloadRequest {
                service: uri.service.clone(),
                catalog_id,
                file_path: scratch.path().to_path_buf(),
                dataset: dataset.name.clone(),
                options: dataset.options.clone(),
                credentials,
            })
            .await?;

        let file_path = match outcome.file_path.strip_prefix(scratch.path()) {
            Ok(relative) if is_plain_relative(relative) => {
                let target = download_target(&collection_path, relative, dataset);
                remove_path(&target)?;
                move_file(&outcome.file_path, &target)?;
                target
            }
            _ => {
                if !outcome.file_path.exists() {
                    return Err(QuestError::provider(
                        provider.name(),
                        format!("downloaded path {} does not exist", outcome.file_path.display()),
                    ));
                }
                let file_name = outcome
                    .file_path
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(&dataset.name));
                let target = collection_path.join(&dataset.name).join(file_name);
                remove_path(&target)?;
                copy_path(&outcome.file_path, &target)?;
                target
            }
        };

        let mut metadata = dataset.metadata.clone();
        merge_metadata(&mut metadata, &outcome.metadata);

        Ok(DatasetUpdate {
            status: Some(DatasetStatus::Downloaded),
            message: Some("success".to_string()),
            file_path: Some(file_path),
            file_format: Some(outcome.file_format),
            datatype: Some(outcome.datatype),
            parameter: outcome.parameter,
            unit: outcome.unit,
            metadata: Some(metadata),
            ..Default::default()
        })
    }

    /// Search, add, stage and download in one call
    pub async fn get_data(&self, request: &DataRequest) -> Result<Vec<String>> {
        let entries = self
            .search_catalog(
                &[request.service_uri.as_str()],
                &SearchOptions {
                    filters: request.filters.clone(),
                    queries: request.queries.clone(),
                    update_cache: false,
                    output: SearchOutput::Uris,
                },
            )
            .await?
            .uris();

        if entries.len() > request.max_catalog_entries {
            return Err(QuestError::TooManyCatalogEntries {
                count: entries.len(),
                max: request.max_catalog_entries,
            });
        }

        let store = self.store().await?;
        if store.get_collection(&request.collection).await?.is_none() {
            self.new_collection(&request.collection, None, None, None).await?;
        }

        let mut cached = Vec::new();
        let mut missing = Vec::new();
        let existing = if request.use_cache {
            store
                .list_datasets(&DatasetQuery {
                    collection: Some(request.collection.clone()),
                    status: Some(DatasetStatus::Downloaded),
                    ..Default::default()
                })
                .await?
        } else {
            Vec::new()
        };

        for entry in entries {
            let mut hit = None;
            for dataset in existing.iter().filter(|d| d.catalog_entry == entry) {
                let wanted = self
                    .resolve_download_options(dataset, &request.download_options)
                    .await?;
                if dataset.options == wanted {
                    hit = Some(dataset.name.clone());
                    break;
                }
            }
            match hit {
                Some(name) => {
                    debug!(dataset = %name, catalog_entry = %entry, "Reusing downloaded dataset");
                    cached.push(name);
                }
                None => missing.push(entry),
            }
        }

        let created = self.add_datasets(&request.collection, &missing).await?;
        if !created.is_empty() {
            self.stage_for_download(&created, request.download_options.clone())
                .await?;
            self.download_datasets(&created, request.raise_on_error).await?;
        }

        cached.extend(created);
        Ok(cached)
    }

    /// `get_data` for geo-seamless services, merging multiple tiles into one dataset
    pub async fn get_seamless_data(&self, request: &DataRequest) -> Result<Vec<String>> {
        let uri: ServiceUri = request.service_uri.parse()?;
        let (_, info) = self.resolve_service(&uri).await?;
        if info.service_type != ServiceType::GeoSeamless {
            return Err(QuestError::invalid_options(
                "get_seamless_data",
                format!("{} is a {} service", uri.service_uri(), info.service_type),
            ));
        }

        let datasets = self.get_data(request).await?;
        if datasets.len() <= 1 {
            return Ok(datasets);
        }

        let tool = self
            .registry()
            .tool(MERGE_TOOL)
            .ok_or_else(|| QuestError::ToolNotFound {
                name: MERGE_TOOL.to_string(),
            })?;

        let mut options = Metadata::new();
        options.insert(
            "datasets".to_string(),
            Value::Array(datasets.iter().cloned().map(Value::String).collect()),
        );
        if let Some(bbox) = request.filters.get("bbox") {
            if tool.parameters().get("bbox").is_some() {
                options.insert("bbox".to_string(), bbox.clone());
            }
        }
        Ok(self.run_tool(MERGE_TOOL, &options).await?.datasets)
    }

    pub async fn get_datasets(&self, filters: &DatasetFilters) -> Result<Vec<Dataset>> {
        Ok(self
            .store()
            .await?
            .list_datasets(&filters.query())
            .await?
            .into_iter()
            .filter(|d| filters.matches_columns(d))
            .collect())
    }

    /// Delete datasets and collections, removing their files
    ///
    /// Returns the deleted dataset and collection names.
    pub async fn delete<S: AsRef<str>>(&self, uris: &[S]) -> Result<Vec<String>> {
        let grouped = classify_uris(
            uris,
            &ClassifyOptions::excluding(&[UriKind::Service, UriKind::Publisher]),
        )?;
        let store = self.store().await?;
        let mut deleted = Vec::new();

        for name in grouped.get(&UriKind::Dataset).into_iter().flatten() {
            let deletion = store.delete_dataset(name).await?;
            for path in [&deletion.dataset.file_path, &deletion.dataset.visualization_path]
                .into_iter()
                .flatten()
            {
                remove_path(path)?;
            }
            if let Some(entry) = &deletion.removed_catalog_entry {
                info!(catalog_entry = %entry, "Removed catalog entry with no remaining datasets");
            }
            info!(dataset = %name, "Deleted dataset");
            deleted.push(name.clone());
        }

        for collection in grouped.get(&UriKind::Collection).into_iter().flatten() {
            self.delete_collection(collection).await?;
            deleted.push(collection.clone());
        }
        Ok(deleted)
    }

    async fn target_collection_path(&self, collection: &str) -> Result<(ActiveProject, PathBuf)> {
        let active = self.active().await?;
        if active.store.get_collection(collection).await?.is_none() {
            return Err(QuestError::CollectionNotFound {
                name: collection.to_string(),
            });
        }
        let path = active.project.collection_path(collection);
        std::fs::create_dir_all(&path)?;
        Ok((active, path))
    }

    /// Move datasets, and their files, into another collection
    pub async fn move_datasets<S: AsRef<str>>(
        &self,
        datasets: &[S],
        collection: &str,
    ) -> Result<Vec<String>> {
        let (active, target) = self.target_collection_path(collection).await?;

        let mut moved = Vec::with_capacity(datasets.len());
        for name in datasets {
            let dataset = self.get_dataset(name.as_ref()).await?;
            let file_path = match &dataset.file_path {
                Some(path) if path.exists() => {
                    let destination = target.join(path.file_name().unwrap_or(path.as_os_str()));
                    move_file(path, &destination)?;
                    Some(destination)
                }
                _ => None,
            };

            active
                .store
                .update_dataset(
                    &dataset.name,
                    DatasetUpdate {
                        collection: Some(collection.to_string()),
                        file_path,
                        ..Default::default()
                    },
                )
                .await?;
            info!(
                dataset = %dataset.name,
                from = %dataset.collection,
                to = %collection,
                "Moved dataset"
            );
            moved.push(dataset.name);
        }
        Ok(moved)
    }

    /// Copy datasets into another collection under fresh names
    pub async fn copy_datasets<S: AsRef<str>>(
        &self,
        datasets: &[S],
        collection: &str,
    ) -> Result<Vec<String>> {
        let (active, target) = self.target_collection_path(collection).await?;

        let mut copies = Vec::with_capacity(datasets.len());
        for name in datasets {
            let original = self.get_dataset(name.as_ref()).await?;
            let mut copy = original.clone();
            copy.name = new_dataset_name();
            copy.collection = collection.to_string();
            copy.visualization_path = None;
            copy.created_at = chrono::Utc::now();
            if original.display_name == original.name {
                copy.display_name = copy.name.clone();
            }

            if let Some(path) = original.file_path.as_ref().filter(|p| p.exists()) {
                let destination = target.join(file_name_for(&copy.name, path));
                copy_path(path, &destination)?;
                copy.file_path = Some(destination);
            }

            active.store.insert_dataset(&copy).await?;
            info!(
                dataset = %original.name,
                copy = %copy.name,
                collection = %collection,
                "Copied dataset"
            );
            copies.push(copy.name);
        }
        Ok(copies)
    }

    fn dataset_file<'a>(&self, dataset: &'a Dataset) -> Result<(&'a Path, &'a str)> {
        match (&dataset.file_path, &dataset.file_format) {
            (Some(path), Some(format)) => Ok((path.as_path(), format.as_str())),
            _ => Err(QuestError::invalid_options(
                &dataset.name,
                format!("dataset has no file (status: {})", dataset.status),
            )),
        }
    }

    /// Open a dataset's file through the I/O handler of its format
    pub async fn open_dataset(&self, name: &str, fmt: OpenFormat) -> Result<OpenedData> {
        let dataset = self.get_dataset(name).await?;
        let (path, format) = self.dataset_file(&dataset)?;
        self.registry().io().get(format)?.open(path, fmt).await
    }

    pub async fn visualize_dataset_options(&self, name: &str) -> Result<OptionSchema> {
        let dataset = self.get_dataset(name).await?;
        let (_, format) = self.dataset_file(&dataset)?;
        Ok(self.registry().io().get(format)?.visualize_options())
    }

    /// Render a dataset and record where the visualization was written
    pub async fn visualize_dataset(&self, name: &str, options: &Metadata) -> Result<PathBuf> {
        let active = self.active().await?;
        let dataset = self.get_dataset(name).await?;
        let (path, format) = self.dataset_file(&dataset)?;
        let handler = self.registry().io().get(format)?;
        let options = handler.visualize_options().validate(name, options)?;

        let output_dir = active
            .project
            .collection_path(&dataset.collection)
            .join(VISUALIZATION_FOLDER);
        std::fs::create_dir_all(&output_dir)?;
        let output = handler.visualize(path, &output_dir, &options).await?;

        active
            .store
            .update_dataset(
                name,
                DatasetUpdate {
                    visualization_path: Some(output.clone()),
                    ..Default::default()
                },
            )
            .await?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset(name: &str) -> Dataset {
        NewDataset::new("svc://usgs-nwis:iv/08158000", "c1", DatasetSource::WebService)
            .into_dataset(name.to_string())
    }

    #[test]
    fn test_staged_display_name() {
        let dataset = dataset("d1234567890abcdef1234567890abcde");
        let options = json!({"parameter": "streamflow"}).as_object().unwrap().clone();
        assert_eq!(staged_display_name(&dataset, &options), "usgs-nwis-streamflow-d123456");
        assert_eq!(
            staged_display_name(&dataset, &Metadata::new()),
            "usgs-nwis-no_parameter-d123456"
        );
    }

    #[test]
    fn test_stage_options_per_dataset_length() {
        let options = StageOptions::PerDataset(vec![Metadata::new()]);
        assert!(options.for_index(0, 1).is_ok());
        assert!(options.for_index(0, 2).is_err());
        assert!(StageOptions::Broadcast(Metadata::new()).for_index(5, 6).is_ok());
    }

    #[test]
    fn test_column_filters() {
        let mut d = dataset("d1234567890abcdef1234567890abcde");
        d.parameter = Some("streamflow".to_string());
        let filters = DatasetFilters {
            columns: json!({"parameter": "streamflow", "status": "not staged"})
                .as_object()
                .unwrap()
                .clone(),
            ..Default::default()
        };
        assert!(filters.matches_columns(&d));

        let filters = DatasetFilters {
            columns: json!({"unit": "cfs"}).as_object().unwrap().clone(),
            ..Default::default()
        };
        assert!(!filters.matches_columns(&d));
    }

    #[test]
    fn test_download_target_never_reuses_the_collection_folder() {
        let tmp = tempfile::TempDir::new().unwrap();
        let collection = tmp.path().join("c1");
        std::fs::create_dir_all(&collection).unwrap();
        let mut d = dataset("d1234567890abcdef1234567890abcde");

        assert_eq!(download_target(&collection, Path::new(""), &d), collection.join(&d.name));
        assert_eq!(
            download_target(&collection, Path::new("site.json"), &d),
            collection.join("site.json")
        );

        std::fs::write(collection.join("site.json"), "other").unwrap();
        assert_eq!(
            download_target(&collection, Path::new("site.json"), &d),
            collection.join(&d.name).join("site.json")
        );

        d.file_path = Some(collection.join("site.json"));
        assert_eq!(
            download_target(&collection, Path::new("site.json"), &d),
            collection.join("site.json")
        );

        assert!(is_plain_relative(Path::new("a/b.tif")));
        assert!(is_plain_relative(Path::new("")));
        assert!(!is_plain_relative(Path::new("../b.tif")));
    }

    #[test]
    fn test_copy_path_copies_trees() {
        let tmp = tempfile::TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("nested").join("a.txt"), "a").unwrap();

        let dst = tmp.path().join("dst");
        copy_path(&src, &dst).unwrap();
        assert_eq!(std::fs::read_to_string(dst.join("nested").join("a.txt")).unwrap(), "a");

        let file = src.join("nested").join("a.txt");
        assert_eq!(file_name_for("dabc", &file), "dabc.txt");
    }
}

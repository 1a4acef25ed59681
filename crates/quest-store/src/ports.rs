use async_trait::async_trait;
use quest_core::error::Result;
use quest_core::models::{
    CatalogEntry, Collection, Dataset, DatasetSource, DatasetStatus, DatasetUpdate, Project,
    ProviderCredentials,
};

/// Port for the project row of a project database
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// The project this database belongs to
    async fn get_project(&self) -> Result<Option<Project>>;

    /// Insert or replace the project row
    async fn save_project(&self, project: &Project) -> Result<()>;
}

/// Port for collection storage
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Insert a collection; fails with `CollectionExists` on a duplicate name
    async fn insert_collection(&self, collection: &Collection) -> Result<()>;

    async fn get_collection(&self, name: &str) -> Result<Option<Collection>>;

    async fn list_collections(&self) -> Result<Vec<Collection>>;

    async fn update_collection(&self, collection: &Collection) -> Result<()>;

    /// Delete a collection and all its datasets in one transaction
    ///
    /// Persisted catalog entries left without datasets are deleted as well.
    /// Returns the deleted datasets so their files can be removed.
    async fn delete_collection(&self, name: &str) -> Result<Vec<DatasetDeletion>>;
}

/// Port for persisted (user- and tool-created) catalog entries
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_catalog_entry(&self, entry: &CatalogEntry) -> Result<()>;

    async fn get_catalog_entry(&self, name: &str) -> Result<Option<CatalogEntry>>;

    /// All persisted entries, or the ones named in `names`
    async fn list_catalog_entries(&self, names: Option<&[String]>) -> Result<Vec<CatalogEntry>>;

    async fn update_catalog_entry(&self, entry: &CatalogEntry) -> Result<()>;

    async fn delete_catalog_entry(&self, name: &str) -> Result<bool>;
}

/// Column filters for dataset listings; `None` matches everything
#[derive(Debug, Clone, Default)]
pub struct DatasetQuery {
    pub names: Option<Vec<String>>,
    pub collection: Option<String>,
    pub catalog_entry: Option<String>,
    pub status: Option<DatasetStatus>,
    pub source: Option<DatasetSource>,
}

impl DatasetQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_collection(collection: impl Into<String>) -> Self {
        Self {
            collection: Some(collection.into()),
            ..Default::default()
        }
    }

    pub fn named(names: Vec<String>) -> Self {
        Self {
            names: Some(names),
            ..Default::default()
        }
    }

    pub fn matches(&self, dataset: &Dataset) -> bool {
        self.names.as_ref().map_or(true, |n| n.contains(&dataset.name))
            && self.collection.as_ref().map_or(true, |c| c == &dataset.collection)
            && self
                .catalog_entry
                .as_ref()
                .map_or(true, |c| c == &dataset.catalog_entry)
            && self.status.map_or(true, |s| s == dataset.status)
            && self.source.map_or(true, |s| s == dataset.source)
    }
}

/// Outcome of deleting a dataset row
#[derive(Debug, Clone)]
pub struct DatasetDeletion {
    pub dataset: Dataset,
    /// The persisted catalog entry that was deleted with it, if it was the last reference
    pub removed_catalog_entry: Option<String>,
}

/// Port for dataset storage
#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn insert_dataset(&self, dataset: &Dataset) -> Result<()>;

    /// Insert a fresh catalog entry and the dataset derived from it in one transaction
    async fn insert_derived(&self, entry: &CatalogEntry, dataset: &Dataset) -> Result<()>;

    async fn get_dataset(&self, name: &str) -> Result<Option<Dataset>>;

    async fn list_datasets(&self, query: &DatasetQuery) -> Result<Vec<Dataset>>;

    /// Apply a partial update and return the updated row
    async fn update_dataset(&self, name: &str, update: DatasetUpdate) -> Result<Dataset>;

    /// Delete a dataset; a persisted catalog entry is deleted with its last dataset
    async fn delete_dataset(&self, name: &str) -> Result<DatasetDeletion>;
}

/// Port for provider credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or replace the credentials of a provider
    async fn set_credentials(&self, credentials: &ProviderCredentials) -> Result<()>;

    async fn get_credentials(&self, provider: &str) -> Result<Option<ProviderCredentials>>;

    async fn delete_credentials(&self, provider: &str) -> Result<bool>;

    /// Providers with stored credentials
    async fn list_credential_providers(&self) -> Result<Vec<String>>;
}

/// Everything a project database offers
pub trait MetadataStore:
    ProjectStore + CollectionStore + CatalogStore + DatasetStore + CredentialStore
{
}

impl<T> MetadataStore for T where
    T: ProjectStore + CollectionStore + CatalogStore + DatasetStore + CredentialStore
{
}

pub mod catalog;
pub mod collection;
pub mod credentials;
pub mod dataset;
pub mod options;
pub mod project;
pub mod provider;

pub use catalog::{CatalogEntry, RESERVED_CATALOG_FIELDS};
pub use collection::Collection;
pub use credentials::ProviderCredentials;
pub use dataset::{Dataset, DatasetSource, DatasetStatus, DatasetUpdate, NewDataset};
pub use options::{OptionSchema, ParamKind, ParamSpec};
pub use project::{Project, ProjectIndex, ProjectIndexEntry, DEFAULT_PROJECT};
pub use provider::{
    ParameterListing, ProviderInfo, ProviderMetadata, PublisherInfo, ServiceInfo, ServiceType,
};

/// Free-form metadata mapping attached to most entities
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Merge `update` into `base`, descending into nested objects
pub fn merge_metadata(base: &mut Metadata, update: &Metadata) {
    for (key, value) in update {
        match (base.get_mut(key), value) {
            (Some(serde_json::Value::Object(existing)), serde_json::Value::Object(incoming)) => {
                merge_metadata(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

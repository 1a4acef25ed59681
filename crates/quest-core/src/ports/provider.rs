use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

use crate::error::{QuestError, Result};
use crate::models::{
    Dataset, Metadata, OptionSchema, ParameterListing, ProviderCredentials, ProviderMetadata,
    PublisherInfo, ServiceInfo,
};

/// One raw catalog row as a provider returns it
///
/// Rows carry at least `service_id`. Geometry may be given as `bbox`
/// (`[xmin, ymin, xmax, ymax]`), as `latitude`/`longitude`, or as a WKT or
/// GeoJSON `geometry`. Every other column ends up in the entry's metadata.
pub type CatalogRow = serde_json::Map<String, Value>;

/// Arguments of a provider download
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub service: String,
    pub catalog_id: String,
    /// Directory the provider writes the downloaded file into
    pub file_path: PathBuf,
    /// Name of the dataset being materialized
    pub dataset: String,
    pub options: Metadata,
    pub credentials: Option<ProviderCredentials>,
}

/// What a provider reports back after writing a file
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    pub file_path: PathBuf,
    pub file_format: String,
    pub datatype: String,
    pub parameter: Option<String>,
    pub unit: Option<String>,
    pub metadata: Metadata,
}

/// Arguments of a publish call
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub publisher: String,
    pub dataset: Dataset,
    pub options: Metadata,
    pub credentials: Option<ProviderCredentials>,
}

/// Port implemented by every data-source adapter
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short unique name, e.g. `usgs-nwis`
    fn name(&self) -> &str;

    fn metadata(&self) -> ProviderMetadata;

    fn services(&self) -> Vec<ServiceInfo>;

    fn publishers(&self) -> Vec<PublisherInfo> {
        Vec::new()
    }

    /// Whether catalog results may be served from the on-disk cache
    fn use_cache(&self) -> bool {
        true
    }

    /// Whether downloads and publishes need stored credentials
    fn requires_auth(&self) -> bool {
        false
    }

    fn service(&self, service: &str) -> Option<ServiceInfo> {
        self.services().into_iter().find(|s| s.service_name == service)
    }

    /// Raw catalog rows of `service`
    ///
    /// `filters` are only passed for providers that do not use the cache;
    /// filtering is otherwise applied by the caller.
    async fn search_catalog(&self, service: &str, filters: &Metadata) -> Result<Vec<CatalogRow>>;

    /// Parameters available for `service`, optionally restricted to some entries
    async fn get_parameters(
        &self,
        service: &str,
        _catalog_ids: Option<&[String]>,
    ) -> Result<ParameterListing> {
        self.service(service)
            .map(|s| ParameterListing::Flat(s.parameters))
            .ok_or_else(|| QuestError::ServiceNotFound {
                uri: format!("svc://{}:{}", self.name(), service),
            })
    }

    /// Fetch one catalog entry into `request.file_path`
    async fn download(&self, request: DownloadRequest) -> Result<DownloadOutcome>;

    /// Declared download options; `None` accepts any options unchecked
    fn download_options(&self, _service: &str) -> Option<OptionSchema> {
        None
    }

    /// Push a dataset to a publisher, returning remote-side metadata
    async fn publish(&self, request: PublishRequest) -> Result<Metadata> {
        Err(QuestError::NotSupported {
            plugin: self.name().to_string(),
            operation: format!("publishing to {}", request.publisher),
        })
    }

    fn publish_options(&self, _publisher: &str) -> Option<OptionSchema> {
        None
    }
}

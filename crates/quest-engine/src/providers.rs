//! Provider, service and publisher discovery, plus provider credentials

use quest_core::error::{QuestError, Result};
use quest_core::models::{
    OptionSchema, ProviderCredentials, ProviderInfo, PublisherInfo, ServiceInfo, ServiceType,
};
use quest_core::ports::Provider;
use quest_core::uri::{PublisherUri, ServiceUri};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::context::Quest;

/// Narrows `get_services`
#[derive(Debug, Clone, Default)]
pub struct ServiceFilters {
    pub provider: Option<String>,
    /// Keep services advertising this (normalized) parameter
    pub parameter: Option<String>,
    pub service_type: Option<ServiceType>,
}

/// A service together with its canonical URI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSummary {
    pub uri: String,
    pub provider: String,
    #[serde(flatten)]
    pub info: ServiceInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublisherSummary {
    pub uri: String,
    pub provider: String,
    #[serde(flatten)]
    pub info: PublisherInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub provider: String,
    pub requires_auth: bool,
    pub has_credentials: bool,
}

fn normalized_parameters(info: &ServiceInfo) -> Vec<String> {
    info.parameters
        .iter()
        .map(|p| info.normalize_parameter(p).to_string())
        .collect()
}

impl Quest {
    /// Descriptions of all loaded providers, optionally rebuilding the provider cache
    pub async fn get_providers(&self, update_cache: bool) -> Vec<ProviderInfo> {
        let providers = if update_cache {
            self.reload_providers().await
        } else {
            self.providers().await
        };

        providers
            .values()
            .map(|provider| ProviderInfo {
                name: provider.name().to_string(),
                metadata: provider.metadata(),
                services: provider.services().into_iter().map(|s| s.service_name).collect(),
                publishers: provider
                    .publishers()
                    .into_iter()
                    .map(|p| p.publisher_name)
                    .collect(),
            })
            .collect()
    }

    pub async fn get_services(&self, filters: &ServiceFilters) -> Result<Vec<ServiceSummary>> {
        let providers = self.providers().await;
        if let Some(name) = &filters.provider {
            if !providers.contains_key(name) {
                return Err(QuestError::ProviderNotFound { name: name.clone() });
            }
        }

        let mut services = Vec::new();
        for provider in providers.values() {
            if filters.provider.as_deref().is_some_and(|p| p != provider.name()) {
                continue;
            }
            for mut info in provider.services() {
                if filters.service_type.is_some_and(|t| t != info.service_type) {
                    continue;
                }
                let parameters = normalized_parameters(&info);
                if let Some(parameter) = &filters.parameter {
                    if !parameters.contains(parameter) {
                        continue;
                    }
                }
                info.parameters = parameters;
                services.push(ServiceSummary {
                    uri: ServiceUri::new(provider.name(), &info.service_name).service_uri(),
                    provider: provider.name().to_string(),
                    info,
                });
            }
        }
        Ok(services)
    }

    pub async fn get_publishers(&self) -> Vec<PublisherSummary> {
        self.providers()
            .await
            .values()
            .flat_map(|provider| {
                provider.publishers().into_iter().map(|info| PublisherSummary {
                    uri: PublisherUri::new(provider.name(), &info.publisher_name).to_string(),
                    provider: provider.name().to_string(),
                    info,
                })
            })
            .collect()
    }

    /// Provider and service description behind a service URI
    pub(crate) async fn resolve_service(
        &self,
        uri: &ServiceUri,
    ) -> Result<(Arc<dyn Provider>, ServiceInfo)> {
        let provider = self.provider(&uri.provider).await?;
        let info = provider
            .service(&uri.service)
            .ok_or_else(|| QuestError::ServiceNotFound {
                uri: uri.service_uri(),
            })?;
        Ok((provider, info))
    }

    /// Parameters of a service, translated through its parameter map
    pub async fn get_parameters(&self, service_uri: &str) -> Result<Vec<String>> {
        let uri: ServiceUri = service_uri.parse()?;
        let (provider, info) = self.resolve_service(&uri).await?;
        let ids = uri.catalog_id.clone().map(|id| vec![id]);
        let listing = provider.get_parameters(&uri.service, ids.as_deref()).await?;

        let raw = match &uri.catalog_id {
            Some(id) => listing.for_entry(id).to_vec(),
            None => listing.all(),
        };
        let mut parameters: Vec<String> = raw
            .iter()
            .map(|p| info.normalize_parameter(p).to_string())
            .collect();
        parameters.sort();
        parameters.dedup();
        Ok(parameters)
    }

    /// Declared download options of a service; `None` when the provider accepts anything
    pub async fn download_options(&self, service_uri: &str) -> Result<Option<OptionSchema>> {
        let uri: ServiceUri = service_uri.parse()?;
        let (provider, _) = self.resolve_service(&uri).await?;
        Ok(provider.download_options(&uri.service))
    }

    pub async fn publish_options(&self, publisher_uri: &str) -> Result<Option<OptionSchema>> {
        let uri: PublisherUri = publisher_uri.parse()?;
        let provider = self.resolve_publisher(&uri).await?;
        Ok(provider.publish_options(&uri.publisher))
    }

    pub(crate) async fn resolve_publisher(&self, uri: &PublisherUri) -> Result<Arc<dyn Provider>> {
        let provider = self.provider(&uri.provider).await?;
        if !provider
            .publishers()
            .iter()
            .any(|p| p.publisher_name == uri.publisher)
        {
            return Err(QuestError::PublisherNotFound {
                uri: uri.to_string(),
            });
        }
        Ok(provider)
    }

    // Credentials

    pub async fn set_provider_credentials(
        &self,
        provider: &str,
        username: &str,
        password: &str,
    ) -> Result<()> {
        self.provider(provider).await?;
        self.store()
            .await?
            .set_credentials(&ProviderCredentials::new(provider, username, password))
            .await?;
        info!(provider = %provider, "Stored provider credentials");
        Ok(())
    }

    pub async fn delete_provider_credentials(&self, provider: &str) -> Result<bool> {
        self.store().await?.delete_credentials(provider).await
    }

    pub async fn get_auth_status(&self, provider: &str) -> Result<AuthStatus> {
        let plugin = self.provider(provider).await?;
        let has_credentials = self.store().await?.get_credentials(provider).await?.is_some();
        Ok(AuthStatus {
            provider: provider.to_string(),
            requires_auth: plugin.requires_auth(),
            has_credentials,
        })
    }

    /// Stored credentials for providers that require them
    pub(crate) async fn credentials_for(
        &self,
        provider: &dyn Provider,
    ) -> Result<Option<ProviderCredentials>> {
        if !provider.requires_auth() {
            return Ok(None);
        }
        self.store()
            .await?
            .get_credentials(provider.name())
            .await?
            .map(Some)
            .ok_or_else(|| QuestError::MissingCredentials {
                provider: provider.name().to_string(),
            })
    }
}

//! Catalog search and merge engine
//!
//! Service URIs are answered by their provider through the normalizing cache
//! wrapper, collection names by the catalog entries their datasets reference,
//! and `svc://quest:quest` by the entries persisted in the project database.
//! Results are merged by entry URI, filtered, queried and then shaped.

pub mod cache;
pub mod filter;
pub mod normalize;
pub mod query;
pub mod tags;

use futures::future::try_join_all;
use geojson::{feature::Id, Feature, FeatureCollection};
use quest_core::error::{QuestError, Result};
use quest_core::models::{CatalogEntry, Metadata};
use quest_core::uri::{classify_uris, new_catalog_id, ClassifyOptions, ServiceUri, UriKind};
use quest_geo::{geometry_from_value, parse_wkt, to_geojson_geometry, to_wkt};
use quest_store::DatasetQuery;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::context::Quest;

pub use cache::CatalogCache;
pub use filter::apply_filters;
pub use query::{apply_queries, parse_query};
pub use tags::{TagCounts, TagResult};

use normalize::{normalize_rows, row_ids};
use tags::{count_tags, merge_counts, select_tags};

/// Shape of a search result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchOutput {
    /// Entry URIs only
    #[default]
    Uris,
    /// Full entries, sorted by URI
    Table,
    /// A GeoJSON feature collection with the entry URI as feature id
    GeoJson,
    /// Entries keyed by URI
    Expanded,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub filters: Metadata,
    pub queries: Vec<String>,
    pub update_cache: bool,
    pub output: SearchOutput,
}

impl SearchOptions {
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.queries.push(query.into());
        self
    }

    pub fn output(mut self, output: SearchOutput) -> Self {
        self.output = output;
        self
    }

    pub fn update_cache(mut self, update_cache: bool) -> Self {
        self.update_cache = update_cache;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchResult {
    Uris(Vec<String>),
    Table(Vec<CatalogEntry>),
    GeoJson(FeatureCollection),
    Expanded(BTreeMap<String, CatalogEntry>),
}

impl SearchResult {
    /// Entry URIs of the result, whatever its shape
    pub fn uris(&self) -> Vec<String> {
        match self {
            SearchResult::Uris(uris) => uris.clone(),
            SearchResult::Table(entries) => entries.iter().map(|e| e.name.clone()).collect(),
            SearchResult::Expanded(entries) => entries.keys().cloned().collect(),
            SearchResult::GeoJson(collection) => collection
                .features
                .iter()
                .filter_map(|f| match &f.id {
                    Some(Id::String(name)) => Some(name.clone()),
                    _ => None,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SearchResult::Uris(uris) => uris.len(),
            SearchResult::Table(entries) => entries.len(),
            SearchResult::Expanded(entries) => entries.len(),
            SearchResult::GeoJson(collection) => collection.features.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct TagOptions {
    /// Restrict to these metadata keys (nested keys included)
    pub keys: Option<Vec<String>>,
    pub as_count: bool,
    pub update_cache: bool,
}

/// A user-created catalog entry
///
/// Geometry is given either as WKT / GeoJSON in `geometry`, or as a
/// `geom_type` plus GeoJSON-style `coordinates`. Both may be omitted.
#[derive(Debug, Clone, Default)]
pub struct NewCatalogEntry {
    pub geometry: Option<Value>,
    pub geom_type: Option<String>,
    pub coordinates: Option<Value>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub parameters: Vec<String>,
    pub metadata: Metadata,
}

fn canonical_geom_type(geom_type: &str) -> Result<&'static str> {
    const TYPES: [&str; 6] = [
        "Point",
        "LineString",
        "Polygon",
        "MultiPoint",
        "MultiLineString",
        "MultiPolygon",
    ];
    TYPES
        .iter()
        .find(|t| t.eq_ignore_ascii_case(geom_type))
        .copied()
        .ok_or_else(|| {
            QuestError::invalid_options(
                "catalog entry",
                format!("unknown geom_type '{}'", geom_type),
            )
        })
}

fn to_feature(entry: CatalogEntry) -> Result<Feature> {
    let geometry = entry
        .geometry
        .as_deref()
        .map(parse_wkt)
        .transpose()?
        .map(|g| to_geojson_geometry(&g));
    let mut properties = entry.to_row();
    properties.remove("geometry");
    properties.remove("name");

    Ok(Feature {
        bbox: None,
        geometry,
        id: Some(Id::String(entry.name)),
        properties: Some(properties),
        foreign_members: None,
    })
}

fn shape(entries: Vec<CatalogEntry>, output: SearchOutput) -> Result<SearchResult> {
    Ok(match output {
        SearchOutput::Uris => SearchResult::Uris(entries.into_iter().map(|e| e.name).collect()),
        SearchOutput::Table => SearchResult::Table(entries),
        SearchOutput::Expanded => {
            SearchResult::Expanded(entries.into_iter().map(|e| (e.name.clone(), e)).collect())
        }
        SearchOutput::GeoJson => SearchResult::GeoJson(FeatureCollection {
            bbox: None,
            features: entries.into_iter().map(to_feature).collect::<Result<Vec<_>>>()?,
            foreign_members: None,
        }),
    })
}

impl Quest {
    /// Search services and collections for catalog entries
    pub async fn search_catalog<S: AsRef<str>>(
        &self,
        uris: &[S],
        options: &SearchOptions,
    ) -> Result<SearchResult> {
        let grouped = classify_uris(
            uris,
            &ClassifyOptions::excluding(&[UriKind::Dataset, UriKind::Publisher]),
        )?;

        let mut merged: BTreeMap<String, CatalogEntry> = BTreeMap::new();

        for collection in grouped.get(&UriKind::Collection).into_iter().flatten() {
            for entry in self.collection_catalog(collection, options.update_cache).await? {
                merged.insert(entry.name.clone(), entry);
            }
        }

        let mut services = Vec::new();
        let mut direct = Vec::new();
        for uri in grouped.get(&UriKind::Service).into_iter().flatten() {
            let parsed: ServiceUri = uri.parse()?;
            if parsed.catalog_id.is_some() {
                direct.push(parsed);
            } else {
                services.push(parsed);
            }
        }

        let results = try_join_all(services.iter().map(|service| {
            self.service_catalog(service, &options.filters, options.update_cache)
        }))
        .await?;
        for entry in results.into_iter().flatten() {
            merged.insert(entry.name.clone(), entry);
        }

        for uri in &direct {
            let entry = self.catalog_entry(uri, options.update_cache).await?;
            merged.insert(entry.name.clone(), entry);
        }

        let total = merged.len();
        let entries = apply_filters(merged.into_values().collect(), &options.filters)?;
        let entries = apply_queries(entries, &options.queries)?;
        debug!(total, matched = entries.len(), "Catalog search finished");

        shape(entries, options.output)
    }

    /// All entries of one service, without filtering
    async fn service_catalog(
        &self,
        service: &ServiceUri,
        filters: &Metadata,
        update_cache: bool,
    ) -> Result<Vec<CatalogEntry>> {
        if service.is_quest() {
            return self.store().await?.list_catalog_entries(None).await;
        }
        self.fetch_service_catalog(service, filters, update_cache).await
    }

    /// Normalized catalog of a provider service, served from the disk cache when allowed
    ///
    /// Filters are only forwarded to providers that bypass the cache. Provider
    /// errors are returned as is and leave the cache untouched.
    pub(crate) async fn fetch_service_catalog(
        &self,
        service: &ServiceUri,
        filters: &Metadata,
        update_cache: bool,
    ) -> Result<Vec<CatalogEntry>> {
        let service = ServiceUri::new(&service.provider, &service.service);
        let (provider, info) = self.resolve_service(&service).await?;
        let cache = CatalogCache::new(self.cache_dir().await);

        if provider.use_cache() && !update_cache {
            if let Some(entries) = cache.load_catalog(&service) {
                return Ok(entries);
            }
        }

        let forwarded = if provider.use_cache() {
            Metadata::new()
        } else {
            filters.clone()
        };
        let rows = provider.search_catalog(&service.service, &forwarded).await?;
        let ids = row_ids(&rows);
        let listing = provider.get_parameters(&service.service, Some(&ids)).await?;
        let entries = normalize_rows(&service, &info, rows, &listing)?;

        if provider.use_cache() {
            cache.store_catalog(&service, &entries)?;
            cache.store_tags(&service, &count_tags(&entries))?;
        }
        info!(service = %service, count = entries.len(), "Fetched service catalog");
        Ok(entries)
    }

    /// Resolve one catalog entry URI
    pub(crate) async fn catalog_entry(
        &self,
        uri: &ServiceUri,
        update_cache: bool,
    ) -> Result<CatalogEntry> {
        let not_found = || QuestError::CatalogEntryNotFound {
            uri: uri.to_string(),
        };
        let Some(catalog_id) = uri.catalog_id.as_deref() else {
            return Err(QuestError::InvalidUri {
                uri: uri.to_string(),
                reason: "expected a catalog entry URI".to_string(),
            });
        };

        if uri.is_quest() {
            return self
                .store()
                .await?
                .get_catalog_entry(&uri.catalog_entry_uri(catalog_id))
                .await?
                .ok_or_else(not_found);
        }

        let name = uri.catalog_entry_uri(catalog_id);
        self.fetch_service_catalog(uri, &Metadata::new(), update_cache)
            .await?
            .into_iter()
            .find(|entry| entry.name == name)
            .ok_or_else(not_found)
    }

    /// Catalog entries referenced by the datasets of a collection
    async fn collection_catalog(
        &self,
        collection: &str,
        update_cache: bool,
    ) -> Result<Vec<CatalogEntry>> {
        let store = self.store().await?;
        if store.get_collection(collection).await?.is_none() {
            return Err(QuestError::CollectionNotFound {
                name: collection.to_string(),
            });
        }

        let referenced: BTreeSet<String> = store
            .list_datasets(&DatasetQuery::in_collection(collection))
            .await?
            .into_iter()
            .map(|d| d.catalog_entry)
            .collect();

        let mut persisted = Vec::new();
        let mut by_service: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();
        for name in referenced {
            let uri: ServiceUri = name.parse()?;
            if uri.is_quest() {
                persisted.push(name);
            } else {
                by_service
                    .entry((uri.provider, uri.service))
                    .or_default()
                    .insert(name);
            }
        }

        let mut entries = store.list_catalog_entries(Some(persisted.as_slice())).await?;
        for ((provider, service), names) in by_service {
            let service = ServiceUri::new(provider, service);
            let catalog = self
                .fetch_service_catalog(&service, &Metadata::new(), update_cache)
                .await?;
            entries.extend(catalog.into_iter().filter(|e| names.contains(&e.name)));
        }
        Ok(entries)
    }

    /// Summarize the metadata values of one or more services
    pub async fn get_tags<S: AsRef<str>>(
        &self,
        service_uris: &[S],
        options: &TagOptions,
    ) -> Result<TagResult> {
        let mut counts = TagCounts::new();
        for uri in service_uris {
            let service: ServiceUri = uri.as_ref().parse()?;
            if service.catalog_id.is_some() {
                return Err(QuestError::InvalidUri {
                    uri: uri.as_ref().to_string(),
                    reason: "tags are summarized per service".to_string(),
                });
            }
            merge_counts(&mut counts, self.service_tags(&service, options.update_cache).await?);
        }
        Ok(select_tags(counts, options.keys.as_deref(), options.as_count))
    }

    async fn service_tags(&self, service: &ServiceUri, update_cache: bool) -> Result<TagCounts> {
        if service.is_quest() {
            let entries = self.store().await?.list_catalog_entries(None).await?;
            return Ok(count_tags(&entries));
        }

        let (provider, _) = self.resolve_service(service).await?;
        let cache = CatalogCache::new(self.cache_dir().await);
        if provider.use_cache() && !update_cache {
            if let Some(counts) = cache.load_tags(service) {
                return Ok(counts);
            }
        }

        let entries = self
            .fetch_service_catalog(service, &Metadata::new(), update_cache)
            .await?;
        let counts = count_tags(&entries);
        if provider.use_cache() {
            cache.store_tags(service, &counts)?;
        }
        Ok(counts)
    }

    /// Persist a user-created catalog entry under `svc://quest:quest`
    pub async fn new_catalog_entry(&self, request: NewCatalogEntry) -> Result<String> {
        let geometry = match (request.geometry, request.geom_type, request.coordinates) {
            (Some(geometry), None, None) => Some(geometry_from_value(&geometry)?),
            (None, Some(geom_type), Some(coordinates)) => Some(geometry_from_value(&json!({
                "type": canonical_geom_type(&geom_type)?,
                "coordinates": coordinates,
            }))?),
            (None, None, None) => None,
            _ => {
                return Err(QuestError::invalid_options(
                    "catalog entry",
                    "give either a geometry or a geom_type with coordinates",
                ))
            }
        };

        let mut entry = CatalogEntry::new(&ServiceUri::quest(), new_catalog_id());
        entry.geometry = geometry.as_ref().map(to_wkt);
        if let Some(display_name) = request.display_name {
            entry.display_name = display_name;
        }
        entry.description = request.description.unwrap_or_default();
        entry.parameters = request.parameters.join(",");
        entry.metadata = request.metadata;

        self.store().await?.insert_catalog_entry(&entry).await?;
        info!(catalog_entry = %entry.name, "Created catalog entry");
        Ok(entry.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quest_core::uri::ServiceUri;

    fn entry(id: &str, wkt: Option<&str>) -> CatalogEntry {
        let mut entry = CatalogEntry::new(&ServiceUri::new("usgs-nwis", "iv"), id);
        entry.geometry = wkt.map(str::to_string);
        entry
    }

    #[test]
    fn test_geojson_output() {
        let result = shape(
            vec![entry("a", Some("POINT(-97.7 30.2)")), entry("b", None)],
            SearchOutput::GeoJson,
        )
        .unwrap();

        let SearchResult::GeoJson(collection) = &result else {
            panic!("expected geojson");
        };
        assert_eq!(collection.features.len(), 2);
        assert!(collection.features[0].geometry.is_some());
        assert!(collection.features[1].geometry.is_none());
        let properties = collection.features[0].properties.as_ref().unwrap();
        assert_eq!(properties["service_id"], "a");
        assert!(!properties.contains_key("geometry"));
        assert_eq!(
            result.uris(),
            vec!["svc://usgs-nwis:iv/a", "svc://usgs-nwis:iv/b"]
        );
    }

    #[test]
    fn test_expanded_output_is_keyed_by_uri() {
        let result = shape(vec![entry("a", None)], SearchOutput::Expanded).unwrap();
        let SearchResult::Expanded(map) = result else {
            panic!("expected expanded");
        };
        assert_eq!(map["svc://usgs-nwis:iv/a"].service_id, "a");
    }

    #[test]
    fn test_geom_type_names() {
        assert_eq!(canonical_geom_type("point").unwrap(), "Point");
        assert_eq!(canonical_geom_type("MULTIPOLYGON").unwrap(), "MultiPolygon");
        assert!(canonical_geom_type("circle").is_err());
    }
}

//! Providers declared by a `quest.yml` manifest
//!
//! Every entry of `USER_SERVICES` is the root of a user provider: a local
//! directory or an `http(s)` URL holding a manifest that declares the
//! services, the catalog file of each service and how catalog entries map to
//! downloadable files. Entries ending in `*` are expanded to every
//! subdirectory that contains a manifest.

use async_trait::async_trait;
use quest_core::error::{QuestError, Result};
use quest_core::formats::{DatasetData, GeoJsonHandler, IoHandler};
use quest_core::models::{Metadata, ProviderMetadata, ServiceInfo, ServiceType};
use quest_core::ports::{CatalogRow, DownloadOutcome, DownloadRequest, Provider};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// File name of a user provider manifest
pub const MANIFEST_FILE: &str = "quest.yml";

/// Prefix of every user provider name
pub const USER_PROVIDER_PREFIX: &str = "user-";

const FEATURE_PLACEHOLDER: &str = "<feature>";

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub name: String,
    #[serde(default)]
    pub metadata: ManifestMetadata,
    #[serde(default)]
    pub services: BTreeMap<String, ManifestService>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestMetadata {
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub organization_name: String,
    #[serde(default)]
    pub organization_abbr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestService {
    #[serde(default)]
    pub metadata: ServiceMetadata,
    #[serde(default)]
    pub service_folder: Option<String>,
    pub features: FeatureSource,
    #[serde(default)]
    pub datasets: DatasetMapping,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceMetadata {
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: String,
    pub service_type: Option<ServiceType>,
    pub datatype: Option<String>,
    pub geom_type: Option<String>,
    pub file_format: Option<String>,
    #[serde(default)]
    pub parameters: Vec<String>,
    pub bbox: Option<[f64; 4]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureSource {
    pub file: String,
    pub format: FeatureFormat,
}

/// Layout of a service's catalog file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureFormat {
    /// GeoJSON feature collection
    Geojson,
    /// Whitespace separated `name xmin ymin xmax ymax` lines
    Mbr,
    /// Comma separated with a header row naming `xmin ymin xmax ymax`
    MbrCsv,
    /// JSON array of row objects
    IsepJson,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetMapping {
    /// Path of an entry's file relative to the service folder, with a `<feature>` placeholder
    pub mapping: Option<String>,
    pub save_folder: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Where a manifest and its files live
#[derive(Debug, Clone)]
enum Root {
    Local(PathBuf),
    Remote(reqwest::Url),
}

impl Root {
    fn parse(entry: &str) -> Result<Self> {
        if entry.starts_with("http://") || entry.starts_with("https://") {
            let with_slash = if entry.ends_with('/') {
                entry.to_string()
            } else {
                format!("{}/", entry)
            };
            reqwest::Url::parse(&with_slash)
                .map(Root::Remote)
                .map_err(|e| QuestError::ConfigInvalid {
                    key: quest_core::config::USER_SERVICES.to_string(),
                    reason: format!("invalid URL '{}': {}", entry, e),
                })
        } else {
            Ok(Root::Local(PathBuf::from(entry)))
        }
    }

    fn join(&self, parts: &[&str]) -> Result<Location> {
        match self {
            Root::Local(dir) => {
                let mut path = dir.clone();
                for part in parts {
                    path.push(part);
                }
                Ok(Location::Local(path))
            }
            Root::Remote(base) => {
                let relative = parts
                    .iter()
                    .map(|p| p.trim_matches('/'))
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
                    .join("/");
                base.join(&relative)
                    .map(Location::Remote)
                    .map_err(|e| QuestError::Http(format!("invalid path '{}': {}", relative, e)))
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Location {
    Local(PathBuf),
    Remote(reqwest::Url),
}

impl Location {
    fn file_name(&self) -> Option<String> {
        match self {
            Location::Local(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            Location::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
                .filter(|name| !name.is_empty()),
        }
    }

    async fn read_to_string(&self, client: &reqwest::Client) -> Result<String> {
        match self {
            Location::Local(path) => Ok(tokio::fs::read_to_string(path).await?),
            Location::Remote(url) => {
                let response = fetch(client, url).await?;
                response
                    .text()
                    .await
                    .map_err(|e| QuestError::Http(format!("Failed to read {}: {}", url, e)))
            }
        }
    }

    /// Copy or fetch this location to `target`
    async fn save_to(&self, client: &reqwest::Client, target: &Path) -> Result<()> {
        match self {
            Location::Local(path) if path.is_dir() => {
                for entry in WalkDir::new(path) {
                    let entry = entry.map_err(|e| QuestError::Io(e.into()))?;
                    let Ok(relative) = entry.path().strip_prefix(path) else {
                        continue;
                    };
                    let destination = target.join(relative);
                    if entry.file_type().is_dir() {
                        tokio::fs::create_dir_all(&destination).await?;
                    } else {
                        tokio::fs::copy(entry.path(), &destination).await?;
                    }
                }
                Ok(())
            }
            Location::Local(path) => {
                tokio::fs::copy(path, target).await?;
                Ok(())
            }
            Location::Remote(url) => {
                let bytes = fetch(client, url)
                    .await?
                    .bytes()
                    .await
                    .map_err(|e| QuestError::Http(format!("Failed to download {}: {}", url, e)))?;
                tokio::fs::write(target, &bytes).await?;
                Ok(())
            }
        }
    }

    fn exists(&self) -> bool {
        match self {
            Location::Local(path) => path.exists(),
            Location::Remote(_) => true,
        }
    }
}

async fn fetch(client: &reqwest::Client, url: &reqwest::Url) -> Result<reqwest::Response> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| QuestError::Http(format!("Failed to fetch {}: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(QuestError::Http(format!(
            "{} returned status {}",
            url,
            response.status()
        )));
    }
    Ok(response)
}

/// A provider backed by a manifest
pub struct UserProvider {
    name: String,
    root: Root,
    manifest: Manifest,
    client: reqwest::Client,
}

impl UserProvider {
    /// Load the manifest found at `entry`
    pub async fn load(entry: &str) -> Result<Self> {
        let root = Root::parse(entry)?;
        let client = reqwest::Client::new();
        let location = root.join(&[MANIFEST_FILE])?;
        let content = location.read_to_string(&client).await.map_err(|e| {
            QuestError::PluginLoad {
                name: entry.to_string(),
                reason: format!("cannot read {}: {}", MANIFEST_FILE, e),
            }
        })?;
        let manifest: Manifest =
            serde_yaml::from_str(&content).map_err(|e| QuestError::InvalidManifest {
                path: PathBuf::from(entry),
                reason: e.to_string(),
            })?;
        Ok(Self::from_manifest(root, manifest, client))
    }

    fn from_manifest(root: Root, manifest: Manifest, client: reqwest::Client) -> Self {
        Self {
            name: format!("{}{}", USER_PROVIDER_PREFIX, manifest.name),
            root,
            manifest,
            client,
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn manifest_service(&self, service: &str) -> Result<&ManifestService> {
        self.manifest
            .services
            .get(service)
            .ok_or_else(|| QuestError::ServiceNotFound {
                uri: format!("svc://{}:{}", self.name, service),
            })
    }

    fn service_location(&self, service: &ManifestService, file: &str) -> Result<Location> {
        match &service.service_folder {
            Some(folder) => self.root.join(&[folder, file]),
            None => self.root.join(&[file]),
        }
    }

    async fn feature_rows(&self, service: &str) -> Result<Vec<CatalogRow>> {
        let declared = self.manifest_service(service)?;
        let location = self.service_location(declared, &declared.features.file)?;
        let content = location
            .read_to_string(&self.client)
            .await
            .map_err(|e| QuestError::provider(&self.name, format!("cannot read catalog: {}", e)))?;
        parse_features(&content, declared.features.format)
            .map_err(|e| QuestError::provider(&self.name, e.to_string()))
    }

    /// Write the catalog row of `catalog_id` as a single-feature GeoJSON file
    async fn write_feature(&self, request: &DownloadRequest, target_dir: &Path) -> Result<PathBuf> {
        let rows = self.feature_rows(&request.service).await?;
        let row = rows
            .into_iter()
            .find(|row| {
                row.get("service_id").and_then(Value::as_str) == Some(request.catalog_id.as_str())
            })
            .ok_or_else(|| QuestError::NoDataAvailable {
                uri: format!("svc://{}:{}/{}", self.name, request.service, request.catalog_id),
            })?;

        let feature = row_to_feature(row)?;
        let collection = geojson::FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        };
        let path = target_dir.join(format!("{}.geojson", request.catalog_id));
        GeoJsonHandler
            .write(&path, &DatasetData::features(collection, Metadata::new()))
            .await?;
        Ok(path)
    }
}

#[async_trait]
impl Provider for UserProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> ProviderMetadata {
        let declared = &self.manifest.metadata;
        ProviderMetadata {
            display_name: declared
                .display_name
                .clone()
                .unwrap_or_else(|| self.manifest.name.clone()),
            description: declared.description.clone(),
            organization_name: declared.organization_name.clone(),
            organization_abbr: declared.organization_abbr.clone(),
        }
    }

    fn services(&self) -> Vec<ServiceInfo> {
        self.manifest
            .services
            .iter()
            .map(|(name, declared)| {
                let meta = &declared.metadata;
                let mut info = ServiceInfo::new(
                    name.clone(),
                    meta.service_type.unwrap_or(ServiceType::GeoDiscrete),
                    meta.datatype.clone().unwrap_or_else(|| "unknown".to_string()),
                )
                .with_parameters(meta.parameters.clone());
                if let Some(display_name) = &meta.display_name {
                    info.display_name = display_name.clone();
                }
                info.description = meta.description.clone();
                info.geom_type = meta.geom_type.clone();
                info.file_format = meta.file_format.clone();
                info.bbox = meta.bbox;
                info
            })
            .collect()
    }

    fn use_cache(&self) -> bool {
        false
    }

    async fn search_catalog(&self, service: &str, _filters: &Metadata) -> Result<Vec<CatalogRow>> {
        self.feature_rows(service).await
    }

    async fn download(&self, request: DownloadRequest) -> Result<DownloadOutcome> {
        let declared = self.manifest_service(&request.service)?.clone();
        let target_dir = match &declared.datasets.save_folder {
            Some(folder) => request.file_path.join(folder),
            None => request.file_path.clone(),
        };
        tokio::fs::create_dir_all(&target_dir).await?;

        let (file_path, file_format) = match &declared.datasets.mapping {
            Some(pattern) => {
                let relative = pattern.replace(FEATURE_PLACEHOLDER, &request.catalog_id);
                let source = self.service_location(&declared, &relative)?;
                if !source.exists() {
                    return Err(QuestError::NoDataAvailable {
                        uri: format!(
                            "svc://{}:{}/{}",
                            self.name, request.service, request.catalog_id
                        ),
                    });
                }
                let file_name = source
                    .file_name()
                    .unwrap_or_else(|| request.catalog_id.clone());
                let target = target_dir.join(file_name);
                source.save_to(&self.client, &target).await?;
                let format = declared
                    .metadata
                    .file_format
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());
                (target, format)
            }
            None => (
                self.write_feature(&request, &target_dir).await?,
                quest_core::formats::geojson::GEOJSON.to_string(),
            ),
        };

        debug!(
            provider = %self.name,
            path = %file_path.display(),
            "User provider download complete"
        );
        Ok(DownloadOutcome {
            file_path,
            file_format,
            datatype: declared
                .metadata
                .datatype
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            parameter: match declared.metadata.parameters.as_slice() {
                [only] => Some(only.clone()),
                _ => None,
            },
            unit: None,
            metadata: declared.datasets.metadata.clone(),
        })
    }
}

/// Parse a catalog file into raw rows
pub fn parse_features(content: &str, format: FeatureFormat) -> Result<Vec<CatalogRow>> {
    match format {
        FeatureFormat::Geojson => parse_geojson(content),
        FeatureFormat::Mbr => parse_mbr(content),
        FeatureFormat::MbrCsv => parse_mbr_csv(content),
        FeatureFormat::IsepJson => parse_isep_json(content),
    }
}

fn parse_geojson(content: &str) -> Result<Vec<CatalogRow>> {
    let collection: geojson::FeatureCollection = content
        .parse::<geojson::GeoJson>()
        .and_then(geojson::FeatureCollection::try_from)
        .map_err(|e| QuestError::Serialization(format!("invalid GeoJSON catalog: {}", e)))?;

    Ok(collection
        .features
        .into_iter()
        .enumerate()
        .map(|(i, feature)| {
            let mut row = feature.properties.unwrap_or_default();
            let id = match feature.id {
                Some(geojson::feature::Id::String(s)) => s,
                Some(geojson::feature::Id::Number(n)) => n.to_string(),
                None => row
                    .get("id")
                    .or_else(|| row.get("name"))
                    .map(value_to_id)
                    .unwrap_or_else(|| i.to_string()),
            };
            row.insert("service_id".to_string(), Value::String(id));
            if let Some(geometry) = feature.geometry {
                if let Ok(value) = serde_json::to_value(&geometry) {
                    row.insert("geometry".to_string(), value);
                }
            }
            row
        })
        .collect())
}

fn mbr_row(name: &str, coords: &[&str]) -> Result<CatalogRow> {
    let bbox = coords
        .iter()
        .map(|c| c.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| QuestError::Serialization(format!("invalid bounds for '{}': {}", name, e)))?;

    let mut row = CatalogRow::new();
    row.insert("service_id".to_string(), Value::String(name.to_string()));
    row.insert("bbox".to_string(), serde_json::json!(bbox));
    Ok(row)
}

fn parse_mbr(content: &str) -> Result<Vec<CatalogRow>> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [name, xmin, ymin, xmax, ymax] => mbr_row(name, &[*xmin, *ymin, *xmax, *ymax]),
                _ => Err(QuestError::Serialization(format!(
                    "expected 'name xmin ymin xmax ymax', got '{}'",
                    line
                ))),
            }
        })
        .collect()
}

fn parse_mbr_csv(content: &str) -> Result<Vec<CatalogRow>> {
    let mut lines = content.lines().filter(|line| !line.trim().is_empty());
    let header: Vec<String> = lines
        .next()
        .ok_or_else(|| QuestError::Serialization("empty MBR CSV catalog".to_string()))?
        .split(',')
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();

    let column = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| {
                QuestError::Serialization(format!("MBR CSV catalog has no '{}' column", name))
            })
    };
    let bounds = [column("xmin")?, column("ymin")?, column("xmax")?, column("ymax")?];
    let id = header
        .iter()
        .position(|h| h == "name" || h == "id")
        .unwrap_or(0);

    lines
        .map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != header.len() {
                return Err(QuestError::Serialization(format!(
                    "expected {} fields, got '{}'",
                    header.len(),
                    line
                )));
            }
            let coords = bounds.map(|i| fields[i]);
            let mut row = mbr_row(fields[id], &coords)?;
            for (i, name) in header.iter().enumerate() {
                if i != id && !bounds.contains(&i) {
                    row.insert(name.clone(), Value::String(fields[i].to_string()));
                }
            }
            Ok(row)
        })
        .collect()
}

fn parse_isep_json(content: &str) -> Result<Vec<CatalogRow>> {
    let items: Vec<CatalogRow> = serde_json::from_str(content)
        .map_err(|e| QuestError::Serialization(format!("invalid JSON catalog: {}", e)))?;

    items
        .into_iter()
        .map(|mut row| {
            if !row.contains_key("service_id") {
                let id = row
                    .get("id")
                    .or_else(|| row.get("name"))
                    .map(value_to_id)
                    .ok_or_else(|| {
                        QuestError::Serialization("catalog item has no 'id' or 'name'".to_string())
                    })?;
                row.insert("service_id".to_string(), Value::String(id));
            }
            Ok(row)
        })
        .collect()
}

fn value_to_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn row_to_feature(mut row: CatalogRow) -> Result<geojson::Feature> {
    let geometry = if let Some(value) = row.remove("geometry").filter(|v| !v.is_null()) {
        Some(quest_geo::to_geojson_geometry(&quest_geo::geometry_from_value(&value)?))
    } else if let Some(bbox) = row.remove("bbox") {
        let polygon = quest_geo::bbox_polygon(quest_geo::parse_bbox(&bbox)?);
        Some(quest_geo::to_geojson_geometry(&geo::Geometry::Polygon(polygon)))
    } else {
        None
    };

    let id = row.get("service_id").map(value_to_id);
    Ok(geojson::Feature {
        bbox: None,
        geometry,
        id: id.map(geojson::feature::Id::String),
        properties: Some(row),
        foreign_members: None,
    })
}

/// Expand `USER_SERVICES` entries, resolving trailing `*` wildcards
pub fn expand_user_services(entries: &[String]) -> Vec<String> {
    let mut expanded = Vec::new();
    for entry in entries {
        let Some(base) = entry.strip_suffix('*') else {
            expanded.push(entry.clone());
            continue;
        };
        if base.starts_with("http://") || base.starts_with("https://") {
            warn!(entry = %entry, "Wildcards are only supported for local user services");
            continue;
        }

        let base = if base.is_empty() { "." } else { base };
        let mut found: Vec<String> = WalkDir::new(base)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir() && e.path().join(MANIFEST_FILE).is_file())
            .map(|e| e.path().to_string_lossy().into_owned())
            .collect();
        found.sort();
        expanded.extend(found);
    }
    expanded
}

/// Load every user provider, logging and skipping the ones that fail
pub async fn load_user_providers(entries: &[String]) -> Vec<Arc<dyn Provider>> {
    let mut providers: Vec<Arc<dyn Provider>> = Vec::new();
    for entry in expand_user_services(entries) {
        match UserProvider::load(&entry).await {
            Ok(provider) => {
                debug!(provider = %provider.name(), root = %entry, "Loaded user provider");
                providers.push(Arc::new(provider));
            }
            Err(e) => {
                warn!(root = %entry, error = %e, "Skipping user provider that failed to load")
            }
        }
    }
    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
name: gauges
metadata:
  display_name: Local gauges
services:
  stations:
    metadata:
      datatype: timeseries
      geom_type: Point
      file_format: timeseries-json
      parameters: [streamflow]
    service_folder: stations
    features:
      file: stations.geojson
      format: geojson
    datasets:
      mapping: "data/<feature>.json"
      save_folder: gauges
  tiles:
    features:
      file: tiles.mbr
      format: mbr
    datasets:
      mapping: null
"#;

    const STATIONS: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "id": "s1", "geometry": {"type": "Point", "coordinates": [-97.7, 30.3]},
     "properties": {"river": "Colorado"}},
    {"type": "Feature", "id": "s2", "geometry": {"type": "Point", "coordinates": [-95.4, 29.8]},
     "properties": {"river": "Buffalo Bayou"}}
  ]
}"#;

    fn write_manifest(dir: &Path) {
        std::fs::create_dir_all(dir.join("stations").join("data")).unwrap();
        std::fs::write(dir.join(MANIFEST_FILE), MANIFEST).unwrap();
        std::fs::write(dir.join("stations").join("stations.geojson"), STATIONS).unwrap();
        let data = dir.join("stations").join("data");
        std::fs::write(data.join("s1.json"), "{\"data\": []}").unwrap();
        std::fs::write(dir.join("tiles.mbr"), "t1 -98 30 -97 31\nt2 -97 30 -96 31\n").unwrap();
    }

    #[test]
    fn test_parse_mbr() {
        let mbr = "a 0 0 1 1\n\n# comment\nb 1 1 2 2\n";
        let rows = parse_features(mbr, FeatureFormat::Mbr).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["service_id"], "a");
        assert_eq!(rows[1]["bbox"], serde_json::json!([1.0, 1.0, 2.0, 2.0]));
        assert!(parse_features("a 0 0 1\n", FeatureFormat::Mbr).is_err());
    }

    #[test]
    fn test_parse_mbr_csv_keeps_extra_columns() {
        let csv = "name,xmin,ymin,xmax,ymax,source\ntile_1,0,0,1,1,lidar\n";
        let rows = parse_features(csv, FeatureFormat::MbrCsv).unwrap();
        assert_eq!(rows[0]["service_id"], "tile_1");
        assert_eq!(rows[0]["source"], "lidar");
        assert!(!rows[0].contains_key("xmin"));
    }

    #[test]
    fn test_parse_isep_json() {
        let isep = r#"[{"id": 7, "latitude": 30, "longitude": -97}]"#;
        let rows = parse_features(isep, FeatureFormat::IsepJson).unwrap();
        assert_eq!(rows[0]["service_id"], "7");
        assert!(parse_features(r#"[{"latitude": 30}]"#, FeatureFormat::IsepJson).is_err());
    }

    #[tokio::test]
    async fn test_invalid_manifest_names_its_root() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_FILE), "name: [unclosed").unwrap();
        let root = tmp.path().to_string_lossy().into_owned();

        match UserProvider::load(&root).await {
            Err(QuestError::InvalidManifest { path, .. }) => assert_eq!(path, PathBuf::from(&root)),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("manifest should not parse"),
        }
    }

    #[tokio::test]
    async fn test_manifest_provider() {
        let tmp = TempDir::new().unwrap();
        write_manifest(tmp.path());

        let provider = UserProvider::load(&tmp.path().to_string_lossy()).await.unwrap();
        assert_eq!(provider.name(), "user-gauges");
        assert_eq!(provider.metadata().display_name, "Local gauges");
        assert!(!provider.use_cache());

        let rows = provider.search_catalog("stations", &Metadata::new()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["service_id"], "s1");
        assert_eq!(rows[0]["river"], "Colorado");
    }

    #[tokio::test]
    async fn test_mapped_download_copies_file() {
        let tmp = TempDir::new().unwrap();
        write_manifest(tmp.path());
        let provider = UserProvider::load(&tmp.path().to_string_lossy()).await.unwrap();
        let out = TempDir::new().unwrap();

        let outcome = provider
            .download(DownloadRequest {
                service: "stations".to_string(),
                catalog_id: "s1".to_string(),
                file_path: out.path().to_path_buf(),
                dataset: "d1".to_string(),
                options: Metadata::new(),
                credentials: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.file_path, out.path().join("gauges").join("s1.json"));
        assert_eq!(outcome.file_format, "timeseries-json");
        assert_eq!(outcome.parameter.as_deref(), Some("streamflow"));
        assert!(outcome.file_path.exists());

        let missing = provider
            .download(DownloadRequest {
                service: "stations".to_string(),
                catalog_id: "s2".to_string(),
                file_path: out.path().to_path_buf(),
                dataset: "d2".to_string(),
                options: Metadata::new(),
                credentials: None,
            })
            .await;
        assert!(matches!(missing, Err(QuestError::NoDataAvailable { .. })));
    }

    #[tokio::test]
    async fn test_unmapped_download_writes_feature() {
        let tmp = TempDir::new().unwrap();
        write_manifest(tmp.path());
        let provider = UserProvider::load(&tmp.path().to_string_lossy()).await.unwrap();
        let out = TempDir::new().unwrap();

        let outcome = provider
            .download(DownloadRequest {
                service: "tiles".to_string(),
                catalog_id: "t2".to_string(),
                file_path: out.path().to_path_buf(),
                dataset: "d1".to_string(),
                options: Metadata::new(),
                credentials: None,
            })
            .await
            .unwrap();
        assert_eq!(outcome.file_format, "geojson");

        let data = GeoJsonHandler.read(&outcome.file_path).await.unwrap();
        match data.body {
            quest_core::formats::DataBody::Features(fc) => assert_eq!(fc.features.len(), 1),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_wildcard_expansion_and_bad_roots() {
        let tmp = TempDir::new().unwrap();
        write_manifest(&tmp.path().join("one"));
        std::fs::create_dir_all(tmp.path().join("empty")).unwrap();

        let pattern = format!("{}/*", tmp.path().display());
        let expanded = expand_user_services(&[pattern.clone()]);
        assert_eq!(expanded, vec![tmp.path().join("one").to_string_lossy().into_owned()]);

        let missing = tmp.path().join("missing").to_string_lossy().into_owned();
        let providers = load_user_providers(&[pattern, missing]).await;
        assert_eq!(providers.len(), 1);
    }
}

//! Shared fixtures for the engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use quest_core::config::Settings;
use quest_core::error::{QuestError, Result};
use quest_core::formats::{DatasetData, IoHandler, TimePoint, TimeSeries, TimeSeriesJsonHandler};
use quest_core::formats::geojson::GEOJSON;
use quest_core::models::{
    Metadata, OptionSchema, ParamSpec, ProviderCredentials, ProviderMetadata, PublisherInfo,
    ServiceInfo, ServiceType,
};
use quest_core::ports::{CatalogRow, DownloadOutcome, DownloadRequest, Provider, PublishRequest};
use quest_engine::tools::{DataKinds, DerivedDataset};
use quest_engine::{PluginRegistry, Quest, Tool, ToolContext, ToolMetadata, ToolOutput};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::Semaphore;

pub const NWIS: &str = "usgs-nwis";
pub const IV: &str = "svc://usgs-nwis:iv";
pub const AUSTIN_BBOX: [f64; 4] = [-98.2, 30.0, -97.4, 30.6];

pub const NED: &str = "usgs-ned";
pub const NED_SVC: &str = "svc://usgs-ned:ned";
pub const MERGE: &str = "raster-merge";

/// In-memory stand-in for a streamflow web service
#[derive(Default)]
pub struct MockNwis {
    pub catalog_calls: AtomicUsize,
    pub downloads: AtomicUsize,
    /// When set, every download waits for a permit
    pub gate: Option<Arc<Semaphore>>,
    /// Catalog ids whose download fails with "no data"
    pub empty: Vec<String>,
}

impl MockNwis {
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn catalog_calls(&self) -> usize {
        self.catalog_calls.load(Ordering::SeqCst)
    }
}

fn row(value: Value) -> CatalogRow {
    value.as_object().cloned().unwrap_or_default()
}

/// Twenty steady hourly values and one spike
pub fn spiky_series() -> TimeSeries {
    let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
    let mut values = vec![12.0; 20];
    values.push(900.0);
    TimeSeries {
        parameter: Some("streamflow".to_string()),
        unit: Some("cfs".to_string()),
        points: values
            .into_iter()
            .enumerate()
            .map(|(i, v)| TimePoint {
                time: start + Duration::hours(i as i64),
                value: Some(v),
            })
            .collect(),
    }
}

#[async_trait]
impl Provider for MockNwis {
    fn name(&self) -> &str {
        NWIS
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            display_name: "USGS NWIS".to_string(),
            description: "Mock water services".to_string(),
            organization_name: "United States Geological Survey".to_string(),
            organization_abbr: "USGS".to_string(),
        }
    }

    fn services(&self) -> Vec<ServiceInfo> {
        vec![ServiceInfo::new("iv", ServiceType::GeoDiscrete, "timeseries")
            .with_geom_type("Point")
            .with_file_format("timeseries-json")
            .with_parameters(["00060"])
            .with_parameter_code("00060", "streamflow")]
    }

    fn publishers(&self) -> Vec<PublisherInfo> {
        vec![PublisherInfo::new("archive")]
    }

    async fn search_catalog(&self, _service: &str, _filters: &Metadata) -> Result<Vec<CatalogRow>> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            row(json!({
                "service_id": "08158000",
                "display_name": "Colorado Rv at Austin",
                "latitude": 30.25,
                "longitude": -97.69,
                "parameters": ["00060"],
                "state": {"code": "TX", "name": "Texas"},
            })),
            row(json!({
                "service_id": "08074000",
                "display_name": "Buffalo Bayou at Houston",
                "latitude": 29.76,
                "longitude": -95.41,
                "parameters": ["00060"],
                "state": {"code": "TX", "name": "Texas"},
            })),
            row(json!({
                "service_id": "07010000",
                "display_name": "Mississippi River at St. Louis",
                "latitude": 38.63,
                "longitude": -90.18,
                "parameters": ["00060"],
                "state": {"code": "MO", "name": "Missouri"},
            })),
        ])
    }

    async fn download(&self, request: DownloadRequest) -> Result<DownloadOutcome> {
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| QuestError::provider(NWIS, e.to_string()))?;
        }
        self.downloads.fetch_add(1, Ordering::SeqCst);

        if self.empty.contains(&request.catalog_id) {
            return Err(QuestError::NoDataAvailable {
                uri: format!("{}/{}", IV, request.catalog_id),
            });
        }

        let path = request.file_path.join(format!("{}.json", request.dataset));
        let mut metadata = Metadata::new();
        metadata.insert("site".to_string(), json!(request.catalog_id));
        TimeSeriesJsonHandler
            .write(&path, &DatasetData::timeseries(spiky_series(), metadata.clone()))
            .await?;

        Ok(DownloadOutcome {
            file_path: path,
            file_format: "timeseries-json".to_string(),
            datatype: "timeseries".to_string(),
            parameter: Some("streamflow".to_string()),
            unit: Some("cfs".to_string()),
            metadata,
        })
    }

    fn download_options(&self, _service: &str) -> Option<OptionSchema> {
        Some(
            OptionSchema::new("NWIS download")
                .with(ParamSpec::string("parameter").with_default("streamflow"))
                .with(ParamSpec::string("period").with_default("P7D")),
        )
    }

    async fn publish(&self, request: PublishRequest) -> Result<Metadata> {
        let mut result = Metadata::new();
        result.insert("publisher".to_string(), json!(request.publisher));
        result.insert("remote_id".to_string(), json!(format!("archive-{}", request.dataset.name)));
        result.insert("options".to_string(), Value::Object(request.options));
        Ok(result)
    }

    fn publish_options(&self, _publisher: &str) -> Option<OptionSchema> {
        Some(OptionSchema::new("Archive").with(ParamSpec::string("title").required()))
    }
}

/// Seamless elevation tiles; each download writes a folder of tiles and reports the folder
#[derive(Default)]
pub struct MockTiles {
    pub auth: bool,
    /// Credentials handed to each download
    pub seen_credentials: Mutex<Vec<Option<ProviderCredentials>>>,
}

impl MockTiles {
    pub fn with_auth() -> Self {
        Self {
            auth: true,
            ..Default::default()
        }
    }

    pub fn usernames(&self) -> Vec<Option<String>> {
        self.seen_credentials
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.as_ref().map(|c| c.username.clone()))
            .collect()
    }
}

#[async_trait]
impl Provider for MockTiles {
    fn name(&self) -> &str {
        NED
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            display_name: "USGS NED".to_string(),
            description: "Mock elevation tiles".to_string(),
            organization_name: "United States Geological Survey".to_string(),
            organization_abbr: "USGS".to_string(),
        }
    }

    fn services(&self) -> Vec<ServiceInfo> {
        vec![ServiceInfo::new("ned", ServiceType::GeoSeamless, "raster")
            .with_geom_type("Polygon")
            .with_file_format("raster-gtiff")
            .with_parameters(["elevation"])]
    }

    fn requires_auth(&self) -> bool {
        self.auth
    }

    async fn search_catalog(&self, _service: &str, _filters: &Metadata) -> Result<Vec<CatalogRow>> {
        Ok(vec![
            row(json!({"service_id": "t1", "bbox": [-98.5, 30.0, -98.0, 30.5]})),
            row(json!({"service_id": "t2", "bbox": [-98.0, 30.0, -97.5, 30.5]})),
            row(json!({"service_id": "t3", "bbox": [-90.0, 40.0, -89.0, 41.0]})),
        ])
    }

    async fn download(&self, request: DownloadRequest) -> Result<DownloadOutcome> {
        self.seen_credentials
            .lock()
            .unwrap()
            .push(request.credentials.clone());

        for tile in ["a.tif", "b.tif"] {
            tokio::fs::write(request.file_path.join(tile), request.catalog_id.as_bytes()).await?;
        }
        Ok(DownloadOutcome {
            file_path: request.file_path,
            file_format: "raster-gtiff".to_string(),
            datatype: "raster".to_string(),
            parameter: Some("elevation".to_string()),
            unit: Some("m".to_string()),
            metadata: Metadata::new(),
        })
    }
}

/// Tile merger recording the options of every run
#[derive(Default)]
pub struct MockMerge {
    pub runs: Mutex<Vec<Metadata>>,
}

impl MockMerge {
    pub fn runs(&self) -> Vec<Metadata> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for MockMerge {
    fn name(&self) -> &str {
        MERGE
    }

    fn metadata(&self) -> ToolMetadata {
        let raster = DataKinds {
            datatype: Some(vec!["raster".to_string()]),
            geotype: None,
            parameters: None,
        };
        ToolMetadata {
            group: "Raster".to_string(),
            display_name: "Merge tiles".to_string(),
            description: "Merge raster tiles into one dataset".to_string(),
            operates_on: raster.clone(),
            produces: raster,
            marks_filtered: false,
        }
    }

    fn parameters(&self) -> OptionSchema {
        OptionSchema::new("Merge tiles")
            .with(ParamSpec::dataset("datasets").required())
            .with(ParamSpec::string("bbox"))
    }

    async fn run(&self, ctx: &ToolContext, options: &Metadata) -> Result<ToolOutput> {
        self.runs.lock().unwrap().push(options.clone());
        let first = options["datasets"][0]
            .as_str()
            .ok_or_else(|| ctx.incompatible("no datasets"))?
            .to_string();

        let input = ctx.dataset(&first).await?;
        let output = ctx
            .create_new_dataset(&input, DerivedDataset::new(GEOJSON))
            .await?;
        Ok(ToolOutput {
            datasets: vec![output.name],
            catalog_entries: vec![output.catalog_entry],
        })
    }
}

/// A context rooted in `tmp` with the built-in plugins and `provider`
pub fn quest_with(tmp: &TempDir, provider: Arc<MockNwis>) -> Quest {
    let mut registry = PluginRegistry::with_builtin();
    registry.register_provider_instance(provider);
    Quest::builder()
        .settings(Settings::with_base_dir(tmp.path()))
        .registry(registry)
        .build()
}

/// Both mock providers, plus the merge tool when given
pub fn quest_with_tiles(
    tmp: &TempDir,
    nwis: Arc<MockNwis>,
    tiles: Arc<MockTiles>,
    merge: Option<Arc<MockMerge>>,
) -> Quest {
    let mut registry = PluginRegistry::with_builtin();
    registry.register_provider_instance(nwis);
    registry.register_provider_instance(tiles);
    if let Some(merge) = merge {
        registry.register_tool(merge);
    }
    Quest::builder()
        .settings(Settings::with_base_dir(tmp.path()))
        .registry(registry)
        .build()
}

pub fn bbox_filter() -> Value {
    json!(AUSTIN_BBOX)
}

pub fn options(value: Value) -> Metadata {
    value.as_object().cloned().unwrap_or_default()
}

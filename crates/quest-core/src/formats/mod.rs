//! I/O handler abstraction for dataset files
//!
//! Each dataset records the `file_format` it was written in. An `IoHandler`
//! registered under that name knows how to read, write, open and visualize
//! such files. The `IoRegistry` dispatches by format name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{QuestError, Result};
use crate::models::{Metadata, OptionSchema};

pub mod geojson;
pub mod timeseries;

pub use self::geojson::GeoJsonHandler;
pub use self::timeseries::TimeSeriesJsonHandler;

/// Broad kind of data a handler deals with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoType {
    Timeseries,
    Features,
    Raster,
}

impl fmt::Display for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IoType::Timeseries => "timeseries",
            IoType::Features => "features",
            IoType::Raster => "raster",
        };
        f.write_str(s)
    }
}

/// One observation of a time series; `None` marks a gap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub time: DateTime<Utc>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, rename = "data")]
    pub points: Vec<TimePoint>,
}

impl TimeSeries {
    /// Values that are present, in time order
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().filter_map(|p| p.value)
    }
}

/// In-memory payload of a dataset file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataBody {
    Timeseries(TimeSeries),
    Features(::geojson::FeatureCollection),
}

/// Data read from a dataset file together with its side-channel metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetData {
    #[serde(default)]
    pub metadata: Metadata,
    pub body: DataBody,
}

impl DatasetData {
    pub fn timeseries(series: TimeSeries, metadata: Metadata) -> Self {
        Self {
            metadata,
            body: DataBody::Timeseries(series),
        }
    }

    pub fn features(collection: ::geojson::FeatureCollection, metadata: Metadata) -> Self {
        Self {
            metadata,
            body: DataBody::Features(collection),
        }
    }

    pub fn as_timeseries(&self) -> Option<&TimeSeries> {
        match &self.body {
            DataBody::Timeseries(series) => Some(series),
            DataBody::Features(_) => None,
        }
    }
}

/// Target representation of `open`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenFormat {
    /// The in-memory data structure
    #[default]
    Native,
    /// A JSON string
    Json,
}

impl FromStr for OpenFormat {
    type Err = QuestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "native" | "" => Ok(OpenFormat::Native),
            "json" => Ok(OpenFormat::Json),
            other => Err(QuestError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }
}

/// Result of `open`
#[derive(Debug, Clone, PartialEq)]
pub enum OpenedData {
    Native(DatasetData),
    Serialized(String),
}

/// Handler trait that every dataset file format implements
#[async_trait]
pub trait IoHandler: Send + Sync {
    /// Format name, matching `Dataset::file_format`
    fn name(&self) -> &str;

    fn iotype(&self) -> IoType;

    /// File extension including the dot, e.g. `.json`
    fn extension(&self) -> &str;

    async fn read(&self, path: &Path) -> Result<DatasetData>;

    /// Write data and its metadata to the same file
    async fn write(&self, path: &Path, data: &DatasetData) -> Result<()>;

    async fn open(&self, path: &Path, fmt: OpenFormat) -> Result<OpenedData> {
        let data = self.read(path).await?;
        match fmt {
            OpenFormat::Native => Ok(OpenedData::Native(data)),
            OpenFormat::Json => Ok(OpenedData::Serialized(serde_json::to_string_pretty(&data)?)),
        }
    }

    /// Render the file into `output_dir`, returning the written path
    async fn visualize(
        &self,
        path: &Path,
        output_dir: &Path,
        options: &Metadata,
    ) -> Result<PathBuf>;

    fn visualize_options(&self) -> OptionSchema {
        OptionSchema::new(format!("Visualize {}", self.name()))
    }
}

/// Central registry of I/O handlers keyed by format name
#[derive(Clone, Default)]
pub struct IoRegistry {
    handlers: BTreeMap<String, Arc<dyn IoHandler>>,
}

impl IoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handlers
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TimeSeriesJsonHandler));
        registry.register(Arc::new(GeoJsonHandler));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn IoHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, format: &str) -> Result<Arc<dyn IoHandler>> {
        self.handlers
            .get(format)
            .cloned()
            .ok_or_else(|| QuestError::UnsupportedFormat {
                format: format.to_string(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

impl fmt::Debug for IoRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoRegistry").field("handlers", &self.names()).finish()
    }
}

//! `geojson` handler
//!
//! Feature collections are stored as plain GeoJSON. Dataset metadata is kept
//! in a `quest_metadata` foreign member of the collection.

use async_trait::async_trait;
use geojson::{Feature, FeatureCollection, GeoJson};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::{DataBody, DatasetData, IoHandler, IoType};
use crate::error::{QuestError, Result};
use crate::fs::write_atomic;
use crate::models::Metadata;

pub const GEOJSON: &str = "geojson";

const METADATA_MEMBER: &str = "quest_metadata";

pub struct GeoJsonHandler;

impl GeoJsonHandler {
    fn parse(path: &Path, content: &str) -> Result<FeatureCollection> {
        let geojson: GeoJson = content.parse().map_err(|e| {
            QuestError::Serialization(format!("Failed to parse GeoJSON {}: {}", path.display(), e))
        })?;

        Ok(match geojson {
            GeoJson::FeatureCollection(collection) => collection,
            GeoJson::Feature(feature) => single(feature),
            GeoJson::Geometry(geometry) => single(Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            }),
        })
    }
}

fn single(feature: Feature) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: vec![feature],
        foreign_members: None,
    }
}

#[async_trait]
impl IoHandler for GeoJsonHandler {
    fn name(&self) -> &str {
        GEOJSON
    }

    fn iotype(&self) -> IoType {
        IoType::Features
    }

    fn extension(&self) -> &str {
        ".geojson"
    }

    async fn read(&self, path: &Path) -> Result<DatasetData> {
        let content = tokio::fs::read_to_string(path).await?;
        let mut collection = Self::parse(path, &content)?;

        let metadata = collection
            .foreign_members
            .as_mut()
            .and_then(|members| members.remove(METADATA_MEMBER))
            .and_then(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default();
        if collection.foreign_members.as_ref().is_some_and(|m| m.is_empty()) {
            collection.foreign_members = None;
        }

        Ok(DatasetData::features(collection, metadata))
    }

    async fn write(&self, path: &Path, data: &DatasetData) -> Result<()> {
        let mut collection = match &data.body {
            DataBody::Features(collection) => collection.clone(),
            DataBody::Timeseries(_) => {
                return Err(QuestError::NotSupported {
                    plugin: GEOJSON.to_string(),
                    operation: "writing time series".to_string(),
                })
            }
        };
        if !data.metadata.is_empty() {
            collection
                .foreign_members
                .get_or_insert_with(Default::default)
                .insert(METADATA_MEMBER.to_string(), Value::Object(data.metadata.clone()));
        }
        write_atomic(path, serde_json::to_string_pretty(&collection)?.as_bytes())
    }

    async fn visualize(
        &self,
        path: &Path,
        output_dir: &Path,
        _options: &Metadata,
    ) -> Result<PathBuf> {
        let data = self.read(path).await?;
        let DataBody::Features(collection) = data.body else {
            return Err(QuestError::Serialization(format!(
                "{} does not contain features",
                path.display()
            )));
        };

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("features");
        let output = output_dir.join(format!("{}_viz.geojson", stem));
        write_atomic(&output, serde_json::to_string(&collection)?.as_bytes())?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const POINTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [-97.7, 30.3]},
             "properties": {"name": "Austin"}}
        ]
    }"#;

    #[tokio::test]
    async fn test_read_plain_geojson() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.geojson");
        std::fs::write(&path, POINTS).unwrap();

        let data = GeoJsonHandler.read(&path).await.unwrap();
        assert!(data.metadata.is_empty());
        match data.body {
            DataBody::Features(collection) => assert_eq!(collection.features.len(), 1),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_metadata_survives_write() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("points.geojson");
        std::fs::write(&source, POINTS).unwrap();

        let mut data = GeoJsonHandler.read(&source).await.unwrap();
        data.metadata = json!({"source": "test"}).as_object().unwrap().clone();

        let target = dir.path().join("copy.geojson");
        GeoJsonHandler.write(&target, &data).await.unwrap();

        let reread = GeoJsonHandler.read(&target).await.unwrap();
        assert_eq!(reread, data);
    }

    #[tokio::test]
    async fn test_bare_geometry_becomes_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geom.geojson");
        std::fs::write(&path, r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#).unwrap();

        let data = GeoJsonHandler.read(&path).await.unwrap();
        match data.body {
            DataBody::Features(collection) => assert_eq!(collection.features.len(), 1),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_visualize_strips_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.geojson");
        std::fs::write(&path, POINTS).unwrap();

        let output = GeoJsonHandler
            .visualize(&path, dir.path(), &Metadata::new())
            .await
            .unwrap();
        let content = std::fs::read_to_string(output).unwrap();
        assert!(!content.contains(METADATA_MEMBER));
        assert!(content.contains("FeatureCollection"));
    }
}

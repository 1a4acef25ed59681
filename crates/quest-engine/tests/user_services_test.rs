//! Providers declared through USER_SERVICES manifests

use quest_core::config::{Settings, SettingsUpdate};
use quest_core::formats::{OpenFormat, OpenedData};
use quest_core::models::DatasetStatus;
use quest_engine::{DataRequest, PluginRegistry, Quest, SearchOptions};
use serial_test::serial;
use std::env;
use std::path::Path;
use tempfile::TempDir;

const MANIFEST: &str = r#"
name: gauges
metadata:
  display_name: Local gauges
  description: Hand-curated stream gauges
services:
  stations:
    metadata:
      display_name: Stations
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
      metadata:
        source: manual
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

const SERIES: &str = r#"{
  "metadata": {"station": "s1"},
  "parameter": "streamflow",
  "unit": "cfs",
  "data": [
    {"time": "2024-05-01T00:00:00Z", "value": 12.5},
    {"time": "2024-05-01T01:00:00Z", "value": null}
  ]
}"#;

fn write_services(root: &Path) {
    let stations = root.join("stations");
    std::fs::create_dir_all(stations.join("data")).unwrap();
    std::fs::write(root.join("quest.yml"), MANIFEST).unwrap();
    std::fs::write(stations.join("stations.geojson"), STATIONS).unwrap();
    std::fs::write(stations.join("data").join("s1.json"), SERIES).unwrap();
}

fn quest(base: &Path) -> Quest {
    Quest::builder()
        .settings(Settings::with_base_dir(base))
        .registry(PluginRegistry::with_builtin())
        .build()
}

#[tokio::test]
async fn test_user_provider_appears_after_reload() {
    let tmp = TempDir::new().unwrap();
    let services = tmp.path().join("services").join("gauges");
    write_services(&services);
    let quest = quest(&tmp.path().join("base"));

    assert!(quest.get_providers(false).await.is_empty());

    let change = quest
        .update_settings(SettingsUpdate {
            user_services: Some(vec![services.to_string_lossy().into_owned()]),
            ..Default::default()
        })
        .await;
    assert!(change.reload_providers);

    let providers = quest.get_providers(true).await;
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0].name, "user-gauges");
    assert_eq!(providers[0].metadata.display_name, "Local gauges");

    let found = quest
        .search_catalog(&["svc://user-gauges:stations"], &SearchOptions::default())
        .await
        .unwrap()
        .uris();
    assert_eq!(
        found,
        vec![
            "svc://user-gauges:stations/s1".to_string(),
            "svc://user-gauges:stations/s2".to_string(),
        ]
    );

    let colorado = quest
        .search_catalog(
            &["svc://user-gauges:stations"],
            &SearchOptions::default().filter("river", "Colorado"),
        )
        .await
        .unwrap();
    assert_eq!(colorado.len(), 1);
}

#[tokio::test]
async fn test_user_provider_download_copies_mapped_file() {
    let tmp = TempDir::new().unwrap();
    let services = tmp.path().join("services").join("gauges");
    write_services(&services);
    let quest = quest(&tmp.path().join("base"));
    quest
        .update_settings(SettingsUpdate {
            user_services: Some(vec![services.to_string_lossy().into_owned()]),
            ..Default::default()
        })
        .await;

    let datasets = quest
        .get_data(
            &DataRequest::new("svc://user-gauges:stations")
                .query("service_id == 's1'")
                .collection("local"),
        )
        .await
        .unwrap();
    assert_eq!(datasets.len(), 1);

    let dataset = quest.get_dataset(&datasets[0]).await.unwrap();
    assert_eq!(dataset.status, DatasetStatus::Downloaded);
    assert_eq!(dataset.file_format.as_deref(), Some("timeseries-json"));
    assert_eq!(dataset.parameter.as_deref(), Some("streamflow"));
    assert_eq!(dataset.metadata["source"], "manual");

    let OpenedData::Native(data) = quest
        .open_dataset(&dataset.name, OpenFormat::Native)
        .await
        .unwrap()
    else {
        panic!("expected native data");
    };
    assert_eq!(data.metadata["station"], "s1");
    assert_eq!(data.as_timeseries().unwrap().points.len(), 2);

    // s2 has no mapped file
    let missing = quest
        .get_data(
            &DataRequest::new("svc://user-gauges:stations")
                .query("service_id == 's2'")
                .collection("local"),
        )
        .await
        .unwrap();
    let failed = quest.get_dataset(&missing[0]).await.unwrap();
    assert_eq!(failed.status, DatasetStatus::FailedDownload);
}

#[tokio::test]
#[serial]
async fn test_user_services_from_environment() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("services");
    write_services(&root.join("gauges"));

    env::set_var("QUEST_USER_SERVICES", format!("{}/*", root.display()));
    let settings = Settings::with_base_dir(tmp.path().join("base")).load_from_env();
    env::remove_var("QUEST_USER_SERVICES");

    let quest = Quest::builder()
        .settings(settings)
        .registry(PluginRegistry::with_builtin())
        .build();
    let names: Vec<String> = quest
        .get_providers(false)
        .await
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["user-gauges".to_string()]);

    let services = quest.get_services(&Default::default()).await.unwrap();
    assert_eq!(services[0].uri, "svc://user-gauges:stations");
}

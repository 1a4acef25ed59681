//! Reshape raw provider rows into catalog entries
//!
//! Every provider result passes through here. Geometry inputs (`bbox`,
//! `latitude`/`longitude`, `geometry`) become one WKT geometry, reserved
//! columns are filled in and every other column is folded into `metadata`.

use quest_core::error::{QuestError, Result};
use quest_core::models::{
    merge_metadata, CatalogEntry, ParameterListing, ServiceInfo, RESERVED_CATALOG_FIELDS,
};
use quest_core::ports::CatalogRow;
use quest_core::uri::ServiceUri;
use quest_geo::{bbox_polygon, geometry_from_value, parse_bbox, point, to_wkt};
use serde_json::Value;

/// Columns consumed while deriving the geometry
pub const GEOMETRY_INPUTS: &[&str] = &["bbox", "latitude", "longitude"];

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn present<'a>(row: &'a CatalogRow, key: &str) -> Option<&'a Value> {
    row.get(key).filter(|v| !v.is_null())
}

fn derive_geometry(row: &CatalogRow) -> Result<Option<String>> {
    if let Some(bbox) = present(row, "bbox") {
        let polygon = bbox_polygon(parse_bbox(bbox)?);
        return Ok(Some(to_wkt(&geo::Geometry::Polygon(polygon))));
    }

    if let (Some(lat), Some(lon)) = (present(row, "latitude"), present(row, "longitude")) {
        let (Some(lat), Some(lon)) = (as_f64(lat), as_f64(lon)) else {
            return Err(QuestError::invalid_options(
                "geometry",
                format!("latitude/longitude must be numbers, got {} / {}", lat, lon),
            ));
        };
        return Ok(Some(to_wkt(&geo::Geometry::Point(point(lon, lat)))));
    }

    match present(row, "geometry") {
        Some(geometry) => Ok(Some(to_wkt(&geometry_from_value(geometry)?))),
        None => Ok(None),
    }
}

fn row_parameters(row: &CatalogRow) -> Vec<String> {
    match row.get("parameters") {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items.iter().filter_map(as_text).collect(),
        _ => Vec::new(),
    }
}

/// Normalize one raw row of `service`
pub fn normalize_row(
    service: &ServiceUri,
    info: &ServiceInfo,
    mut row: CatalogRow,
    listing: &ParameterListing,
) -> Result<CatalogEntry> {
    let service_id = present(&row, "service_id").and_then(as_text).ok_or_else(|| {
        QuestError::provider(
            &service.provider,
            format!("{} returned a catalog row without service_id", service.service_uri()),
        )
    })?;

    let mut entry = CatalogEntry::new(service, &service_id);
    entry.geometry = derive_geometry(&row).map_err(|e| {
        QuestError::provider(&service.provider, format!("entry {}: {}", service_id, e))
    })?;

    if let Some(display_name) = present(&row, "display_name").and_then(as_text) {
        entry.display_name = display_name;
    }
    if let Some(description) = present(&row, "description").and_then(as_text) {
        entry.description = description;
    }
    entry.publisher_id = present(&row, "publisher_id").and_then(as_text);

    let advertised = listing.for_entry(&service_id);
    let raw = if advertised.is_empty() {
        row_parameters(&row)
    } else {
        advertised.to_vec()
    };
    let mut parameters: Vec<&str> = raw.iter().map(|p| info.normalize_parameter(p)).collect();
    parameters.dedup();
    entry.parameters = parameters.join(",");

    if let Some(Value::Object(metadata)) = row.remove("metadata") {
        merge_metadata(&mut entry.metadata, &metadata);
    }
    for (key, value) in row {
        if RESERVED_CATALOG_FIELDS.contains(&key.as_str())
            || GEOMETRY_INPUTS.contains(&key.as_str())
        {
            continue;
        }
        entry.metadata.insert(key, value);
    }

    Ok(entry)
}

/// Normalize all rows of `service`, sorted by entry URI
pub fn normalize_rows(
    service: &ServiceUri,
    info: &ServiceInfo,
    rows: Vec<CatalogRow>,
    listing: &ParameterListing,
) -> Result<Vec<CatalogEntry>> {
    let mut entries = rows
        .into_iter()
        .map(|row| normalize_row(service, info, row, listing))
        .collect::<Result<Vec<_>>>()?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries.dedup_by(|a, b| a.name == b.name);
    Ok(entries)
}

/// Ids of the rows, for per-entry parameter lookups
pub fn row_ids(rows: &[CatalogRow]) -> Vec<String> {
    rows.iter()
        .filter_map(|row| present(row, "service_id").and_then(as_text))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quest_core::models::ServiceType;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn service() -> (ServiceUri, ServiceInfo) {
        (
            ServiceUri::new("usgs-nwis", "iv"),
            ServiceInfo::new("iv", ServiceType::GeoDiscrete, "timeseries")
                .with_parameter_code("00060", "streamflow"),
        )
    }

    fn row(value: Value) -> CatalogRow {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_reserved_columns_are_populated() {
        let (uri, info) = service();
        let entry = normalize_row(
            &uri,
            &info,
            row(json!({
                "service_id": "08158000",
                "latitude": 30.24,
                "longitude": -97.69,
                "state": "TX"
            })),
            &ParameterListing::Flat(vec!["00060".to_string()]),
        )
        .unwrap();

        assert_eq!(entry.name, "svc://usgs-nwis:iv/08158000");
        assert_eq!(entry.service, "svc://usgs-nwis:iv");
        assert_eq!(entry.service_id, "08158000");
        assert_eq!(entry.display_name, "08158000");
        assert_eq!(entry.description, "");
        assert_eq!(entry.parameters, "streamflow");
        assert!(entry.geometry.as_deref().unwrap().starts_with("POINT"));
        assert_eq!(entry.metadata, row(json!({"state": "TX"})));
    }

    #[test]
    fn test_bbox_becomes_polygon() {
        let (uri, info) = service();
        let entry = normalize_row(
            &uri,
            &info,
            row(json!({"service_id": 12, "bbox": [-98.0, 30.0, -97.0, 31.0]})),
            &ParameterListing::Flat(vec![]),
        )
        .unwrap();
        assert_eq!(entry.service_id, "12");
        assert!(entry.geometry.as_deref().unwrap().starts_with("POLYGON"));
        assert!(entry.metadata.is_empty());
    }

    #[test]
    fn test_geotypical_entry_has_no_geometry() {
        let (uri, info) = service();
        let entry = normalize_row(
            &uri,
            &info,
            row(json!({
                "service_id": "huc-12",
                "display_name": "Upper basin",
                "parameters": ["00060", "precip"],
                "metadata": {"source": {"agency": "usgs"}},
                "name": "ignored",
                "reserved": {"x": 1}
            })),
            &ParameterListing::PerEntry(BTreeMap::new()),
        )
        .unwrap();

        assert_eq!(entry.geometry, None);
        assert_eq!(entry.display_name, "Upper basin");
        assert_eq!(entry.parameters, "streamflow,precip");
        assert_eq!(entry.name, "svc://usgs-nwis:iv/huc-12");
        assert_eq!(entry.metadata, row(json!({"source": {"agency": "usgs"}})));
    }

    #[test]
    fn test_row_without_id_is_a_provider_error() {
        let (uri, info) = service();
        let listing = ParameterListing::Flat(vec![]);
        let err = normalize_row(&uri, &info, row(json!({"state": "TX"})), &listing).unwrap_err();
        assert!(matches!(err, QuestError::Provider { .. }));
    }

    #[test]
    fn test_rows_are_sorted_and_deduplicated() {
        let (uri, info) = service();
        let rows = vec![
            row(json!({"service_id": "b"})),
            row(json!({"service_id": "a"})),
            row(json!({"service_id": "b"})),
        ];
        assert_eq!(row_ids(&rows), vec!["b", "a", "b"]);
        let entries = normalize_rows(&uri, &info, rows, &ParameterListing::Flat(vec![])).unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.service_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}

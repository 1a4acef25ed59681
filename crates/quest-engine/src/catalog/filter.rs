//! Attribute, spatial and free-text filters over catalog entries

use quest_core::error::{QuestError, Result};
use quest_core::models::{CatalogEntry, Metadata};
use quest_geo::{intersects_bbox, parse_bbox, parse_wkt, geometry_type_name, BBox};
use serde_json::Value;
use tracing::debug;

use super::tags::display_value;

/// One parsed filter
#[derive(Debug, Clone)]
enum Filter {
    BBox(BBox),
    GeomType(String),
    Parameter(String),
    DisplayName(String),
    Description(String),
    SearchTerms(Vec<String>),
    Metadata { path: String, value: Value },
}

fn text_filter(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(QuestError::invalid_options(
            "filters",
            format!("'{}' expects a string, got {}", key, other),
        )),
    }
}

fn parse_filters(filters: &Metadata) -> Result<Vec<Filter>> {
    let mut parsed = Vec::new();
    for (key, value) in filters {
        if value.is_null() {
            continue;
        }
        let filter = match key.as_str() {
            "bbox" => Filter::BBox(parse_bbox(value)?),
            "geom_type" => Filter::GeomType(text_filter(key, value)?.to_lowercase()),
            "parameter" => Filter::Parameter(text_filter(key, value)?),
            "display_name" => Filter::DisplayName(text_filter(key, value)?),
            "description" => Filter::Description(text_filter(key, value)?),
            "search_terms" => Filter::SearchTerms(match value {
                Value::Array(items) => items
                    .iter()
                    .map(|v| text_filter(key, v).map(|t| t.to_lowercase()))
                    .collect::<Result<Vec<_>>>()?,
                other => vec![text_filter(key, other)?.to_lowercase()],
            }),
            _ => Filter::Metadata {
                path: key.clone(),
                value: value.clone(),
            },
        };
        parsed.push(filter);
    }
    Ok(parsed)
}

/// All columns of an entry, stringified, for free-text matching
fn searchable_text(entry: &CatalogEntry) -> Vec<String> {
    entry
        .to_row()
        .values()
        .filter(|v| !v.is_null())
        .map(|v| display_value(v).to_lowercase())
        .collect()
}

fn matches(filter: &Filter, entry: &CatalogEntry) -> bool {
    match filter {
        Filter::BBox(bbox) => entry
            .geometry
            .as_deref()
            .and_then(|wkt| parse_wkt(wkt).ok())
            .is_some_and(|geometry| intersects_bbox(&geometry, *bbox)),
        Filter::GeomType(wanted) => entry
            .geometry
            .as_deref()
            .and_then(|wkt| parse_wkt(wkt).ok())
            .is_some_and(|geometry| {
                geometry_type_name(&geometry)
                    .to_lowercase()
                    .contains(wanted.as_str())
            }),
        Filter::Parameter(wanted) => entry.parameters.contains(wanted.as_str()),
        Filter::DisplayName(wanted) => entry.display_name.contains(wanted.as_str()),
        Filter::Description(wanted) => entry.description.contains(wanted.as_str()),
        Filter::SearchTerms(terms) => {
            let text = searchable_text(entry);
            terms
                .iter()
                .any(|term| text.iter().any(|column| column.contains(term.as_str())))
        }
        Filter::Metadata { path, value } => entry
            .metadata_path(path)
            .is_some_and(|found| found == value || display_value(found) == display_value(value)),
    }
}

/// Keep the entries that pass every filter
pub fn apply_filters(entries: Vec<CatalogEntry>, filters: &Metadata) -> Result<Vec<CatalogEntry>> {
    let parsed = parse_filters(filters)?;
    if parsed.is_empty() {
        return Ok(entries);
    }

    let before = entries.len();
    let kept: Vec<CatalogEntry> = entries
        .into_iter()
        .filter(|entry| parsed.iter().all(|filter| matches(filter, entry)))
        .collect();
    debug!(before, after = kept.len(), "Applied catalog filters");
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quest_core::uri::ServiceUri;
    use serde_json::json;

    fn entries() -> Vec<CatalogEntry> {
        let service = ServiceUri::new("usgs-nwis", "iv");

        let mut austin = CatalogEntry::new(&service, "08158000");
        austin.display_name = "Colorado Rv at Austin".to_string();
        austin.geometry = Some("POINT(-97.69 30.24)".to_string());
        austin.parameters = "streamflow,gage_height".to_string();
        austin.metadata = json!({"state": "TX", "site": {"huc": "12090205"}})
            .as_object()
            .unwrap()
            .clone();

        let mut tulsa = CatalogEntry::new(&service, "07164500");
        tulsa.display_name = "Arkansas Rv at Tulsa".to_string();
        tulsa.geometry = Some("POINT(-95.98 36.14)".to_string());
        tulsa.parameters = "streamflow".to_string();
        tulsa.metadata = json!({"state": "OK", "drainage_area": 74615})
            .as_object()
            .unwrap()
            .clone();

        let mut basin = CatalogEntry::new(&service, "huc");
        basin.description = "Whole basin".to_string();

        vec![austin, tulsa, basin]
    }

    fn filters(value: Value) -> Metadata {
        value.as_object().unwrap().clone()
    }

    fn ids(entries: &[CatalogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.service_id.as_str()).collect()
    }

    #[test]
    fn test_bbox_filter_drops_geotypical_entries() {
        let bbox = filters(json!({"bbox": [-98.2, 30.0, -97.4, 30.6]}));
        let kept = apply_filters(entries(), &bbox).unwrap();
        assert_eq!(ids(&kept), vec!["08158000"]);
    }

    #[test]
    fn test_substring_filters() {
        let kept = apply_filters(entries(), &filters(json!({"parameter": "gage"}))).unwrap();
        assert_eq!(ids(&kept), vec!["08158000"]);

        let kept = apply_filters(entries(), &filters(json!({"geom_type": "point"}))).unwrap();
        assert_eq!(kept.len(), 2);

        let kept = apply_filters(entries(), &filters(json!({"description": "basin"}))).unwrap();
        assert_eq!(ids(&kept), vec!["huc"]);
    }

    #[test]
    fn test_search_terms_match_any_column() {
        let terms = filters(json!({"search_terms": ["tulsa", "12090205"]}));
        let kept = apply_filters(entries(), &terms).unwrap();
        assert_eq!(ids(&kept), vec!["08158000", "07164500"]);
    }

    #[test]
    fn test_metadata_path_filters() {
        let kept = apply_filters(entries(), &filters(json!({"site:huc": "12090205"}))).unwrap();
        assert_eq!(ids(&kept), vec!["08158000"]);

        let kept = apply_filters(entries(), &filters(json!({"drainage_area": "74615"}))).unwrap();
        assert_eq!(ids(&kept), vec!["07164500"]);
    }

    #[test]
    fn test_null_filters_are_ignored_and_bad_bbox_rejected() {
        assert_eq!(apply_filters(entries(), &filters(json!({"bbox": null}))).unwrap().len(), 3);
        assert!(apply_filters(entries(), &filters(json!({"bbox": [1, 2]}))).is_err());
    }
}

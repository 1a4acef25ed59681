use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::intersects::Intersects;
use geo::{coord, Geometry, Point, Polygon, Rect};
use quest_core::error::{QuestError, Result};
use serde_json::Value;
use wkt::{ToWkt, TryFromWkt};

/// Bounding box `[xmin, ymin, xmax, ymax]` in degrees
pub type BBox = [f64; 4];

/// Parse a bounding box from a JSON array of four numbers or a comma-separated string
pub fn parse_bbox(value: &Value) -> Result<BBox> {
    let numbers: Vec<f64> = match value {
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| invalid_bbox(value))?,
        Value::String(s) => s
            .split(',')
            .map(|part| part.trim().parse::<f64>().ok())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| invalid_bbox(value))?,
        _ => return Err(invalid_bbox(value)),
    };

    match numbers.as_slice() {
        [xmin, ymin, xmax, ymax] if xmin <= xmax && ymin <= ymax => {
            Ok([*xmin, *ymin, *xmax, *ymax])
        }
        _ => Err(invalid_bbox(value)),
    }
}

fn invalid_bbox(value: &Value) -> QuestError {
    QuestError::invalid_options(
        "bbox",
        format!("expected [xmin, ymin, xmax, ymax] with min <= max, got {}", value),
    )
}

/// Polygon covering a bounding box
pub fn bbox_polygon(bbox: BBox) -> Polygon<f64> {
    let [xmin, ymin, xmax, ymax] = bbox;
    Rect::new(coord! { x: xmin, y: ymin }, coord! { x: xmax, y: ymax }).to_polygon()
}

pub fn point(longitude: f64, latitude: f64) -> Point<f64> {
    Point::new(longitude, latitude)
}

pub fn to_wkt(geometry: &Geometry<f64>) -> String {
    geometry.wkt_string()
}

pub fn parse_wkt(text: &str) -> Result<Geometry<f64>> {
    Geometry::<f64>::try_from_wkt_str(text).map_err(|e| {
        QuestError::invalid_options("geometry", format!("invalid WKT '{}': {}", text, e))
    })
}

/// Geometry from a WKT string or a GeoJSON geometry object
pub fn geometry_from_value(value: &Value) -> Result<Geometry<f64>> {
    match value {
        Value::String(text) => parse_wkt(text),
        Value::Object(_) => {
            let geometry = geojson::Geometry::from_json_value(value.clone()).map_err(|e| {
                QuestError::invalid_options("geometry", format!("invalid GeoJSON geometry: {}", e))
            })?;
            Geometry::<f64>::try_from(geometry).map_err(|e| {
                QuestError::invalid_options(
                    "geometry",
                    format!("unsupported GeoJSON geometry: {}", e),
                )
            })
        }
        other => Err(QuestError::invalid_options(
            "geometry",
            format!("expected WKT or GeoJSON, got {}", other),
        )),
    }
}

/// OGC name of a geometry's type, e.g. `Point` or `MultiPolygon`
pub fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "LineString",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Polygon",
        Geometry::Triangle(_) => "Polygon",
    }
}

/// Whether a geometry intersects a bounding box
pub fn intersects_bbox(geometry: &Geometry<f64>, bbox: BBox) -> bool {
    let filter = bbox_polygon(bbox);

    // Cheap rejection on the envelopes first
    if let Some(rect) = geometry.bounding_rect() {
        let [xmin, ymin, xmax, ymax] = bbox;
        let x_overlap = rect.min().x <= xmax && rect.max().x >= xmin;
        let y_overlap = rect.min().y <= ymax && rect.max().y >= ymin;
        if !(x_overlap && y_overlap) {
            return false;
        }
    }

    geometry.intersects(&filter)
}

pub fn to_geojson_geometry(geometry: &Geometry<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(geometry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bbox() {
        assert_eq!(
            parse_bbox(&json!([-98.2, 30.0, -97.4, 30.6])).unwrap(),
            [-98.2, 30.0, -97.4, 30.6]
        );
        assert_eq!(parse_bbox(&json!("-98.2, 30, -97.4, 30.6")).unwrap()[1], 30.0);
        assert!(parse_bbox(&json!([1, 2, 3])).is_err());
        assert!(parse_bbox(&json!([5, 0, 1, 1])).is_err());
        assert!(parse_bbox(&json!({"xmin": 0})).is_err());
    }

    #[test]
    fn test_bbox_polygon_to_wkt() {
        let polygon = Geometry::Polygon(bbox_polygon([0.0, 0.0, 1.0, 2.0]));
        let text = to_wkt(&polygon);
        assert!(text.starts_with("POLYGON"));

        let parsed = parse_wkt(&text).unwrap();
        assert_eq!(geometry_type_name(&parsed), "Polygon");
    }

    #[test]
    fn test_point_round_trip() {
        let geometry = Geometry::Point(point(-97.7, 30.3));
        let parsed = parse_wkt(&to_wkt(&geometry)).unwrap();
        assert_eq!(parsed, geometry);
    }

    #[test]
    fn test_invalid_wkt() {
        assert!(parse_wkt("POINT (1").is_err());
    }

    #[test]
    fn test_geometry_from_value() {
        let from_wkt = geometry_from_value(&json!("POINT(1 2)")).unwrap();
        let from_geojson =
            geometry_from_value(&json!({"type": "Point", "coordinates": [1.0, 2.0]})).unwrap();
        assert_eq!(from_wkt, from_geojson);
        assert!(geometry_from_value(&json!(42)).is_err());
    }

    #[test]
    fn test_intersects_bbox() {
        let inside = Geometry::Point(point(-97.7, 30.3));
        let outside = Geometry::Point(point(-90.0, 30.3));
        let bbox = [-98.2, 30.0, -97.4, 30.6];

        assert!(intersects_bbox(&inside, bbox));
        assert!(!intersects_bbox(&outside, bbox));

        let overlapping = Geometry::Polygon(bbox_polygon([-97.5, 30.5, -96.0, 31.0]));
        assert!(intersects_bbox(&overlapping, bbox));
    }

    #[test]
    fn test_to_geojson() {
        let geometry = Geometry::Point(point(1.0, 2.0));
        let geojson = to_geojson_geometry(&geometry);
        let value = serde_json::to_value(&geojson).unwrap();
        assert_eq!(value["type"], "Point");
        assert_eq!(value["coordinates"], json!([1.0, 2.0]));
    }
}

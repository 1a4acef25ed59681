//! Quest Geo - Geometry helpers for catalog entries
//!
//! Catalog entries carry their geometry as WKT. This crate converts provider
//! geometry inputs (bounding boxes, coordinates, GeoJSON) to WKT and evaluates
//! the spatial predicates used by catalog filters.

pub mod spatial;

pub use spatial::{
    bbox_polygon, geometry_from_value, geometry_type_name, intersects_bbox, parse_bbox,
    parse_wkt, point, to_geojson_geometry, to_wkt, BBox,
};

//! Modules d'export (Shapefile, CSV, GeoJSON)

pub mod csv;
pub mod geojson;
pub mod shp;

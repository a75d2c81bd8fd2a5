//! Lecture des Shapefiles (.shp/.dbf/.prj)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geo::{Contains, Coord, Geometry, LineString, MultiLineString, MultiPolygon, Point, Polygon};
use shapefile::dbase::FieldValue;
use shapefile::{PolygonRing, Shape};
use tracing::{debug, warn};

use crate::types::{Crs, RawFeature, RawLayer};
use crate::LossError;

/// Lit un Shapefile et son `.prj` éventuel
pub fn read(path: &Path) -> Result<RawLayer, LossError> {
    let mut reader = shapefile::Reader::from_path(path).map_err(|source| LossError::Shapefile {
        path: path.display().to_string(),
        source,
    })?;

    let mut features = Vec::new();
    for (index, item) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = item.map_err(|source| LossError::Shapefile {
            path: path.display().to_string(),
            source,
        })?;

        let mut properties = BTreeMap::new();
        for (name, value) in record {
            properties.insert(name, field_to_string(value));
        }

        features.push(RawFeature {
            id: index.to_string(),
            geometry: shape_to_geometry(shape),
            properties,
        });
    }

    let crs = read_prj(path)?;
    debug!(
        path = %path.display(),
        features = features.len(),
        crs = ?crs.as_ref().map(|c| c.to_string()),
        "Shapefile loaded"
    );

    Ok(RawLayer { features, crs })
}

/// Chemin du `.prj` associé (minuscule ou majuscule)
pub fn prj_path(path: &Path) -> Option<PathBuf> {
    ["prj", "PRJ"]
        .iter()
        .map(|ext| path.with_extension(ext))
        .find(|candidate| candidate.exists())
}

fn read_prj(path: &Path) -> Result<Option<Crs>, LossError> {
    let Some(prj) = prj_path(path) else {
        return Ok(None);
    };
    let content = std::fs::read_to_string(&prj)?;
    Ok(Crs::parse(&content))
}

/// Convertit une valeur DBF en texte (les valeurs nulles deviennent "")
fn field_to_string(value: FieldValue) -> String {
    match value {
        FieldValue::Character(s) => s.map(|s| s.trim().to_string()).unwrap_or_default(),
        FieldValue::Numeric(n) => n.map(|n| n.to_string()).unwrap_or_default(),
        FieldValue::Float(f) => f.map(|f| f.to_string()).unwrap_or_default(),
        FieldValue::Logical(b) => b.map(|b| b.to_string()).unwrap_or_default(),
        FieldValue::Integer(i) => i.to_string(),
        FieldValue::Double(d) => d.to_string(),
        FieldValue::Memo(m) => m,
        other => format!("{:?}", other),
    }
}

/// Accès aux coordonnées planes des différents types de points
trait PlanarPoint {
    fn coord(&self) -> Coord;
}

impl PlanarPoint for shapefile::Point {
    fn coord(&self) -> Coord {
        Coord {
            x: self.x,
            y: self.y,
        }
    }
}

impl PlanarPoint for shapefile::PointM {
    fn coord(&self) -> Coord {
        Coord {
            x: self.x,
            y: self.y,
        }
    }
}

impl PlanarPoint for shapefile::PointZ {
    fn coord(&self) -> Coord {
        Coord {
            x: self.x,
            y: self.y,
        }
    }
}

fn to_line<P: PlanarPoint>(points: &[P]) -> LineString {
    LineString::new(points.iter().map(PlanarPoint::coord).collect())
}

/// Convertit une forme Shapefile en géométrie (Z et M ignorés)
fn shape_to_geometry(shape: Shape) -> Option<Geometry> {
    match shape {
        Shape::NullShape => None,
        Shape::Polygon(p) => rings_to_geometry(p.rings()),
        Shape::PolygonM(p) => rings_to_geometry(p.rings()),
        Shape::PolygonZ(p) => rings_to_geometry(p.rings()),
        Shape::Polyline(l) => parts_to_geometry(l.parts()),
        Shape::PolylineM(l) => parts_to_geometry(l.parts()),
        Shape::PolylineZ(l) => parts_to_geometry(l.parts()),
        Shape::Point(p) => Some(Geometry::Point(Point::from(p.coord()))),
        Shape::PointM(p) => Some(Geometry::Point(Point::from(p.coord()))),
        Shape::PointZ(p) => Some(Geometry::Point(Point::from(p.coord()))),
        other => {
            warn!(shape_type = ?other.shapetype(), "Unsupported shape type, treated as null");
            None
        }
    }
}

fn parts_to_geometry<P: PlanarPoint>(parts: &[Vec<P>]) -> Option<Geometry> {
    let mut lines: Vec<LineString> = parts.iter().map(|part| to_line(part)).collect();
    match lines.len() {
        0 => None,
        1 => lines.pop().map(Geometry::LineString),
        _ => Some(Geometry::MultiLineString(MultiLineString::new(lines))),
    }
}

fn rings_to_geometry<P: PlanarPoint>(rings: &[PolygonRing<P>]) -> Option<Geometry> {
    let mut outers = Vec::new();
    let mut inners = Vec::new();
    for ring in rings {
        match ring {
            PolygonRing::Outer(points) => outers.push(to_line(points)),
            PolygonRing::Inner(points) => inners.push(to_line(points)),
        }
    }

    let mut polygons = organize_rings(outers, inners);
    match polygons.len() {
        0 => None,
        1 => polygons.pop().map(Geometry::Polygon),
        _ => Some(Geometry::MultiPolygon(MultiPolygon::new(polygons))),
    }
}

/// Rattache chaque trou à l'anneau extérieur qui contient son premier point
///
/// Un trou orphelin est rattaché au dernier anneau extérieur lu; sans aucun
/// anneau extérieur, les trous deviennent des anneaux extérieurs (fichier mal
/// orienté).
fn organize_rings(outers: Vec<LineString>, inners: Vec<LineString>) -> Vec<Polygon> {
    if outers.is_empty() {
        return inners
            .into_iter()
            .map(|ring| Polygon::new(ring, vec![]))
            .collect();
    }

    let shells: Vec<Polygon> = outers
        .iter()
        .map(|ring| Polygon::new(ring.clone(), vec![]))
        .collect();
    let mut holes: Vec<Vec<LineString>> = vec![Vec::new(); outers.len()];

    for inner in inners {
        let owner = inner
            .0
            .first()
            .and_then(|first| {
                let point = Point::from(*first);
                shells.iter().position(|shell| shell.contains(&point))
            })
            .unwrap_or(outers.len() - 1);
        holes[owner].push(inner);
    }

    outers
        .into_iter()
        .zip(holes)
        .map(|(outer, holes)| Polygon::new(outer, holes))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    fn square(x0: f64, y0: f64, size: f64) -> LineString {
        LineString::from(vec![
            (x0, y0),
            (x0 + size, y0),
            (x0 + size, y0 + size),
            (x0, y0 + size),
            (x0, y0),
        ])
    }

    #[test]
    fn test_organize_rings_assigns_hole() {
        let polygons = organize_rings(
            vec![square(0.0, 0.0, 10.0), square(100.0, 0.0, 10.0)],
            vec![square(102.0, 2.0, 2.0)],
        );
        assert_eq!(polygons.len(), 2);
        assert!(polygons[0].interiors().is_empty());
        assert_eq!(polygons[1].interiors().len(), 1);
        assert!((polygons[1].unsigned_area() - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_organize_rings_without_outer() {
        let polygons = organize_rings(vec![], vec![square(0.0, 0.0, 1.0)]);
        assert_eq!(polygons.len(), 1);
    }

    #[test]
    fn test_field_to_string() {
        assert_eq!(
            field_to_string(FieldValue::Character(Some(" Good ".to_string()))),
            "Good"
        );
        assert_eq!(field_to_string(FieldValue::Character(None)), "");
        assert_eq!(field_to_string(FieldValue::Numeric(Some(3.0))), "3");
    }

    #[test]
    fn test_null_shape() {
        assert!(shape_to_geometry(Shape::NullShape).is_none());
    }
}

//! Conversion des lignes fermées (ou presque) en polygones

use geo::{Area, Coord, Geometry, LineString, MultiLineString, MultiPolygon, Polygon, Validation};

/// Tente de convertir une géométrie linéaire en polygone
///
/// Les géométries non linéaires et les lignes inutilisables sont retournées
/// inchangées; elles seront écartées plus tard par le filtre de type.
pub fn force_polygon(geometry: Geometry) -> Geometry {
    match geometry {
        Geometry::LineString(line) => match line_to_polygon(&line) {
            Some(polygon) => Geometry::Polygon(polygon),
            None => Geometry::LineString(line),
        },
        Geometry::MultiLineString(lines) => match lines_to_multipolygon(&lines) {
            Some(multi) => Geometry::MultiPolygon(multi),
            None => Geometry::MultiLineString(lines),
        },
        other => other,
    }
}

fn line_to_polygon(line: &LineString) -> Option<Polygon> {
    close_ring(line.0.clone())
}

/// Ferme l'anneau si nécessaire et retourne le polygone s'il est valide
///
/// Il faut au moins 3 sommets, et 4 points une fois l'anneau fermé. Un
/// anneau de surface nulle (sommets alignés) est rejeté.
pub(crate) fn close_ring(mut coords: Vec<Coord>) -> Option<Polygon> {
    if coords.len() < 3 {
        return None;
    }
    if coords.first() != coords.last() {
        coords.push(coords[0]);
    }
    if coords.len() < 4 {
        return None;
    }

    let polygon = Polygon::new(LineString::new(coords), vec![]);
    (polygon.is_valid() && polygon.unsigned_area() > 0.0).then_some(polygon)
}

fn lines_to_multipolygon(lines: &MultiLineString) -> Option<MultiPolygon> {
    let polygons: Vec<Polygon> = lines.0.iter().filter_map(line_to_polygon).collect();
    if polygons.is_empty() {
        return None;
    }

    let multi = MultiPolygon::new(polygons);
    (multi.is_valid() && multi.unsigned_area() > 0.0).then_some(multi)
}

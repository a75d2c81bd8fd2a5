//! Réparation des polygones invalides (auto-union et reconstruction par anneau)

use geo::{BooleanOps, Geometry, LineString, MultiPolygon, Polygon};

/// Auto-union d'une géométrie surfacique
///
/// Équivalent d'un tampon de largeur nulle: les auto-intersections sont
/// résolues et l'orientation des anneaux est normalisée. Retourne `None`
/// pour les géométries non surfaciques.
pub fn self_union(geometry: &Geometry) -> Option<MultiPolygon> {
    let empty = MultiPolygon::<f64>::new(vec![]);
    match geometry {
        Geometry::Polygon(polygon) => Some(MultiPolygon::new(vec![polygon.clone()]).union(&empty)),
        Geometry::MultiPolygon(multi) => Some(multi.union(&empty)),
        _ => None,
    }
}

/// Reconstruit une géométrie surfacique invalide
///
/// Chaque anneau est traité comme un polygone autonome puis réparé. Les
/// anneaux extérieurs sont fusionnés et les trous soustraits du résultat.
pub fn make_valid(geometry: &Geometry) -> Option<MultiPolygon> {
    let polygons: Vec<&Polygon> = match geometry {
        Geometry::Polygon(polygon) => vec![polygon],
        Geometry::MultiPolygon(multi) => multi.0.iter().collect(),
        _ => return None,
    };

    let mut shells = MultiPolygon::new(vec![]);
    let mut holes = MultiPolygon::new(vec![]);

    for polygon in polygons {
        shells = shells.union(&heal_ring(polygon.exterior()));
        for interior in polygon.interiors() {
            holes = holes.union(&heal_ring(interior));
        }
    }

    if holes.0.is_empty() {
        Some(shells)
    } else {
        Some(shells.difference(&holes))
    }
}

fn heal_ring(ring: &LineString) -> MultiPolygon {
    MultiPolygon::new(vec![Polygon::new(ring.clone(), vec![])]).union(&MultiPolygon::new(vec![]))
}

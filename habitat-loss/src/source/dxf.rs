//! Conversion des dessins DXF (polylignes fermées) en polygones
//!
//! Seules les entités `LWPOLYLINE` et `POLYLINE` de l'espace objet sont
//! considérées, sans descendre dans les blocs. Les lignes, arcs, textes et
//! insertions sont ignorés sans erreur.

use std::collections::BTreeMap;
use std::path::Path;

use dxf::entities::{Entity, EntityType};
use dxf::Drawing;
use geo::{Coord, Geometry};
use tracing::{debug, warn};

use crate::repair::coerce::close_ring;
use crate::types::{Crs, RawFeature, RawLayer};
use crate::LossError;

/// Charge un fichier DXF et le convertit en couche de polygones
pub fn read(path: &Path, crs: &Crs) -> Result<RawLayer, LossError> {
    let drawing = Drawing::load_file(path).map_err(|source| LossError::Dxf {
        path: path.display().to_string(),
        source,
    })?;

    convert(&drawing, crs).map_err(|reason| LossError::Conversion {
        path: path.display().to_string(),
        reason,
    })
}

/// Convertit les polylignes d'un dessin en polygones valides
///
/// Retourne un message d'erreur si aucun polygone valide n'est produit.
pub fn convert(drawing: &Drawing, crs: &Crs) -> Result<RawLayer, String> {
    let mut features = Vec::new();
    let mut polylines = 0usize;
    let mut rejected = 0usize;

    for entity in drawing.entities() {
        if entity.common.is_in_paper_space {
            continue;
        }
        let Some(vertices) = polyline_vertices(entity) else {
            continue;
        };
        polylines += 1;

        match close_ring(vertices) {
            Some(polygon) => {
                let mut properties = BTreeMap::new();
                properties.insert("layer".to_string(), entity.common.layer.clone());
                features.push(RawFeature {
                    id: features.len().to_string(),
                    geometry: Some(Geometry::Polygon(polygon)),
                    properties,
                });
            }
            None => {
                rejected += 1;
                debug!(layer = %entity.common.layer, "Polyline discarded (degenerate or self-intersecting)");
            }
        }
    }

    if features.is_empty() {
        return Err(format!(
            "no valid polyline geometries found ({} polylines, {} rejected)",
            polylines, rejected
        ));
    }

    if rejected > 0 {
        warn!(rejected, kept = features.len(), "Some DXF polylines could not be converted");
    }

    Ok(RawLayer {
        features,
        crs: Some(crs.clone()),
    })
}

/// Sommets 2D d'une polyligne, `None` pour les autres entités
fn polyline_vertices(entity: &Entity) -> Option<Vec<Coord>> {
    match &entity.specific {
        EntityType::LwPolyline(lw) => Some(
            lw.vertices
                .iter()
                .map(|v| Coord { x: v.x, y: v.y })
                .collect(),
        ),
        EntityType::Polyline(pl) => Some(
            pl.vertices()
                .map(|v| Coord {
                    x: v.location.x,
                    y: v.location.y,
                })
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxf::entities::{Line, LwPolyline};
    use dxf::LwPolylineVertex;
    use geo::Area;

    fn lw_polyline(points: &[(f64, f64)]) -> Entity {
        let mut lw = LwPolyline::default();
        for &(x, y) in points {
            lw.vertices.push(LwPolylineVertex {
                x,
                y,
                ..Default::default()
            });
        }
        Entity::new(EntityType::LwPolyline(lw))
    }

    #[test]
    fn test_convert_closes_open_polylines() {
        let mut drawing = Drawing::new();
        drawing.add_entity(lw_polyline(&[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0), (0.0, 100.0)]));

        let layer = convert(&drawing, &Crs::from_epsg(31370)).unwrap();
        assert_eq!(layer.features.len(), 1);
        assert_eq!(layer.crs, Some(Crs::from_epsg(31370)));

        let Some(Geometry::Polygon(polygon)) = &layer.features[0].geometry else {
            panic!("Expected polygon");
        };
        assert!((polygon.unsigned_area() - 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_convert_ignores_other_entities() {
        let mut drawing = Drawing::new();
        drawing.add_entity(Entity::new(EntityType::Line(Line::default())));
        drawing.add_entity(lw_polyline(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]));

        let layer = convert(&drawing, &Crs::from_epsg(31370)).unwrap();
        assert_eq!(layer.features.len(), 1);
    }

    #[test]
    fn test_convert_rejects_bow_tie() {
        let mut drawing = Drawing::new();
        drawing.add_entity(lw_polyline(&[(0.0, 0.0), (10.0, 10.0), (10.0, 0.0), (0.0, 10.0)]));

        let result = convert(&drawing, &Crs::from_epsg(31370));
        assert!(result.is_err());
    }

    #[test]
    fn test_convert_rejects_collinear_polyline() {
        let mut drawing = Drawing::new();
        drawing.add_entity(lw_polyline(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0)]));

        let err = convert(&drawing, &Crs::from_epsg(31370)).unwrap_err();
        assert!(err.contains("no valid polyline"));
    }

    #[test]
    fn test_convert_empty_drawing() {
        let drawing = Drawing::new();
        let err = convert(&drawing, &Crs::from_epsg(31370)).unwrap_err();
        assert!(err.contains("no valid polyline"));
    }

    #[test]
    fn test_convert_skips_short_polylines() {
        let mut drawing = Drawing::new();
        drawing.add_entity(lw_polyline(&[(0.0, 0.0), (10.0, 0.0)]));
        drawing.add_entity(lw_polyline(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]));

        let layer = convert(&drawing, &Crs::from_epsg(31370)).unwrap();
        assert_eq!(layer.features.len(), 1);
    }
}

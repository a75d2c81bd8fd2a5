//! Intersection des habitats et de l'emprise, calcul des pertes

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use geo::{Area, BooleanOps, BoundingRect, HasDimensions, MultiPolygon};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use tracing::debug;

use crate::scoring::HabitatFeature;
use crate::settings::round_to;
use crate::types::DevelopmentFeature;
use crate::LossError;

/// m² par hectare
pub const SQUARE_METRES_PER_HECTARE: f64 = 10_000.0;

type Envelope = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Portion d'habitat perdue sous l'emprise d'aménagement
#[derive(Debug, Clone)]
pub struct IntersectionFeature {
    pub habitat_id: String,
    pub development_id: String,
    pub geometry: MultiPolygon,
    pub broad_habitat: String,
    pub condition: String,
    pub distinctiveness: String,
    pub condition_score: Option<f64>,
    pub distinctiveness_score: Option<f64>,
    pub significance_score: f64,
    /// Surface non arrondie de l'intersection (m²)
    pub area_m2: f64,
    /// Surface perdue arrondie (ha)
    pub loss_area_ha: f64,
    /// `None` si l'un des scores est inconnu
    pub biodiversity_units: Option<f64>,
    pub properties: BTreeMap<String, String>,
}

/// Unités de biodiversité d'une surface perdue
///
/// `None` si l'état ou la distinctivité n'a pas de score.
pub fn biodiversity_units(
    loss_area_ha: f64,
    condition: Option<f64>,
    distinctiveness: Option<f64>,
    significance: f64,
    precision: u32,
) -> Option<f64> {
    let condition = condition?;
    let distinctiveness = distinctiveness?;
    Some(round_to(
        loss_area_ha * condition * significance * distinctiveness,
        precision,
    ))
}

fn envelope(geometry: &MultiPolygon, index: usize) -> Option<Envelope> {
    let rect = geometry.bounding_rect()?;
    Some(GeomWithData::new(
        Rectangle::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
        index,
    ))
}

/// Intersecte chaque habitat avec chaque feature de l'emprise
///
/// Les paires dont les emprises sont disjointes sont écartées via un R-tree.
/// Les résultats suivent l'ordre des habitats puis celui de l'emprise. Les
/// intersections sans surface (points, lignes) sont ignorées.
pub fn intersect(
    habitats: &[HabitatFeature],
    development: &[DevelopmentFeature],
    precision: u32,
) -> Result<Vec<IntersectionFeature>, LossError> {
    let tree = RTree::bulk_load(
        development
            .iter()
            .enumerate()
            .filter_map(|(i, f)| envelope(&f.geometry, i))
            .collect(),
    );

    let mut results = Vec::new();
    let mut candidates_checked = 0usize;

    for habitat in habitats {
        let Some(rect) = habitat.geometry.bounding_rect() else {
            continue;
        };
        let query = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);

        let mut candidates: Vec<usize> = tree
            .locate_in_envelope_intersecting(&query)
            .map(|item| item.data)
            .collect();
        candidates.sort_unstable();

        for index in candidates {
            candidates_checked += 1;
            let dev = &development[index];

            let shared = catch_unwind(AssertUnwindSafe(|| habitat.geometry.intersection(&dev.geometry)))
                .map_err(|_| {
                    LossError::geometry(
                        &habitat.id,
                        format!("intersection with development feature {} failed", dev.id),
                    )
                })?;

            if shared.is_empty() {
                continue;
            }
            let area_m2 = shared.unsigned_area();
            if area_m2 <= 0.0 {
                continue;
            }

            let loss_area_ha = round_to(area_m2 / SQUARE_METRES_PER_HECTARE, precision);
            let units = biodiversity_units(
                loss_area_ha,
                habitat.condition_score,
                habitat.distinctiveness_score,
                habitat.significance_score,
                precision,
            );

            results.push(IntersectionFeature {
                habitat_id: habitat.id.clone(),
                development_id: dev.id.clone(),
                geometry: shared,
                broad_habitat: habitat.broad_habitat.clone(),
                condition: habitat.condition.clone(),
                distinctiveness: habitat.distinctiveness.clone(),
                condition_score: habitat.condition_score,
                distinctiveness_score: habitat.distinctiveness_score,
                significance_score: habitat.significance_score,
                area_m2,
                loss_area_ha,
                biodiversity_units: units,
                properties: habitat.properties.clone(),
            });
        }
    }

    debug!(
        habitats = habitats.len(),
        development = development.len(),
        candidates_checked,
        intersections = results.len(),
        "Overlay computed"
    );

    if results.is_empty() {
        return Err(LossError::NoOverlap);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
        ]])
    }

    fn habitat(id: &str, geometry: MultiPolygon, condition: Option<f64>, distinctiveness: Option<f64>) -> HabitatFeature {
        HabitatFeature {
            id: id.to_string(),
            area_m2: geometry.unsigned_area(),
            geometry,
            broad_habitat: "Grassland".to_string(),
            condition: "Good".to_string(),
            distinctiveness: "High".to_string(),
            condition_score: condition,
            distinctiveness_score: distinctiveness,
            significance_score: 1.0,
            properties: BTreeMap::new(),
        }
    }

    fn development(id: &str, geometry: MultiPolygon) -> DevelopmentFeature {
        DevelopmentFeature {
            id: id.to_string(),
            geometry,
        }
    }

    #[test]
    fn test_two_hectares_good_high() {
        // 200 m x 100 m = 2 ha entièrement couverts
        let habitats = vec![habitat("h1", rect(0.0, 0.0, 200.0, 100.0), Some(3.0), Some(6.0))];
        let dev = vec![development("d1", rect(-10.0, -10.0, 210.0, 110.0))];

        let results = intersect(&habitats, &dev, 2).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].loss_area_ha, 2.0);
        assert_eq!(results[0].biodiversity_units, Some(36.0));
        assert_eq!(results[0].habitat_id, "h1");
        assert_eq!(results[0].development_id, "d1");
    }

    #[test]
    fn test_null_score_gives_null_units() {
        let habitats = vec![habitat("h1", rect(0.0, 0.0, 100.0, 100.0), None, Some(6.0))];
        let dev = vec![development("d1", rect(0.0, 0.0, 50.0, 100.0))];

        let results = intersect(&habitats, &dev, 2).unwrap();
        assert_eq!(results[0].loss_area_ha, 0.5);
        assert_eq!(results[0].biodiversity_units, None);
    }

    #[test]
    fn test_touching_polygons_are_no_overlap() {
        // Bord commun: intersection de dimension 1
        let habitats = vec![habitat("h1", rect(0.0, 0.0, 100.0, 100.0), Some(3.0), Some(6.0))];
        let dev = vec![development("d1", rect(100.0, 0.0, 200.0, 100.0))];

        assert!(matches!(intersect(&habitats, &dev, 2), Err(LossError::NoOverlap)));
    }

    #[test]
    fn test_disjoint_is_no_overlap() {
        let habitats = vec![habitat("h1", rect(0.0, 0.0, 100.0, 100.0), Some(3.0), Some(6.0))];
        let dev = vec![development("d1", rect(500.0, 500.0, 600.0, 600.0))];

        assert!(matches!(intersect(&habitats, &dev, 2), Err(LossError::NoOverlap)));
    }

    #[test]
    fn test_output_order_follows_inputs() {
        let habitats = vec![
            habitat("h1", rect(0.0, 0.0, 100.0, 100.0), Some(3.0), Some(6.0)),
            habitat("h2", rect(100.0, 0.0, 200.0, 100.0), Some(2.0), Some(4.0)),
        ];
        let dev = vec![
            development("d2", rect(150.0, 0.0, 200.0, 100.0)),
            development("d1", rect(50.0, 0.0, 150.0, 100.0)),
        ];

        let results = intersect(&habitats, &dev, 2).unwrap();
        let pairs: Vec<(&str, &str)> = results
            .iter()
            .map(|r| (r.habitat_id.as_str(), r.development_id.as_str()))
            .collect();
        assert_eq!(pairs, vec![("h1", "d1"), ("h2", "d2"), ("h2", "d1")]);
    }

    #[test]
    fn test_units_use_rounded_area() {
        // 123.456 m² → 0.01 ha (précision 2)
        let habitats = vec![habitat("h1", rect(0.0, 0.0, 123.456, 1.0), Some(3.0), Some(8.0))];
        let dev = vec![development("d1", rect(0.0, 0.0, 200.0, 1.0))];

        let results = intersect(&habitats, &dev, 2).unwrap();
        assert_eq!(results[0].loss_area_ha, 0.01);
        assert_eq!(results[0].biodiversity_units, Some(0.24));
    }

    #[test]
    fn test_biodiversity_units_formula() {
        assert_eq!(biodiversity_units(2.0, Some(3.0), Some(6.0), 1.0, 2), Some(36.0));
        assert_eq!(biodiversity_units(1.5, Some(2.5), Some(4.0), 1.1, 2), Some(16.5));
        assert_eq!(biodiversity_units(1.0, Some(3.0), None, 1.0, 2), None);
        assert_eq!(biodiversity_units(1.0, Some(3.0), Some(0.0), 1.0, 2), Some(0.0));
    }
}

//! Réparation des géométries brutes
//!
//! Chaque étape est indépendante: en cas d'erreur (ou de panique dans les
//! opérations booléennes), l'étape est ignorée et la géométrie précédente est
//! conservée.

pub mod coerce;
pub mod heal;

use std::panic::{catch_unwind, AssertUnwindSafe};

use geo::{Geometry, HasDimensions, Validation};
use serde::Serialize;
use tracing::{debug, warn};

use crate::types::{Feature, RawFeature, Role};
use crate::LossError;

/// Compteurs de réparation d'une couche
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairStats {
    /// Features lues
    pub input: usize,
    /// Features sans géométrie (ou géométrie vide) écartées avant réparation
    pub dropped_null: usize,
    /// Géométries surfaciques auto-unies
    pub self_unioned: usize,
    /// Géométries encore invalides reconstruites
    pub made_valid: usize,
    /// Lignes converties en polygones
    pub coerced: usize,
    /// Étapes ignorées suite à une erreur
    pub step_failures: usize,
    /// Features vides après réparation
    pub dropped_after_repair: usize,
    /// Features conservées
    pub output: usize,
}

/// Répare les géométries d'une couche
///
/// Retourne une erreur de données si la couche ne contient aucune géométrie,
/// avant ou après réparation.
pub fn repair_features(
    features: Vec<RawFeature>,
    role: Role,
) -> Result<(Vec<Feature>, RepairStats), LossError> {
    let mut stats = RepairStats {
        input: features.len(),
        ..Default::default()
    };

    let present: Vec<(String, Geometry, _)> = features
        .into_iter()
        .filter_map(|feature| match feature.geometry {
            Some(geometry) if !geometry.is_empty() => {
                Some((feature.id, geometry, feature.properties))
            }
            _ => {
                stats.dropped_null += 1;
                None
            }
        })
        .collect();

    if present.is_empty() {
        return Err(LossError::data(role.label(), "no valid geometries found"));
    }

    let mut repaired = Vec::with_capacity(present.len());
    for (id, geometry, properties) in present {
        let geometry = repair_geometry(&id, geometry, &mut stats);
        if geometry.is_empty() {
            stats.dropped_after_repair += 1;
            continue;
        }
        repaired.push(Feature {
            id,
            geometry,
            properties,
        });
    }

    if repaired.is_empty() {
        return Err(LossError::data(
            role.label(),
            "no valid geometries found after repair",
        ));
    }

    stats.output = repaired.len();
    debug!(role = %role, ?stats, "Geometries repaired");
    if stats.step_failures > 0 {
        warn!(role = %role, failures = stats.step_failures, "Some repair steps were skipped");
    }

    Ok((repaired, stats))
}

/// Applique les étapes de réparation à une géométrie
fn repair_geometry(id: &str, geometry: Geometry, stats: &mut RepairStats) -> Geometry {
    let mut geometry = geometry;

    if let Some(healed) = run_step("self-union", id, &geometry, stats, |g| {
        Ok(heal::self_union(g).map(Geometry::MultiPolygon))
    }) {
        stats.self_unioned += 1;
        geometry = healed;
    }

    if !geometry.is_valid() {
        if let Some(fixed) = run_step("make-valid", id, &geometry, stats, |g| {
            match heal::make_valid(g) {
                Some(multi) if multi.is_empty() => {
                    Err(LossError::geometry(id, "make valid produced an empty geometry"))
                }
                other => Ok(other.map(Geometry::MultiPolygon)),
            }
        }) {
            stats.made_valid += 1;
            geometry = fixed;
        }
    }

    if matches!(geometry, Geometry::LineString(_) | Geometry::MultiLineString(_)) {
        if let Some(coerced) = run_step("force-polygon", id, &geometry, stats, |g| {
            let result = coerce::force_polygon(g.clone());
            Ok(is_polygonal(&result).then_some(result))
        }) {
            stats.coerced += 1;
            geometry = coerced;
        }
    }

    geometry
}

/// Exécute une étape en interceptant erreurs et paniques
///
/// `Ok(None)` signifie que l'étape ne s'applique pas à cette géométrie.
fn run_step<F>(
    step: &'static str,
    id: &str,
    geometry: &Geometry,
    stats: &mut RepairStats,
    f: F,
) -> Option<Geometry>
where
    F: FnOnce(&Geometry) -> Result<Option<Geometry>, LossError>,
{
    match catch_unwind(AssertUnwindSafe(|| f(geometry))) {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            stats.step_failures += 1;
            warn!(step, feature_id = %id, error = %e, "Repair step failed, keeping previous geometry");
            None
        }
        Err(_) => {
            stats.step_failures += 1;
            warn!(step, feature_id = %id, "Repair step panicked, keeping previous geometry");
            None
        }
    }
}

fn is_polygonal(geometry: &Geometry) -> bool {
    matches!(geometry, Geometry::Polygon(_) | Geometry::MultiPolygon(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area, LineString, MultiPolygon, Point};
    use std::collections::BTreeMap;

    fn raw(id: &str, geometry: Option<Geometry>) -> RawFeature {
        RawFeature {
            id: id.to_string(),
            geometry,
            properties: BTreeMap::new(),
        }
    }

    fn square(size: f64) -> Geometry {
        Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: size, y: 0.0),
            (x: size, y: size),
            (x: 0.0, y: size),
        ])
    }

    #[test]
    fn test_repair_drops_null_and_empty() {
        let features = vec![
            raw("0", None),
            raw("1", Some(square(10.0))),
            raw("2", Some(Geometry::MultiPolygon(MultiPolygon::new(vec![])))),
        ];

        let (repaired, stats) = repair_features(features, Role::Baseline).unwrap();
        assert_eq!(repaired.len(), 1);
        assert_eq!(repaired[0].id, "1");
        assert_eq!(stats.dropped_null, 2);
        assert_eq!(stats.output, 1);
        assert!(repaired.iter().all(|f| !f.geometry.is_empty()));
    }

    #[test]
    fn test_repair_all_null_is_data_error() {
        let result = repair_features(vec![raw("0", None)], Role::Development);
        match result {
            Err(LossError::Data { layer, reason }) => {
                assert_eq!(layer, "development");
                assert!(reason.contains("no valid geometries"));
            }
            other => panic!("Expected Data error, got {:?}", other),
        }
    }

    #[test]
    fn test_repair_empty_input_is_data_error() {
        assert!(repair_features(vec![], Role::Baseline).is_err());
    }

    #[test]
    fn test_repair_heals_bow_tie() {
        let bow_tie = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 10.0),
        ]);

        let (repaired, stats) = repair_features(vec![raw("0", Some(bow_tie))], Role::Baseline).unwrap();
        assert_eq!(stats.self_unioned, 1);
        assert!(repaired[0].geometry.is_valid());
        assert!((repaired[0].geometry.unsigned_area() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_repair_coerces_lines() {
        let line = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (0.0, 3.0)]));
        let (repaired, stats) = repair_features(vec![raw("0", Some(line))], Role::Development).unwrap();
        assert_eq!(stats.coerced, 1);
        assert!(matches!(repaired[0].geometry, Geometry::Polygon(_)));
    }

    #[test]
    fn test_repair_keeps_points_for_later_filtering() {
        let point = Geometry::Point(Point::new(1.0, 1.0));
        let (repaired, _) = repair_features(vec![raw("0", Some(point))], Role::Baseline).unwrap();
        assert!(matches!(repaired[0].geometry, Geometry::Point(_)));
    }

    #[test]
    fn test_run_step_recovers_from_panic() {
        let mut stats = RepairStats::default();
        let geometry = square(1.0);
        let result = run_step("boom", "0", &geometry, &mut stats, |_| panic!("boom"));
        assert!(result.is_none());
        assert_eq!(stats.step_failures, 1);
    }

    #[test]
    fn test_run_step_recovers_from_error() {
        let mut stats = RepairStats::default();
        let geometry = square(1.0);
        let result = run_step("fail", "0", &geometry, &mut stats, |_| {
            Err(LossError::geometry("0", "failed"))
        });
        assert!(result.is_none());
        assert_eq!(stats.step_failures, 1);
    }
}

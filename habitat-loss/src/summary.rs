//! Agrégation des résultats d'un calcul

use serde::Serialize;

use crate::overlay::{IntersectionFeature, SQUARE_METRES_PER_HECTARE};
use crate::scoring::HabitatFeature;
use crate::settings::round_to;

/// Totaux d'un calcul
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Surface totale des habitats retenus (ha), indépendante du recouvrement
    pub total_baseline_area_ha: f64,
    pub total_loss_area_ha: f64,
    /// Somme des unités, les valeurs nulles comptant pour zéro
    pub total_biodiversity_units: f64,
    pub feature_count: usize,
    /// Intersections dont les unités sont nulles (score inconnu)
    pub null_units_count: usize,
}

impl RunSummary {
    /// Calcule les totaux à partir des habitats et des intersections
    pub fn compute(
        habitats: &[HabitatFeature],
        intersections: &[IntersectionFeature],
        precision: u32,
    ) -> Self {
        let baseline_m2: f64 = habitats.iter().map(|h| h.area_m2).sum();
        let loss_ha: f64 = intersections.iter().map(|f| f.loss_area_ha).sum();
        let units: f64 = intersections
            .iter()
            .filter_map(|f| f.biodiversity_units)
            .sum();

        Self {
            total_baseline_area_ha: round_to(baseline_m2 / SQUARE_METRES_PER_HECTARE, precision),
            total_loss_area_ha: round_to(loss_ha, precision),
            total_biodiversity_units: round_to(units, precision),
            feature_count: intersections.len(),
            null_units_count: intersections
                .iter()
                .filter(|f| f.biodiversity_units.is_none())
                .count(),
        }
    }

    /// Vrai si aucun total n'est renseigné (calcul sans recouvrement)
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Les `n` premières intersections, dans l'ordre de production
pub fn preview(features: &[IntersectionFeature], n: usize) -> &[IntersectionFeature] {
    &features[..n.min(features.len())]
}

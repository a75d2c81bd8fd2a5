//! Harmonisation des SCR des deux couches et contrôle de cohérence spatiale

pub mod reproject;

use geo::{BoundingRect, Coord, Rect};
use tracing::{debug, info};

use crate::types::{Crs, Layer};
use crate::LossError;

pub use reproject::Reprojector;

/// Couches exprimées dans un même SCR projeté
#[derive(Debug, Clone)]
pub struct Harmonized {
    pub baseline: Layer,
    pub development: Layer,
    pub crs: Crs,
}

/// Ramène les deux couches dans le SCR de la couche de référence
///
/// - référence sans SCR: le SCR par défaut lui est assigné (sans reprojection)
/// - référence géographique: reprojetée vers le SCR par défaut
/// - emprise sans SCR: le SCR d'origine de la référence lui est assigné, puis
///   elle suit la même reprojection
/// - emprise dans un autre SCR: reprojetée vers le SCR cible
pub fn harmonize(
    mut baseline: Layer,
    mut development: Layer,
    default: &Crs,
) -> Result<Harmonized, LossError> {
    let source = match baseline.crs.take() {
        Some(crs) => crs,
        None => {
            info!(crs = %default, "Baseline has no CRS, assigning default");
            default.clone()
        }
    };
    let target = if source.is_geographic() {
        info!(from = %source, to = %default, "Baseline CRS is geographic, reprojecting");
        reproject_layer(&mut baseline, &source, default)?;
        default.clone()
    } else {
        source.clone()
    };
    baseline.crs = Some(target.clone());

    let development_crs = match development.crs.take() {
        Some(crs) => crs,
        None => {
            info!(crs = %source, "Development has no CRS, assigning baseline CRS");
            source
        }
    };
    if development_crs != target {
        info!(from = %development_crs, to = %target, "Reprojecting development layer");
        reproject_layer(&mut development, &development_crs, &target)?;
    }
    development.crs = Some(target.clone());

    ensure_same_crs(&baseline, &development)?;

    Ok(Harmonized {
        baseline,
        development,
        crs: target,
    })
}

fn reproject_layer(layer: &mut Layer, from: &Crs, to: &Crs) -> Result<(), LossError> {
    let reprojector = Reprojector::new(from, to)?;
    for feature in &mut layer.features {
        feature.geometry = reprojector.transform_geometry(&feature.geometry)?;
    }
    debug!(features = layer.features.len(), from = %from, to = %to, "Layer reprojected");
    Ok(())
}

/// Vérifie que les deux couches partagent un SCR identique
pub fn ensure_same_crs(baseline: &Layer, development: &Layer) -> Result<(), LossError> {
    let describe = |crs: &Option<Crs>| {
        crs.as_ref()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "undefined".to_string())
    };

    match (&baseline.crs, &development.crs) {
        (Some(a), Some(b)) if a == b => Ok(()),
        _ => Err(LossError::CrsMismatch {
            baseline: describe(&baseline.crs),
            development: describe(&development.crs),
        }),
    }
}

/// Emprise combinée des géométries d'une couche
pub fn layer_extent(layer: &Layer) -> Option<Rect> {
    layer
        .features
        .iter()
        .filter_map(|f| f.geometry.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        })
}

/// Compare les centres des emprises des deux couches
///
/// Échoue si l'écart dépasse `threshold` sur l'un des deux axes. Un écart
/// égal au seuil est accepté.
pub fn check_spatial_alignment(
    baseline: &Layer,
    development: &Layer,
    threshold: f64,
) -> Result<(), LossError> {
    let (Some(a), Some(b)) = (layer_extent(baseline), layer_extent(development)) else {
        return Ok(());
    };

    let (ca, cb) = (a.center(), b.center());
    let dx = (ca.x - cb.x).abs();
    let dy = (ca.y - cb.y).abs();
    debug!(dx, dy, threshold, "Layer centre offset");

    if dx > threshold || dy > threshold {
        return Err(LossError::SpatialMismatch {
            baseline_x: ca.x,
            baseline_y: ca.y,
            development_x: cb.x,
            development_y: cb.y,
            distance: dx.max(dy),
            threshold,
        });
    }

    Ok(())
}

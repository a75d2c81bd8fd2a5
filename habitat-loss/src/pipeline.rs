//! Enchaînement complet d'un calcul de perte

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::crs::{check_spatial_alignment, harmonize};
use crate::overlay::{intersect, IntersectionFeature, SQUARE_METRES_PER_HECTARE};
use crate::repair::{repair_features, RepairStats};
use crate::scoring::{HabitatFeature, HabitatScorer, MappingReport};
use crate::settings::{round_to, Settings};
use crate::source::{read_layer, SourceFormat};
use crate::summary::{preview, RunSummary};
use crate::types::{into_polygonal, Crs, DevelopmentFeature, Layer, PolygonFeature, RawLayer, Role};
use crate::LossError;

/// Paramètres d'un calcul
///
/// Construit pour chaque exécution, aucun état n'est partagé entre deux calculs.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub settings: Settings,
    /// Multiplicateur de significance stratégique (constant sur le calcul)
    pub significance: f64,
    pub baseline: PathBuf,
    pub development: PathBuf,
}

impl RunContext {
    pub fn new(
        baseline: impl Into<PathBuf>,
        development: impl Into<PathBuf>,
        significance: f64,
        settings: Settings,
    ) -> Self {
        Self {
            settings,
            significance,
            baseline: baseline.into(),
            development: development.into(),
        }
    }
}

/// Résultat d'un calcul avec recouvrement
#[derive(Debug, Clone)]
pub struct RunResult {
    pub crs: Crs,
    pub habitats: Vec<HabitatFeature>,
    pub intersections: Vec<IntersectionFeature>,
    pub summary: RunSummary,
    pub mapping: MappingReport,
    pub baseline_repair: RepairStats,
    pub development_repair: RepairStats,
}

impl RunResult {
    /// Premières intersections, dans l'ordre de production
    pub fn preview(&self, n: usize) -> &[IntersectionFeature] {
        preview(&self.intersections, n)
    }
}

/// Calcul valide sans aucun recouvrement entre les deux couches
#[derive(Debug, Clone)]
pub struct NoOverlap {
    pub crs: Crs,
    /// Totaux, tous nuls
    pub summary: RunSummary,
    /// Surface des habitats retenus (ha), pour information
    pub baseline_area_ha: f64,
    pub mapping: MappingReport,
    pub baseline_repair: RepairStats,
    pub development_repair: RepairStats,
}

/// Issue d'un calcul
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Scored(RunResult),
    NoOverlap(NoOverlap),
}

impl RunOutcome {
    pub fn summary(&self) -> &RunSummary {
        match self {
            RunOutcome::Scored(result) => &result.summary,
            RunOutcome::NoOverlap(empty) => &empty.summary,
        }
    }

    pub fn mapping(&self) -> &MappingReport {
        match self {
            RunOutcome::Scored(result) => &result.mapping,
            RunOutcome::NoOverlap(empty) => &empty.mapping,
        }
    }

    pub fn crs(&self) -> &Crs {
        match self {
            RunOutcome::Scored(result) => &result.crs,
            RunOutcome::NoOverlap(empty) => &empty.crs,
        }
    }
}

/// Vérifie la significance stratégique (nombre fini strictement positif)
pub fn validate_significance(significance: f64) -> Result<(), LossError> {
    if significance.is_finite() && significance > 0.0 {
        Ok(())
    } else {
        Err(LossError::InvalidSignificance(significance))
    }
}

/// Lit les deux couches et exécute le calcul
///
/// Les formats des deux fichiers sont vérifiés avant toute lecture.
pub fn run(ctx: &RunContext) -> Result<RunOutcome, LossError> {
    validate_significance(ctx.significance)?;
    let default_crs = ctx.settings.validate()?;

    SourceFormat::for_role(&ctx.baseline, Role::Baseline)?;
    SourceFormat::for_role(&ctx.development, Role::Development)?;

    info!(path = %ctx.baseline.display(), "Loading baseline layer");
    let baseline = read_layer(&ctx.baseline, Role::Baseline, &default_crs)?;
    info!(path = %ctx.development.display(), "Loading development layer");
    let development = read_layer(&ctx.development, Role::Development, &default_crs)?;

    run_layers(baseline, development, ctx.significance, &ctx.settings)
}

/// Exécute le calcul sur deux couches déjà chargées
pub fn run_layers(
    baseline: RawLayer,
    development: RawLayer,
    significance: f64,
    settings: &Settings,
) -> Result<RunOutcome, LossError> {
    validate_significance(significance)?;
    let default_crs = settings.validate()?;

    let (baseline_features, baseline_repair) = repair_features(baseline.features, Role::Baseline)?;
    let (development_features, development_repair) =
        repair_features(development.features, Role::Development)?;

    let harmonized = harmonize(
        Layer {
            features: baseline_features,
            crs: baseline.crs,
        },
        Layer {
            features: development_features,
            crs: development.crs,
        },
        &default_crs,
    )?;
    check_spatial_alignment(
        &harmonized.baseline,
        &harmonized.development,
        settings.spatial_mismatch_threshold,
    )?;
    info!(crs = %harmonized.crs, "Layers harmonized");

    let crs = harmonized.crs;
    let baseline_polygons = polygon_features(harmonized.baseline, Role::Baseline)?;
    let development_polygons: Vec<DevelopmentFeature> =
        polygon_features(harmonized.development, Role::Development)?
            .into_iter()
            .map(DevelopmentFeature::from)
            .collect();

    let scorer = HabitatScorer::from_settings(settings);
    let (habitats, mapping) = scorer.score(baseline_polygons, significance)?;

    match intersect(&habitats, &development_polygons, settings.precision) {
        Ok(intersections) => {
            let summary = RunSummary::compute(&habitats, &intersections, settings.precision);
            info!(
                features = summary.feature_count,
                loss_ha = summary.total_loss_area_ha,
                units = summary.total_biodiversity_units,
                "Biodiversity loss computed"
            );
            Ok(RunOutcome::Scored(RunResult {
                crs,
                habitats,
                intersections,
                summary,
                mapping,
                baseline_repair,
                development_repair,
            }))
        }
        Err(LossError::NoOverlap) => {
            warn!("No overlap between baseline and development layers");
            let baseline_m2: f64 = habitats.iter().map(|h| h.area_m2).sum();
            Ok(RunOutcome::NoOverlap(NoOverlap {
                crs,
                summary: RunSummary::default(),
                baseline_area_ha: round_to(baseline_m2 / SQUARE_METRES_PER_HECTARE, settings.precision),
                mapping,
                baseline_repair,
                development_repair,
            }))
        }
        Err(e) => Err(e),
    }
}

/// Garde uniquement les géométries surfaciques
fn polygon_features(layer: Layer, role: Role) -> Result<Vec<PolygonFeature>, LossError> {
    let total = layer.features.len();
    let polygons: Vec<PolygonFeature> = layer
        .features
        .into_iter()
        .filter_map(|feature| {
            into_polygonal(feature.geometry).map(|geometry| PolygonFeature {
                id: feature.id,
                geometry,
                properties: feature.properties,
            })
        })
        .collect();

    if polygons.len() < total {
        debug!(role = %role, dropped = total - polygons.len(), "Non-polygonal geometries dropped");
    }
    if polygons.is_empty() {
        return Err(LossError::data(role.label(), "no polygon geometries found"));
    }
    Ok(polygons)
}

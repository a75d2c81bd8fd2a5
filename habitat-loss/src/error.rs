//! Types d'erreurs pour le crate habitat-loss

use thiserror::Error;

/// Erreurs pouvant survenir pendant un calcul de perte de biodiversité
#[derive(Debug, Error)]
pub enum LossError {
    /// Erreur d'I/O lors de la lecture d'une couche
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Extension de fichier non acceptée pour ce rôle
    #[error("Unsupported format for {role} layer: '{extension}' (expected {expected})")]
    UnsupportedFormat {
        role: &'static str,
        extension: String,
        expected: &'static str,
    },

    /// Aucune géométrie exploitable
    #[error("Data error in {layer} layer: {reason}")]
    Data { layer: &'static str, reason: String },

    /// Colonnes attributaires obligatoires absentes
    #[error("Required columns missing from baseline layer: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// Conversion DAO → polygones sans résultat
    #[error("DXF conversion failed for {path}: {reason}")]
    Conversion { path: String, reason: String },

    /// Les deux couches ne partagent pas le même SCR
    #[error("CRS mismatch: baseline is {baseline}, development is {development}")]
    CrsMismatch {
        baseline: String,
        development: String,
    },

    /// Les deux couches couvrent des zones différentes
    #[error(
        "Spatial mismatch: baseline centre ({baseline_x:.0}, {baseline_y:.0}) and development \
         centre ({development_x:.0}, {development_y:.0}) are {distance:.0} map units apart \
         (threshold {threshold:.0})"
    )]
    SpatialMismatch {
        baseline_x: f64,
        baseline_y: f64,
        development_x: f64,
        development_y: f64,
        distance: f64,
        threshold: f64,
    },

    /// Aucun recouvrement entre les deux couches
    #[error("No overlap between baseline and development layers")]
    NoOverlap,

    /// Reprojection impossible
    #[error("Reprojection from {from} to {to} failed: {reason}")]
    Reprojection {
        from: String,
        to: String,
        reason: String,
    },

    /// Significance stratégique invalide
    #[error("Strategic significance must be a positive number, got {0}")]
    InvalidSignificance(f64),

    /// Paramètres de calcul invalides
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Erreur de lecture shapefile
    #[error("Shapefile error in {path}: {source}")]
    Shapefile {
        path: String,
        #[source]
        source: shapefile::Error,
    },

    /// Erreur de lecture DXF
    #[error("DXF error in {path}: {source}")]
    Dxf {
        path: String,
        #[source]
        source: dxf::DxfError,
    },

    /// Erreur de lecture GeoPackage
    #[error("GeoPackage error in {path}: {source}")]
    GeoPackage {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Géométrie illisible
    #[error("Invalid geometry for {feature_id}: {reason}")]
    Geometry { feature_id: String, reason: String },
}

impl LossError {
    /// Crée une erreur de données avec contexte
    pub fn data(layer: &'static str, reason: impl Into<String>) -> Self {
        Self::Data {
            layer,
            reason: reason.into(),
        }
    }

    /// Crée une erreur de géométrie illisible
    pub fn geometry(feature_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Geometry {
            feature_id: feature_id.into(),
            reason: reason.into(),
        }
    }

    /// Vrai pour les erreurs que l'utilisateur corrige en choisissant d'autres fichiers
    pub fn is_input_mismatch(&self) -> bool {
        matches!(
            self,
            Self::CrsMismatch { .. } | Self::SpatialMismatch { .. } | Self::UnsupportedFormat { .. }
        )
    }
}

//! Paramètres d'un calcul (SCR par défaut, seuils, tables de correspondance)

use serde::{Deserialize, Serialize};

use crate::types::Crs;
use crate::LossError;

/// Paramètres d'un calcul
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// SCR assigné aux couches sans SCR (et aux conversions DXF)
    pub default_crs: String,

    /// Écart maximal toléré entre les centres des deux couches (unités de la carte)
    pub spatial_mismatch_threshold: f64,

    /// Nombre de décimales des surfaces et des unités
    pub precision: u32,

    /// Nombre de features affichées dans l'aperçu
    pub preview_rows: usize,

    /// Noms des colonnes de la couche de référence
    pub columns: ColumnNames,

    /// Types d'habitat exclus du calcul (comparaison normalisée)
    pub excluded_habitats: Vec<String>,

    /// Table de correspondance de l'état (condition)
    pub condition: Vec<ScoreAlias>,

    /// Table de correspondance de la distinctivité
    pub distinctiveness: Vec<ScoreAlias>,
}

/// Noms des colonnes attributaires attendues
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ColumnNames {
    pub condition: String,
    pub distinctiveness: String,
    pub broad_habitat: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            condition: "Baseline Condition".to_string(),
            distinctiveness: "Baseline Distinctiveness".to_string(),
            broad_habitat: "Baseline Broad Habitat Type".to_string(),
        }
    }
}

/// Une catégorie et les libellés qui la désignent
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoreAlias {
    pub score: f64,
    pub aliases: Vec<String>,
}

impl ScoreAlias {
    fn new(score: f64, aliases: &[&str]) -> Self {
        Self {
            score,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_crs: "EPSG:31370".to_string(),
            spatial_mismatch_threshold: 10_000.0,
            precision: 2,
            preview_rows: 10,
            columns: ColumnNames::default(),
            excluded_habitats: vec!["Urban".to_string()],
            condition: vec![
                ScoreAlias::new(3.0, &["Good", "3", "3.0"]),
                ScoreAlias::new(2.5, &["Fairly Good", "2.5"]),
                ScoreAlias::new(2.0, &["Moderate", "2", "2.0"]),
                ScoreAlias::new(1.5, &["Fairly Poor", "1.5"]),
                ScoreAlias::new(1.0, &["Poor", "1", "1.0"]),
            ],
            distinctiveness: vec![
                ScoreAlias::new(8.0, &["V.High", "Very High", "8"]),
                ScoreAlias::new(6.0, &["High", "6"]),
                ScoreAlias::new(4.0, &["Medium", "4"]),
                ScoreAlias::new(2.0, &["Low", "2"]),
                ScoreAlias::new(0.0, &["V.Low", "Very Low", "0"]),
            ],
        }
    }
}

/// Précision maximale acceptée (au-delà, l'arrondi n'a plus de sens en f64)
const MAX_PRECISION: u32 = 10;

impl Settings {
    /// Vérifie la cohérence des paramètres et retourne le SCR par défaut
    pub fn validate(&self) -> Result<Crs, LossError> {
        let crs = Crs::parse(&self.default_crs)
            .ok_or_else(|| LossError::InvalidSettings("default_crs is empty".to_string()))?;

        if crs.is_geographic() {
            return Err(LossError::InvalidSettings(format!(
                "default_crs {} is geographic; areas need a projected CRS",
                crs
            )));
        }
        if !(self.spatial_mismatch_threshold.is_finite() && self.spatial_mismatch_threshold > 0.0)
        {
            return Err(LossError::InvalidSettings(format!(
                "spatial_mismatch_threshold must be positive, got {}",
                self.spatial_mismatch_threshold
            )));
        }
        if self.precision > MAX_PRECISION {
            return Err(LossError::InvalidSettings(format!(
                "precision must be at most {}, got {}",
                MAX_PRECISION, self.precision
            )));
        }
        if self.condition.is_empty() || self.distinctiveness.is_empty() {
            return Err(LossError::InvalidSettings(
                "condition and distinctiveness tables must not be empty".to_string(),
            ));
        }

        Ok(crs)
    }
}

/// Arrondit une valeur au nombre de décimales demandé
pub fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10_f64.powi(precision as i32);
    (value * factor).round() / factor
}

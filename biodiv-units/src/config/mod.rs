//! Configuration du calcul (preset embarqué ou fichier JSON, surcharges)

use std::path::Path;

use anyhow::{Context, Result};
use habitat_loss::Settings;

/// Variable d'environnement: SCR par défaut
pub const ENV_DEFAULT_CRS: &str = "BIODIV_DEFAULT_CRS";
/// Variable d'environnement: nombre de décimales
pub const ENV_PRECISION: &str = "BIODIV_PRECISION";

/// Surcharges passées en ligne de commande
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub default_crs: Option<String>,
    pub spatial_mismatch_threshold: Option<f64>,
    pub precision: Option<u32>,
}

/// Charge une configuration depuis un fichier
pub fn load(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read config file: {}", path.display()))?;

    serde_json::from_str(&content).context("Failed to parse config JSON")
}

/// Charge une configuration depuis un preset embarqué
pub fn from_preset(preset: &str) -> Result<Settings> {
    match preset {
        "default" => load_embedded(include_str!("presets/default.json")),
        _ => anyhow::bail!("Unknown preset: {}. Use: default", preset),
    }
}

fn load_embedded(json: &str) -> Result<Settings> {
    serde_json::from_str(json).context("Failed to parse embedded config")
}

/// Résout un preset ou un chemin de fichier
pub fn load_settings(source: &str) -> Result<Settings> {
    match source {
        "default" => from_preset(source),
        _ => load(Path::new(source)),
    }
}

/// Applique les variables d'environnement puis les options CLI
pub fn apply_overrides(settings: &mut Settings, overrides: &Overrides) -> Result<()> {
    if let Ok(crs) = std::env::var(ENV_DEFAULT_CRS) {
        settings.default_crs = crs;
    }
    if let Ok(precision) = std::env::var(ENV_PRECISION) {
        settings.precision = precision
            .trim()
            .parse()
            .context(format!("Invalid {}: '{}'", ENV_PRECISION, precision))?;
    }

    if let Some(ref crs) = overrides.default_crs {
        settings.default_crs = crs.clone();
    }
    if let Some(threshold) = overrides.spatial_mismatch_threshold {
        settings.spatial_mismatch_threshold = threshold;
    }
    if let Some(precision) = overrides.precision {
        settings.precision = precision;
    }

    Ok(())
}

//! Export tabulaire (CSV) des intersections, sans géométrie

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use habitat_loss::IntersectionFeature;

/// Ligne CSV: une intersection habitat x emprise
#[derive(Debug, Serialize)]
struct Row<'a> {
    #[serde(rename = "Habitat id")]
    habitat_id: &'a str,
    #[serde(rename = "Development id")]
    development_id: &'a str,
    #[serde(rename = "Broad habitat")]
    broad_habitat: &'a str,
    #[serde(rename = "Condition")]
    condition: &'a str,
    #[serde(rename = "Distinctiveness")]
    distinctiveness: &'a str,
    #[serde(rename = "Loss area (ha)")]
    loss_area_ha: f64,
    #[serde(rename = "Condition score")]
    condition_score: Option<f64>,
    #[serde(rename = "Distinctiveness score")]
    distinctiveness_score: Option<f64>,
    #[serde(rename = "Significance score")]
    significance_score: f64,
    #[serde(rename = "Biodiversity units")]
    biodiversity_units: Option<f64>,
}

impl<'a> From<&'a IntersectionFeature> for Row<'a> {
    fn from(feature: &'a IntersectionFeature) -> Self {
        Self {
            habitat_id: &feature.habitat_id,
            development_id: &feature.development_id,
            broad_habitat: &feature.broad_habitat,
            condition: &feature.condition,
            distinctiveness: &feature.distinctiveness,
            loss_area_ha: feature.loss_area_ha,
            condition_score: feature.condition_score,
            distinctiveness_score: feature.distinctiveness_score,
            significance_score: feature.significance_score,
            biodiversity_units: feature.biodiversity_units,
        }
    }
}

/// Exporte les intersections en CSV (scores absents = cellules vides)
pub fn export_to_csv(features: &[IntersectionFeature], output_path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_path)
        .context(format!("Failed to create file: {}", output_path.display()))?;

    for feature in features {
        writer.serialize(Row::from(feature))?;
    }
    writer.flush()?;

    Ok(())
}

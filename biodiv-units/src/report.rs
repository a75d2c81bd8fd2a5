//! Rapport de calcul
//!
//! Regroupe les entrées (avec empreinte blake3), les paramètres, le résumé,
//! les valeurs non reconnues et les statistiques de réparation d'un calcul.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use habitat_loss::{IntersectionFeature, MappingReport, RepairStats, Role, RunOutcome, RunSummary};

/// Statut global du calcul
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    /// Pertes calculées
    Scored,
    /// Aucun recouvrement: pas de perte, aucun fichier écrit
    NoOverlap,
    /// Calcul interrompu par une erreur
    Failed,
}

/// Fichier d'entrée
#[derive(Debug, Clone, Serialize)]
pub struct InputFile {
    pub role: Role,
    pub path: PathBuf,
    /// Empreinte blake3 (absente si le fichier est illisible)
    pub checksum: Option<String>,
}

/// Rapport complet d'un calcul
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub duration_secs: f64,
    pub inputs: Vec<InputFile>,
    pub significance: f64,
    /// SCR commun des couches (affichage)
    pub crs: Option<String>,
    pub summary: RunSummary,
    pub mapping: MappingReport,
    pub baseline_repair: RepairStats,
    pub development_repair: RepairStats,
    /// Fichiers écrits
    pub outputs: Vec<PathBuf>,
    pub error: Option<String>,
}

impl RunReport {
    /// Crée un rapport vide pour une significance donnée
    pub fn new(significance: f64) -> Self {
        Self {
            status: RunStatus::Failed,
            duration_secs: 0.0,
            inputs: Vec::new(),
            significance,
            crs: None,
            summary: RunSummary::default(),
            mapping: MappingReport::default(),
            baseline_repair: RepairStats::default(),
            development_repair: RepairStats::default(),
            outputs: Vec::new(),
            error: None,
        }
    }

    pub fn record_input(&mut self, role: Role, path: &Path, checksum: Option<String>) {
        self.inputs.push(InputFile {
            role,
            path: path.to_path_buf(),
            checksum,
        });
    }

    /// Reprend le résultat du pipeline
    pub fn record_outcome(&mut self, outcome: &RunOutcome) {
        self.crs = Some(outcome.crs().to_string());
        self.summary = outcome.summary().clone();
        self.mapping = outcome.mapping().clone();

        match outcome {
            RunOutcome::Scored(result) => {
                self.status = RunStatus::Scored;
                self.baseline_repair = result.baseline_repair.clone();
                self.development_repair = result.development_repair.clone();
            }
            RunOutcome::NoOverlap(no_overlap) => {
                self.status = RunStatus::NoOverlap;
                self.baseline_repair = no_overlap.baseline_repair.clone();
                self.development_repair = no_overlap.development_repair.clone();
            }
        }
    }

    pub fn record_output(&mut self, path: &Path) {
        self.outputs.push(path.to_path_buf());
    }

    pub fn record_failure(&mut self, error: &anyhow::Error) {
        self.status = RunStatus::Failed;
        self.error = Some(format!("{:#}", error));
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Affiche le rapport sur la console
    pub fn display(&self, preview: &[IntersectionFeature]) {
        println!("\n{}", "=".repeat(60));
        println!("BIODIVERSITY UNIT LOSS REPORT");
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);
        println!("Significance: {}", self.significance);
        if let Some(ref crs) = self.crs {
            println!("CRS: {}", crs);
        }

        println!("\n--- INPUTS ---");
        for input in &self.inputs {
            println!(
                "  {}: {} ({})",
                input.role,
                input.path.display(),
                input.checksum.as_deref().unwrap_or("unreadable")
            );
        }

        println!("\n--- SUMMARY ---");
        println!("Baseline area: {} ha", self.summary.total_baseline_area_ha);
        println!("Loss area: {} ha", self.summary.total_loss_area_ha);
        println!("Biodiversity units: {}", self.summary.total_biodiversity_units);
        println!(
            "Features: {} ({} without units)",
            self.summary.feature_count, self.summary.null_units_count
        );

        if self.mapping.has_unmapped() || self.mapping.excluded_features > 0 {
            println!("\n--- MAPPING ---");
            for (label, unmapped) in [
                ("Condition", &self.mapping.condition),
                ("Distinctiveness", &self.mapping.distinctiveness),
            ] {
                if unmapped.count > 0 {
                    let values: Vec<&str> = unmapped.values.iter().map(String::as_str).collect();
                    println!(
                        "  {}: {} features unmapped ({})",
                        label,
                        unmapped.count,
                        values.join(", ")
                    );
                }
            }
            if self.mapping.excluded_features > 0 {
                println!("  Excluded habitats: {} features", self.mapping.excluded_features);
            }
        }

        println!("\n--- REPAIR ---");
        for (role, stats) in [
            (Role::Baseline, &self.baseline_repair),
            (Role::Development, &self.development_repair),
        ] {
            println!(
                "  {}: {} in, {} out ({} null, {} made valid, {} coerced, {} failed steps)",
                role,
                stats.input,
                stats.output,
                stats.dropped_null,
                stats.made_valid,
                stats.coerced,
                stats.step_failures
            );
        }

        if !preview.is_empty() {
            println!("\n--- PREVIEW ({} of {}) ---", preview.len(), self.summary.feature_count);
            for feature in preview {
                println!(
                    "  [{}:{}] {} | {} | {} | {} ha | {}",
                    feature.habitat_id,
                    feature.development_id,
                    feature.broad_habitat,
                    feature.condition,
                    feature.distinctiveness,
                    feature.loss_area_ha,
                    feature
                        .biodiversity_units
                        .map(|u| u.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }

        if !self.outputs.is_empty() {
            println!("\n--- OUTPUTS ---");
            for output in &self.outputs {
                println!("  {}", output.display());
            }
        }

        if let Some(ref error) = self.error {
            println!("\n--- ERROR ---");
            println!("  {}", error);
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary_line(&self) -> String {
        format!(
            "{:?}: {} ha lost, {} biodiversity units, {} features",
            self.status,
            self.summary.total_loss_area_ha,
            self.summary.total_biodiversity_units,
            self.summary.feature_count
        )
    }
}

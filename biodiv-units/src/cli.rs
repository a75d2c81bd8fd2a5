//! Définition et implémentation des commandes CLI
//!
//! - `loss`: habitats de référence x emprise → pertes en unités de biodiversité
//! - `convert`: dessin DXF → Shapefile de polygones

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::{info, warn};

use biodiv_units::config::{self, Overrides};
use biodiv_units::export;
use biodiv_units::report::RunReport;
use habitat_loss::settings::ColumnNames;
use habitat_loss::source::SourceFormat;
use habitat_loss::types::{into_polygonal, Crs, PolygonFeature};
use habitat_loss::{RunContext, RunOutcome, RunResult, Role};

#[derive(Subcommand)]
pub enum Commands {
    /// Compute biodiversity-unit loss between a baseline habitat map and a development footprint
    Loss(LossArgs),

    /// Convert a DXF drawing (closed polylines) into a polygon shapefile
    Convert {
        /// Path to the DXF drawing
        #[arg(short, long)]
        input: PathBuf,

        /// Output shapefile (default: <input>_conv.shp next to the drawing)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// CRS assigned to the drawing (default: configured default CRS)
        #[arg(long)]
        crs: Option<String>,
    },
}

#[derive(Args)]
pub struct LossArgs {
    /// Baseline habitat layer (.shp or .gpkg)
    #[arg(short, long)]
    pub baseline: PathBuf,

    /// Development footprint (.shp or .dxf)
    #[arg(short, long)]
    pub development: PathBuf,

    /// Strategic significance multiplier
    #[arg(short, long, default_value_t = 1.0)]
    pub significance: f64,

    /// Output shapefile for the intersections
    #[arg(short, long)]
    pub output: PathBuf,

    /// Optional summary CSV
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Optional GeoJSON export of the intersections
    #[arg(long)]
    pub geojson: Option<PathBuf>,

    /// Optional JSON run report
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Config preset name (default) or path to a JSON config
    #[arg(long, default_value = "default")]
    pub config: String,

    /// CRS assigned to layers without one (e.g., EPSG:31370)
    #[arg(long)]
    pub default_crs: Option<String>,

    /// Maximum distance between layer centres, in map units
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Decimal places for areas and units
    #[arg(long)]
    pub precision: Option<u32>,
}

impl LossArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            default_crs: self.default_crs.clone(),
            spatial_mismatch_threshold: self.threshold,
            precision: self.precision,
        }
    }
}

/// Exécute la commande loss
///
/// Les fichiers de sortie ne sont écrits qu'après un calcul réussi. Une
/// absence de recouvrement n'est pas une erreur: aucun fichier résultat.
pub fn cmd_loss(args: &LossArgs) -> Result<()> {
    let start = Instant::now();

    check_extension(&args.output, "shp")?;
    // Formats vérifiés avant toute lecture des entrées
    SourceFormat::for_role(&args.baseline, Role::Baseline)?;
    SourceFormat::for_role(&args.development, Role::Development)?;

    let mut settings = config::load_settings(&args.config)?;
    config::apply_overrides(&mut settings, &args.overrides())?;

    let mut report = RunReport::new(args.significance);
    for (role, path) in [
        (Role::Baseline, &args.baseline),
        (Role::Development, &args.development),
    ] {
        let checksum = match compute_file_checksum(path) {
            Ok(checksum) => Some(checksum),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Checksum unavailable");
                None
            }
        };
        report.record_input(role, path, checksum);
    }

    let preview_rows = settings.preview_rows;
    let precision = settings.precision;
    let columns = settings.columns.clone();
    let ctx = RunContext::new(&args.baseline, &args.development, args.significance, settings);

    let outcome = match habitat_loss::run(&ctx) {
        Ok(outcome) => outcome,
        Err(e) => {
            if e.is_input_mismatch() {
                warn!("Input files do not fit together, choose other baseline or development files");
            }
            let e = anyhow::Error::new(e).context("Biodiversity loss calculation failed");
            report.record_failure(&e);
            report.set_duration(start.elapsed());
            report.display(&[]);
            return Err(e);
        }
    };
    report.record_outcome(&outcome);

    let preview = match &outcome {
        RunOutcome::NoOverlap(no_overlap) => {
            println!(
                "No overlap between the development and the baseline habitats \
                 ({} ha): no biodiversity units lost, no result files written",
                no_overlap.baseline_area_ha
            );
            &[][..]
        }
        RunOutcome::Scored(result) => {
            let written = write_outputs(result, args, &columns, precision)?;
            for path in &written {
                report.record_output(path);
            }

            info!(
                features = result.summary.feature_count,
                outputs = report.outputs.len(),
                "Results written"
            );
            result.preview(preview_rows)
        }
    };

    report.set_duration(start.elapsed());
    if let Some(ref path) = args.report {
        create_parent_dir(path)?;
        report
            .save_to_file(path)
            .context(format!("Failed to save report {}", path.display()))?;
    }
    report.display(preview);
    info!("{}", report.summary_line());

    Ok(())
}

/// Écrit les fichiers résultats; en cas d'échec, ceux déjà écrits sont supprimés
fn write_outputs(
    result: &RunResult,
    args: &LossArgs,
    columns: &ColumnNames,
    precision: u32,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let outcome = write_each_output(result, args, columns, precision, &mut written);
    if outcome.is_err() {
        remove_outputs(&written);
    }
    outcome.map(|()| written)
}

fn write_each_output(
    result: &RunResult,
    args: &LossArgs,
    columns: &ColumnNames,
    precision: u32,
    written: &mut Vec<PathBuf>,
) -> Result<()> {
    create_parent_dir(&args.output)?;
    export::shp::export_intersections(
        &result.intersections,
        columns,
        &result.crs,
        precision,
        &args.output,
    )
    .context(format!("Failed to export {}", args.output.display()))?;
    written.push(args.output.clone());

    if let Some(ref path) = args.csv {
        create_parent_dir(path)?;
        written.push(path.clone());
        export::csv::export_to_csv(&result.intersections, path)
            .context(format!("Failed to export {}", path.display()))?;
    }
    if let Some(ref path) = args.geojson {
        create_parent_dir(path)?;
        written.push(path.clone());
        export::geojson::export_to_geojson(&result.intersections, &result.crs, path)
            .context(format!("Failed to export {}", path.display()))?;
    }
    Ok(())
}

fn remove_outputs(paths: &[PathBuf]) {
    for path in paths {
        let is_shapefile = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("shp"));
        if is_shapefile {
            export::shp::remove_shapefile(path);
        } else if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to remove partial output");
            }
        }
    }
}

/// Exécute la commande convert
pub fn cmd_convert(input: &Path, output: Option<&Path>, crs: Option<&str>) -> Result<()> {
    check_extension(input, "dxf")?;

    let definition = match crs {
        Some(crs) => crs.to_string(),
        None => {
            let mut settings = config::from_preset("default")?;
            config::apply_overrides(&mut settings, &Overrides::default())?;
            settings.default_crs
        }
    };
    let crs = Crs::parse(&definition).context("CRS must not be empty")?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| conversion_path(input));
    check_extension(&output, "shp")?;

    let layer = habitat_loss::source::dxf::read(input, &crs)
        .context(format!("Failed to convert {}", input.display()))?;

    let features: Vec<PolygonFeature> = layer
        .features
        .into_iter()
        .filter_map(|feature| {
            let geometry = into_polygonal(feature.geometry?)?;
            Some(PolygonFeature {
                id: feature.id,
                geometry,
                properties: feature.properties,
            })
        })
        .collect();

    create_parent_dir(&output)?;
    export::shp::export_polygons(&features, &crs, &output)?;

    println!(
        "Conversion complete: {} polygons to {} ({})",
        features.len(),
        output.display(),
        crs
    );
    Ok(())
}

/// Chemin de sortie par défaut d'une conversion: `<nom>_conv.shp`
fn conversion_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "drawing".to_string());
    input.with_file_name(format!("{}_conv.shp", stem))
}

fn check_extension(path: &Path, expected: &str) -> Result<()> {
    let matches = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(expected));
    if !matches {
        anyhow::bail!("Expected a .{} file, got {}", expected, path.display());
    }
    Ok(())
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create {}", parent.display()))?;
    }
    Ok(())
}

fn compute_file_checksum(path: &Path) -> Result<String> {
    use std::fs::File;
    use std::io::Read;

    let mut file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 65536]; // 64KB buffer

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

//! Point d'entrée CLI pour biodiv-units

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::Commands;

/// Calculer les pertes d'unités de biodiversité d'un projet d'aménagement
#[derive(Parser)]
#[command(name = "biodiv-units")]
#[command(author, version)]
#[command(about = "Compute biodiversity-unit loss between a baseline habitat map and a development footprint")]
#[command(long_about = "Intersects a baseline habitat layer (.shp/.gpkg) with a development footprint (.shp/.dxf), \
scores each overlap by condition, distinctiveness and strategic significance, and writes the result \
as a shapefile with optional CSV, GeoJSON and JSON report exports.")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Loss(args) => {
            info!(
                baseline = %args.baseline.display(),
                development = %args.development.display(),
                significance = args.significance,
                "Computing biodiversity loss"
            );
            cli::cmd_loss(&args)?;
        }
        Commands::Convert { input, output, crs } => {
            info!(input = %input.display(), crs = ?crs, "Converting DXF drawing");
            cli::cmd_convert(&input, output.as_deref(), crs.as_deref())?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}

//! # habitat-loss
//!
//! Calcul des pertes d'unités de biodiversité entre une carte d'habitats de
//! référence et l'emprise d'un projet d'aménagement.
//!
//! ## Features
//!
//! - Lecture Shapefile, GeoPackage et DXF (polylignes fermées)
//! - Réparation automatique des géométries invalides
//! - Harmonisation des SCR (reprojection PROJ avec le feature `reproject`)
//! - Intersection avec pré-filtrage R-tree et scores configurables
//!
//! ## Usage
//!
//! ```rust,ignore
//! use habitat_loss::{run, RunContext, RunOutcome, Settings};
//!
//! let ctx = RunContext::new("habitats.shp", "plan.dxf", 1.0, Settings::default());
//! match run(&ctx)? {
//!     RunOutcome::Scored(result) => {
//!         println!("Perte: {} ha", result.summary.total_loss_area_ha);
//!         println!("Unités: {}", result.summary.total_biodiversity_units);
//!     }
//!     RunOutcome::NoOverlap(_) => println!("Aucun recouvrement"),
//! }
//! ```

pub mod crs;
pub mod error;
pub mod overlay;
pub mod pipeline;
pub mod repair;
pub mod scoring;
pub mod settings;
pub mod source;
pub mod summary;
pub mod types;

pub use error::LossError;
pub use overlay::IntersectionFeature;
pub use pipeline::{run, run_layers, NoOverlap, RunContext, RunOutcome, RunResult};
pub use repair::RepairStats;
pub use scoring::{HabitatFeature, MappingReport};
pub use settings::Settings;
pub use summary::RunSummary;
pub use types::{Crs, Role};

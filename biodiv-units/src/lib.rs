//! # biodiv-units
//!
//! Calcul des pertes d'unités de biodiversité en ligne de commande.
//!
//! ## Features
//!
//! - Configuration JSON (preset embarqué ou fichier) et surcharges `.env`
//! - Export Shapefile, CSV et GeoJSON des intersections
//! - Rapport JSON avec empreintes blake3 des entrées
//!
//! ## Usage CLI
//!
//! ```bash
//! # Pertes d'un projet (significance 1.15)
//! biodiv-units loss --baseline habitats.shp --development plan.dxf \
//!     --significance 1.15 --output pertes.shp --csv pertes.csv --report run.json
//!
//! # Conversion d'un dessin DXF en Shapefile
//! biodiv-units convert --input plan.dxf
//! ```

pub mod config;
pub mod export;
pub mod report;

pub use report::{RunReport, RunStatus};

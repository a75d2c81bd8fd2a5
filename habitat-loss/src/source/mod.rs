//! Lecture des couches d'entrée (Shapefile, GeoPackage, DXF)

pub mod dxf;
pub mod gpkg;
pub mod shp;

use std::path::Path;

use tracing::debug;

use crate::types::{Crs, RawLayer, Role};
use crate::LossError;

/// Formats de fichiers reconnus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Shapefile,
    GeoPackage,
    Dxf,
}

impl SourceFormat {
    /// Détermine le format d'un fichier selon son rôle
    ///
    /// La couche de référence accepte `.shp`/`.gpkg`, l'emprise `.shp`/`.dxf`.
    /// Toute autre extension échoue avant l'ouverture du fichier.
    pub fn for_role(path: &Path, role: Role) -> Result<Self, LossError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match (role, extension.as_str()) {
            (_, "shp") => Ok(Self::Shapefile),
            (Role::Baseline, "gpkg") => Ok(Self::GeoPackage),
            (Role::Development, "dxf") => Ok(Self::Dxf),
            (Role::Baseline, _) => Err(LossError::UnsupportedFormat {
                role: role.label(),
                extension: display_extension(&extension),
                expected: ".shp or .gpkg",
            }),
            (Role::Development, _) => Err(LossError::UnsupportedFormat {
                role: role.label(),
                extension: display_extension(&extension),
                expected: ".shp or .dxf",
            }),
        }
    }
}

fn display_extension(extension: &str) -> String {
    if extension.is_empty() {
        "(none)".to_string()
    } else {
        format!(".{}", extension)
    }
}

/// Lit une couche selon son format
///
/// `dxf_crs` est le SCR assigné aux dessins DXF, qui n'en portent pas.
pub fn read_layer(path: &Path, role: Role, dxf_crs: &Crs) -> Result<RawLayer, LossError> {
    let format = SourceFormat::for_role(path, role)?;
    debug!(path = %path.display(), role = %role, format = ?format, "Reading layer");

    match format {
        SourceFormat::Shapefile => shp::read(path),
        SourceFormat::GeoPackage => gpkg::read(path, None),
        SourceFormat::Dxf => dxf::read(path, dxf_crs),
    }
}

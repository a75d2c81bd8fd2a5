//! Lecture des GeoPackages (SQLite + géométries GPKG/WKB)

use std::collections::BTreeMap;
use std::path::Path;

use geozero::wkb::GpkgWkb;
use geozero::ToGeo;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::{debug, warn};

use crate::types::{Crs, RawFeature, RawLayer};
use crate::LossError;

/// Lit une table de features d'un GeoPackage
///
/// Sans nom de table, la première table de features de `gpkg_contents`
/// (ordre alphabétique) est lue.
pub fn read(path: &Path, table: Option<&str>) -> Result<RawLayer, LossError> {
    let sql_error = |source| LossError::GeoPackage {
        path: path.display().to_string(),
        source,
    };

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(sql_error)?;

    let table = match table {
        Some(name) => name.to_string(),
        None => first_feature_table(&conn)
            .map_err(sql_error)?
            .ok_or_else(|| LossError::data("baseline", "GeoPackage contains no feature table"))?,
    };

    let (geometry_column, srs_id): (String, i64) = conn
        .query_row(
            "SELECT column_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?1",
            [&table],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(sql_error)?;

    let crs = read_srs(&conn, srs_id).map_err(sql_error)?;

    let mut stmt = conn
        .prepare(&format!("SELECT * FROM {}", quote_identifier(&table)))
        .map_err(sql_error)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut features = Vec::new();
    let mut rows = stmt.query([]).map_err(sql_error)?;
    let mut index = 0usize;

    while let Some(row) = rows.next().map_err(sql_error)? {
        let mut properties = BTreeMap::new();
        let mut geometry = None;
        let mut feature_id = index.to_string();

        for (i, name) in columns.iter().enumerate() {
            let value = row.get_ref(i).map_err(sql_error)?;

            if name.eq_ignore_ascii_case(&geometry_column) {
                if let ValueRef::Blob(blob) = value {
                    match GpkgWkb(blob.to_vec()).to_geo() {
                        Ok(geom) => geometry = Some(geom),
                        Err(e) => {
                            warn!(table = %table, row = index, error = %e, "Unreadable geometry, treated as null")
                        }
                    }
                }
                continue;
            }

            if name.eq_ignore_ascii_case("fid") {
                if let ValueRef::Integer(fid) = value {
                    feature_id = fid.to_string();
                }
            }

            properties.insert(name.clone(), value_to_string(value));
        }

        features.push(RawFeature {
            id: feature_id,
            geometry,
            properties,
        });
        index += 1;
    }

    debug!(
        path = %path.display(),
        table = %table,
        features = features.len(),
        crs = ?crs.as_ref().map(|c| c.to_string()),
        "GeoPackage loaded"
    );

    Ok(RawLayer { features, crs })
}

fn first_feature_table(conn: &Connection) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' \
         ORDER BY table_name LIMIT 1",
        [],
        |row| row.get(0),
    )
    .optional()
}

/// Résout un `srs_id` GeoPackage en SCR
///
/// Les identifiants 0 et -1 désignent des SCR non définis.
fn read_srs(conn: &Connection, srs_id: i64) -> rusqlite::Result<Option<Crs>> {
    if srs_id <= 0 {
        return Ok(None);
    }

    let row: Option<(String, i64, String)> = conn
        .query_row(
            "SELECT organization, organization_coordsys_id, definition \
             FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
            [srs_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    Ok(row.and_then(|(organization, code, definition)| {
        let epsg = if organization.eq_ignore_ascii_case("epsg") {
            u32::try_from(code).ok().filter(|&c| c > 0)
        } else {
            None
        };
        // Le WKT est conservé: son mot-clé racine distingue les SCR géographiques
        match (Crs::parse(&definition).filter(Crs::is_wkt), epsg) {
            (Some(crs), Some(code)) => Some(crs.with_epsg(code)),
            (Some(crs), None) => Some(crs),
            (None, Some(code)) => Some(Crs::from_epsg(code)),
            (None, None) => None,
        }
    }))
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(r) => r.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).trim().to_string(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

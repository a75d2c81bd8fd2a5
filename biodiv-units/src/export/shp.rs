//! Export Shapefile (.shp/.shx/.dbf + .prj)

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use geo::{LineString, MultiPolygon};
use habitat_loss::settings::ColumnNames;
use habitat_loss::types::{Crs, PolygonFeature};
use habitat_loss::IntersectionFeature;
use shapefile::dbase::{FieldName, FieldValue, Record, TableWriterBuilder};
use shapefile::{Point, Polygon, PolygonRing};
use tracing::{debug, warn};

/// Longueur maximale d'un nom de champ DBF
const DBF_NAME_LEN: usize = 10;
/// Longueur maximale d'un champ caractère DBF
const DBF_CHAR_LEN: usize = 254;

/// Champs numériques ajoutés aux intersections
pub const LOSS_FIELD: &str = "Loss_ha";
pub const CONDITION_FIELD: &str = "Cond_scr";
pub const DISTINCTIVENESS_FIELD: &str = "Dist_scr";
pub const SIGNIFICANCE_FIELD: &str = "Sig_scr";
pub const UNITS_FIELD: &str = "BU";

/// Extensions écrites pour un Shapefile
const SHAPEFILE_PARTS: &[&str] = &["shp", "shx", "dbf", "prj"];

/// Colonne texte: nom DBF et valeurs par feature
struct TextColumn {
    field: String,
    values: Vec<String>,
}

impl TextColumn {
    /// Valeurs tronquées à la largeur maximale d'un champ caractère
    fn new(field: String, values: impl IntoIterator<Item = String>) -> Self {
        Self {
            field,
            values: values.into_iter().map(truncate_value).collect(),
        }
    }

    fn width(&self) -> u8 {
        let longest = self.values.iter().map(|v| v.len()).max().unwrap_or(1);
        longest.clamp(1, DBF_CHAR_LEN) as u8
    }
}

/// Tronque une valeur à 254 octets sans couper de caractère
fn truncate_value(mut value: String) -> String {
    if value.len() > DBF_CHAR_LEN {
        let mut end = DBF_CHAR_LEN;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        value.truncate(end);
    }
    value
}

/// Supprime les fichiers d'un Shapefile (.shp/.shx/.dbf/.prj)
pub fn remove_shapefile(path: &Path) {
    for ext in SHAPEFILE_PARTS {
        let part = path.with_extension(ext);
        if part.exists() {
            if let Err(e) = std::fs::remove_file(&part) {
                warn!(path = %part.display(), error = %e, "Failed to remove partial output");
            }
        }
    }
}

/// Tronque un nom à 10 caractères en évitant les doublons
fn dbf_name(name: &str, used: &mut BTreeSet<String>) -> String {
    let base: String = name.chars().take(DBF_NAME_LEN).collect();
    let base = if base.trim().is_empty() { "field".to_string() } else { base };

    let mut candidate = base.clone();
    let mut n = 1;
    while used.contains(&candidate.to_ascii_uppercase()) {
        let suffix = format!("_{}", n);
        let keep = DBF_NAME_LEN.saturating_sub(suffix.len());
        candidate = format!("{}{}", base.chars().take(keep).collect::<String>(), suffix);
        n += 1;
    }
    used.insert(candidate.to_ascii_uppercase());
    candidate
}

fn field_name(name: &str) -> Result<FieldName> {
    FieldName::try_from(name).map_err(|e| anyhow::anyhow!("Invalid DBF field name '{}': {:?}", name, e))
}

/// Convertit un multipolygone en polygone Shapefile
fn to_shape(geometry: &MultiPolygon) -> Polygon {
    let ring = |line: &LineString| -> Vec<Point> {
        line.0.iter().map(|c| Point::new(c.x, c.y)).collect()
    };

    let rings: Vec<PolygonRing<Point>> = geometry
        .0
        .iter()
        .flat_map(|polygon| {
            std::iter::once(PolygonRing::Outer(ring(polygon.exterior())))
                .chain(polygon.interiors().iter().map(|i| PolygonRing::Inner(ring(i))))
        })
        .collect();

    Polygon::with_rings(rings)
}

/// Définitions WKT des SCR EPSG courants, pour les `.prj` des SCR sans WKT
const KNOWN_WKT: &[(u32, &str)] = &[
    (
        31370,
        r#"PROJCS["Belge 1972 / Belgian Lambert 72",GEOGCS["Belge 1972",DATUM["Reseau_National_Belge_1972",SPHEROID["International 1924",6378388,297,AUTHORITY["EPSG","7022"]],AUTHORITY["EPSG","6313"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4313"]],PROJECTION["Lambert_Conformal_Conic_2SP"],PARAMETER["latitude_of_origin",90],PARAMETER["central_meridian",4.36748666666667],PARAMETER["standard_parallel_1",51.1666672333333],PARAMETER["standard_parallel_2",49.8333339],PARAMETER["false_easting",150000.013],PARAMETER["false_northing",5400088.438],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AXIS["Easting",EAST],AXIS["Northing",NORTH],AUTHORITY["EPSG","31370"]]"#,
    ),
    (
        27700,
        r#"PROJCS["OSGB 1936 / British National Grid",GEOGCS["OSGB 1936",DATUM["OSGB_1936",SPHEROID["Airy 1830",6377563.396,299.3249646,AUTHORITY["EPSG","7001"]],AUTHORITY["EPSG","6277"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4277"]],PROJECTION["Transverse_Mercator"],PARAMETER["latitude_of_origin",49],PARAMETER["central_meridian",-2],PARAMETER["scale_factor",0.9996012717],PARAMETER["false_easting",400000],PARAMETER["false_northing",-100000],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AXIS["Easting",EAST],AXIS["Northing",NORTH],AUTHORITY["EPSG","27700"]]"#,
    ),
];

/// Écrit le `.prj` du SCR
///
/// La définition WKT est écrite telle quelle; pour un code EPSG seul, la
/// table des SCR courants est utilisée. Sinon aucun `.prj` n'est écrit.
pub fn write_prj(path: &Path, crs: &Crs) -> Result<bool> {
    let wkt = if crs.is_wkt() {
        Some(crs.definition())
    } else {
        crs.epsg().and_then(|code| {
            KNOWN_WKT
                .iter()
                .find(|(known, _)| *known == code)
                .map(|(_, wkt)| *wkt)
        })
    };

    let Some(wkt) = wkt else {
        warn!(
            crs = %crs,
            path = %path.display(),
            "No WKT definition known for this CRS, .prj not written"
        );
        return Ok(false);
    };

    let prj = path.with_extension("prj");
    std::fs::write(&prj, wkt).context(format!("Failed to write {}", prj.display()))?;
    Ok(true)
}

fn text_columns<'a, I>(names: I, properties: &[&BTreeMap<String, String>], used: &mut BTreeSet<String>) -> Vec<(String, TextColumn)>
where
    I: IntoIterator<Item = &'a String>,
{
    names
        .into_iter()
        .map(|name| {
            let values = properties
                .iter()
                .map(|p| p.get(name).cloned().unwrap_or_default());
            (name.clone(), TextColumn::new(dbf_name(name, used), values))
        })
        .collect()
}

/// Exporte les intersections en Shapefile
///
/// Les attributs d'origine sont conservés (noms tronqués à 10 caractères),
/// suivis des scores et des unités. Les valeurs nulles restent vides. En cas
/// d'échec, les fichiers partiellement écrits sont supprimés.
pub fn export_intersections(
    features: &[IntersectionFeature],
    columns: &ColumnNames,
    crs: &Crs,
    precision: u32,
    output_path: &Path,
) -> Result<()> {
    write_intersections(features, columns, crs, precision, output_path)
        .inspect_err(|_| remove_shapefile(output_path))
}

fn write_intersections(
    features: &[IntersectionFeature],
    columns: &ColumnNames,
    crs: &Crs,
    precision: u32,
    output_path: &Path,
) -> Result<()> {
    let mut used = BTreeSet::new();

    let mut categorical = vec![
        TextColumn::new(
            dbf_name(&columns.broad_habitat, &mut used),
            features.iter().map(|f| f.broad_habitat.clone()),
        ),
        TextColumn::new(
            dbf_name(&columns.condition, &mut used),
            features.iter().map(|f| f.condition.clone()),
        ),
        TextColumn::new(
            dbf_name(&columns.distinctiveness, &mut used),
            features.iter().map(|f| f.distinctiveness.clone()),
        ),
    ];

    let property_names: BTreeSet<&String> = features.iter().flat_map(|f| f.properties.keys()).collect();
    let properties: Vec<&BTreeMap<String, String>> = features.iter().map(|f| &f.properties).collect();
    let extra = text_columns(property_names, &properties, &mut used);
    categorical.extend(extra.into_iter().map(|(_, column)| column));

    for name in [LOSS_FIELD, CONDITION_FIELD, DISTINCTIVENESS_FIELD, SIGNIFICANCE_FIELD, UNITS_FIELD] {
        used.insert(name.to_ascii_uppercase());
    }

    let mut table = TableWriterBuilder::new();
    for column in &categorical {
        table = table.add_character_field(field_name(&column.field)?, column.width());
    }
    let decimals = precision.min(15) as u8;
    for name in [LOSS_FIELD, CONDITION_FIELD, DISTINCTIVENESS_FIELD, SIGNIFICANCE_FIELD, UNITS_FIELD] {
        table = table.add_numeric_field(field_name(name)?, 20, decimals);
    }

    let mut writer = shapefile::Writer::from_path(output_path, table)
        .context(format!("Failed to create shapefile: {}", output_path.display()))?;

    for (i, feature) in features.iter().enumerate() {
        let mut record = Record::default();
        for column in &categorical {
            record.insert(
                column.field.clone(),
                FieldValue::Character(Some(column.values[i].clone())),
            );
        }
        record.insert(LOSS_FIELD.to_string(), FieldValue::Numeric(Some(feature.loss_area_ha)));
        record.insert(CONDITION_FIELD.to_string(), FieldValue::Numeric(feature.condition_score));
        record.insert(
            DISTINCTIVENESS_FIELD.to_string(),
            FieldValue::Numeric(feature.distinctiveness_score),
        );
        record.insert(
            SIGNIFICANCE_FIELD.to_string(),
            FieldValue::Numeric(Some(feature.significance_score)),
        );
        record.insert(UNITS_FIELD.to_string(), FieldValue::Numeric(feature.biodiversity_units));

        writer
            .write_shape_and_record(&to_shape(&feature.geometry), &record)
            .context(format!("Failed to write feature {}", i))?;
    }
    drop(writer);

    write_prj(output_path, crs)?;
    debug!(path = %output_path.display(), features = features.len(), "Shapefile written");
    Ok(())
}

/// Exporte une couche de polygones (conversion DXF)
pub fn export_polygons(features: &[PolygonFeature], crs: &Crs, output_path: &Path) -> Result<()> {
    write_polygons(features, crs, output_path).inspect_err(|_| remove_shapefile(output_path))
}

fn write_polygons(features: &[PolygonFeature], crs: &Crs, output_path: &Path) -> Result<()> {
    let mut used = BTreeSet::new();
    let property_names: BTreeSet<&String> = features.iter().flat_map(|f| f.properties.keys()).collect();
    let properties: Vec<&BTreeMap<String, String>> = features.iter().map(|f| &f.properties).collect();
    let columns = text_columns(property_names, &properties, &mut used);

    let mut table = TableWriterBuilder::new();
    for (_, column) in &columns {
        table = table.add_character_field(field_name(&column.field)?, column.width());
    }

    let mut writer = shapefile::Writer::from_path(output_path, table)
        .context(format!("Failed to create shapefile: {}", output_path.display()))?;

    for (i, feature) in features.iter().enumerate() {
        let mut record = Record::default();
        for (_, column) in &columns {
            record.insert(
                column.field.clone(),
                FieldValue::Character(Some(column.values[i].clone())),
            );
        }
        writer
            .write_shape_and_record(&to_shape(&feature.geometry), &record)
            .context(format!("Failed to write feature {}", i))?;
    }
    drop(writer);

    write_prj(output_path, crs)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn test_dbf_name_truncates_and_dedupes() {
        let mut used = BTreeSet::new();
        assert_eq!(dbf_name("Baseline Condition", &mut used), "Baseline C");
        assert_eq!(dbf_name("Baseline Cover", &mut used), "Baseline_1");
        assert_eq!(dbf_name("Name", &mut used), "Name");
        assert_eq!(dbf_name("name", &mut used), "name_1");
    }

    #[test]
    fn test_to_shape_keeps_holes() {
        let multi = MultiPolygon::new(vec![polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)],
            interiors: [[(x: 2.0, y: 2.0), (x: 4.0, y: 2.0), (x: 4.0, y: 4.0), (x: 2.0, y: 4.0)]],
        )]);

        let shape = to_shape(&multi);
        assert_eq!(shape.rings().len(), 2);
        assert!(matches!(shape.rings()[0], PolygonRing::Outer(_)));
        assert!(matches!(shape.rings()[1], PolygonRing::Inner(_)));
    }

    #[test]
    fn test_write_prj() {
        let path = std::env::temp_dir().join(format!("biodiv-prj-{}.shp", std::process::id()));
        let prj = path.with_extension("prj");

        let wkt = Crs::parse(r#"PROJCS["Custom Lambert",UNIT["metre",1]]"#).unwrap();
        assert!(write_prj(&path, &wkt).unwrap());
        assert!(std::fs::read_to_string(&prj).unwrap().starts_with("PROJCS[\"Custom Lambert\""));

        assert!(write_prj(&path, &Crs::from_epsg(31370)).unwrap());
        let written = Crs::parse(&std::fs::read_to_string(&prj).unwrap()).unwrap();
        assert_eq!(written, Crs::from_epsg(31370));
        assert!(!written.is_geographic());

        std::fs::remove_file(&prj).ok();
        assert!(!write_prj(&path, &Crs::from_epsg(3812)).unwrap());
        assert!(!prj.exists());
    }

    #[test]
    fn test_truncate_value_keeps_char_boundary() {
        assert_eq!(truncate_value("Grassland".to_string()), "Grassland");
        assert_eq!(truncate_value("G".repeat(300)).len(), DBF_CHAR_LEN);

        // 'é' occupe 2 octets: la coupe à 254 tomberait au milieu du dernier
        let value = format!("{}é", "a".repeat(253));
        let truncated = truncate_value(value);
        assert_eq!(truncated, "a".repeat(253));
    }

    #[test]
    fn test_long_values_are_truncated_on_export() {
        let feature = IntersectionFeature {
            habitat_id: "0".to_string(),
            development_id: "0".to_string(),
            geometry: MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 100.0, y: 0.0),
                (x: 100.0, y: 100.0),
                (x: 0.0, y: 100.0),
            ]]),
            broad_habitat: "G".repeat(300),
            condition: "Good".to_string(),
            distinctiveness: "High".to_string(),
            condition_score: Some(3.0),
            distinctiveness_score: Some(6.0),
            significance_score: 1.0,
            area_m2: 10_000.0,
            loss_area_ha: 1.0,
            biodiversity_units: Some(18.0),
            properties: BTreeMap::from([("Notes".to_string(), "n".repeat(1000))]),
        };
        let path = std::env::temp_dir().join(format!("biodiv-long-{}.shp", std::process::id()));

        export_intersections(&[feature], &ColumnNames::default(), &Crs::from_epsg(31370), 2, &path)
            .unwrap();

        let mut reader = shapefile::Reader::from_path(&path).unwrap();
        let (_, record) = reader.iter_shapes_and_records().next().unwrap().unwrap();
        match record.get("Baseline B") {
            Some(FieldValue::Character(Some(v))) => assert_eq!(v.len(), DBF_CHAR_LEN),
            other => panic!("expected a character field, got {:?}", other),
        }
        match record.get("Notes") {
            Some(FieldValue::Character(Some(v))) => assert_eq!(v.len(), DBF_CHAR_LEN),
            other => panic!("expected a character field, got {:?}", other),
        }
        drop(reader);

        remove_shapefile(&path);
    }

    #[test]
    fn test_remove_shapefile_removes_all_parts() {
        let path = std::env::temp_dir().join(format!("biodiv-partial-{}.shp", std::process::id()));
        for ext in ["shp", "shx", "dbf"] {
            std::fs::write(path.with_extension(ext), b"partial").unwrap();
        }

        remove_shapefile(&path);

        for ext in SHAPEFILE_PARTS {
            assert!(!path.with_extension(ext).exists());
        }
    }

    #[test]
    fn test_failed_export_leaves_no_files() {
        // Le .prj ne peut pas être écrit: un dossier occupe son chemin
        let path = std::env::temp_dir().join(format!("biodiv-failed-{}.shp", std::process::id()));
        std::fs::create_dir_all(path.with_extension("prj")).unwrap();
        let wkt = Crs::parse(r#"PROJCS["Custom Lambert",UNIT["metre",1]]"#).unwrap();

        let result = export_intersections(&[], &ColumnNames::default(), &wkt, 2, &path);

        assert!(result.is_err());
        for ext in ["shp", "shx", "dbf"] {
            assert!(!path.with_extension(ext).exists());
        }
        std::fs::remove_dir(path.with_extension("prj")).ok();
    }
}

//! Export vers GeoJSON avec geozero (streaming)

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use geo::Geometry;
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;

use habitat_loss::types::Crs;
use habitat_loss::IntersectionFeature;

/// Exporte les intersections en GeoJSON
///
/// Le membre `crs` n'est écrit que si le code EPSG est connu.
pub fn export_to_geojson(
    features: &[IntersectionFeature],
    crs: &Crs,
    output_path: &Path,
) -> Result<()> {
    let file = File::create(output_path)
        .context(format!("Failed to create file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    write!(writer, r#"{{"type":"FeatureCollection","#)?;
    if let Some(epsg) = crs.epsg() {
        write!(
            writer,
            r#""crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}},"#,
            epsg
        )?;
    }
    write!(writer, r#""features":["#)?;

    for (i, feature) in features.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write_feature(&mut writer, feature)?;
    }

    write!(writer, "]}}")?;
    writer.flush()?;

    Ok(())
}

/// Écrit une intersection en GeoJSON
fn write_feature<W: Write>(writer: &mut W, feature: &IntersectionFeature) -> Result<()> {
    write!(
        writer,
        r#"{{"type":"Feature","id":"{}:{}","#,
        escape_json(&feature.habitat_id),
        escape_json(&feature.development_id)
    )?;

    write!(writer, r#""geometry":"#)?;
    let mut geom_buf = Vec::new();
    let mut geom_writer = GeoJsonWriter::new(&mut geom_buf);
    Geometry::MultiPolygon(feature.geometry.clone()).process_geom(&mut geom_writer)?;
    writer.write_all(&geom_buf)?;

    write!(
        writer,
        r#","properties":{{"habitat_id":"{}","development_id":"{}""#,
        escape_json(&feature.habitat_id),
        escape_json(&feature.development_id)
    )?;
    for (key, value) in [
        ("broad_habitat", &feature.broad_habitat),
        ("condition", &feature.condition),
        ("distinctiveness", &feature.distinctiveness),
    ] {
        write!(writer, r#","{}":"{}""#, key, escape_json(value))?;
    }
    for (key, value) in &feature.properties {
        write!(
            writer,
            r#","{}":"{}""#,
            escape_json(key),
            escape_json(value)
        )?;
    }
    for (key, value) in [
        ("loss_area_ha", Some(feature.loss_area_ha)),
        ("condition_score", feature.condition_score),
        ("distinctiveness_score", feature.distinctiveness_score),
        ("significance_score", Some(feature.significance_score)),
        ("biodiversity_units", feature.biodiversity_units),
    ] {
        write!(writer, r#","{}":{}"#, key, json_number(value))?;
    }
    write!(writer, "}}}}")?;

    Ok(())
}

/// Nombre JSON, `null` si absent ou non fini
fn json_number(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => "null".to_string(),
    }
}

/// Échappe une chaîne pour JSON
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};
    use std::collections::BTreeMap;

    fn intersection(units: Option<f64>) -> IntersectionFeature {
        IntersectionFeature {
            habitat_id: "3".to_string(),
            development_id: "0".to_string(),
            geometry: MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 100.0, y: 0.0),
                (x: 100.0, y: 100.0),
                (x: 0.0, y: 100.0),
            ]]),
            broad_habitat: "Grassland \"semi\"".to_string(),
            condition: "Good".to_string(),
            distinctiveness: "Medium".to_string(),
            condition_score: units.map(|_| 3.0),
            distinctiveness_score: Some(4.0),
            significance_score: 1.0,
            area_m2: 10_000.0,
            loss_area_ha: 1.0,
            biodiversity_units: units,
            properties: BTreeMap::from([("Site".to_string(), "North".to_string())]),
        }
    }

    #[test]
    fn test_write_feature() {
        let mut buffer = Vec::new();
        write_feature(&mut buffer, &intersection(Some(12.0))).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(json["type"], "Feature");
        assert_eq!(json["geometry"]["type"], "MultiPolygon");
        assert_eq!(json["properties"]["broad_habitat"], "Grassland \"semi\"");
        assert_eq!(json["properties"]["Site"], "North");
        assert_eq!(json["properties"]["biodiversity_units"], 12.0);
    }

    #[test]
    fn test_null_scores_written_as_null() {
        let mut buffer = Vec::new();
        write_feature(&mut buffer, &intersection(None)).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert!(json["properties"]["condition_score"].is_null());
        assert!(json["properties"]["biodiversity_units"].is_null());
        assert_eq!(json["properties"]["loss_area_ha"], 1.0);
    }

    #[test]
    fn test_escape_json() {
        assert_eq!(escape_json("hello"), "hello");
        assert_eq!(escape_json("hello\"world"), "hello\\\"world");
        assert_eq!(escape_json("line\nbreak"), "line\\nbreak");
    }

    #[test]
    fn test_export_to_geojson() {
        let output_path = std::env::temp_dir().join(format!("biodiv-{}.geojson", std::process::id()));

        export_to_geojson(&[intersection(Some(12.0))], &Crs::from_epsg(31370), &output_path).unwrap();

        let content = std::fs::read_to_string(&output_path).unwrap();
        assert!(content.contains("EPSG::31370"));
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json["features"].as_array().unwrap().len(), 1);

        std::fs::remove_file(output_path).ok();
    }
}

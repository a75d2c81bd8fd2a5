//! Correspondance des attributs catégoriels vers des scores numériques

use std::collections::{BTreeMap, BTreeSet};

use geo::{Area, MultiPolygon};
use serde::Serialize;
use tracing::{debug, warn};

use crate::settings::{ScoreAlias, Settings};
use crate::types::PolygonFeature;
use crate::LossError;

/// Longueur maximale d'un nom de champ DBF
const DBF_FIELD_LEN: usize = 10;

/// Normalise une valeur catégorielle (espaces, casse)
pub fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Table ordonnée libellé normalisé -> score
#[derive(Debug, Clone)]
pub struct AliasTable {
    entries: Vec<(String, f64)>,
}

impl AliasTable {
    pub fn new(aliases: &[ScoreAlias]) -> Self {
        let entries = aliases
            .iter()
            .flat_map(|entry| {
                entry
                    .aliases
                    .iter()
                    .map(move |alias| (normalize(alias), entry.score))
            })
            .collect();
        Self { entries }
    }

    /// Score de la première entrée correspondante
    pub fn lookup(&self, value: &str) -> Option<f64> {
        let key = normalize(value);
        if key.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, score)| *score)
    }
}

/// Valeurs non reconnues pour un attribut
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnmappedAttribute {
    pub count: usize,
    pub values: BTreeSet<String>,
}

impl UnmappedAttribute {
    fn record(&mut self, raw: &str) {
        self.count += 1;
        let raw = raw.trim();
        self.values.insert(if raw.is_empty() {
            "(empty)".to_string()
        } else {
            raw.to_string()
        });
    }
}

/// Bilan de la correspondance (non bloquant)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingReport {
    pub condition: UnmappedAttribute,
    pub distinctiveness: UnmappedAttribute,
    /// Features retirées (types d'habitat exclus)
    pub excluded_features: usize,
}

impl MappingReport {
    /// Vrai si au moins une valeur n'a pas pu être convertie
    pub fn has_unmapped(&self) -> bool {
        self.condition.count > 0 || self.distinctiveness.count > 0
    }
}

/// Feature de la couche de référence avec ses scores
#[derive(Debug, Clone)]
pub struct HabitatFeature {
    pub id: String,
    pub geometry: MultiPolygon,
    pub broad_habitat: String,
    pub condition: String,
    pub distinctiveness: String,
    pub condition_score: Option<f64>,
    pub distinctiveness_score: Option<f64>,
    pub significance_score: f64,
    /// Surface de la géométrie réparée (m²)
    pub area_m2: f64,
    /// Autres attributs de la source
    pub properties: BTreeMap<String, String>,
}

/// Noms effectifs des colonnes dans la couche lue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub condition: String,
    pub distinctiveness: String,
    pub broad_habitat: String,
}

/// Attribution des scores d'état et de distinctivité
#[derive(Debug, Clone)]
pub struct HabitatScorer {
    condition: AliasTable,
    distinctiveness: AliasTable,
    columns: crate::settings::ColumnNames,
    excluded: BTreeSet<String>,
}

impl HabitatScorer {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            condition: AliasTable::new(&settings.condition),
            distinctiveness: AliasTable::new(&settings.distinctiveness),
            columns: settings.columns.clone(),
            excluded: settings.excluded_habitats.iter().map(|h| normalize(h)).collect(),
        }
    }

    /// Vérifie la présence des colonnes attendues
    ///
    /// Un nom est cherché à l'identique, puis sans tenir compte de la casse,
    /// puis tronqué à 10 caractères (limite DBF).
    pub fn check_columns(&self, features: &[PolygonFeature]) -> Result<ResolvedColumns, LossError> {
        let available: BTreeSet<&str> = features
            .iter()
            .flat_map(|f| f.properties.keys().map(String::as_str))
            .collect();

        let mut missing = Vec::new();
        let mut resolve = |wanted: &str| match resolve_column(&available, wanted) {
            Some(name) => name,
            None => {
                missing.push(wanted.to_string());
                String::new()
            }
        };

        let resolved = ResolvedColumns {
            condition: resolve(&self.columns.condition),
            distinctiveness: resolve(&self.columns.distinctiveness),
            broad_habitat: resolve(&self.columns.broad_habitat),
        };

        if !missing.is_empty() {
            return Err(LossError::MissingColumns(missing));
        }
        Ok(resolved)
    }

    /// Attribue les scores et retire les habitats exclus
    pub fn score(
        &self,
        features: Vec<PolygonFeature>,
        significance: f64,
    ) -> Result<(Vec<HabitatFeature>, MappingReport), LossError> {
        let columns = self.check_columns(&features)?;
        let mut report = MappingReport::default();
        let mut scored = Vec::with_capacity(features.len());

        for feature in features {
            let PolygonFeature {
                id,
                geometry,
                mut properties,
            } = feature;

            let broad_habitat = properties.remove(&columns.broad_habitat).unwrap_or_default();
            if self.excluded.contains(&normalize(&broad_habitat)) {
                report.excluded_features += 1;
                continue;
            }

            let condition = properties.remove(&columns.condition).unwrap_or_default();
            let distinctiveness = properties.remove(&columns.distinctiveness).unwrap_or_default();

            let condition_score = self.condition.lookup(&condition);
            if condition_score.is_none() {
                report.condition.record(&condition);
            }
            let distinctiveness_score = self.distinctiveness.lookup(&distinctiveness);
            if distinctiveness_score.is_none() {
                report.distinctiveness.record(&distinctiveness);
            }

            let area_m2 = geometry.unsigned_area();
            scored.push(HabitatFeature {
                id,
                geometry,
                broad_habitat,
                condition,
                distinctiveness,
                condition_score,
                distinctiveness_score,
                significance_score: significance,
                area_m2,
                properties,
            });
        }

        if report.has_unmapped() {
            warn!(
                condition = report.condition.count,
                condition_values = ?report.condition.values,
                distinctiveness = report.distinctiveness.count,
                distinctiveness_values = ?report.distinctiveness.values,
                "Some categorical values could not be mapped to a score"
            );
        }
        debug!(
            scored = scored.len(),
            excluded = report.excluded_features,
            "Baseline habitats scored"
        );

        Ok((scored, report))
    }
}

fn resolve_column(available: &BTreeSet<&str>, wanted: &str) -> Option<String> {
    if available.contains(wanted) {
        return Some(wanted.to_string());
    }
    if let Some(name) = available.iter().find(|name| name.eq_ignore_ascii_case(wanted)) {
        return Some(name.to_string());
    }
    let truncated: String = wanted.chars().take(DBF_FIELD_LEN).collect();
    available
        .iter()
        .find(|name| name.eq_ignore_ascii_case(&truncated))
        .map(|name| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn feature(id: &str, habitat: &str, condition: &str, distinctiveness: &str) -> PolygonFeature {
        let mut properties = BTreeMap::new();
        properties.insert("Baseline Broad Habitat Type".to_string(), habitat.to_string());
        properties.insert("Baseline Condition".to_string(), condition.to_string());
        properties.insert("Baseline Distinctiveness".to_string(), distinctiveness.to_string());
        properties.insert("Name".to_string(), format!("parcel {}", id));
        PolygonFeature {
            id: id.to_string(),
            geometry: MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 100.0, y: 0.0),
                (x: 100.0, y: 100.0),
                (x: 0.0, y: 100.0),
            ]]),
            properties,
        }
    }

    fn scorer() -> HabitatScorer {
        HabitatScorer::from_settings(&Settings::default())
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Fairly   Good "), "fairly good");
        assert_eq!(normalize("V.HIGH"), "v.high");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_alias_lookup() {
        let settings = Settings::default();
        let condition = AliasTable::new(&settings.condition);
        let distinctiveness = AliasTable::new(&settings.distinctiveness);

        assert_eq!(condition.lookup("Good"), Some(3.0));
        assert_eq!(condition.lookup("fairly good"), Some(2.5));
        assert_eq!(condition.lookup(" POOR "), Some(1.0));
        assert_eq!(condition.lookup("2.5"), Some(2.5));
        assert_eq!(condition.lookup("Excellent"), None);
        assert_eq!(condition.lookup(""), None);

        assert_eq!(distinctiveness.lookup("V.High"), Some(8.0));
        assert_eq!(distinctiveness.lookup("very high"), Some(8.0));
        assert_eq!(distinctiveness.lookup("High"), Some(6.0));
        assert_eq!(distinctiveness.lookup("Very Low"), Some(0.0));
        assert_eq!(distinctiveness.lookup("v.low"), Some(0.0));
    }

    #[test]
    fn test_high_is_not_matched_by_substring() {
        let settings = Settings::default();
        let distinctiveness = AliasTable::new(&settings.distinctiveness);
        assert_eq!(distinctiveness.lookup("Highest"), None);
    }

    #[test]
    fn test_score_features() {
        let (scored, report) = scorer()
            .score(vec![feature("1", "Grassland", "Good", "High")], 1.15)
            .unwrap();

        assert_eq!(scored.len(), 1);
        let f = &scored[0];
        assert_eq!(f.condition_score, Some(3.0));
        assert_eq!(f.distinctiveness_score, Some(6.0));
        assert_eq!(f.significance_score, 1.15);
        assert_eq!(f.broad_habitat, "Grassland");
        assert!((f.area_m2 - 10_000.0).abs() < 1e-9);
        assert_eq!(f.properties.get("Name").map(String::as_str), Some("parcel 1"));
        assert!(!report.has_unmapped());
    }

    #[test]
    fn test_unmapped_values_are_counted() {
        let (scored, report) = scorer()
            .score(
                vec![
                    feature("1", "Grassland", "Excellent", "High"),
                    feature("2", "Woodland", "", "Unknown"),
                ],
                1.0,
            )
            .unwrap();

        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].condition_score, None);
        assert_eq!(scored[1].distinctiveness_score, None);
        assert_eq!(report.condition.count, 2);
        assert!(report.condition.values.contains("Excellent"));
        assert!(report.condition.values.contains("(empty)"));
        assert_eq!(report.distinctiveness.count, 1);
        assert!(report.has_unmapped());
    }

    #[test]
    fn test_urban_is_excluded() {
        let (scored, report) = scorer()
            .score(
                vec![
                    feature("1", "Urban", "Good", "High"),
                    feature("2", " urban ", "Good", "High"),
                    feature("3", "Grassland", "Good", "High"),
                ],
                1.0,
            )
            .unwrap();

        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].id, "3");
        assert_eq!(report.excluded_features, 2);
    }

    #[test]
    fn test_missing_columns() {
        let mut f = feature("1", "Grassland", "Good", "High");
        f.properties.remove("Baseline Condition");

        match scorer().check_columns(&[f]) {
            Err(LossError::MissingColumns(missing)) => {
                assert_eq!(missing, vec!["Baseline Condition".to_string()]);
            }
            other => panic!("Expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_dbf_column_names() {
        let mut properties = BTreeMap::new();
        properties.insert("BASELINE B".to_string(), "Grassland".to_string());
        properties.insert("Baseline C".to_string(), "Good".to_string());
        properties.insert("Baseline D".to_string(), "High".to_string());
        let f = PolygonFeature {
            id: "1".to_string(),
            geometry: MultiPolygon::new(vec![]),
            properties,
        };

        let columns = scorer().check_columns(&[f]).unwrap();
        assert_eq!(columns.broad_habitat, "BASELINE B");
        assert_eq!(columns.condition, "Baseline C");
        assert_eq!(columns.distinctiveness, "Baseline D");
    }
}

//! Types de données pour le crate habitat-loss

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use geo::{Geometry, MultiPolygon};
use regex::Regex;
use serde::Serialize;

/// Rôle d'une couche dans le calcul
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Couche des habitats existants (avant aménagement)
    Baseline,
    /// Emprise du projet d'aménagement
    Development,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Baseline => "baseline",
            Role::Development => "development",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Système de coordonnées de référence
///
/// Soit un code `EPSG:n`, soit une définition WKT (fichier `.prj`).
/// Deux SCR sont égaux si leurs codes EPSG sont connus et identiques, sinon si
/// leurs définitions normalisées sont identiques.
#[derive(Debug, Clone, Serialize)]
pub struct Crs {
    definition: String,
    epsg: Option<u32>,
}

/// Codes EPSG géographiques (en degrés) courants, pour les codes sans WKT
const GEOGRAPHIC_EPSG: &[u32] = &[
    4326, 4258, 4269, 4277, 4313, 4171, 4167, 4283, 4230, 4617, 4674, 4619, 4612, 4490, 4322,
    4275, 4807, 4989,
];

/// Mots-clés racine des WKT géographiques (WKT1 et WKT2)
const GEOGRAPHIC_WKT_KEYWORDS: &[&str] = &["GEOGCS", "GEOGCRS", "GEOGRAPHICCRS", "GEODCRS", "GEODETICCRS"];

fn epsg_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*EPSG\s*:\s*(\d+)\s*$").expect("valid regex"))
}

fn wkt_authority_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(?:AUTHORITY|ID)\[\s*"EPSG"\s*,\s*"?(\d+)"?\s*\]"#).expect("valid regex")
    })
}

fn wkt_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^\s*([A-Za-z]+)\[\s*"([^"]*)""#).expect("valid regex"))
}

impl Crs {
    /// Construit un SCR depuis un code EPSG
    pub fn from_epsg(code: u32) -> Self {
        Self {
            definition: format!("EPSG:{}", code),
            epsg: Some(code),
        }
    }

    /// Analyse une définition (`EPSG:n` ou WKT)
    ///
    /// Retourne `None` pour une définition vide.
    pub fn parse(definition: &str) -> Option<Self> {
        let trimmed = definition.trim().trim_start_matches('\u{feff}');
        if trimmed.is_empty() {
            return None;
        }

        if let Some(caps) = epsg_code_regex().captures(trimmed) {
            let code = caps[1].parse().ok()?;
            return Some(Self::from_epsg(code));
        }

        // WKT1: l'autorité de la racine est la dernière du texte
        let epsg = wkt_authority_regex()
            .captures_iter(trimmed)
            .last()
            .and_then(|caps| caps[1].parse().ok());

        Some(Self {
            definition: trimmed.to_string(),
            epsg,
        })
    }

    /// Définition transmise à PROJ
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Code EPSG si connu
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Vrai si la définition est un WKT complet (écrit dans les `.prj`)
    pub fn is_wkt(&self) -> bool {
        wkt_name_regex().is_match(&self.definition)
    }

    /// Complète le code EPSG d'une définition WKT qui n'en porte pas
    pub fn with_epsg(mut self, code: u32) -> Self {
        self.epsg.get_or_insert(code);
        self
    }

    /// Vrai si le SCR est géographique (unités en degrés)
    ///
    /// Le mot-clé racine du WKT fait foi; la liste des codes EPSG ne sert
    /// que pour les définitions `EPSG:n`.
    pub fn is_geographic(&self) -> bool {
        if let Some(caps) = wkt_name_regex().captures(&self.definition) {
            let keyword = caps[1].to_ascii_uppercase();
            return GEOGRAPHIC_WKT_KEYWORDS.contains(&keyword.as_str());
        }
        self.epsg
            .map(|code| GEOGRAPHIC_EPSG.contains(&code))
            .unwrap_or(false)
    }

    fn normalized(&self) -> String {
        self.definition
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase()
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        match (self.epsg, other.epsg) {
            (Some(a), Some(b)) => a == b,
            _ => self.normalized() == other.normalized(),
        }
    }
}

impl Eq for Crs {}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.epsg {
            return write!(f, "EPSG:{}", code);
        }
        match wkt_name_regex().captures(&self.definition) {
            Some(caps) => write!(f, "{}[\"{}\"]", &caps[1], &caps[2]),
            None => f.write_str(&self.definition),
        }
    }
}

/// Feature brute telle que lue depuis un fichier
#[derive(Debug, Clone)]
pub struct RawFeature {
    /// Identifiant de la feature (index d'enregistrement ou clé primaire)
    pub id: String,

    /// Géométrie, absente pour les enregistrements nuls
    pub geometry: Option<Geometry>,

    /// Attributs convertis en texte (clé -> valeur)
    pub properties: BTreeMap<String, String>,
}

/// Couche brute (features + SCR éventuel)
#[derive(Debug, Clone, Default)]
pub struct RawLayer {
    pub features: Vec<RawFeature>,
    pub crs: Option<Crs>,
}

/// Feature après réparation: géométrie non vide garantie
#[derive(Debug, Clone)]
pub struct Feature {
    pub id: String,
    pub geometry: Geometry,
    pub properties: BTreeMap<String, String>,
}

/// Couche réparée
#[derive(Debug, Clone, Default)]
pub struct Layer {
    pub features: Vec<Feature>,
    pub crs: Option<Crs>,
}

/// Feature surfacique (après filtrage des types de géométrie)
#[derive(Debug, Clone)]
pub struct PolygonFeature {
    pub id: String,
    pub geometry: MultiPolygon,
    pub properties: BTreeMap<String, String>,
}

/// Feature de l'emprise d'aménagement
#[derive(Debug, Clone)]
pub struct DevelopmentFeature {
    pub id: String,
    pub geometry: MultiPolygon,
}

impl From<PolygonFeature> for DevelopmentFeature {
    fn from(feature: PolygonFeature) -> Self {
        Self {
            id: feature.id,
            geometry: feature.geometry,
        }
    }
}

/// Convertit une géométrie en multipolygone si elle est surfacique
///
/// Les collections gardent uniquement leurs membres surfaciques (résultats
/// de réparation). Les points et lignes retournent `None`.
pub fn into_polygonal(geometry: Geometry) -> Option<MultiPolygon> {
    match geometry {
        Geometry::Polygon(polygon) => Some(MultiPolygon::new(vec![polygon])),
        Geometry::MultiPolygon(multi) => Some(multi),
        Geometry::Rect(rect) => Some(MultiPolygon::new(vec![rect.to_polygon()])),
        Geometry::Triangle(triangle) => Some(MultiPolygon::new(vec![triangle.to_polygon()])),
        Geometry::GeometryCollection(collection) => {
            let polygons: Vec<_> = collection
                .0
                .into_iter()
                .filter_map(into_polygonal)
                .flat_map(|multi| multi.0)
                .collect();
            if polygons.is_empty() {
                None
            } else {
                Some(MultiPolygon::new(polygons))
            }
        }
        _ => None,
    }
}

//! Reprojection de géométries avec PROJ
//!
//! La reprojection effective nécessite le feature `reproject`. Sans lui,
//! seule la transformation identité est possible.

use geo::Geometry;
#[cfg(feature = "reproject")]
use geo::{Coord, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
#[cfg(feature = "reproject")]
use proj::Proj;

use crate::types::Crs;
use crate::LossError;

/// Reprojection de géométries entre deux SCR
pub struct Reprojector {
    #[cfg(feature = "reproject")]
    proj: Option<Proj>,
    #[cfg(feature = "reproject")]
    source: Crs,
    #[cfg(feature = "reproject")]
    target: Crs,
}

impl Reprojector {
    /// Crée un reprojector entre deux SCR (`EPSG:n` ou WKT)
    pub fn new(source: &Crs, target: &Crs) -> Result<Self, LossError> {
        if source == target {
            return Ok(Self::identity(source, target));
        }
        Self::create(source, target)
    }
}

#[cfg(not(feature = "reproject"))]
impl Reprojector {
    fn identity(_source: &Crs, _target: &Crs) -> Self {
        Self {}
    }

    fn create(source: &Crs, target: &Crs) -> Result<Self, LossError> {
        Err(reprojection_error(
            source,
            target,
            "requires the 'reproject' feature (build with: cargo build --features reproject)",
        ))
    }

    /// Transforme une géométrie (identité sans le feature `reproject`)
    pub fn transform_geometry(&self, geom: &Geometry) -> Result<Geometry, LossError> {
        Ok(geom.clone())
    }
}

#[cfg(feature = "reproject")]
impl Reprojector {
    fn identity(source: &Crs, target: &Crs) -> Self {
        Self {
            proj: None,
            source: source.clone(),
            target: target.clone(),
        }
    }

    fn create(source: &Crs, target: &Crs) -> Result<Self, LossError> {
        let proj = Proj::new_known_crs(source.definition(), target.definition(), None)
            .map_err(|e| reprojection_error(source, target, e))?;
        Ok(Self {
            proj: Some(proj),
            source: source.clone(),
            target: target.clone(),
        })
    }

    /// Transforme une géométrie
    pub fn transform_geometry(&self, geom: &Geometry) -> Result<Geometry, LossError> {
        match &self.proj {
            Some(proj) => self.transform_with(proj, geom),
            None => Ok(geom.clone()),
        }
    }

    fn transform_with(&self, proj: &Proj, geom: &Geometry) -> Result<Geometry, LossError> {
        match geom {
            Geometry::Point(p) => {
                let (x, y) = proj
                    .convert((p.x(), p.y()))
                    .map_err(|e| reprojection_error(&self.source, &self.target, e))?;
                Ok(Geometry::Point(Point::new(x, y)))
            }
            Geometry::LineString(ls) => Ok(Geometry::LineString(self.transform_linestring(proj, ls)?)),
            Geometry::Polygon(p) => Ok(Geometry::Polygon(self.transform_polygon(proj, p)?)),
            Geometry::MultiPoint(mp) => {
                let line = self.transform_linestring(proj, &LineString::from(mp.0.clone()))?;
                Ok(Geometry::MultiPoint(MultiPoint::new(
                    line.0.into_iter().map(Point::from).collect(),
                )))
            }
            Geometry::MultiLineString(mls) => {
                let lines: Result<Vec<LineString>, LossError> = mls
                    .0
                    .iter()
                    .map(|ls| self.transform_linestring(proj, ls))
                    .collect();
                Ok(Geometry::MultiLineString(MultiLineString::new(lines?)))
            }
            Geometry::MultiPolygon(mp) => {
                let polys: Result<Vec<Polygon>, LossError> =
                    mp.0.iter().map(|p| self.transform_polygon(proj, p)).collect();
                Ok(Geometry::MultiPolygon(MultiPolygon::new(polys?)))
            }
            Geometry::GeometryCollection(gc) => {
                let members: Result<Vec<Geometry>, LossError> =
                    gc.0.iter().map(|g| self.transform_with(proj, g)).collect();
                Ok(Geometry::GeometryCollection(GeometryCollection::new_from(members?)))
            }
            Geometry::Rect(r) => self.transform_with(proj, &Geometry::Polygon(r.to_polygon())),
            Geometry::Triangle(t) => self.transform_with(proj, &Geometry::Polygon(t.to_polygon())),
            Geometry::Line(l) => {
                self.transform_with(proj, &Geometry::LineString(LineString::new(vec![l.start, l.end])))
            }
        }
    }

    /// Transforme une LineString (conversion par lot)
    fn transform_linestring(&self, proj: &Proj, ls: &LineString) -> Result<LineString, LossError> {
        let mut coords: Vec<(f64, f64)> = ls.0.iter().map(|c| (c.x, c.y)).collect();
        proj.convert_array(&mut coords)
            .map_err(|e| reprojection_error(&self.source, &self.target, e))?;
        Ok(LineString::new(
            coords.into_iter().map(|(x, y)| Coord { x, y }).collect(),
        ))
    }

    fn transform_polygon(&self, proj: &Proj, p: &Polygon) -> Result<Polygon, LossError> {
        let exterior = self.transform_linestring(proj, p.exterior())?;
        let interiors: Result<Vec<LineString>, LossError> = p
            .interiors()
            .iter()
            .map(|ls| self.transform_linestring(proj, ls))
            .collect();
        Ok(Polygon::new(exterior, interiors?))
    }
}

fn reprojection_error(source: &Crs, target: &Crs, reason: impl std::fmt::Display) -> LossError {
    LossError::Reprojection {
        from: source.to_string(),
        to: target.to_string(),
        reason: reason.to_string(),
    }
}

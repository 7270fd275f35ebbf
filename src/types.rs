use crate::crs::Crs;
use geo::{MultiPolygon, Point};

/// An administrative unit: identifier, hierarchy names, boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    pub id: String,
    // Values of the configured name columns, in configured order.
    pub names: Vec<String>,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildingPoint {
    pub point: Point<f64>,
}

impl BuildingPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { point: Point::new(x, y) }
    }
}

/// A building point claimed by the area (by index) that strictly contains it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssignedPoint {
    pub area: usize,
    pub point: Point<f64>,
}

/// A feature collection tagged with the CRS its coordinates are expressed in.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer<T> {
    pub name: String,
    pub crs: Option<Crs>,
    pub features: Vec<T>,
}

impl<T> Layer<T> {
    pub fn new(name: impl Into<String>, crs: Option<Crs>, features: Vec<T>) -> Self {
        Self {
            name: name.into(),
            crs,
            features,
        }
    }
}

/// How an area's representative coordinate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CenterSource {
    MeanCenter { points: usize },
    InteriorPoint,
}

/// One output row: the representative WGS84 coordinate of an area.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaCenter {
    pub id: String,
    pub names: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub source: CenterSource,
}

impl AreaCenter {
    pub fn is_fallback(&self) -> bool {
        self.source == CenterSource::InteriorPoint
    }
}

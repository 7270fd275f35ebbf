//! Coordinate reference system identifiers and their projection definitions.
//!
//! A [`Crs`] is either an EPSG code with a built-in definition or a raw
//! proj string. [`Transformer`] wraps a pair of `proj4rs` projections and
//! works in degrees for geographic systems (the library itself expects
//! radians).

use crate::error::{CenterError, Result};
use geo::Coord;
use proj4rs::proj::Proj;
use std::fmt;
use std::str::FromStr;

const WGS84_CODE: u32 = 4326;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Crs {
    Epsg(u32),
    Proj(String),
}

impl Crs {
    /// The GPS geographic system: longitude/latitude in degrees.
    pub fn wgs84() -> Self {
        Crs::Epsg(WGS84_CODE)
    }

    pub fn is_geographic(&self) -> bool {
        match self {
            Crs::Epsg(code) => matches!(code, 4326 | 4269 | 4755),
            Crs::Proj(def) => def.split_whitespace().any(|token| {
                matches!(
                    token,
                    "+proj=longlat" | "+proj=latlong" | "+proj=lonlat" | "+proj=latlon"
                )
            }),
        }
    }

    /// The proj definition string for this CRS.
    pub fn proj_string(&self) -> Result<String> {
        match self {
            Crs::Proj(def) => Ok(def.clone()),
            Crs::Epsg(4326) => Ok("+proj=longlat +datum=WGS84 +no_defs".to_string()),
            Crs::Epsg(4269) => {
                Ok("+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs".to_string())
            }
            // DGN95, the Indonesian national datum; WGS84 ellipsoid, no shift.
            Crs::Epsg(4755) => {
                Ok("+proj=longlat +ellps=WGS84 +towgs84=0,0,0,0,0,0,0 +no_defs".to_string())
            }
            Crs::Epsg(3857 | 900913) => Ok(concat!(
                "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0",
                " +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
            )
            .to_string()),
            Crs::Epsg(code @ 32601..=32660) => Ok(format!(
                "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
                code - 32600
            )),
            Crs::Epsg(code @ 32701..=32760) => Ok(format!(
                "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
                code - 32700
            )),
            Crs::Epsg(code) => Err(CenterError::UnrecognizedCrs(format!("EPSG:{code}"))),
        }
    }

    /// Parse the `crs` member of a legacy GeoJSON document.
    ///
    /// Only the `name` form is supported; `link` CRSs are not resolvable offline.
    pub fn from_geojson_member(member: &serde_json::Value) -> Result<Self> {
        let name = member
            .get("properties")
            .and_then(|props| props.get("name"))
            .and_then(|name| name.as_str())
            .ok_or_else(|| CenterError::UnrecognizedCrs(member.to_string()))?;
        name.parse()
    }

    /// Recognize the CRS described by a shapefile `.prj` (ESRI WKT).
    ///
    /// Only WGS84 geographic and WGS84 / UTM are detected; anything else
    /// returns `None` and must be declared in the configuration.
    pub fn from_esri_wkt(wkt: &str) -> Option<Self> {
        let normalized = wkt.replace(' ', "_").to_ascii_uppercase();
        if !normalized.contains("WGS_1984") && !normalized.contains("WGS_84") {
            return None;
        }
        if !normalized.starts_with("PROJCS") {
            return normalized.starts_with("GEOGCS").then(Crs::wgs84);
        }

        let zone_start = normalized.find("UTM_ZONE_")? + "UTM_ZONE_".len();
        let rest = &normalized[zone_start..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        let zone: u32 = digits.parse().ok()?;
        if !(1..=60).contains(&zone) {
            return None;
        }
        match rest[digits.len()..].chars().next() {
            Some('N') => Some(Crs::Epsg(32600 + zone)),
            Some('S') => Some(Crs::Epsg(32700 + zone)),
            _ => None,
        }
    }
}

impl FromStr for Crs {
    type Err = CenterError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.starts_with("+proj=") {
            return Ok(Crs::Proj(trimmed.to_string()));
        }

        let upper = trimmed.to_ascii_uppercase();
        if upper == "CRS84" || upper.ends_with(":CRS84") {
            return Ok(Crs::wgs84());
        }

        // EPSG:4326, urn:ogc:def:crs:EPSG::4326, urn:ogc:def:crs:EPSG:6.6:4326, 4326
        let code = if upper.contains("EPSG") {
            upper.rsplit(':').next()
        } else {
            Some(upper.as_str())
        };
        code.and_then(|c| c.parse::<u32>().ok())
            .map(Crs::Epsg)
            .ok_or_else(|| CenterError::UnrecognizedCrs(trimmed.to_string()))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{code}"),
            Crs::Proj(def) => f.write_str(def),
        }
    }
}

/// A resolved CRS-to-CRS coordinate transform.
pub struct Transformer {
    from: Proj,
    to: Proj,
    from_geographic: bool,
    to_geographic: bool,
}

impl Transformer {
    pub fn new(from: &Crs, to: &Crs) -> Result<Self> {
        Ok(Self {
            from: resolve(from)?,
            to: resolve(to)?,
            from_geographic: from.is_geographic(),
            to_geographic: to.is_geographic(),
        })
    }

    pub fn coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let mut point = if self.from_geographic {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };

        proj4rs::transform::transform(&self.from, &self.to, &mut point).map_err(|e| {
            CenterError::Projection {
                x: coord.x,
                y: coord.y,
                reason: format!("{e:?}"),
            }
        })?;

        let (x, y, _) = point;
        if self.to_geographic {
            Ok(Coord {
                x: x.to_degrees(),
                y: y.to_degrees(),
            })
        } else {
            Ok(Coord { x, y })
        }
    }
}

fn resolve(crs: &Crs) -> Result<Proj> {
    let definition = crs.proj_string()?;
    Proj::from_proj_string(&definition).map_err(|e| CenterError::UnsupportedProjection {
        crs: crs.to_string(),
        reason: format!("{e:?}"),
    })
}

use crate::config::InputConfig;
use crate::crs::Crs;
use crate::error::CenterError;
use crate::types::{Area, BuildingPoint, Layer};
use anyhow::{Context, Result, anyhow};
use geo::MultiPolygon;
use geojson::{FeatureCollection, GeoJson, JsonObject};
use shapefile::Reader;
use shapefile::dbase::{FieldValue, Record};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Shapefile,
    GeoJson,
}

fn detect_format(path: &Path) -> Result<Format> {
    let extension = path.extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input geometry file has no extension: {:?}", path))?;

    match extension.as_str() {
        "shp" => Ok(Format::Shapefile),
        "json" | "geojson" => Ok(Format::GeoJson),
        _ => Err(anyhow!("Unsupported geometry format: {}", extension)),
    }
}

fn crs_override(value: Option<&str>) -> Result<Option<Crs>> {
    value
        .map(|s| s.parse::<Crs>().context("Invalid CRS override in configuration"))
        .transpose()
}

/// Final CRS of a layer: the configured override wins over what the file declares.
///
/// The `.prj` sidecar of a shapefile is only consulted without an override.
fn resolve_crs(format: Format, path: &Path, declared: Option<Crs>, override_value: Option<&str>) -> Result<Option<Crs>> {
    if let Some(crs) = crs_override(override_value)? {
        return Ok(Some(crs));
    }
    Ok(match format {
        Format::Shapefile => shapefile_crs(path),
        Format::GeoJson => declared,
    })
}

pub fn load_areas(config: &InputConfig) -> Result<Layer<Area>> {
    let path = &config.areas;
    let format = detect_format(path)?;
    let mut layer = match format {
        Format::Shapefile => load_shapefile_areas(path, config)?,
        Format::GeoJson => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
            read_geojson_areas(BufReader::new(file), config)?
        }
    };
    layer.crs = resolve_crs(format, path, layer.crs.take(), config.areas_crs.as_deref())?;

    info!(areas = layer.features.len(), crs = ?layer.crs, "loaded area layer from {:?}", path);
    Ok(layer)
}

pub fn load_points(config: &InputConfig) -> Result<Layer<BuildingPoint>> {
    let path = &config.points;
    let format = detect_format(path)?;
    let mut layer = match format {
        Format::Shapefile => load_shapefile_points(path)?,
        Format::GeoJson => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
            read_geojson_points(BufReader::new(file))?
        }
    };
    layer.crs = resolve_crs(format, path, layer.crs.take(), config.points_crs.as_deref())?;

    info!(points = layer.features.len(), crs = ?layer.crs, "loaded building layer from {:?}", path);
    Ok(layer)
}

fn read_collection<R: Read>(reader: R) -> Result<FeatureCollection> {
    // Parse the GeoJSON. warning: this loads the whole file into memory.
    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        _ => Err(anyhow!("GeoJSON must be a FeatureCollection")),
    }
}

/// The CRS a GeoJSON collection declares.
///
/// Without a legacy `crs` member, RFC 7946 fixes the CRS to WGS84.
fn collection_crs(collection: &FeatureCollection) -> Result<Option<Crs>> {
    match collection.foreign_members.as_ref().and_then(|members| members.get("crs")) {
        Some(serde_json::Value::Null) | None => Ok(Some(Crs::wgs84())),
        Some(member) => Ok(Some(Crs::from_geojson_member(member)?)),
    }
}

fn json_to_string(value: Option<&serde_json::Value>) -> Option<String> {
    match value {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn area_attributes(
    props: Option<&JsonObject>,
    config: &InputConfig,
    feature: usize,
) -> Result<(String, Vec<String>)> {
    let id = json_to_string(props.and_then(|p| p.get(&config.id_column)))
        .ok_or_else(|| CenterError::MissingColumn {
            column: config.id_column.clone(),
            feature,
        })?;
    let names = config.name_columns.iter()
        .map(|column| json_to_string(props.and_then(|p| p.get(column))).unwrap_or_default())
        .collect();
    Ok((id, names))
}

pub fn read_geojson_areas<R: Read>(reader: R, config: &InputConfig) -> Result<Layer<Area>> {
    let collection = read_collection(reader)?;
    let crs = collection_crs(&collection)?;

    let mut areas = Vec::new();

    for (index, feature) in collection.features.into_iter().enumerate() {
        let (id, names) = area_attributes(feature.properties.as_ref(), config, index)?;

        let found = match feature.geometry {
            Some(geo) => {
                let valid_geo: geo::Geometry<f64> = geo.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry of area '{}': {:?}", id, e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => Ok(mp),
                    geo::Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p])),
                    other => Err(geometry_kind(&other)),
                }
            },
            None => Err("null"),
        };
        let geometry = found.map_err(|kind| CenterError::NonPolygonArea {
            id: id.clone(),
            feature: index,
            found: kind.to_string(),
        })?;

        areas.push(Area { id, names, geometry });
    }

    Ok(Layer::new("areas", crs, areas))
}

fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        _ => "unsupported geometry",
    }
}

pub fn read_geojson_points<R: Read>(reader: R) -> Result<Layer<BuildingPoint>> {
    let collection = read_collection(reader)?;
    let crs = collection_crs(&collection)?;

    let mut points = Vec::new();

    for feature in collection.features {
        let Some(geometry) = feature.geometry else { continue };
        let geo_geom: geo::Geometry<f64> = geometry.value.try_into()
            .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

        match geo_geom {
            geo::Geometry::Point(point) => points.push(BuildingPoint { point }),
            geo::Geometry::MultiPoint(mp) => {
                points.extend(mp.into_iter().map(|point| BuildingPoint { point }));
            },
            _ => debug!("skipping non-point building feature"),
        }
    }

    Ok(Layer::new("buildings", crs, points))
}

/// CRS declared by the `.prj` sidecar of a shapefile, if recognizable.
fn shapefile_crs(path: &Path) -> Option<Crs> {
    let prj = path.with_extension("prj");
    let wkt = fs::read_to_string(&prj).ok()?;
    let crs = Crs::from_esri_wkt(&wkt);
    if crs.is_none() {
        warn!("Unrecognized projection in {:?}; declare it in the configuration", prj);
    }
    crs
}

fn field_to_string(value: Option<&FieldValue>) -> Option<String> {
    match value? {
        FieldValue::Character(Some(s)) => Some(s.trim().to_string()),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) => Some(number_to_string(*n)),
        FieldValue::Float(Some(f)) => Some(number_to_string(f64::from(*f))),
        FieldValue::Integer(i) => Some(i.to_string()),
        _ => None,
    }
}

fn number_to_string(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn record_attributes(record: &Record, config: &InputConfig, feature: usize) -> Result<(String, Vec<String>)> {
    let id = field_to_string(record.get(&config.id_column))
        .ok_or_else(|| CenterError::MissingColumn {
            column: config.id_column.clone(),
            feature,
        })?;
    let names = config.name_columns.iter()
        .map(|column| field_to_string(record.get(column)).unwrap_or_default())
        .collect();
    Ok((id, names))
}

fn load_shapefile_areas(path: &Path, config: &InputConfig) -> Result<Layer<Area>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut areas = Vec::new();

    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result?;
        let (id, names) = record_attributes(&record, config, index)?;

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            other => {
                return Err(CenterError::NonPolygonArea {
                    id,
                    feature: index,
                    found: format!("{:?}", other.shapetype()),
                }.into());
            }
        };

        areas.push(Area { id, names, geometry });
    }

    // CRS comes from the .prj sidecar, see resolve_crs.
    Ok(Layer::new("areas", None, areas))
}

fn load_shapefile_points(path: &Path) -> Result<Layer<BuildingPoint>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut points = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, _record) = result?;
        match shape {
            shapefile::Shape::Point(p) => points.push(BuildingPoint::new(p.x, p.y)),
            shapefile::Shape::PointM(p) => points.push(BuildingPoint::new(p.x, p.y)),
            shapefile::Shape::PointZ(p) => points.push(BuildingPoint::new(p.x, p.y)),
            shapefile::Shape::Multipoint(mp) => {
                points.extend(mp.points().iter().map(|p| BuildingPoint::new(p.x, p.y)));
            },
            _ => debug!("skipping non-point shape"),
        }
    }

    Ok(Layer::new("buildings", None, points))
}

//! Coordinate normalization: bring both input layers into EPSG:4326.

use crate::crs::{Crs, Transformer};
use crate::error::{CenterError, Result};
use crate::types::{Area, BuildingPoint, Layer};
use geo::MapCoords;
use tracing::{debug, info};

/// Features whose coordinates can be pushed through a [`Transformer`].
pub trait Reproject: Sized {
    fn reproject(&self, transformer: &Transformer) -> Result<Self>;
}

impl Reproject for Area {
    fn reproject(&self, transformer: &Transformer) -> Result<Self> {
        let geometry = self
            .geometry
            .try_map_coords(|coord| transformer.coord(coord))?;
        Ok(Area {
            id: self.id.clone(),
            names: self.names.clone(),
            geometry,
        })
    }
}

impl Reproject for BuildingPoint {
    fn reproject(&self, transformer: &Transformer) -> Result<Self> {
        Ok(BuildingPoint {
            point: transformer.coord(self.point.0)?.into(),
        })
    }
}

/// Reproject a layer into `to`, returning a transformed copy.
///
/// A layer already in `to` is cloned without touching a single coordinate.
pub fn reproject<T: Reproject + Clone>(layer: &Layer<T>, to: &Crs) -> Result<Layer<T>> {
    let from = layer.crs.as_ref().ok_or_else(|| CenterError::UnknownCrs {
        layer: layer.name.clone(),
    })?;

    if from == to {
        debug!(layer = %layer.name, crs = %from, "layer already in target CRS");
        return Ok(layer.clone());
    }

    info!(
        layer = %layer.name,
        from = %from,
        to = %to,
        features = layer.features.len(),
        "reprojecting layer"
    );
    let transformer = Transformer::new(from, to)?;
    let features = layer
        .features
        .iter()
        .map(|feature| feature.reproject(&transformer))
        .collect::<Result<Vec<_>>>()?;

    Ok(Layer {
        name: layer.name.clone(),
        crs: Some(to.clone()),
        features,
    })
}

/// Both input layers expressed in WGS84 longitude/latitude.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub areas: Layer<Area>,
    pub points: Layer<BuildingPoint>,
}

pub fn normalize(areas: &Layer<Area>, points: &Layer<BuildingPoint>) -> Result<Normalized> {
    let target = Crs::wgs84();
    Ok(Normalized {
        areas: reproject(areas, &target)?,
        points: reproject(points, &target)?,
    })
}

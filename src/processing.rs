//! Mean-center aggregation with interior-point fallback.
//!
//! Every building point is assigned to the area that strictly contains it
//! (boundary points belong to no area). Areas with at least one assigned
//! point are represented by the arithmetic mean of those points; areas
//! with none fall back to [`InteriorPoint`], which always lies inside the
//! boundary, unlike the polygon centroid.
//!
//! Candidate areas are found through an R-tree of bounding boxes, so the
//! join stays sub-quadratic. When overlapping input lets several areas
//! contain the same point, the area with the lowest identifier claims it.

use crate::error::{CenterError, Result};
use crate::types::{Area, AreaCenter, AssignedPoint, BuildingPoint, CenterSource};
use geo::{BoundingRect, Contains, InteriorPoint, Point};
use rstar::{RTree, RTreeObject, AABB};
use std::collections::HashSet;
use tracing::{info, warn};

// Bounding box of one area, indexed in the R-tree.
struct AreaEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for AreaEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

fn build_index(areas: &[Area]) -> RTree<AreaEnvelope> {
    let items: Vec<AreaEnvelope> = areas.iter().enumerate().filter_map(|(index, area)| {
        // Empty geometries have no bounding box and can contain nothing.
        let rect = area.geometry.bounding_rect()?;
        Some(AreaEnvelope {
            index,
            aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
        })
    }).collect();

    RTree::bulk_load(items)
}

/// Outcome of the containment join.
#[derive(Debug, Default)]
pub struct Join {
    pub assigned: Vec<AssignedPoint>,
    pub unassigned: usize,
    // Points strictly inside more than one area.
    pub ambiguous: usize,
}

/// Assign each point to the area that strictly contains it.
pub fn assign_points(areas: &[Area], points: &[BuildingPoint]) -> Join {
    let tree = build_index(areas);
    let mut join = Join::default();

    for building in points {
        let point = building.point;
        let envelope = AABB::from_point([point.x(), point.y()]);

        let mut containing = tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|candidate| candidate.index)
            .filter(|&index| areas[index].geometry.contains(&point));

        let Some(first) = containing.next() else {
            join.unassigned += 1;
            continue;
        };

        let mut claimed = first;
        let mut overlaps = false;
        for other in containing {
            overlaps = true;
            if areas[other].id < areas[claimed].id {
                claimed = other;
            }
        }
        if overlaps {
            join.ambiguous += 1;
        }

        join.assigned.push(AssignedPoint { area: claimed, point });
    }

    join
}

/// Result of one aggregation run.
#[derive(Debug)]
pub struct Aggregation {
    /// One center per input area, in input order.
    pub centers: Vec<AreaCenter>,
    pub assigned_points: usize,
    pub unassigned_points: usize,
    pub ambiguous_points: usize,
}

impl Aggregation {
    pub fn mean_center_areas(&self) -> usize {
        self.centers.iter().filter(|c| !c.is_fallback()).count()
    }

    pub fn fallback_areas(&self) -> usize {
        self.centers.iter().filter(|c| c.is_fallback()).count()
    }

    /// No area received a single building point.
    ///
    /// Usually means the two layers cover different regions or one of them
    /// declared the wrong CRS.
    pub fn is_empty_join(&self) -> bool {
        self.mean_center_areas() == 0
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    sum_x: f64,
    sum_y: f64,
    count: usize,
}

fn check_unique_ids(areas: &[Area]) -> Result<()> {
    let mut seen = HashSet::with_capacity(areas.len());
    for area in areas {
        if !seen.insert(area.id.as_str()) {
            return Err(CenterError::DuplicateAreaId(area.id.clone()));
        }
    }
    Ok(())
}

fn center_for(area: &Area, acc: Accumulator) -> Result<AreaCenter> {
    let (location, source) = if acc.count > 0 {
        let n = acc.count as f64;
        (
            Point::new(acc.sum_x / n, acc.sum_y / n),
            CenterSource::MeanCenter { points: acc.count },
        )
    } else {
        let interior = area
            .geometry
            .interior_point()
            .ok_or_else(|| CenterError::EmptyGeometry(area.id.clone()))?;
        (interior, CenterSource::InteriorPoint)
    };

    Ok(AreaCenter {
        id: area.id.clone(),
        names: area.names.clone(),
        latitude: location.y(),
        longitude: location.x(),
        source,
    })
}

/// Compute one representative coordinate per area.
///
/// Both slices must already be in the same geographic CRS.
pub fn aggregate(areas: &[Area], points: &[BuildingPoint]) -> Result<Aggregation> {
    check_unique_ids(areas)?;
    info!("Aggregating {} building points into {} areas...", points.len(), areas.len());

    let join = assign_points(areas, points);

    let mut accumulators = vec![Accumulator::default(); areas.len()];
    for assigned in &join.assigned {
        let acc = &mut accumulators[assigned.area];
        acc.sum_x += assigned.point.x();
        acc.sum_y += assigned.point.y();
        acc.count += 1;
    }

    let centers = areas.iter()
        .zip(accumulators)
        .map(|(area, acc)| center_for(area, acc))
        .collect::<Result<Vec<_>>>()?;

    let aggregation = Aggregation {
        centers,
        assigned_points: join.assigned.len(),
        unassigned_points: join.unassigned,
        ambiguous_points: join.ambiguous,
    };

    info!(
        assigned = aggregation.assigned_points,
        unassigned = aggregation.unassigned_points,
        mean_center_areas = aggregation.mean_center_areas(),
        fallback_areas = aggregation.fallback_areas(),
        "aggregation finished"
    );
    if aggregation.ambiguous_points > 0 {
        warn!(
            points = aggregation.ambiguous_points,
            "points fall inside overlapping areas; the lowest area id claimed them"
        );
    }
    if aggregation.is_empty_join() && !areas.is_empty() {
        warn!("no building point fell inside any area; every center is an interior-point fallback");
    }

    Ok(aggregation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon, Polygon};

    fn square(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
        polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ]
    }

    fn area(id: &str, polygon: Polygon<f64>) -> Area {
        Area {
            id: id.to_string(),
            names: vec![format!("Desa {id}"), format!("SLS {id}")],
            geometry: MultiPolygon::new(vec![polygon]),
        }
    }

    fn points(coords: &[(f64, f64)]) -> Vec<BuildingPoint> {
        coords.iter().map(|&(x, y)| BuildingPoint::new(x, y)).collect()
    }

    #[test]
    fn test_mean_center() {
        let areas = vec![area("a", square(0.0, 0.0, 4.0))];
        let result = aggregate(&areas, &points(&[(3.0, 3.0), (1.0, 1.0), (2.0, 2.0)])).unwrap();

        let center = &result.centers[0];
        assert_eq!(center.longitude, 2.0);
        assert_eq!(center.latitude, 2.0);
        assert_eq!(center.source, CenterSource::MeanCenter { points: 3 });
        assert_eq!(center.names, vec!["Desa a", "SLS a"]);
    }

    #[test]
    fn test_single_point_regardless_of_shape() {
        let l_shape: Polygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 30.0, y: 0.0),
            (x: 30.0, y: 5.0),
            (x: 5.0, y: 5.0),
            (x: 5.0, y: 30.0),
            (x: 0.0, y: 30.0),
            (x: 0.0, y: 0.0),
        ];
        let areas = vec![area("l", l_shape)];
        let result = aggregate(&areas, &points(&[(2.0, 20.0)])).unwrap();
        assert_eq!((result.centers[0].longitude, result.centers[0].latitude), (2.0, 20.0));

        let areas = vec![area("sq", square(0.0, 0.0, 50.0))];
        let result = aggregate(&areas, &points(&[(10.0, 20.0)])).unwrap();
        assert_eq!((result.centers[0].longitude, result.centers[0].latitude), (10.0, 20.0));
    }

    #[test]
    fn test_empty_join_uses_interior_points() {
        let areas = vec![
            area("a", square(0.0, 0.0, 1.0)),
            area("b", square(10.0, 0.0, 1.0)),
            area("c", square(20.0, 0.0, 1.0)),
        ];
        let outside = points(&[(5.0, 5.0), (-3.0, 0.5), (100.0, 100.0)]);

        let result = aggregate(&areas, &outside).unwrap();

        assert!(result.is_empty_join());
        assert_eq!(result.centers.len(), 3);
        assert_eq!(result.fallback_areas(), 3);
        assert_eq!(result.unassigned_points, 3);
        for (center, area) in result.centers.iter().zip(&areas) {
            assert!(center.is_fallback());
            assert!(area.geometry.contains(&Point::new(center.longitude, center.latitude)));
        }
    }

    #[test]
    fn test_fallback_inside_concave_area() {
        // A U shape whose centroid lies in the notch, outside the polygon.
        let u_shape: Polygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 8.0, y: 10.0),
            (x: 8.0, y: 2.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ];
        let areas = vec![area("u", u_shape)];
        let result = aggregate(&areas, &[]).unwrap();

        let center = &result.centers[0];
        assert!(areas[0].geometry.contains(&Point::new(center.longitude, center.latitude)));
    }

    #[test]
    fn test_coverage_and_order() {
        let areas = vec![
            area("z", square(0.0, 0.0, 1.0)),
            area("m", square(2.0, 0.0, 1.0)),
            area("a", square(4.0, 0.0, 1.0)),
            area("q", square(6.0, 0.0, 1.0)),
        ];
        let result = aggregate(&areas, &points(&[(4.5, 0.5), (0.25, 0.25), (0.75, 0.75)])).unwrap();

        let ids: Vec<&str> = result.centers.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "m", "a", "q"]);
        assert_eq!(result.centers[0].source, CenterSource::MeanCenter { points: 2 });
        assert_eq!(result.centers[1].source, CenterSource::InteriorPoint);
        assert_eq!(result.centers[2].source, CenterSource::MeanCenter { points: 1 });
        assert_eq!(result.centers[3].source, CenterSource::InteriorPoint);
        assert!(!result.is_empty_join());
        assert_eq!(result.mean_center_areas(), 2);
    }

    #[test]
    fn test_boundary_points_are_dropped() {
        let areas = vec![area("a", square(0.0, 0.0, 2.0)), area("b", square(2.0, 0.0, 2.0))];
        let result = aggregate(&areas, &points(&[(2.0, 1.0), (0.0, 0.0), (1.0, 1.0)])).unwrap();

        assert_eq!(result.assigned_points, 1);
        assert_eq!(result.unassigned_points, 2);
        assert_eq!(result.centers[0].source, CenterSource::MeanCenter { points: 1 });
        assert_eq!(result.centers[1].source, CenterSource::InteriorPoint);
    }

    #[test]
    fn test_overlap_goes_to_lowest_id() {
        let areas = vec![
            area("b-200", square(0.0, 0.0, 10.0)),
            area("a-100", square(5.0, 5.0, 10.0)),
        ];
        let result = aggregate(&areas, &points(&[(7.0, 7.0), (1.0, 1.0)])).unwrap();

        assert_eq!(result.ambiguous_points, 1);
        assert_eq!(result.centers[0].source, CenterSource::MeanCenter { points: 1 });
        assert_eq!((result.centers[0].longitude, result.centers[0].latitude), (1.0, 1.0));
        assert_eq!(result.centers[1].source, CenterSource::MeanCenter { points: 1 });
        assert_eq!((result.centers[1].longitude, result.centers[1].latitude), (7.0, 7.0));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let areas = vec![area("a", square(0.0, 0.0, 1.0)), area("a", square(2.0, 0.0, 1.0))];
        assert!(matches!(
            aggregate(&areas, &[]),
            Err(CenterError::DuplicateAreaId(id)) if id == "a"
        ));
    }

    #[test]
    fn test_empty_geometry_has_no_fallback() {
        let areas = vec![Area {
            id: "void".to_string(),
            names: vec![],
            geometry: MultiPolygon::new(vec![]),
        }];
        assert!(matches!(
            aggregate(&areas, &points(&[(0.0, 0.0)])),
            Err(CenterError::EmptyGeometry(id)) if id == "void"
        ));
    }

    #[test]
    fn test_idempotent() {
        let areas = vec![area("a", square(0.0, 0.0, 1.0)), area("b", square(3.0, 3.0, 1.0))];
        let pts = points(&[(0.1, 0.7), (0.3, 0.2), (0.9, 0.4)]);

        let first = aggregate(&areas, &pts).unwrap();
        let second = aggregate(&areas, &pts).unwrap();
        assert_eq!(first.centers, second.centers);
        for (a, b) in first.centers.iter().zip(&second.centers) {
            assert_eq!(a.latitude.to_bits(), b.latitude.to_bits());
            assert_eq!(a.longitude.to_bits(), b.longitude.to_bits());
        }
    }

    #[test]
    fn test_multipolygon_area() {
        let geometry = MultiPolygon::new(vec![square(0.0, 0.0, 1.0), square(10.0, 10.0, 1.0)]);
        let areas = vec![Area { id: "island".to_string(), names: vec![], geometry }];
        let result = aggregate(&areas, &points(&[(0.5, 0.5), (10.5, 10.5)])).unwrap();
        assert_eq!((result.centers[0].longitude, result.centers[0].latitude), (5.5, 5.5));
    }
}

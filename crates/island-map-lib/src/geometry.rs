//! Geometry records stored in the spatial index
//!
//! A `GeometryRecord` is an immutable polyline (or closed polygon ring) with a
//! precomputed bounding box. The set of shapes is closed, so it is modelled as a
//! tagged variant rather than a trait object.

use crate::graph::RoadId;
use crate::utils::{coord_distance, point_segment_distance};
use crate::{MapError, Result};
use geo::{Coord, Rect};
use std::sync::Arc;

/// Partition axis of the spatial index
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// The other axis
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }

    /// Component of `coord` on this axis
    #[inline(always)]
    pub fn of(self, coord: Coord<f64>) -> f64 {
        match self {
            Axis::X => coord.x,
            Axis::Y => coord.y,
        }
    }
}

/// The closed set of geometry kinds
#[derive(Clone, Debug)]
pub enum Shape {
    /// A single polyline or polygon ring
    Simple(Arc<[Coord<f64>]>),
    /// Several parts merged for render economy; carries no per-feature identity
    Composite(Vec<Arc<[Coord<f64>]>>),
    /// Navigation road owned by the graph
    Road {
        id: RoadId,
        points: Arc<[Coord<f64>]>,
    },
    /// Roundabout road, traversable in one direction only
    Roundabout {
        id: RoadId,
        points: Arc<[Coord<f64>]>,
    },
}

/// Immutable geometry with a cached bounding box
#[derive(Clone, Debug)]
pub struct GeometryRecord {
    shape: Shape,
    bbox: Rect<f64>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GeometryRecord {
    /// Build a simple record from a point sequence
    pub fn new(points: Vec<Coord<f64>>) -> Result<Self> {
        let points: Arc<[Coord<f64>]> = points.into();
        let bbox = bounds_of(std::slice::from_ref(&points))?;
        Ok(Self {
            shape: Shape::Simple(points),
            bbox,
        })
    }

    /// Merge records into one composite record
    ///
    /// Nested composites are flattened; road identity is dropped.
    pub fn composite(records: impl IntoIterator<Item = GeometryRecord>) -> Result<Self> {
        let mut parts = Vec::new();
        for record in records {
            match record.shape {
                Shape::Composite(inner) => parts.extend(inner),
                Shape::Simple(points)
                | Shape::Road { points, .. }
                | Shape::Roundabout { points, .. } => parts.push(points),
            }
        }
        let bbox = bounds_of(&parts)?;
        Ok(Self {
            shape: Shape::Composite(parts),
            bbox,
        })
    }

    /// Build a road record sharing the graph's point storage
    pub fn road(id: RoadId, points: Arc<[Coord<f64>]>, roundabout: bool) -> Result<Self> {
        let bbox = bounds_of(std::slice::from_ref(&points))?;
        let shape = if roundabout {
            Shape::Roundabout { id, points }
        } else {
            Shape::Road { id, points }
        };
        Ok(Self { shape, bbox })
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn bounding_box(&self) -> Rect<f64> {
        self.bbox
    }

    /// Squared diagonal of the bounding box, used for level-of-detail culling
    #[inline]
    pub fn size(&self) -> f64 {
        let w = self.bbox.width();
        let h = self.bbox.height();
        w * w + h * h
    }

    #[inline]
    pub fn is_composite(&self) -> bool {
        matches!(self.shape, Shape::Composite(_))
    }

    #[inline]
    pub fn is_roundabout(&self) -> bool {
        matches!(self.shape, Shape::Roundabout { .. })
    }

    /// Road this record stands for, if any
    #[inline]
    pub fn road_id(&self) -> Option<RoadId> {
        match &self.shape {
            Shape::Road { id, .. } | Shape::Roundabout { id, .. } => Some(*id),
            _ => None,
        }
    }

    /// Point sequences making up this record (one for non-composites)
    pub fn parts(&self) -> &[Arc<[Coord<f64>]>] {
        match &self.shape {
            Shape::Composite(parts) => parts,
            Shape::Simple(points)
            | Shape::Road { points, .. }
            | Shape::Roundabout { points, .. } => std::slice::from_ref(points),
        }
    }

    /// Every point of every part, in order
    pub fn points(&self) -> impl Iterator<Item = Coord<f64>> + '_ {
        self.parts().iter().flat_map(|part| part.iter().copied())
    }

    pub fn point_count(&self) -> usize {
        self.parts().iter().map(|part| part.len()).sum()
    }

    /// True when every part starts and ends at the same point
    pub fn is_closed(&self) -> bool {
        self.parts()
            .iter()
            .all(|part| part.len() > 1 && part.first() == part.last())
    }

    /// Partition key: the maximum bounding-box coordinate on `axis`
    #[inline]
    pub fn split_value(&self, axis: Axis) -> f64 {
        axis.of(self.bbox.max())
    }

    /// Minimum point-to-segment distance over all parts
    pub fn distance_to(&self, point: Coord<f64>) -> f64 {
        let mut best = f64::INFINITY;
        for part in self.parts() {
            if part.len() == 1 {
                best = best.min(coord_distance(point, part[0]));
                continue;
            }
            for pair in part.windows(2) {
                best = best.min(point_segment_distance(point, pair[0], pair[1]));
            }
        }
        best
    }
}

/// Axis-aligned bounds of all parts; errors when no point exists
fn bounds_of(parts: &[Arc<[Coord<f64>]>]) -> Result<Rect<f64>> {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut found = false;

    for p in parts.iter().flat_map(|part| part.iter()) {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
        found = true;
    }

    if !found {
        return Err(MapError::InvalidGeometry(
            "geometry record needs at least one point".to_string(),
        ));
    }

    Ok(Rect::new(
        Coord { x: min_x, y: min_y },
        Coord { x: max_x, y: max_y },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn test_bbox_exactly_bounds_points() {
        let rec = GeometryRecord::new(vec![c(1.0, 5.0), c(-2.0, 3.0), c(4.0, -1.0)]).unwrap();
        let bbox = rec.bounding_box();
        assert_eq!(bbox.min(), c(-2.0, -1.0));
        assert_eq!(bbox.max(), c(4.0, 5.0));
        assert!((rec.size() - (36.0 + 36.0)).abs() < 1e-9);
    }

    #[test]
    fn test_empty_record_fails() {
        assert!(GeometryRecord::new(Vec::new()).is_err());
        assert!(GeometryRecord::composite(Vec::new()).is_err());
    }

    #[test]
    fn test_split_value_uses_bbox_max() {
        let rec = GeometryRecord::new(vec![c(1.0, 2.0), c(7.0, 9.0)]).unwrap();
        assert_eq!(rec.split_value(Axis::X), 7.0);
        assert_eq!(rec.split_value(Axis::Y), 9.0);
        assert_eq!(Axis::X.flip(), Axis::Y);
    }

    #[test]
    fn test_composite_flattens_parts() {
        let a = GeometryRecord::new(vec![c(0.0, 0.0), c(1.0, 1.0)]).unwrap();
        let b = GeometryRecord::new(vec![c(5.0, 5.0), c(6.0, 7.0)]).unwrap();
        let ab = GeometryRecord::composite(vec![a, b]).unwrap();
        let d = GeometryRecord::new(vec![c(-3.0, 2.0)]).unwrap();
        let all = GeometryRecord::composite(vec![ab, d]).unwrap();

        assert!(all.is_composite());
        assert_eq!(all.parts().len(), 3);
        assert_eq!(all.point_count(), 5);
        assert_eq!(all.bounding_box().min(), c(-3.0, 0.0));
        assert_eq!(all.bounding_box().max(), c(6.0, 7.0));
        assert!(all.road_id().is_none());
    }

    #[test]
    fn test_road_record_identity() {
        let points: Arc<[Coord<f64>]> = vec![c(0.0, 0.0), c(10.0, 0.0)].into();
        let road = GeometryRecord::road(RoadId(3), points.clone(), false).unwrap();
        let rb = GeometryRecord::road(RoadId(4), points, true).unwrap();
        assert_eq!(road.road_id(), Some(RoadId(3)));
        assert!(!road.is_roundabout());
        assert!(rb.is_roundabout());
        assert_eq!(rb.road_id(), Some(RoadId(4)));
    }

    #[test]
    fn test_distance_to_polyline() {
        let rec =
            GeometryRecord::new(vec![c(0.0, 0.0), c(10.0, 0.0), c(10.0, 10.0)]).unwrap();
        assert!((rec.distance_to(c(5.0, 2.0)) - 2.0).abs() < 1e-9);
        assert!((rec.distance_to(c(13.0, 5.0)) - 3.0).abs() < 1e-9);
        assert!(rec.distance_to(c(10.0, 0.0)).abs() < 1e-9);

        let single = GeometryRecord::new(vec![c(3.0, 4.0)]).unwrap();
        assert!((single.distance_to(c(0.0, 0.0)) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_is_closed() {
        let ring =
            GeometryRecord::new(vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 0.0)]).unwrap();
        let open = GeometryRecord::new(vec![c(0.0, 0.0), c(1.0, 0.0)]).unwrap();
        assert!(ring.is_closed());
        assert!(!open.is_closed());
    }
}

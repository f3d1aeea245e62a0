//! Utility functions for coordinate conversions and planar geometry helpers

use geo::line_measures::Distance;
use geo::{Closest, ClosestPoint, Coord, Euclidean, Line, Point};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per degree of latitude on the mean sphere
const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Equirectangular projection of WGS84 around a local origin
///
/// World units are meters. `x` grows eastward and `y` grows southward, so the
/// northern edge of a region has the smallest `y` (screen orientation).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalProjection {
    origin_lat: f64,
    origin_lon: f64,
    /// Meters per degree of longitude at the origin latitude
    lon_scale: f64,
}

impl LocalProjection {
    /// Create a projection centred on `(origin_lat, origin_lon)` in degrees
    pub fn new(origin_lat: f64, origin_lon: f64) -> Self {
        Self {
            origin_lat,
            origin_lon,
            lon_scale: METERS_PER_DEGREE * origin_lat.to_radians().cos(),
        }
    }

    /// Convert WGS84 degrees to world meters
    #[inline(always)]
    pub fn to_world(&self, lat: f64, lon: f64) -> Coord<f64> {
        Coord {
            x: (lon - self.origin_lon) * self.lon_scale,
            y: (self.origin_lat - lat) * METERS_PER_DEGREE,
        }
    }

    /// Convert world meters back to WGS84 `(lat, lon)` degrees
    #[inline(always)]
    pub fn to_wgs84(&self, coord: Coord<f64>) -> (f64, f64) {
        let lat = self.origin_lat - coord.y / METERS_PER_DEGREE;
        let lon = if self.lon_scale.abs() > f64::EPSILON {
            self.origin_lon + coord.x / self.lon_scale
        } else {
            self.origin_lon
        };
        (lat, lon)
    }

    /// Origin of the projection as `(lat, lon)`
    pub fn origin(&self) -> (f64, f64) {
        (self.origin_lat, self.origin_lon)
    }
}

/// Euclidean distance between two coordinates
#[inline(always)]
pub fn coord_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Perpendicular foot of `point` on the segment `start..end`, clamped to the segment
pub fn project_onto_segment(point: Coord<f64>, start: Coord<f64>, end: Coord<f64>) -> Coord<f64> {
    if start == end {
        return start;
    }
    let line = Line::new(start, end);
    match line.closest_point(&Point::from(point)) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => p.into(),
        Closest::Indeterminate => start,
    }
}

/// Minimum distance from `point` to the segment `start..end`
#[inline]
pub fn point_segment_distance(point: Coord<f64>, start: Coord<f64>, end: Coord<f64>) -> f64 {
    if start == end {
        return coord_distance(point, start);
    }
    Euclidean.distance(&Point::from(point), &Line::new(start, end))
}

/// Bit-exact hashable coordinate key
///
/// Used wherever points must match exactly (coastline chaining), never for
/// approximate lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CoordKey {
    x_bits: u64,
    y_bits: u64,
}

impl CoordKey {
    pub const fn from_coord(c: Coord<f64>) -> Self {
        Self {
            x_bits: c.x.to_bits(),
            y_bits: c.y.to_bits(),
        }
    }
}

impl From<Coord<f64>> for CoordKey {
    fn from(c: Coord<f64>) -> Self {
        Self::from_coord(c)
    }
}

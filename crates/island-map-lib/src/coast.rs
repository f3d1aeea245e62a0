//! Coastline stitching
//!
//! Coastline data arrives as open segments, cut wherever the data region's
//! bounds clip them. [`CoastStitcher`] joins them back into closed land-mass
//! polygons in three passes:
//!
//! 1. **Connect**: chain segments whose start equals another's end; emit loops.
//! 2. **Extend**: push loose ends lying inside the bounds just past the nearest edge.
//! 3. **Fix**: walk the bounds' perimeter counter-clockwise (left side down,
//!    bottom side right, right side up, top side left) from each loose end to
//!    the next loose start, inserting the rectangle corners passed on the way.
//!
//! Synthetic points always lie strictly outside the bounds.

use crate::geometry::GeometryRecord;
use crate::utils::CoordKey;
use crate::{MapError, Result};
use geo::{Coord, Rect};
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Distances (world units) of synthetic coastline points outside the bounds
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoastConfig {
    /// How far a loose end is pushed past the nearest edge
    pub extend_margin: f64,
    /// How far inserted corner points sit outside each edge
    pub corner_margin: f64,
}

impl Default for CoastConfig {
    fn default() -> Self {
        Self {
            extend_margin: 1_000.0,
            corner_margin: 10_000.0,
        }
    }
}

impl CoastConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("extend margin", self.extend_margin),
            ("corner margin", self.corner_margin),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(MapError::InvalidConfig(format!(
                    "coast {name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct CoastlinePart {
    start: Coord<f64>,
    points: Vec<Coord<f64>>,
}

impl CoastlinePart {
    fn end(&self) -> Coord<f64> {
        self.points[self.points.len() - 1]
    }

    fn is_complete(&self) -> bool {
        self.points.len() > 1 && self.end() == self.start
    }

    /// Append `other`, skipping its first point when it repeats our end
    fn append(&mut self, other: CoastlinePart) {
        let skip = usize::from(other.points.first() == Some(&self.end()));
        self.points.extend(other.points.into_iter().skip(skip));
    }

    /// Replace the start with a new point in front of the old one
    fn false_start(&mut self, point: Coord<f64>) {
        self.points.insert(0, point);
        self.start = point;
    }
}

/// Which bound edge a point is closest to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Edge {
    Left,
    Bottom,
    Right,
    Top,
}

/// Joins open coastline segments into closed polygons
#[derive(Debug)]
pub struct CoastStitcher {
    bounds: Rect<f64>,
    config: CoastConfig,
    parts: Vec<CoastlinePart>,
    starts: HashMap<CoordKey, usize>,
    skipped: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl CoastStitcher {
    pub fn new(bounds: Rect<f64>, config: CoastConfig) -> Result<Self> {
        config.validate()?;
        if !(bounds.width() > 0.0 && bounds.height() > 0.0) {
            return Err(MapError::InvalidConfig(
                "coastline bounds must have a positive area".to_string(),
            ));
        }
        Ok(Self {
            bounds,
            config,
            parts: Vec::new(),
            starts: HashMap::new(),
            skipped: 0,
        })
    }

    /// Queue an open segment
    ///
    /// Segments with fewer than two points are skipped, as is a segment whose
    /// start point was already claimed by an earlier one.
    pub fn add_segment(&mut self, points: Vec<Coord<f64>>) {
        if points.len() < 2 {
            self.skipped += 1;
            return;
        }
        let start = points[0];
        let key = CoordKey::from_coord(start);
        if self.starts.contains_key(&key) {
            tracing::debug!("Ignoring coastline segment with duplicate start {:?}", start);
            self.skipped += 1;
            return;
        }
        self.starts.insert(key, self.parts.len());
        self.parts.push(CoastlinePart { start, points });
    }

    /// Number of segments rejected by [`add_segment`](Self::add_segment)
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Run all passes and return the closed polygons
    pub fn stitch(self) -> Vec<GeometryRecord> {
        #[cfg(feature = "profiling")]
        profiling::scope!("coast::stitch");
        let segments = self.parts.len();
        let (mut islands, open) = self.connect();
        let connected = islands.len();

        let open: Vec<CoastlinePart> = open
            .into_iter()
            .map(|mut part| {
                self.extend(&mut part);
                part
            })
            .collect();
        islands.extend(self.fix(open));

        tracing::info!(
            "Stitched {} coastline segments into {} islands ({} closed by the bounds)",
            segments,
            islands.len(),
            islands.len() - connected
        );

        islands
            .into_iter()
            .filter_map(|points| match GeometryRecord::new(points) {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!("Dropping degenerate island: {}", err);
                    None
                }
            })
            .collect()
    }

    /// Chain parts end-to-start; returns finished loops and the remaining open parts
    fn connect(&self) -> (Vec<Vec<Coord<f64>>>, Vec<CoastlinePart>) {
        let mut slots: Vec<Option<CoastlinePart>> = self.parts.iter().cloned().map(Some).collect();
        let mut islands = Vec::new();

        for i in 0..slots.len() {
            let Some(mut part) = slots[i].take() else {
                continue;
            };
            while !part.is_complete() {
                let next = self
                    .starts
                    .get(&CoordKey::from_coord(part.end()))
                    .copied()
                    .filter(|&j| j != i);
                match next.and_then(|j| slots[j].take()) {
                    Some(other) => part.append(other),
                    None => break,
                }
            }
            if part.is_complete() {
                islands.push(part.points);
            } else {
                slots[i] = Some(part);
            }
        }

        (islands, slots.into_iter().flatten().collect())
    }

    /// Move ends lying strictly inside the bounds past the nearest edge
    fn extend(&self, part: &mut CoastlinePart) {
        if let Some(point) = self.push_out(part.start) {
            part.false_start(point);
        }
        if let Some(point) = self.push_out(part.end()) {
            part.points.push(point);
        }
    }

    fn push_out(&self, p: Coord<f64>) -> Option<Coord<f64>> {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        let inside = p.x > min.x && p.x < max.x && p.y > min.y && p.y < max.y;
        if !inside {
            return None;
        }
        let margin = self.config.extend_margin;
        let point = match self.nearest_edge(p) {
            Edge::Left => Coord { x: min.x - margin, y: p.y },
            Edge::Right => Coord { x: max.x + margin, y: p.y },
            Edge::Top => Coord { x: p.x, y: min.y - margin },
            Edge::Bottom => Coord { x: p.x, y: max.y + margin },
        };
        Some(point)
    }

    /// Nearest edge; horizontal edges win only when strictly closer
    fn nearest_edge(&self, p: Coord<f64>) -> Edge {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        let to_top = (p.y - min.y).abs();
        let to_bottom = (p.y - max.y).abs();
        let to_left = (p.x - min.x).abs();
        let to_right = (p.x - max.x).abs();
        if to_top.min(to_bottom) < to_left.min(to_right) {
            if to_bottom < to_top { Edge::Bottom } else { Edge::Top }
        } else if to_left < to_right {
            Edge::Left
        } else {
            Edge::Right
        }
    }

    /// Edge a point outside (or on) the bounds belongs to, in walk priority order
    fn edge_of(&self, p: Coord<f64>) -> Edge {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        if p.x <= min.x {
            Edge::Left
        } else if p.y >= max.y {
            Edge::Bottom
        } else if p.x >= max.x {
            Edge::Right
        } else if p.y <= min.y {
            Edge::Top
        } else {
            self.nearest_edge(p)
        }
    }

    /// Position along the counter-clockwise perimeter walk, starting at the top-left corner
    fn perimeter_param(&self, p: Coord<f64>) -> f64 {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        let w = self.bounds.width();
        let h = self.bounds.height();
        let t = match self.edge_of(p) {
            Edge::Left => (p.y - min.y).clamp(0.0, h),
            Edge::Bottom => h + (p.x - min.x).clamp(0.0, w),
            Edge::Right => h + w + (max.y - p.y).clamp(0.0, h),
            Edge::Top => 2.0 * h + w + (max.x - p.x).clamp(0.0, w),
        };
        t % self.perimeter()
    }

    fn perimeter(&self) -> f64 {
        2.0 * (self.bounds.width() + self.bounds.height())
    }

    /// Forward walking distance from parameter `a` to `b`
    fn ahead(&self, a: f64, b: f64) -> f64 {
        (b - a).rem_euclid(self.perimeter())
    }

    /// Corner points in walk order: bottom-left, bottom-right, top-right, top-left
    fn corners(&self) -> [Coord<f64>; 4] {
        let (min, max) = (self.bounds.min(), self.bounds.max());
        let m = self.config.corner_margin;
        [
            Coord { x: min.x - m, y: max.y + m },
            Coord { x: max.x + m, y: max.y + m },
            Coord { x: max.x + m, y: min.y - m },
            Coord { x: min.x - m, y: min.y - m },
        ]
    }

    /// Close every open part by walking the perimeter
    fn fix(&self, open: Vec<CoastlinePart>) -> Vec<Vec<Coord<f64>>> {
        let corners: Vec<(f64, Coord<f64>)> = self
            .corners()
            .into_iter()
            .map(|c| (self.perimeter_param(c), c))
            .collect();

        let mut slots: Vec<Option<CoastlinePart>> = open.into_iter().map(Some).collect();
        let mut islands = Vec::new();
        // Each connection passes at most four corners
        let step_limit = 5 * (slots.len() + 1);

        for i in 0..slots.len() {
            let Some(mut part) = slots[i].take() else {
                continue;
            };
            let mut last_corner: Option<usize> = None;
            let mut steps = 0;

            while !part.is_complete() {
                steps += 1;
                if steps > step_limit {
                    tracing::warn!("Coastline walk did not converge; closing directly");
                    part.points.push(part.start);
                    break;
                }

                let here = self.perimeter_param(part.end());

                // Nearest loose start ahead, own start included
                let mut next: (f64, Option<usize>) =
                    (self.ahead(here, self.perimeter_param(part.start)), None);
                for (j, slot) in slots.iter().enumerate() {
                    if let Some(other) = slot {
                        let d = self.ahead(here, self.perimeter_param(other.start));
                        if d < next.0 {
                            next = (d, Some(j));
                        }
                    }
                }

                // Nearest corner strictly ahead, skipping the one just placed
                let corner = corners
                    .iter()
                    .enumerate()
                    .filter(|(k, _)| Some(*k) != last_corner)
                    .map(|(k, (t, c))| (self.ahead(here, *t), k, *c))
                    .filter(|(d, _, _)| *d > 0.0)
                    .min_by(|a, b| a.0.total_cmp(&b.0));

                match (next, corner) {
                    ((d, target), Some((dc, k, point))) if dc < d => {
                        tracing::trace!(
                            "Coastline walk passes corner {} before target {:?}",
                            k,
                            target
                        );
                        part.points.push(point);
                        last_corner = Some(k);
                    }
                    ((_, Some(j)), _) => {
                        if let Some(other) = slots[j].take() {
                            part.append(other);
                        }
                        last_corner = None;
                    }
                    _ => {
                        part.points.push(part.start);
                    }
                }
            }
            islands.push(part.points);
        }
        islands
    }
}

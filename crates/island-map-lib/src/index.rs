//! Static partition tree over geometry records
//!
//! The index is built once and never mutated. Records are bisected on
//! alternating axes (x first) around the record that would sit at the median
//! position, keyed by the maximum bounding-box coordinate on that axis. Each
//! leaf owns a bounded bucket of records.
//!
//! A long record can have points that route to another leaf than the one
//! holding it. After construction every point of every record is routed to
//! its leaf, and that leaf remembers the owner in its *required set*. A query
//! touching a leaf returns the leaf's bucket plus every bucket it requires, so
//! nothing is stored twice.
//!
//! # Performance
//!
//! The median selection uses a first-element pivot without randomisation:
//! expected linear work per level, quadratic on adversarial (for example
//! pre-sorted) input. Leaf contents depend on this exact partition order.

use crate::geometry::{Axis, GeometryRecord};
use crate::{MapError, Result};
use geo::{Coord, Rect};
use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Settings for a single index instance
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexConfig {
    /// Maximum number of records per leaf bucket
    pub leaf_capacity: usize,
    /// Merge non-composite records of each leaf into one composite record
    pub compact: bool,
    /// Side of the square probed by nearest queries, also the maximum accepted distance
    pub nearest_tolerance: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            leaf_capacity: 64,
            compact: false,
            nearest_tolerance: 225.0,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<()> {
        if self.leaf_capacity == 0 {
            return Err(MapError::InvalidConfig(
                "leaf capacity must be at least 1".to_string(),
            ));
        }
        if !(self.nearest_tolerance.is_finite() && self.nearest_tolerance > 0.0) {
            return Err(MapError::InvalidConfig(format!(
                "nearest tolerance must be positive, got {}",
                self.nearest_tolerance
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
enum Node {
    Split {
        axis: Axis,
        value: f64,
        left: usize,
        right: usize,
    },
    Leaf(usize),
}

#[derive(Clone, Debug, Default)]
struct Leaf {
    records: Vec<GeometryRecord>,
    /// Other leaves whose buckets must be returned with this one
    required: BTreeSet<usize>,
}

/// Static spatial index answering rectangle and nearest-point queries
#[derive(Clone, Debug)]
pub struct SpatialIndex {
    nodes: Vec<Node>,
    leaves: Vec<Leaf>,
    root: Option<usize>,
    config: IndexConfig,
    len: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SpatialIndex {
    /// Build an index over `records`
    ///
    /// An empty input produces an empty index that answers every query with
    /// nothing.
    pub fn build(mut records: Vec<GeometryRecord>, config: IndexConfig) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::build");
        config.validate()?;

        let mut index = Self {
            nodes: Vec::new(),
            leaves: Vec::new(),
            root: None,
            config,
            len: 0,
        };
        if records.is_empty() {
            return Ok(index);
        }

        // Partition in place, remembering each leaf's range in build order
        let mut ranges = Vec::new();
        let last = records.len() - 1;
        let root = index.create_node(&mut records, 0, last, Axis::X, &mut ranges);
        index.root = Some(root);

        // Ranges are contiguous and ascending, so the records can be drained in order
        let mut remaining = records.into_iter();
        for (start, end) in ranges {
            let bucket: Vec<GeometryRecord> = remaining.by_ref().take(end - start + 1).collect();
            index.leaves.push(Leaf {
                records: Self::arrange_bucket(bucket, config.compact),
                required: BTreeSet::new(),
            });
        }
        index.len = index.leaves.iter().map(|leaf| leaf.records.len()).sum();

        index.link_required();

        tracing::debug!(
            "Built spatial index: {} records in {} leaves (capacity {}, compact {})",
            index.len,
            index.leaves.len(),
            config.leaf_capacity,
            config.compact
        );
        Ok(index)
    }

    /// Recursively bisect `records[min..=max]`, returning the node index
    fn create_node(
        &mut self,
        records: &mut [GeometryRecord],
        min: usize,
        max: usize,
        axis: Axis,
        ranges: &mut Vec<(usize, usize)>,
    ) -> usize {
        let delta = max - min;
        if delta < self.config.leaf_capacity {
            ranges.push((min, max));
            let node = self.nodes.len();
            self.nodes.push(Node::Leaf(ranges.len() - 1));
            return node;
        }

        let expected = min + delta / 2;
        select(&mut records[min..=max], expected - min, axis);
        let value = records[expected].split_value(axis);

        // Reserve the slot so the parent precedes its children
        let node = self.nodes.len();
        self.nodes.push(Node::Leaf(usize::MAX));
        let left = self.create_node(records, min, expected, axis.flip(), ranges);
        let right = self.create_node(records, expected + 1, max, axis.flip(), ranges);
        self.nodes[node] = Node::Split {
            axis,
            value,
            left,
            right,
        };
        node
    }

    /// Order a leaf's bucket: by descending size, or compacted
    fn arrange_bucket(mut bucket: Vec<GeometryRecord>, compact: bool) -> Vec<GeometryRecord> {
        if !compact {
            bucket.sort_by(|a, b| b.size().total_cmp(&a.size()));
            return bucket;
        }

        let (kept, mergeable): (Vec<_>, Vec<_>) =
            bucket.into_iter().partition(GeometryRecord::is_composite);
        if mergeable.len() < 2 {
            let mut bucket = kept;
            bucket.extend(mergeable);
            return bucket;
        }

        let mut bucket = kept;
        match GeometryRecord::composite(mergeable) {
            Ok(merged) => bucket.push(merged),
            // Unreachable with non-empty records; keep the leaf usable regardless
            Err(err) => tracing::warn!("Leaf compaction skipped: {}", err),
        }
        bucket
    }

    /// Route every point to its leaf and record cross-leaf requirements
    fn link_required(&mut self) {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::link_required");
        let Some(root) = self.root else {
            return;
        };

        let mut links = Vec::new();
        for (owner, leaf) in self.leaves.iter().enumerate() {
            for record in &leaf.records {
                for point in record.points() {
                    let holder = self.single_leaf(root, point);
                    if holder != owner {
                        links.push((holder, owner));
                    }
                }
            }
        }

        for (holder, owner) in links {
            self.leaves[holder].required.insert(owner);
        }
    }

    /// The one leaf a point routes to
    fn single_leaf(&self, mut node: usize, point: Coord<f64>) -> usize {
        loop {
            match &self.nodes[node] {
                Node::Leaf(leaf) => return *leaf,
                Node::Split {
                    axis,
                    value,
                    left,
                    right,
                } => {
                    node = if *value <= axis.of(point) { *right } else { *left };
                }
            }
        }
    }

    /// Leaves touched by `rect`, including required leaves, in ascending order
    fn collect_leaves(&self, rect: Rect<f64>) -> BTreeSet<usize> {
        let mut set = BTreeSet::new();
        let Some(root) = self.root else {
            return set;
        };

        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match &self.nodes[node] {
                Node::Leaf(leaf) => {
                    set.insert(*leaf);
                    set.extend(self.leaves[*leaf].required.iter().copied());
                }
                Node::Split {
                    axis,
                    value,
                    left,
                    right,
                } => {
                    if *value <= axis.of(rect.max()) {
                        stack.push(*right);
                    }
                    if *value >= axis.of(rect.min()) {
                        stack.push(*left);
                    }
                }
            }
        }
        set
    }

    /// Buckets of every leaf needed to draw `rect`, each leaf at most once
    pub fn query_rect(&self, rect: Rect<f64>) -> Vec<&[GeometryRecord]> {
        self.collect_leaves(rect)
            .into_iter()
            .map(|leaf| self.leaves[leaf].records.as_slice())
            .collect()
    }

    /// Every bucket in leaf order
    pub fn query_all(&self) -> Vec<&[GeometryRecord]> {
        self.leaves
            .iter()
            .map(|leaf| leaf.records.as_slice())
            .collect()
    }

    /// Record closest to `point`, or `None` when nothing lies within the tolerance
    pub fn query_nearest(&self, point: Coord<f64>) -> Option<&GeometryRecord> {
        self.query_nearest_where(point, |_| true)
    }

    /// Like [`query_nearest`](Self::query_nearest), considering only records accepted by `accept`
    pub fn query_nearest_where(
        &self,
        point: Coord<f64>,
        mut accept: impl FnMut(&GeometryRecord) -> bool,
    ) -> Option<&GeometryRecord> {
        let half = self.config.nearest_tolerance / 2.0;
        let probe = Rect::new(
            Coord {
                x: point.x - half,
                y: point.y - half,
            },
            Coord {
                x: point.x + half,
                y: point.y + half,
            },
        );

        let mut best: Option<(&GeometryRecord, f64)> = None;
        for bucket in self.query_rect(probe) {
            for record in bucket {
                if !accept(record) {
                    continue;
                }
                let distance = record.distance_to(point);
                if best.is_none_or(|(_, d)| distance < d) {
                    best = Some((record, distance));
                }
            }
        }

        match best {
            Some((record, distance)) if distance <= self.config.nearest_tolerance => Some(record),
            _ => None,
        }
    }

    /// Iterate over every stored record
    pub fn records(&self) -> impl Iterator<Item = &GeometryRecord> {
        self.leaves.iter().flat_map(|leaf| leaf.records.iter())
    }

    /// Bounds of all stored records
    pub fn bounding_box(&self) -> Option<Rect<f64>> {
        self.records().map(GeometryRecord::bounding_box).reduce(|a, b| {
            Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        })
    }

    #[inline]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Number of stored records (after compaction)
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }
}

/// Partition `records` so that position `k` holds the element that would sit
/// there if sorted by split value, smaller-or-equal before and greater-or-equal after
fn select(records: &mut [GeometryRecord], k: usize, axis: Axis) {
    if records.len() < 2 {
        return;
    }
    let mut lo = 0;
    let mut hi = records.len() - 1;
    while lo < hi {
        let pivot = partition(records, lo, hi, axis);
        match pivot.cmp(&k) {
            std::cmp::Ordering::Equal => return,
            std::cmp::Ordering::Less => lo = pivot + 1,
            std::cmp::Ordering::Greater => hi = pivot - 1,
        }
    }
}

/// Hoare-style partition around `records[lo]`, returning its final position
fn partition(records: &mut [GeometryRecord], lo: usize, hi: usize, axis: Axis) -> usize {
    let pivot = records[lo].split_value(axis);
    let key = |records: &[GeometryRecord], i: usize| records[i].split_value(axis);

    let mut i = lo;
    let mut j = hi + 1;
    loop {
        i += 1;
        while key(records, i) < pivot {
            if i == hi {
                break;
            }
            i += 1;
        }
        j -= 1;
        while pivot < key(records, j) {
            if j == lo {
                break;
            }
            j -= 1;
        }
        if i >= j {
            break;
        }
        records.swap(i, j);
    }
    records.swap(lo, j);
    j
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Rect<f64> {
        Rect::new(c(min_x, min_y), c(max_x, max_y))
    }

    /// Short horizontal segments on a regular grid, 10 units long, 100 apart
    fn grid_records(n: usize) -> Vec<GeometryRecord> {
        let mut records = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let x = i as f64 * 100.0;
                let y = j as f64 * 100.0;
                records.push(GeometryRecord::new(vec![c(x, y), c(x + 10.0, y)]).unwrap());
            }
        }
        records
    }

    fn config(leaf_capacity: usize, compact: bool) -> IndexConfig {
        IndexConfig {
            leaf_capacity,
            compact,
            nearest_tolerance: 225.0,
        }
    }

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex::build(Vec::new(), IndexConfig::default()).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.leaf_count(), 0);
        assert!(index.query_rect(rect(0.0, 0.0, 10.0, 10.0)).is_empty());
        assert!(index.query_nearest(c(0.0, 0.0)).is_none());
        assert!(index.bounding_box().is_none());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SpatialIndex::build(grid_records(2), config(0, false));
        assert!(matches!(result, Err(MapError::InvalidConfig(_))));

        let bad_tolerance = IndexConfig {
            nearest_tolerance: 0.0,
            ..IndexConfig::default()
        };
        assert!(SpatialIndex::build(grid_records(2), bad_tolerance).is_err());
    }

    #[test]
    fn test_full_bounds_returns_every_record_once() {
        let records = grid_records(12);
        let total = records.len();
        let index = SpatialIndex::build(records, config(4, false)).unwrap();

        assert_eq!(index.len(), total);
        assert!(index.leaf_count() > 1, "Expected the grid to be split");

        let buckets = index.query_rect(rect(-1.0, -1.0, 1200.0, 1200.0));
        let returned: usize = buckets.iter().map(|b| b.len()).sum();
        assert_eq!(returned, total, "Each record should be returned exactly once");

        let mut starts: Vec<(i64, i64)> = buckets
            .iter()
            .flat_map(|b| b.iter())
            .map(|r| {
                let min = r.bounding_box().min();
                (min.x as i64, min.y as i64)
            })
            .collect();
        starts.sort_unstable();
        starts.dedup();
        assert_eq!(starts.len(), total, "No record should be duplicated");
    }

    #[test]
    fn test_leaves_respect_capacity() {
        let index = SpatialIndex::build(grid_records(10), config(8, false)).unwrap();
        for bucket in index.query_all() {
            assert!(bucket.len() <= 8, "Leaf holds {} records", bucket.len());
            assert!(!bucket.is_empty());
        }
    }

    #[test]
    fn test_coverage_monotonicity() {
        let index = SpatialIndex::build(grid_records(10), config(4, false)).unwrap();

        let nested = [
            (rect(150.0, 150.0, 250.0, 250.0), rect(100.0, 100.0, 400.0, 400.0)),
            (rect(100.0, 100.0, 400.0, 400.0), rect(0.0, 0.0, 900.0, 900.0)),
            (rect(450.0, 0.0, 460.0, 10.0), rect(300.0, -50.0, 700.0, 300.0)),
        ];
        for (inner, outer) in nested {
            let small = index.collect_leaves(inner);
            let large = index.collect_leaves(outer);
            assert!(
                small.is_subset(&large),
                "Leaves of {:?} should be contained in leaves of {:?}",
                inner,
                outer
            );
        }
    }

    #[test]
    fn test_query_rect_finds_contained_records() {
        let index = SpatialIndex::build(grid_records(10), config(4, false)).unwrap();
        let query = rect(295.0, 295.0, 320.0, 305.0);
        let found = index
            .query_rect(query)
            .iter()
            .flat_map(|b| b.iter())
            .any(|r| r.bounding_box().min() == c(300.0, 300.0));
        assert!(found, "Record at (300, 300) should be visible");
    }

    #[test]
    fn test_required_sets_link_long_records() {
        let mut records = grid_records(8);
        // A long diagonal whose points land in many leaves
        records.push(
            GeometryRecord::new(vec![c(0.0, 0.0), c(350.0, 350.0), c(700.0, 700.0)]).unwrap(),
        );
        let index = SpatialIndex::build(records, config(4, false)).unwrap();

        for probe in [c(0.0, 0.0), c(350.0, 350.0), c(700.0, 700.0)] {
            let query = rect(probe.x - 1.0, probe.y - 1.0, probe.x + 1.0, probe.y + 1.0);
            let found = index
                .query_rect(query)
                .iter()
                .flat_map(|b| b.iter())
                .any(|r| r.point_count() == 3);
            assert!(found, "Diagonal should be returned near {:?}", probe);
        }
    }

    #[test]
    fn test_uncompacted_leaves_sorted_by_size() {
        let mut records = Vec::new();
        for i in 0..6 {
            let len = (i + 1) as f64;
            records.push(GeometryRecord::new(vec![c(0.0, 0.0), c(len, len)]).unwrap());
        }
        let index = SpatialIndex::build(records, config(16, false)).unwrap();
        let buckets = index.query_all();
        assert_eq!(buckets.len(), 1);
        let sizes: Vec<f64> = buckets[0].iter().map(GeometryRecord::size).collect();
        assert!(sizes.windows(2).all(|w| w[0] >= w[1]), "Sizes: {:?}", sizes);
    }

    #[test]
    fn test_compaction_preserves_coverage() {
        let records = grid_records(8);
        let plain = SpatialIndex::build(records.clone(), config(4, false)).unwrap();
        let compact = SpatialIndex::build(records, config(4, true)).unwrap();

        assert_eq!(plain.leaf_count(), compact.leaf_count());
        assert!(compact.len() < plain.len(), "Compaction should merge records");

        let points = |buckets: Vec<&[GeometryRecord]>| -> usize {
            buckets.iter().flat_map(|b| b.iter()).map(GeometryRecord::point_count).sum()
        };
        let everything = rect(-10.0, -10.0, 800.0, 800.0);
        assert_eq!(points(plain.query_rect(everything)), points(compact.query_rect(everything)));

        for bucket in compact.query_all() {
            let composites = bucket.iter().filter(|r| r.is_composite()).count();
            assert!(composites <= 1);
            if bucket.len() > 1 {
                assert!(bucket.last().is_some_and(GeometryRecord::is_composite));
            }
        }
    }

    #[test]
    fn test_compaction_keeps_existing_composites_first() {
        let a = GeometryRecord::new(vec![c(0.0, 0.0), c(1.0, 0.0)]).unwrap();
        let b = GeometryRecord::new(vec![c(2.0, 0.0), c(3.0, 0.0)]).unwrap();
        let existing = GeometryRecord::composite(vec![a.clone(), b.clone()]).unwrap();

        let bucket = SpatialIndex::arrange_bucket(vec![a.clone(), existing.clone(), b], true);
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket[0].parts().len(), 2);
        assert!(bucket[1].is_composite());

        // A single eligible record is left alone
        let bucket = SpatialIndex::arrange_bucket(vec![existing, a], true);
        assert_eq!(bucket.len(), 2);
        assert!(!bucket[1].is_composite());
    }

    #[test]
    fn test_nearest_within_and_beyond_tolerance() {
        let index = SpatialIndex::build(grid_records(10), config(4, false)).unwrap();

        // 20 units below the segment starting at (300, 300)
        let hit = index.query_nearest(c(305.0, 320.0)).unwrap();
        assert_eq!(hit.bounding_box().min(), c(300.0, 300.0));
        assert!((hit.distance_to(c(305.0, 320.0)) - 20.0).abs() < 1e-9);

        // Far outside the grid
        assert!(index.query_nearest(c(5000.0, 5000.0)).is_none());
    }

    #[test]
    fn test_nearest_picks_minimum_distance() {
        let records = vec![
            GeometryRecord::new(vec![c(0.0, 0.0), c(100.0, 0.0)]).unwrap(),
            GeometryRecord::new(vec![c(0.0, 30.0), c(100.0, 30.0)]).unwrap(),
        ];
        let index = SpatialIndex::build(records, config(1, false)).unwrap();
        let near = index.query_nearest(c(50.0, 20.0)).unwrap();
        assert_eq!(near.bounding_box().min().y, 30.0);
    }

    #[test]
    fn test_nearest_where_skips_rejected_records() {
        let records = vec![
            GeometryRecord::new(vec![c(0.0, 0.0), c(100.0, 0.0)]).unwrap(),
            GeometryRecord::new(vec![c(0.0, 30.0), c(100.0, 30.0), c(100.0, 60.0)]).unwrap(),
        ];
        let index = SpatialIndex::build(records, config(1, false)).unwrap();
        let near = index
            .query_nearest_where(c(50.0, 5.0), |r| r.point_count() == 3)
            .unwrap();
        assert_eq!(near.point_count(), 3, "The closer two-point record is filtered out");
        assert!(index.query_nearest_where(c(50.0, 5.0), |_| false).is_none());
    }

    #[test]
    fn test_nearest_rejects_distance_over_tolerance() {
        let records = vec![GeometryRecord::new(vec![c(0.0, 0.0), c(100.0, 0.0)]).unwrap()];
        let index = SpatialIndex::build(
            records,
            IndexConfig {
                nearest_tolerance: 10.0,
                ..IndexConfig::default()
            },
        )
        .unwrap();
        assert!(index.query_nearest(c(0.0, 4.0)).is_some());
        assert!(index.query_nearest(c(0.0, 11.0)).is_none());
    }

    #[test]
    fn test_select_places_median() {
        // Reverse-sorted input exercises the slow path of the pivot choice
        let mut records: Vec<GeometryRecord> = (0..31)
            .rev()
            .map(|i| GeometryRecord::new(vec![c(i as f64, 0.0)]).unwrap())
            .collect();
        select(&mut records, 15, Axis::X);
        assert_eq!(records[15].split_value(Axis::X), 15.0);
        assert!(records[..15].iter().all(|r| r.split_value(Axis::X) <= 15.0));
        assert!(records[16..].iter().all(|r| r.split_value(Axis::X) >= 15.0));
    }

    #[test]
    fn test_select_with_duplicate_keys() {
        let mut records: Vec<GeometryRecord> = [3.0, 1.0, 3.0, 3.0, 2.0, 3.0, 0.0]
            .iter()
            .map(|&x| GeometryRecord::new(vec![c(x, 0.0)]).unwrap())
            .collect();
        select(&mut records, 3, Axis::X);
        let median = records[3].split_value(Axis::X);
        assert_eq!(median, 3.0);
        assert!(records[..3].iter().all(|r| r.split_value(Axis::X) <= median));
    }
}

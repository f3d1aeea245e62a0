//! Goal-directed route search over the road graph
//!
//! [`RouteFinder`] runs A* with a straight-line heuristic. Endpoints may be
//! vertices or arbitrary points; a point is snapped to the nearest road the
//! vehicle may use and joined to the route by a synthetic connector plus the
//! partial road between the snapped foot and the road's vertex.
//!
//! Search state lives on the graph's vertices. Outside drag mode every touched
//! vertex is reset after each query. In drag mode the state survives between
//! queries so a repeated query with the same source can be answered from the
//! already settled vertices.

use crate::geometry::GeometryRecord;
use crate::graph::{Road, RoadAccess, RoadGraph, RoadId, VehicleClass, VertexId};
use crate::index::SpatialIndex;
use crate::utils::{coord_distance, point_segment_distance, project_onto_segment};
use crate::{MapError, NoPathReason, Result};
use geo::Coord;
use smallvec::SmallVec;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Optimistic speed used by the fastest-mode heuristic
pub const DEFAULT_SPEED_BOUND_KMH: f64 = 130.0;

/// Speed assigned to synthetic connectors
const CONNECTOR_SPEED_KMH: u16 = 15;

/// Start or end of a route query
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Endpoint {
    Vertex(VertexId),
    /// Free-form point in world coordinates, snapped to the nearest usable road
    Point(Coord<f64>),
}

/// What a route minimises
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CostModel {
    /// Meters travelled
    #[default]
    Shortest,
    /// Estimated minutes at each road's speed limit
    Fastest,
}

/// Parameters a retained search was computed for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchAnchor {
    pub source: VertexId,
    pub vehicle: VehicleClass,
    pub cost: CostModel,
}

/// Whether search state is kept between queries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DragState {
    /// Every query cleans up after itself
    #[default]
    Idle,
    /// State is retained; `anchor` describes the retained search, if any
    Dragging {
        reversed: bool,
        anchor: Option<SearchAnchor>,
    },
}

/// Ordered roads from the start endpoint to the end endpoint
#[derive(Clone, Debug, Default)]
pub struct Route {
    roads: Vec<Road>,
}

impl Route {
    #[inline]
    pub fn roads(&self) -> &[Road] {
        &self.roads
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.roads.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.roads.is_empty()
    }

    /// Total length in meters
    pub fn total_length(&self) -> f64 {
        self.roads.iter().map(Road::length).sum()
    }

    /// Estimated minutes at each road's speed limit
    pub fn travel_minutes(&self) -> f64 {
        self.roads.iter().map(Road::travel_minutes).sum()
    }

    pub fn into_roads(self) -> Vec<Road> {
        self.roads
    }
}

#[derive(Clone, Copy, Debug)]
struct QueueEntry {
    priority: f64,
    vertex: VertexId,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| self.vertex.cmp(&other.vertex))
    }
}

/// Where a free-form point meets the road network
#[derive(Clone, Copy, Debug)]
struct Attachment {
    point: Coord<f64>,
    road: RoadId,
    /// Perpendicular foot of `point` on the road
    foot: Coord<f64>,
    /// Index of the segment holding `foot`
    segment: usize,
}

#[derive(Clone, Copy, Debug)]
struct ResolvedEndpoint {
    anchor: VertexId,
    attachment: Option<Attachment>,
}

/// A* route search with an incremental drag mode
#[derive(Debug)]
pub struct RouteFinder {
    drag: DragState,
    queue: BinaryHeap<Reverse<QueueEntry>>,
    /// Finalised vertices
    settled: HashSet<VertexId>,
    /// Every vertex whose search state was written
    touched: HashSet<VertexId>,
    speed_bound_kmh: f64,
}

impl Default for RouteFinder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RouteFinder {
    pub fn new() -> Self {
        Self::with_speed_bound(DEFAULT_SPEED_BOUND_KMH)
    }

    /// Use `speed_bound_kmh` as the optimistic speed of the fastest-mode heuristic
    pub fn with_speed_bound(speed_bound_kmh: f64) -> Self {
        Self {
            drag: DragState::Idle,
            queue: BinaryHeap::new(),
            settled: HashSet::new(),
            touched: HashSet::new(),
            speed_bound_kmh,
        }
    }

    #[inline]
    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    /// Number of vertices finalised by the retained or latest search
    #[inline]
    pub fn settled_count(&self) -> usize {
        self.settled.len()
    }

    /// Enter or leave drag mode; leaving performs the deferred cleanup
    pub fn set_drag_mode(&mut self, graph: &mut RoadGraph, enabled: bool, reversed: bool) {
        self.drag = match (enabled, self.drag) {
            (true, DragState::Dragging { anchor, .. }) => DragState::Dragging { reversed, anchor },
            (true, DragState::Idle) => DragState::Dragging {
                reversed,
                anchor: None,
            },
            (false, _) => {
                self.reset(graph);
                DragState::Idle
            }
        };
    }

    /// Find a route between two endpoints
    ///
    /// Bike requests always minimise distance. Fails with
    /// [`MapError::NoPathFound`] when an endpoint cannot be resolved or the
    /// target cannot be reached; outside drag mode the graph's search state is
    /// clean again whenever this returns.
    pub fn find_path(
        &mut self,
        graph: &mut RoadGraph,
        index: &SpatialIndex,
        from: Endpoint,
        to: Endpoint,
        vehicle: VehicleClass,
        cost: CostModel,
    ) -> Result<Route> {
        let result = self.find_path_inner(graph, index, from, to, vehicle, cost);
        match (&result, self.drag) {
            (Err(_), DragState::Dragging { reversed, .. }) => {
                self.reset(graph);
                self.drag = DragState::Dragging {
                    reversed,
                    anchor: None,
                };
            }
            (_, DragState::Idle) => self.reset(graph),
            _ => {}
        }
        result
    }

    fn find_path_inner(
        &mut self,
        graph: &mut RoadGraph,
        index: &SpatialIndex,
        from: Endpoint,
        to: Endpoint,
        vehicle: VehicleClass,
        cost: CostModel,
    ) -> Result<Route> {
        let cost = match vehicle {
            VehicleClass::Bike => CostModel::Shortest,
            VehicleClass::Car => cost,
        };

        let start = resolve_endpoint(graph, index, from, vehicle)?;
        let end = resolve_endpoint(graph, index, to, vehicle)?;

        if start.anchor == end.anchor
            && start.attachment.is_none()
            && end.attachment.is_none()
        {
            return Err(MapError::NoPathFound(NoPathReason::Unreachable));
        }

        let anchor = SearchAnchor {
            source: start.anchor,
            vehicle,
            cost,
        };
        let reuse = matches!(
            self.drag,
            DragState::Dragging { anchor: Some(previous), .. } if previous == anchor
        ) && self.settled.contains(&end.anchor);

        if reuse {
            tracing::trace!("Reusing retained search for vertex {}", end.anchor.0);
        } else {
            self.reset(graph);
            self.search(graph, anchor, end.anchor)?;
            if let DragState::Dragging { reversed, .. } = self.drag {
                self.drag = DragState::Dragging {
                    reversed,
                    anchor: Some(anchor),
                };
            }
        }

        let path = self.trace_back(graph, start.anchor, end.anchor)?;
        let mut roads = assemble(graph, path, &start, &end);
        if let DragState::Dragging { reversed: true, .. } = self.drag {
            roads.reverse();
        }
        Ok(Route { roads })
    }

    /// A* from `anchor.source` until `target` is settled
    fn search(
        &mut self,
        graph: &mut RoadGraph,
        anchor: SearchAnchor,
        target: VertexId,
    ) -> Result<()> {
        #[cfg(feature = "profiling")]
        profiling::scope!("routing::search");
        let target_pos = graph
            .vertex(target)
            .map(|v| v.position())
            .ok_or(MapError::NoPathFound(NoPathReason::UnknownVertex(target)))?;
        let heuristic = Heuristic {
            target: target_pos,
            cost: anchor.cost,
            meters_per_minute: self.speed_bound_kmh.max(f64::from(graph.max_speed_kmh())) * 1000.0
                / 60.0,
        };

        let Some(source) = graph.vertex_mut(anchor.source) else {
            return Err(MapError::NoPathFound(NoPathReason::UnknownVertex(
                anchor.source,
            )));
        };
        source.search.best = 0.0;
        source.search.heuristic = heuristic.estimate(source.position());
        let priority = source.search.heuristic;
        self.touched.insert(anchor.source);
        self.queue.push(Reverse(QueueEntry {
            priority,
            vertex: anchor.source,
        }));

        while let Some(Reverse(QueueEntry { vertex, .. })) = self.queue.pop() {
            if !self.settled.insert(vertex) {
                continue;
            }
            if vertex == target {
                tracing::debug!(
                    "Route search settled {} vertices, {} touched",
                    self.settled.len(),
                    self.touched.len()
                );
                return Ok(());
            }

            let Some(current) = graph.vertex(vertex) else {
                continue;
            };
            let best = current.search.best;

            let edges: SmallVec<[(RoadId, VertexId, f64, Coord<f64>); 8]> = graph
                .departures(vertex, anchor.vehicle)
                .filter_map(|road| {
                    let id = road.id()?;
                    let next = road.other_vertex(vertex)?;
                    let weight = match anchor.cost {
                        CostModel::Shortest => road.length(),
                        CostModel::Fastest => road.travel_minutes(),
                    };
                    Some((id, next, weight, road.vertex_position(next)?))
                })
                .collect();

            for (road, next, weight, position) in edges {
                if self.settled.contains(&next) {
                    continue;
                }
                let Some(neighbor) = graph.vertex_mut(next) else {
                    continue;
                };
                self.touched.insert(next);
                let candidate = best + weight;
                if candidate < neighbor.search.best {
                    neighbor.search.best = candidate;
                    neighbor.search.via = Some(road);
                    if neighbor.search.heuristic.is_infinite() {
                        neighbor.search.heuristic = heuristic.estimate(position);
                    }
                    self.queue.push(Reverse(QueueEntry {
                        priority: candidate + neighbor.search.heuristic,
                        vertex: next,
                    }));
                }
            }
        }

        tracing::debug!(
            "Route search exhausted after settling {} vertices",
            self.settled.len()
        );
        Err(MapError::NoPathFound(NoPathReason::Unreachable))
    }

    /// Follow predecessor roads from `target` back to `source`, returned in travel order
    fn trace_back(
        &self,
        graph: &RoadGraph,
        source: VertexId,
        target: VertexId,
    ) -> Result<Vec<Road>> {
        let mut path = Vec::new();
        let mut current = target;
        while current != source {
            let road = graph
                .vertex(current)
                .and_then(|v| v.search.via)
                .and_then(|id| graph.road(id))
                .ok_or(MapError::NoPathFound(NoPathReason::Unreachable))?;
            let previous = road
                .other_vertex(current)
                .ok_or(MapError::NoPathFound(NoPathReason::Unreachable))?;
            path.push(road.clone());
            current = previous;
            if path.len() > graph.road_count() {
                return Err(MapError::NoPathFound(NoPathReason::Unreachable));
            }
        }
        path.reverse();
        Ok(path)
    }

    /// Reset every touched vertex and drop retained search bookkeeping
    fn reset(&mut self, graph: &mut RoadGraph) {
        graph.reset_vertices(self.touched.drain());
        self.settled.clear();
        self.queue.clear();
    }
}

struct Heuristic {
    target: Coord<f64>,
    cost: CostModel,
    meters_per_minute: f64,
}

impl Heuristic {
    /// Lower bound of the remaining cost from `position`
    #[inline]
    fn estimate(&self, position: Coord<f64>) -> f64 {
        let distance = coord_distance(position, self.target);
        match self.cost {
            CostModel::Shortest => distance,
            CostModel::Fastest => distance / self.meters_per_minute,
        }
    }
}

fn resolve_endpoint(
    graph: &RoadGraph,
    index: &SpatialIndex,
    endpoint: Endpoint,
    vehicle: VehicleClass,
) -> Result<ResolvedEndpoint> {
    match endpoint {
        Endpoint::Vertex(id) => match graph.vertex(id) {
            Some(_) => Ok(ResolvedEndpoint {
                anchor: id,
                attachment: None,
            }),
            None => Err(MapError::NoPathFound(NoPathReason::UnknownVertex(id))),
        },
        Endpoint::Point(point) => {
            let usable = |record: &GeometryRecord| {
                record
                    .road_id()
                    .and_then(|id| graph.road(id))
                    .is_some_and(|road| road.access().permits(vehicle))
            };
            let road = index
                .query_nearest_where(point, usable)
                .and_then(GeometryRecord::road_id)
                .and_then(|id| graph.road(id))
                .ok_or(MapError::NoPathFound(NoPathReason::UnresolvedEndpoint))?;
            let id = road
                .id()
                .ok_or(MapError::NoPathFound(NoPathReason::UnresolvedEndpoint))?;

            let (segment, foot) = closest_segment(road.points(), point);
            Ok(ResolvedEndpoint {
                anchor: road.closest_vertex(point),
                attachment: Some(Attachment {
                    point,
                    road: id,
                    foot,
                    segment,
                }),
            })
        }
    }
}

/// Segment of `points` nearest to `point`, with the perpendicular foot on it
fn closest_segment(points: &[Coord<f64>], point: Coord<f64>) -> (usize, Coord<f64>) {
    let mut best = (0, points[0]);
    let mut best_distance = f64::INFINITY;
    for (i, pair) in points.windows(2).enumerate() {
        let distance = point_segment_distance(point, pair[0], pair[1]);
        if distance < best_distance {
            best_distance = distance;
            best = (i, project_onto_segment(point, pair[0], pair[1]));
        }
    }
    best
}

/// Straight synthetic road from `a` to `b`
fn connector(a: Coord<f64>, b: Coord<f64>) -> Option<Road> {
    synthetic(vec![a, b], None, VertexId::SENTINEL, VertexId::SENTINEL)
}

/// Synthetic road from points, skipping repeated points; `None` if it collapses to one point
fn synthetic(
    mut points: Vec<Coord<f64>>,
    template: Option<&Road>,
    from: VertexId,
    to: VertexId,
) -> Option<Road> {
    points.dedup();
    if points.len() < 2 {
        return None;
    }
    let (access, speed, name) = match template {
        Some(road) => (road.access(), road.speed_kmh(), road.name().map(str::to_string)),
        None => (RoadAccess::All, CONNECTOR_SPEED_KMH, None),
    };
    Some(Road::new(
        None,
        Arc::from(points),
        access,
        speed,
        name,
        from,
        to,
        false,
    ))
}

/// Points of `road` from the attachment foot to the end at `vertex`
fn foot_to_vertex(road: &Road, attachment: &Attachment, vertex: VertexId) -> Vec<Coord<f64>> {
    let points = road.points();
    let segment = attachment.segment.min(points.len().saturating_sub(2));
    let mut out = vec![attachment.foot];
    if vertex == road.from() {
        out.extend(points[..=segment].iter().rev().copied());
    } else {
        out.extend(points[segment + 1..].iter().copied());
    }
    out
}

/// Points of `road` between two attachments on it
fn foot_to_foot(road: &Road, a: &Attachment, b: &Attachment) -> Vec<Coord<f64>> {
    let points = road.points();
    let mut out = vec![a.foot];
    match a.segment.cmp(&b.segment) {
        Ordering::Less => out.extend(points[a.segment + 1..=b.segment].iter().copied()),
        Ordering::Greater => out.extend(points[b.segment + 1..=a.segment].iter().rev().copied()),
        Ordering::Equal => {}
    }
    out.push(b.foot);
    out
}

/// Add the walkway pieces of point endpoints around the searched path
fn assemble(
    graph: &RoadGraph,
    mut path: Vec<Road>,
    start: &ResolvedEndpoint,
    end: &ResolvedEndpoint,
) -> Vec<Road> {
    // Both points on the same road with nothing else in between
    if let (Some(s), Some(e)) = (&start.attachment, &end.attachment) {
        let only_shared_road = s.road == e.road
            && path.len() <= 1
            && path.iter().all(|road| road.id() == Some(s.road));
        if let (true, Some(road)) = (only_shared_road, graph.road(s.road)) {
            return [
                connector(s.point, s.foot),
                synthetic(
                    foot_to_foot(road, s, e),
                    Some(road),
                    VertexId::SENTINEL,
                    VertexId::SENTINEL,
                ),
                connector(e.foot, e.point),
            ]
            .into_iter()
            .flatten()
            .collect();
        }
    }

    let mut head = Vec::new();
    if let Some(s) = &start.attachment {
        if let Some(road) = graph.road(s.road) {
            head.extend(connector(s.point, s.foot));
            let mut toward = start.anchor;
            if path.first().and_then(Road::id) == Some(s.road) {
                let first = path.remove(0);
                toward = first.other_vertex(start.anchor).unwrap_or(start.anchor);
            }
            head.extend(synthetic(
                foot_to_vertex(road, s, toward),
                Some(road),
                VertexId::SENTINEL,
                toward,
            ));
        }
    }

    let mut tail = Vec::new();
    if let Some(e) = &end.attachment {
        if let Some(road) = graph.road(e.road) {
            let mut from = end.anchor;
            if path.last().and_then(Road::id) == Some(e.road) {
                if let Some(last) = path.pop() {
                    from = last.other_vertex(end.anchor).unwrap_or(end.anchor);
                }
            }
            let mut points = foot_to_vertex(road, e, from);
            points.reverse();
            tail.extend(synthetic(points, Some(road), from, VertexId::SENTINEL));
            tail.extend(connector(e.foot, e.point));
        }
    }

    head.into_iter().chain(path).chain(tail).collect()
}

//! Road network storage
//!
//! Vertices and roads live in flat, append-only arenas and refer to each other
//! by index only. Vertex index 0 is a sentinel that never takes part in a
//! search, so real vertices start at 1.

use crate::geometry::GeometryRecord;
use crate::utils::coord_distance;
use crate::Result;
use geo::Coord;
use smallvec::SmallVec;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable index of a vertex in the graph arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VertexId(pub usize);

impl VertexId {
    /// The non-vertex placeholder at index 0
    pub const SENTINEL: VertexId = VertexId(0);

    #[inline]
    pub fn is_sentinel(self) -> bool {
        self == Self::SENTINEL
    }
}

/// Stable index of a road in the graph arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoadId(pub usize);

/// Vehicle class a route is computed for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VehicleClass {
    Car,
    Bike,
}

/// Who may use a road
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RoadAccess {
    All,
    BikeOnly,
    CarOnly,
    None,
}

impl RoadAccess {
    #[inline]
    pub fn permits(self, vehicle: VehicleClass) -> bool {
        match self {
            RoadAccess::All => true,
            RoadAccess::BikeOnly => vehicle == VehicleClass::Bike,
            RoadAccess::CarOnly => vehicle == VehicleClass::Car,
            RoadAccess::None => false,
        }
    }
}

/// A polyline between two vertices with routing attributes
#[derive(Clone, Debug)]
pub struct Road {
    /// `None` for synthetic connectors produced while assembling a route
    id: Option<RoadId>,
    points: Arc<[Coord<f64>]>,
    access: RoadAccess,
    speed_kmh: u16,
    name: Option<String>,
    from: VertexId,
    to: VertexId,
    roundabout: bool,
    /// Length in meters
    length: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Road {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: Option<RoadId>,
        points: Arc<[Coord<f64>]>,
        access: RoadAccess,
        speed_kmh: u16,
        name: Option<String>,
        from: VertexId,
        to: VertexId,
        roundabout: bool,
    ) -> Self {
        let length = points
            .windows(2)
            .map(|pair| coord_distance(pair[0], pair[1]))
            .sum();
        Self {
            id,
            points,
            access,
            speed_kmh,
            name,
            from,
            to,
            roundabout,
            length,
        }
    }

    /// Arena id, or `None` for a synthetic connector
    #[inline]
    pub fn id(&self) -> Option<RoadId> {
        self.id
    }

    #[inline]
    pub fn is_synthetic(&self) -> bool {
        self.id.is_none()
    }

    /// Length in meters
    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    #[inline]
    pub fn speed_kmh(&self) -> u16 {
        self.speed_kmh
    }

    /// Estimated minutes to traverse the road at its speed limit
    pub fn travel_minutes(&self) -> f64 {
        let meters_per_minute = f64::from(self.speed_kmh.max(1)) * 1000.0 / 60.0;
        self.length / meters_per_minute
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn access(&self) -> RoadAccess {
        self.access
    }

    #[inline]
    pub fn is_roundabout(&self) -> bool {
        self.roundabout
    }

    #[inline]
    pub fn from(&self) -> VertexId {
        self.from
    }

    #[inline]
    pub fn to(&self) -> VertexId {
        self.to
    }

    #[inline]
    pub fn points(&self) -> &[Coord<f64>] {
        &self.points
    }

    #[inline]
    pub fn start_point(&self) -> Coord<f64> {
        self.points[0]
    }

    #[inline]
    pub fn end_point(&self) -> Coord<f64> {
        self.points[self.points.len() - 1]
    }

    /// The endpoint opposite `vertex`, if `vertex` is one of the ends
    pub fn other_vertex(&self, vertex: VertexId) -> Option<VertexId> {
        if vertex == self.from {
            Some(self.to)
        } else if vertex == self.to {
            Some(self.from)
        } else {
            None
        }
    }

    /// Position of the road end at `vertex`
    pub fn vertex_position(&self, vertex: VertexId) -> Option<Coord<f64>> {
        if vertex == self.from {
            Some(self.start_point())
        } else if vertex == self.to {
            Some(self.end_point())
        } else {
            None
        }
    }

    /// The polyline point adjacent to the end at `vertex`, used for turn directions
    pub fn second_position(&self, vertex: VertexId) -> Option<Coord<f64>> {
        let n = self.points.len();
        if vertex == self.from {
            self.points.get(1.min(n - 1)).copied()
        } else if vertex == self.to {
            self.points.get(n.saturating_sub(2)).copied()
        } else {
            None
        }
    }

    /// The endpoint closer to `point`; ties go to the start
    pub fn closest_vertex(&self, point: Coord<f64>) -> VertexId {
        if coord_distance(point, self.start_point()) > coord_distance(point, self.end_point()) {
            self.to
        } else {
            self.from
        }
    }

    /// A vertex both roads end at, preferring this road's start
    pub fn shared_vertex(&self, other: &Road) -> Option<VertexId> {
        if self.from == other.from || self.from == other.to {
            Some(self.from)
        } else if self.to == other.from || self.to == other.to {
            Some(self.to)
        } else {
            None
        }
    }

    /// Geometry record for the index; synthetic roads become plain records
    pub fn to_record(&self) -> Result<GeometryRecord> {
        match self.id {
            Some(id) => GeometryRecord::road(id, self.points.clone(), self.roundabout),
            None => GeometryRecord::new(self.points.to_vec()),
        }
    }
}

/// Transient per-query bookkeeping of a vertex
#[derive(Clone, Copy, Debug)]
pub(crate) struct SearchState {
    pub best: f64,
    pub heuristic: f64,
    pub via: Option<RoadId>,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            best: f64::INFINITY,
            heuristic: f64::INFINITY,
            via: None,
        }
    }
}

/// Road network intersection
#[derive(Clone, Debug)]
pub struct Vertex {
    id: VertexId,
    position: Coord<f64>,
    departures: SmallVec<[RoadId; 4]>,
    pub(crate) search: SearchState,
}

impl Vertex {
    #[inline]
    pub fn id(&self) -> VertexId {
        self.id
    }

    #[inline]
    pub fn position(&self) -> Coord<f64> {
        self.position
    }

    /// Roads that may legally be entered from this vertex
    #[inline]
    pub fn departures(&self) -> &[RoadId] {
        &self.departures
    }

    /// Best cost found by the latest search, infinite when untouched
    #[inline]
    pub fn best_cost(&self) -> f64 {
        self.search.best
    }

    pub(crate) fn reset(&mut self) {
        self.search = SearchState::default();
    }
}

/// Arena of vertices and roads
#[derive(Clone, Debug)]
pub struct RoadGraph {
    vertices: Vec<Vertex>,
    roads: Vec<Road>,
    max_speed_kmh: u16,
}

impl Default for RoadGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RoadGraph {
    pub fn new() -> Self {
        Self {
            vertices: vec![Vertex {
                id: VertexId::SENTINEL,
                position: Coord { x: f64::NAN, y: f64::NAN },
                departures: SmallVec::new(),
                search: SearchState::default(),
            }],
            roads: Vec::new(),
            max_speed_kmh: 0,
        }
    }

    pub(crate) fn add_vertex(&mut self, position: Coord<f64>) -> VertexId {
        let id = VertexId(self.vertices.len());
        self.vertices.push(Vertex {
            id,
            position,
            departures: SmallVec::new(),
            search: SearchState::default(),
        });
        id
    }

    /// Append a road, assigning it the next id
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn add_road(
        &mut self,
        points: Arc<[Coord<f64>]>,
        access: RoadAccess,
        speed_kmh: u16,
        name: Option<String>,
        from: VertexId,
        to: VertexId,
        roundabout: bool,
    ) -> RoadId {
        let id = RoadId(self.roads.len());
        self.max_speed_kmh = self.max_speed_kmh.max(speed_kmh);
        self.roads.push(Road::new(
            Some(id),
            points,
            access,
            speed_kmh,
            name,
            from,
            to,
            roundabout,
        ));
        id
    }

    /// Register `road` as a legal departure from `vertex`
    pub(crate) fn attach(&mut self, vertex: VertexId, road: RoadId) {
        if let Some(v) = self.vertices.get_mut(vertex.0) {
            v.departures.push(road);
        }
    }

    /// A real vertex; the sentinel and out-of-range ids yield `None`
    #[inline]
    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        if id.is_sentinel() {
            return None;
        }
        self.vertices.get(id.0)
    }

    pub(crate) fn vertex_mut(&mut self, id: VertexId) -> Option<&mut Vertex> {
        if id.is_sentinel() {
            return None;
        }
        self.vertices.get_mut(id.0)
    }

    #[inline]
    pub fn road(&self, id: RoadId) -> Option<&Road> {
        self.roads.get(id.0)
    }

    /// All real vertices in id order
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.iter().skip(1)
    }

    #[inline]
    pub fn roads(&self) -> &[Road] {
        &self.roads
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() - 1
    }

    #[inline]
    pub fn road_count(&self) -> usize {
        self.roads.len()
    }

    /// Departures from `vertex` usable by `vehicle`
    pub fn departures(
        &self,
        vertex: VertexId,
        vehicle: VehicleClass,
    ) -> impl Iterator<Item = &Road> + '_ {
        self.vertex(vertex)
            .map(|v| v.departures.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.roads.get(id.0))
            .filter(move |road| road.access.permits(vehicle))
    }

    /// Index records for every road
    pub fn road_records(&self) -> Vec<GeometryRecord> {
        self.roads
            .iter()
            .filter_map(|road| match road.to_record() {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!("Skipping road without geometry: {}", err);
                    None
                }
            })
            .collect()
    }

    /// Highest speed limit of any road
    #[inline]
    pub fn max_speed_kmh(&self) -> u16 {
        self.max_speed_kmh
    }

    /// Clear search state of the given vertices
    pub(crate) fn reset_vertices(&mut self, ids: impl IntoIterator<Item = VertexId>) {
        for id in ids {
            if let Some(v) = self.vertices.get_mut(id.0) {
                v.reset();
            }
        }
    }
}

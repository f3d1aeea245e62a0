//! Island Map Library - Spatial Indexing and Routing for a Bounded Map Region
//!
//! This library provides the engine underneath an interactive map viewer: it answers
//! "what is visible in this viewport", "what is nearest to this point" and "what is the
//! best route from A to B", and it assembles raw parsed map data into the graph and the
//! indices those queries run against.
//!
//! # Architecture
//!
//! - **[`GeometryRecord`]**: Immutable polyline/polygon with a cached bounding box
//! - **[`SpatialIndex`]**: Static partition tree answering rectangle and nearest queries
//! - **[`WayGraphBuilder`]**: Splits tagged ways at shared points into a [`RoadGraph`]
//! - **[`RouteFinder`]**: A* search over the road graph with an incremental drag mode
//! - **[`CoastStitcher`]**: Joins bounds-clipped coastline segments into closed islands
//! - **[`MapModel`]**: High-level owner of the graph, the indices and the route finder
//!
//! # Coordinates
//!
//! All geometry lives in planar world units (meters) with `y` growing southward, the
//! same orientation as screen space. [`utils::LocalProjection`] converts from WGS84.
//!
//! # Performance Characteristics
//!
//! - **Index Build**: expected O(N log N), quadratic on adversarial input ordering
//! - **Rectangle Query**: O(log L + K) where L=leaves, K=returned buckets
//! - **Route Query**: O((V + E) log V) in the worst case, usually far less with A*

mod builder;
mod coast;
mod feed;
mod geometry;
mod graph;
mod index;
mod map;
mod routing;
pub mod utils;

// Public API exports
pub use builder::{BuildStats, WayGraphBuilder};
pub use coast::{CoastConfig, CoastStitcher};
pub use feed::{FeatureCategory, OneWay, Poi, RawMapFeed, RoadTags, RoadType, TaggedWay, WayKind};
pub use geometry::{Axis, GeometryRecord, Shape};
pub use graph::{Road, RoadAccess, RoadGraph, RoadId, VehicleClass, Vertex, VertexId};
pub use index::{IndexConfig, SpatialIndex};
pub use map::{Config, LayerSettings, MapInfo, MapModel};
pub use routing::{CostModel, DragState, Endpoint, Route, RouteFinder, SearchAnchor};

/// Why a route query could not produce a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoPathReason {
    /// A free-form endpoint had no road within the nearest-query tolerance
    UnresolvedEndpoint,
    /// A vertex endpoint does not exist in the graph
    UnknownVertex(VertexId),
    /// The search frontier emptied before reaching the target
    Unreachable,
}

impl std::fmt::Display for NoPathReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoPathReason::UnresolvedEndpoint => write!(f, "no road within range of an endpoint"),
            NoPathReason::UnknownVertex(id) => write!(f, "vertex {} does not exist", id.0),
            NoPathReason::Unreachable => write!(f, "target is unreachable for this vehicle"),
        }
    }
}

/// Error types for the map engine
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("No path found: {0}")]
    NoPathFound(NoPathReason),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, MapError>;

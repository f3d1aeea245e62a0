//! Road graph construction from tagged ways
//!
//! Ways are cut at every point identifier they share with another way (or
//! revisit themselves). Each piece becomes one road between two vertices, and
//! vertices are created on the first sighting of an identifier.

use crate::feed::{OneWay, RoadTags};
use crate::graph::{RoadGraph, VertexId};
use geo::Coord;
use std::collections::HashMap;
use std::sync::Arc;

/// Counters describing one graph build
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Ways accepted for splitting
    pub ways: usize,
    /// Ways dropped for having fewer than two resolvable points
    pub discarded_ways: usize,
    /// Point identifiers with no known coordinate
    pub unresolved_ids: usize,
    /// Identifiers where at least one way was cut
    pub split_points: usize,
    pub vertices: usize,
    pub roads: usize,
}

#[derive(Debug)]
struct PendingWay {
    nodes: Vec<i64>,
    tags: RoadTags,
}

/// Collects road ways and turns them into a [`RoadGraph`]
pub struct WayGraphBuilder<'a> {
    points: &'a HashMap<i64, Coord<f64>>,
    ways: Vec<PendingWay>,
    stats: BuildStats,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> WayGraphBuilder<'a> {
    pub fn new(points: &'a HashMap<i64, Coord<f64>>) -> Self {
        Self {
            points,
            ways: Vec::new(),
            stats: BuildStats::default(),
        }
    }

    /// Queue a road way; unknown identifiers are dropped and short ways discarded
    pub fn add_way(&mut self, nodes: Vec<i64>, tags: RoadTags) {
        let total = nodes.len();
        let mut resolved: Vec<i64> = nodes
            .into_iter()
            .filter(|id| self.points.contains_key(id))
            .collect();
        let missing = total - resolved.len();
        if missing > 0 {
            tracing::debug!("Way dropped {} unresolved point ids", missing);
            self.stats.unresolved_ids += missing;
        }

        // A point repeated back-to-back adds no geometry
        resolved.dedup();
        if resolved.len() < 2 {
            self.stats.discarded_ways += 1;
            return;
        }

        self.stats.ways += 1;
        self.ways.push(PendingWay {
            nodes: resolved,
            tags,
        });
    }

    /// Split all queued ways and assemble the graph
    pub fn build(self) -> (RoadGraph, BuildStats) {
        #[cfg(feature = "profiling")]
        profiling::scope!("builder::build");
        let Self {
            points,
            ways,
            mut stats,
        } = self;

        // Every occurrence counts, so a way revisiting a point is cut there too
        let mut occurrences: HashMap<i64, u32> = HashMap::new();
        for way in &ways {
            for id in &way.nodes {
                *occurrences.entry(*id).or_default() += 1;
            }
        }
        stats.split_points = occurrences.values().filter(|&&n| n > 1).count();

        let mut graph = RoadGraph::new();
        let mut vertex_of: HashMap<i64, VertexId> = HashMap::new();

        for way in &ways {
            for piece in split_way(&way.nodes, &occurrences) {
                let (Some(&first), Some(&last)) = (piece.first(), piece.last()) else {
                    continue;
                };
                let coords: Vec<Coord<f64>> = piece
                    .iter()
                    .filter_map(|id| points.get(id).copied())
                    .collect();
                if coords.len() < 2 {
                    continue;
                }

                let from = vertex_id(&mut graph, &mut vertex_of, first, coords[0]);
                let to = vertex_id(&mut graph, &mut vertex_of, last, coords[coords.len() - 1]);

                let tags = &way.tags;
                let road = graph.add_road(
                    Arc::from(coords),
                    tags.access(),
                    tags.effective_speed_kmh(),
                    tags.name.clone(),
                    from,
                    to,
                    tags.roundabout,
                );

                match tags.effective_oneway() {
                    OneWay::No => {
                        graph.attach(from, road);
                        if to != from {
                            graph.attach(to, road);
                        }
                    }
                    OneWay::Forward => graph.attach(from, road),
                    OneWay::Backward => graph.attach(to, road),
                }
            }
        }

        stats.vertices = graph.vertex_count();
        stats.roads = graph.road_count();
        tracing::info!(
            "Built road graph: {} vertices, {} roads from {} ways ({} discarded, {} unresolved ids)",
            stats.vertices,
            stats.roads,
            stats.ways,
            stats.discarded_ways,
            stats.unresolved_ids
        );
        (graph, stats)
    }
}

/// Cut `nodes` at interior identifiers seen more than once overall
///
/// The way's own end identifiers never cause a cut.
fn split_way<'n>(nodes: &'n [i64], occurrences: &HashMap<i64, u32>) -> Vec<&'n [i64]> {
    let (Some(&first), Some(&last)) = (nodes.first(), nodes.last()) else {
        return Vec::new();
    };

    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, id) in nodes.iter().enumerate().take(nodes.len() - 1).skip(1) {
        let shared = occurrences.get(id).is_some_and(|&n| n > 1);
        if shared && *id != first && *id != last {
            pieces.push(&nodes[start..=i]);
            start = i;
        }
    }
    pieces.push(&nodes[start..]);
    pieces
}

fn vertex_id(
    graph: &mut RoadGraph,
    vertex_of: &mut HashMap<i64, VertexId>,
    node: i64,
    position: Coord<f64>,
) -> VertexId {
    *vertex_of
        .entry(node)
        .or_insert_with(|| graph.add_vertex(position))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::RoadType;
    use crate::graph::{RoadAccess, VehicleClass};

    fn points(entries: &[(i64, f64, f64)]) -> HashMap<i64, Coord<f64>> {
        entries
            .iter()
            .map(|&(id, x, y)| (id, Coord { x, y }))
            .collect()
    }

    fn named(road_type: RoadType, name: &str) -> RoadTags {
        RoadTags {
            name: Some(name.to_string()),
            ..RoadTags::new(road_type)
        }
    }

    #[test]
    fn test_unshared_way_yields_one_road() {
        let pts = points(&[(1, 0.0, 0.0), (2, 10.0, 0.0), (3, 20.0, 0.0)]);
        let mut builder = WayGraphBuilder::new(&pts);
        builder.add_way(vec![1, 2, 3], named(RoadType::Residential, "Main"));
        let (graph, stats) = builder.build();

        assert_eq!(graph.road_count(), 1);
        assert_eq!(graph.vertex_count(), 2, "Only the ends become vertices");
        assert_eq!(stats.split_points, 0);
        assert_eq!(graph.roads()[0].points().len(), 3);
    }

    #[test]
    fn test_shared_midpoint_splits_both_ways() {
        // Two ways crossing at point 5
        let pts = points(&[
            (1, 0.0, 10.0),
            (5, 10.0, 10.0),
            (2, 20.0, 10.0),
            (3, 10.0, 0.0),
            (4, 10.0, 20.0),
        ]);
        let mut builder = WayGraphBuilder::new(&pts);
        let mut main = named(RoadType::Primary, "Main");
        main.speed_kmh = Some(70);
        builder.add_way(vec![1, 5, 2], main);
        builder.add_way(vec![3, 5, 4], named(RoadType::Residential, "Cross"));
        let (graph, stats) = builder.build();

        assert_eq!(graph.road_count(), 4);
        assert_eq!(graph.vertex_count(), 5);
        assert_eq!(stats.split_points, 1);

        let main_roads: Vec<_> = graph
            .roads()
            .iter()
            .filter(|r| r.name() == Some("Main"))
            .collect();
        assert_eq!(main_roads.len(), 2);
        for road in &main_roads {
            assert_eq!(road.speed_kmh(), 70, "Split pieces keep the tagged speed");
            assert_eq!(road.access(), RoadAccess::All);
        }
        assert_eq!(main_roads[0].end_point(), Coord { x: 10.0, y: 10.0 });
        assert_eq!(main_roads[1].start_point(), Coord { x: 10.0, y: 10.0 });
        assert_eq!(main_roads[0].to(), main_roads[1].from(), "Pieces meet at one vertex");

        let hub = main_roads[0].to();
        assert_eq!(graph.vertex(hub).unwrap().departures().len(), 4);
    }

    #[test]
    fn test_shared_endpoint_does_not_split() {
        let pts = points(&[(1, 0.0, 0.0), (2, 10.0, 0.0), (3, 20.0, 0.0), (4, 30.0, 0.0)]);
        let mut builder = WayGraphBuilder::new(&pts);
        builder.add_way(vec![1, 2], RoadTags::default());
        builder.add_way(vec![2, 3, 4], RoadTags::default());
        let (graph, _) = builder.build();
        assert_eq!(graph.road_count(), 2);
        assert_eq!(graph.vertex_count(), 3);
    }

    #[test]
    fn test_vertex_ids_start_at_one_and_are_reused() {
        let pts = points(&[(10, 0.0, 0.0), (20, 1.0, 0.0), (30, 2.0, 0.0)]);
        let mut builder = WayGraphBuilder::new(&pts);
        builder.add_way(vec![10, 20], RoadTags::default());
        builder.add_way(vec![20, 30], RoadTags::default());
        let (graph, _) = builder.build();

        let first = &graph.roads()[0];
        let second = &graph.roads()[1];
        assert_eq!(first.from(), VertexId(1));
        assert_eq!(first.to(), VertexId(2));
        assert_eq!(second.from(), VertexId(2));
        assert_eq!(second.to(), VertexId(3));
    }

    #[test]
    fn test_directionality_attachment() {
        let pts = points(&[(1, 0.0, 0.0), (2, 10.0, 0.0)]);
        let attached = |oneway: OneWay, roundabout: bool| {
            let mut builder = WayGraphBuilder::new(&pts);
            let tags = RoadTags {
                oneway,
                roundabout,
                ..RoadTags::default()
            };
            builder.add_way(vec![1, 2], tags);
            let (graph, _) = builder.build();
            let at = |v: usize| graph.vertex(VertexId(v)).unwrap().departures().len();
            (at(1), at(2))
        };

        assert_eq!(attached(OneWay::No, false), (1, 1));
        assert_eq!(attached(OneWay::Forward, false), (1, 0));
        assert_eq!(attached(OneWay::Backward, false), (0, 1));
        assert_eq!(attached(OneWay::Backward, true), (1, 0), "Roundabouts attach at start");
    }

    #[test]
    fn test_closed_roundabout_with_exit() {
        let pts = points(&[(1, 0.0, 0.0), (2, 10.0, 0.0), (3, 10.0, 10.0), (4, 20.0, 0.0)]);
        let mut builder = WayGraphBuilder::new(&pts);
        let ring = RoadTags {
            roundabout: true,
            ..RoadTags::new(RoadType::Tertiary)
        };
        builder.add_way(vec![1, 2, 3, 1], ring);
        builder.add_way(vec![2, 4], RoadTags::default());
        let (graph, _) = builder.build();

        // Ring is cut at the exit point 2
        let ring_roads: Vec<_> = graph.roads().iter().filter(|r| r.is_roundabout()).collect();
        assert_eq!(ring_roads.len(), 2);
        assert_eq!(ring_roads[0].from(), ring_roads[1].to());
        for road in ring_roads {
            let from = graph.vertex(road.from()).unwrap();
            assert!(from.departures().contains(&road.id().unwrap()));
        }
    }

    #[test]
    fn test_malformed_ways_are_skipped() {
        let pts = points(&[(1, 0.0, 0.0), (2, 10.0, 0.0)]);
        let mut builder = WayGraphBuilder::new(&pts);
        builder.add_way(vec![], RoadTags::default());
        builder.add_way(vec![1], RoadTags::default());
        builder.add_way(vec![1, 99], RoadTags::default());
        builder.add_way(vec![1, 1], RoadTags::default());
        builder.add_way(vec![1, 42, 2], RoadTags::default());
        let (graph, stats) = builder.build();

        assert_eq!(stats.discarded_ways, 4);
        assert_eq!(stats.unresolved_ids, 2);
        assert_eq!(stats.ways, 1);
        assert_eq!(graph.road_count(), 1);
        assert_eq!(graph.roads()[0].points().len(), 2);
    }

    #[test]
    fn test_access_flows_into_roads() {
        let pts = points(&[(1, 0.0, 0.0), (2, 10.0, 0.0), (3, 20.0, 0.0)]);
        let mut builder = WayGraphBuilder::new(&pts);
        builder.add_way(vec![1, 2], RoadTags::new(RoadType::Motorway));
        builder.add_way(vec![2, 3], RoadTags::new(RoadType::Cycleway));
        let (graph, _) = builder.build();

        assert_eq!(graph.roads()[0].access(), RoadAccess::CarOnly);
        assert_eq!(graph.roads()[0].speed_kmh(), 130);
        assert_eq!(graph.roads()[1].access(), RoadAccess::BikeOnly);
        assert_eq!(graph.departures(VertexId(2), VehicleClass::Bike).count(), 1);
        assert_eq!(graph.max_speed_kmh(), 130);
    }
}

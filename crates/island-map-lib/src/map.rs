//! Map model: owns the road graph, one spatial index per layer and the route finder

use crate::builder::{BuildStats, WayGraphBuilder};
use crate::coast::{CoastConfig, CoastStitcher};
use crate::feed::{FeatureCategory, Poi, RawMapFeed, WayKind};
use crate::geometry::GeometryRecord;
use crate::graph::{Road, RoadGraph, VehicleClass};
use crate::index::{IndexConfig, SpatialIndex};
use crate::routing::{CostModel, Endpoint, Route, RouteFinder, DEFAULT_SPEED_BOUND_KMH};
use crate::{MapError, Result};
use geo::{Coord, Rect};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index shape for one layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerSettings {
    pub leaf_capacity: usize,
    pub compact: bool,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            leaf_capacity: 64,
            compact: false,
        }
    }
}

impl LayerSettings {
    const fn new(leaf_capacity: usize, compact: bool) -> Self {
        Self {
            leaf_capacity,
            compact,
        }
    }
}

/// Configuration for building a [`MapModel`]
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Side of the square probed by nearest queries (world units).
    /// Default: 225
    pub nearest_tolerance: f64,
    /// Per-layer index settings; missing layers use [`LayerSettings::default`]
    pub layers: BTreeMap<FeatureCategory, LayerSettings>,
    /// Margins for closing clipped coastlines
    pub coast: CoastConfig,
    /// Optimistic speed used by the fastest-route heuristic (km/h).
    /// Raised automatically when the graph holds a faster road.
    pub speed_bound_kmh: f64,
}

impl Default for Config {
    fn default() -> Self {
        use FeatureCategory::*;
        let layers = [
            (Navigation, LayerSettings::new(64, false)),
            (Walkway, LayerSettings::new(4, true)),
            (Cycleway, LayerSettings::new(4, true)),
            (RoadLevel1, LayerSettings::new(16, true)),
            (RoadLevel2, LayerSettings::new(16, true)),
            (RoadLevel3, LayerSettings::new(16, true)),
            (RoadLevel4, LayerSettings::new(16, true)),
            (RoadLevel5, LayerSettings::new(16, true)),
            (Railway, LayerSettings::new(8, true)),
            (Forest, LayerSettings::new(64, false)),
            (Plain, LayerSettings::new(8, true)),
            (Grass, LayerSettings::new(16, true)),
            (Industrial, LayerSettings::new(4, true)),
            (Residential, LayerSettings::new(4, true)),
            (Water, LayerSettings::new(64, false)),
            (Waterway, LayerSettings::new(8, true)),
            (Parking, LayerSettings::new(4, true)),
            (Building, LayerSettings::new(32, true)),
            (Farmland, LayerSettings::new(16, true)),
            (Sand, LayerSettings::new(16, true)),
            (Coast, LayerSettings::new(64, false)),
        ]
        .into_iter()
        .collect();

        Self {
            nearest_tolerance: 225.0,
            layers,
            coast: CoastConfig::default(),
            speed_bound_kmh: DEFAULT_SPEED_BOUND_KMH,
        }
    }
}

impl Config {
    pub fn layer_settings(&self, category: FeatureCategory) -> LayerSettings {
        self.layers.get(&category).copied().unwrap_or_default()
    }

    /// Index settings for a layer; navigation roads are never compacted so
    /// every record keeps its road identity
    pub fn index_config(&self, category: FeatureCategory) -> IndexConfig {
        let settings = self.layer_settings(category);
        IndexConfig {
            leaf_capacity: settings.leaf_capacity,
            compact: settings.compact && category != FeatureCategory::Navigation,
            nearest_tolerance: self.nearest_tolerance,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for category in FeatureCategory::ALL {
            self.index_config(category).validate()?;
        }
        self.coast.validate()?;
        if !(self.speed_bound_kmh.is_finite() && self.speed_bound_kmh > 0.0) {
            return Err(MapError::InvalidConfig(format!(
                "speed bound must be positive, got {}",
                self.speed_bound_kmh
            )));
        }
        Ok(())
    }
}

/// Summary of a built model
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MapInfo {
    pub bounds: Option<Rect<f64>>,
    pub vertex_count: usize,
    pub road_count: usize,
    pub poi_count: usize,
    /// Closed coastline polygons
    pub island_count: usize,
    /// Record count of every non-empty layer
    pub layer_sizes: BTreeMap<FeatureCategory, usize>,
    pub discarded_ways: usize,
    pub unresolved_ids: usize,
}

/// Top-level owner of everything the viewer queries
#[derive(Debug)]
pub struct MapModel {
    bounds: Rect<f64>,
    graph: RoadGraph,
    layers: HashMap<FeatureCategory, SpatialIndex>,
    pois: Vec<Poi>,
    finder: RouteFinder,
    stats: BuildStats,
    config: Config,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl MapModel {
    /// Build the graph and every layer index from a parsed feed
    ///
    /// Roads feed both the navigation graph and their render layer. Feature
    /// ways tagged with a derived category are skipped, since those layers are
    /// produced here.
    pub fn build(feed: RawMapFeed, config: Config) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("map::build");

        config.validate()?;

        let mut builder = WayGraphBuilder::new(&feed.points);
        let mut buckets: HashMap<FeatureCategory, Vec<GeometryRecord>> = HashMap::new();
        let mut skipped_derived = 0usize;

        for way in &feed.ways {
            let (category, road_tags) = match &way.kind {
                WayKind::Road(tags) => (tags.road_type.render_category(), Some(tags)),
                WayKind::Feature(category) if category.is_derived() => {
                    skipped_derived += 1;
                    continue;
                }
                WayKind::Feature(category) => (*category, None),
            };
            if let Some(tags) = road_tags {
                builder.add_way(way.nodes.clone(), tags.clone());
            }
            // Unresolvable ways are counted by the builder; feature ways vanish silently
            if let Ok(record) = GeometryRecord::new(feed.resolve(&way.nodes)) {
                buckets.entry(category).or_default().push(record);
            }
        }
        if skipped_derived > 0 {
            tracing::warn!(
                "Skipped {} feature ways tagged with a derived layer",
                skipped_derived
            );
        }

        let (graph, stats) = builder.build();
        buckets.insert(FeatureCategory::Navigation, graph.road_records());

        if !feed.coastlines.is_empty() {
            let mut stitcher = CoastStitcher::new(feed.bounds, config.coast)?;
            for segment in feed.coastlines {
                stitcher.add_segment(segment);
            }
            buckets.insert(FeatureCategory::Coast, stitcher.stitch());
        }

        // Layers are independent, so their indices build in parallel
        let layers: HashMap<FeatureCategory, SpatialIndex> = buckets
            .into_par_iter()
            .map(|(category, records)| {
                let index = SpatialIndex::build(records, config.index_config(category))?;
                tracing::debug!(
                    "Layer {}: {} records in {} leaves",
                    category,
                    index.len(),
                    index.leaf_count()
                );
                Ok((category, index))
            })
            .collect::<Result<_>>()?;

        let speed_bound = config
            .speed_bound_kmh
            .max(f64::from(graph.max_speed_kmh()));

        tracing::info!(
            "Built map model: {} vertices, {} roads, {} layers, {} points of interest",
            graph.vertex_count(),
            graph.road_count(),
            layers.len(),
            feed.pois.len()
        );

        Ok(Self {
            bounds: feed.bounds,
            graph,
            layers,
            pois: feed.pois,
            finder: RouteFinder::with_speed_bound(speed_bound),
            stats,
            config,
        })
    }

    /// Buckets of a layer intersecting `rect`; empty when the layer has no data
    pub fn query_visible(
        &self,
        category: FeatureCategory,
        rect: Rect<f64>,
    ) -> Vec<&[GeometryRecord]> {
        self.layers
            .get(&category)
            .map(|index| index.query_rect(rect))
            .unwrap_or_default()
    }

    #[inline]
    pub fn layer(&self, category: FeatureCategory) -> Option<&SpatialIndex> {
        self.layers.get(&category)
    }

    /// Road closest to `point` within the nearest-query tolerance
    pub fn nearest_road(&self, point: Coord<f64>) -> Option<&Road> {
        let index = self.layers.get(&FeatureCategory::Navigation)?;
        let record = index.query_nearest_where(point, |record| record.road_id().is_some())?;
        record.road_id().and_then(|id| self.graph.road(id))
    }

    /// Route between two endpoints over the navigation layer
    pub fn find_path(
        &mut self,
        from: Endpoint,
        to: Endpoint,
        vehicle: VehicleClass,
        cost: CostModel,
    ) -> Result<Route> {
        let index = self
            .layers
            .get(&FeatureCategory::Navigation)
            .ok_or_else(|| MapError::InvalidConfig("navigation layer missing".to_string()))?;
        let route = self
            .finder
            .find_path(&mut self.graph, index, from, to, vehicle, cost)?;
        tracing::debug!(
            "Route with {} roads, {:.0} m, {} vertices settled",
            route.len(),
            route.total_length(),
            self.finder.settled_count()
        );
        Ok(route)
    }

    pub fn set_drag_mode(&mut self, enabled: bool, reversed: bool) {
        self.finder.set_drag_mode(&mut self.graph, enabled, reversed);
    }

    #[inline]
    pub fn graph(&self) -> &RoadGraph {
        &self.graph
    }

    #[inline]
    pub fn route_finder(&self) -> &RouteFinder {
        &self.finder
    }

    #[inline]
    pub fn pois(&self) -> &[Poi] {
        &self.pois
    }

    /// Point of interest by name, exact match first, then ignoring ASCII case
    pub fn poi(&self, name: &str) -> Option<&Poi> {
        self.pois
            .iter()
            .find(|poi| poi.name == name)
            .or_else(|| self.pois.iter().find(|poi| poi.name.eq_ignore_ascii_case(name)))
    }

    #[inline]
    pub fn bounds(&self) -> Rect<f64> {
        self.bounds
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn info(&self) -> MapInfo {
        MapInfo {
            bounds: Some(self.bounds),
            vertex_count: self.graph.vertex_count(),
            road_count: self.graph.road_count(),
            poi_count: self.pois.len(),
            island_count: self
                .layers
                .get(&FeatureCategory::Coast)
                .map_or(0, SpatialIndex::len),
            layer_sizes: self
                .layers
                .iter()
                .filter(|(_, index)| !index.is_empty())
                .map(|(category, index)| (*category, index.len()))
                .collect(),
            discarded_ways: self.stats.discarded_ways,
            unresolved_ids: self.stats.unresolved_ids,
        }
    }
}

//! JSON map feed in WGS84 coordinates
//!
//! ```json
//! {
//!   "bounds": { "min_lat": 55.0, "min_lon": 14.6, "max_lat": 55.3, "max_lon": 15.2 },
//!   "nodes": [{ "id": 1, "lat": 55.1, "lon": 14.7 }],
//!   "ways": [
//!     { "nodes": [1, 2, 3], "kind": { "road": { "road_type": "residential", "name": "Storegade" } } },
//!     { "nodes": [4, 5, 6, 4], "kind": { "feature": "building" } }
//!   ],
//!   "coastlines": [[[55.0, 14.6], [55.1, 14.7]]],
//!   "pois": [{ "name": "Harbour", "lat": 55.1, "lon": 14.7 }]
//! }
//! ```

use crate::error::{CliError, Result};
use geo::Rect;
use island_map_lib::utils::LocalProjection;
use island_map_lib::{RawMapFeed, TaggedWay};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl GeoBounds {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedNode {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPoi {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedFile {
    pub bounds: GeoBounds,
    #[serde(default)]
    pub nodes: Vec<FeedNode>,
    #[serde(default)]
    pub ways: Vec<TaggedWay>,
    /// Each coastline is a list of `[lat, lon]` pairs
    #[serde(default)]
    pub coastlines: Vec<Vec<[f64; 2]>>,
    #[serde(default)]
    pub pois: Vec<FeedPoi>,
}

impl FeedFile {
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Projection centred on the bounds, used for both input and output
    pub fn projection(&self) -> LocalProjection {
        let (lat, lon) = self.bounds.center();
        LocalProjection::new(lat, lon)
    }

    /// Project everything into world coordinates
    pub fn into_raw_feed(self) -> Result<(RawMapFeed, LocalProjection)> {
        let b = self.bounds;
        if !(b.min_lat < b.max_lat && b.min_lon < b.max_lon) {
            return Err(CliError::InvalidFeed(format!(
                "bounds must span a positive area, got {b:?}"
            )));
        }
        let projection = self.projection();

        // North-west and south-east corners; Rect::new orders them anyway
        let bounds = Rect::new(
            projection.to_world(b.max_lat, b.min_lon),
            projection.to_world(b.min_lat, b.max_lon),
        );
        let mut feed = RawMapFeed::new(bounds);

        for node in self.nodes {
            feed.add_point(node.id, projection.to_world(node.lat, node.lon));
        }
        feed.ways = self.ways;
        for coastline in self.coastlines {
            feed.add_coastline(
                coastline
                    .into_iter()
                    .map(|[lat, lon]| projection.to_world(lat, lon))
                    .collect(),
            );
        }
        for poi in self.pois {
            feed.add_poi(poi.name, projection.to_world(poi.lat, poi.lon));
        }

        tracing::debug!(
            "Projected feed: {} points, {} ways, {} coastlines, {} points of interest",
            feed.points.len(),
            feed.ways.len(),
            feed.coastlines.len(),
            feed.pois.len()
        );
        Ok((feed, projection))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use island_map_lib::{FeatureCategory, RoadType, WayKind};

    /// Three junctions along a street plus a side street, near 55N 15E
    pub(crate) const SAMPLE: &str = r#"{
        "bounds": { "min_lat": 54.99, "min_lon": 14.99, "max_lat": 55.01, "max_lon": 15.01 },
        "nodes": [
            { "id": 1, "lat": 55.0, "lon": 14.995 },
            { "id": 2, "lat": 55.0, "lon": 15.0 },
            { "id": 3, "lat": 55.0, "lon": 15.005 },
            { "id": 4, "lat": 55.005, "lon": 15.0 },
            { "id": 5, "lat": 55.001, "lon": 15.001 },
            { "id": 6, "lat": 55.001, "lon": 15.002 },
            { "id": 7, "lat": 55.002, "lon": 15.002 }
        ],
        "ways": [
            { "nodes": [1, 2, 3], "kind": { "road": { "road_type": "residential", "name": "Storegade" } } },
            { "nodes": [2, 4], "kind": { "road": { "road_type": "primary", "speed_kmh": 60 } } },
            { "nodes": [5, 6, 7, 5], "kind": { "feature": "building" } }
        ],
        "coastlines": [[[54.995, 14.98], [54.996, 15.0], [54.995, 15.02]]],
        "pois": [
            { "name": "Harbour", "lat": 54.9999, "lon": 14.996 },
            { "name": "Church", "lat": 55.0049, "lon": 15.0001 }
        ]
    }"#;

    #[test]
    fn test_parse_sample() {
        let file: FeedFile = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(file.nodes.len(), 7);
        assert_eq!(file.ways.len(), 3);
        match &file.ways[0].kind {
            WayKind::Road(tags) => {
                assert_eq!(tags.road_type, RoadType::Residential);
                assert_eq!(tags.name.as_deref(), Some("Storegade"));
                assert_eq!(tags.speed_kmh, None, "Missing tags take their defaults");
            }
            other => panic!("Expected a road, got {other:?}"),
        }
        assert_eq!(file.ways[2].kind, WayKind::Feature(FeatureCategory::Building));
    }

    #[test]
    fn test_projection_keeps_orientation() {
        let file: FeedFile = serde_json::from_str(SAMPLE).unwrap();
        let (feed, projection) = file.into_raw_feed().unwrap();

        let origin = projection.to_world(55.0, 15.0);
        assert!(origin.x.abs() < 1e-6 && origin.y.abs() < 1e-6);

        // North is up: node 4 lies north of node 2, so its y is smaller
        assert!(feed.points[&4].y < feed.points[&2].y);
        assert!(feed.points[&3].x > feed.points[&2].x);
        assert!(feed.bounds.width() > 1_000.0 && feed.bounds.height() > 2_000.0);
        assert_eq!(feed.coastlines[0].len(), 3);
        assert_eq!(feed.pois.len(), 2);
    }

    #[test]
    fn test_empty_bounds_rejected() {
        let file: FeedFile = serde_json::from_str(
            r#"{ "bounds": { "min_lat": 55.0, "min_lon": 15.0, "max_lat": 55.0, "max_lon": 15.1 } }"#,
        )
        .unwrap();
        assert!(matches!(file.into_raw_feed(), Err(CliError::InvalidFeed(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = FeedFile::load(Path::new("/definitely/not/here.json"));
        assert!(matches!(result, Err(CliError::Io(_))));
    }
}

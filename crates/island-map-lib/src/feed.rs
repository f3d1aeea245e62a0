//! Raw parsed map data consumed by the model builder
//!
//! A feed supplies point coordinates by identifier, tagged ways referencing
//! those identifiers, open coastline segments and named points of interest.
//! Coordinates are planar world meters; see [`crate::utils::LocalProjection`].

use crate::graph::RoadAccess;
use geo::{Coord, Rect};
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Layer a piece of geometry is drawn and indexed in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FeatureCategory {
    Building,
    Coast,
    Cycleway,
    Farmland,
    Forest,
    Grass,
    Industrial,
    Navigation,
    Parking,
    Plain,
    Railway,
    Residential,
    RoadLevel1,
    RoadLevel2,
    RoadLevel3,
    RoadLevel4,
    RoadLevel5,
    Sand,
    Walkway,
    Water,
    Waterway,
}

impl FeatureCategory {
    pub const ALL: [FeatureCategory; 21] = [
        FeatureCategory::Building,
        FeatureCategory::Coast,
        FeatureCategory::Cycleway,
        FeatureCategory::Farmland,
        FeatureCategory::Forest,
        FeatureCategory::Grass,
        FeatureCategory::Industrial,
        FeatureCategory::Navigation,
        FeatureCategory::Parking,
        FeatureCategory::Plain,
        FeatureCategory::Railway,
        FeatureCategory::Residential,
        FeatureCategory::RoadLevel1,
        FeatureCategory::RoadLevel2,
        FeatureCategory::RoadLevel3,
        FeatureCategory::RoadLevel4,
        FeatureCategory::RoadLevel5,
        FeatureCategory::Sand,
        FeatureCategory::Walkway,
        FeatureCategory::Water,
        FeatureCategory::Waterway,
    ];

    /// Layers filled by the model itself rather than by plain feature ways
    pub fn is_derived(self) -> bool {
        matches!(self, FeatureCategory::Navigation | FeatureCategory::Coast)
    }

    pub fn name(self) -> &'static str {
        match self {
            FeatureCategory::Building => "building",
            FeatureCategory::Coast => "coast",
            FeatureCategory::Cycleway => "cycleway",
            FeatureCategory::Farmland => "farmland",
            FeatureCategory::Forest => "forest",
            FeatureCategory::Grass => "grass",
            FeatureCategory::Industrial => "industrial",
            FeatureCategory::Navigation => "navigation",
            FeatureCategory::Parking => "parking",
            FeatureCategory::Plain => "plain",
            FeatureCategory::Railway => "railway",
            FeatureCategory::Residential => "residential",
            FeatureCategory::RoadLevel1 => "road_level1",
            FeatureCategory::RoadLevel2 => "road_level2",
            FeatureCategory::RoadLevel3 => "road_level3",
            FeatureCategory::RoadLevel4 => "road_level4",
            FeatureCategory::RoadLevel5 => "road_level5",
            FeatureCategory::Sand => "sand",
            FeatureCategory::Walkway => "walkway",
            FeatureCategory::Water => "water",
            FeatureCategory::Waterway => "waterway",
        }
    }

    /// Parse a category from its [`name`](Self::name)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl std::fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Road classification from the source data
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RoadType {
    Motorway,
    MotorwayLink,
    Primary,
    Secondary,
    Tertiary,
    Residential,
    Service,
    Unclassified,
    #[default]
    Unknown,
    Cycleway,
    LivingStreet,
    Track,
}

impl RoadType {
    /// Speed limit assumed when none is tagged
    pub fn default_speed_kmh(self) -> u16 {
        match self {
            RoadType::Motorway => 130,
            RoadType::MotorwayLink => 90,
            RoadType::Primary | RoadType::Secondary => 80,
            RoadType::Tertiary
            | RoadType::Residential
            | RoadType::Service
            | RoadType::Unclassified
            | RoadType::Unknown => 50,
            RoadType::Cycleway => 20,
            RoadType::LivingStreet | RoadType::Track => 15,
        }
    }

    /// Layer the road is drawn in
    pub fn render_category(self) -> FeatureCategory {
        match self {
            RoadType::Motorway | RoadType::MotorwayLink => FeatureCategory::RoadLevel1,
            RoadType::Primary => FeatureCategory::RoadLevel2,
            RoadType::Secondary | RoadType::Tertiary => FeatureCategory::RoadLevel3,
            RoadType::Residential | RoadType::Unclassified => FeatureCategory::RoadLevel4,
            RoadType::LivingStreet | RoadType::Track | RoadType::Service | RoadType::Unknown => {
                FeatureCategory::RoadLevel5
            }
            RoadType::Cycleway => FeatureCategory::Cycleway,
        }
    }

    /// Classify a `highway=*` tag value; `None` for values that are not routable roads
    pub fn from_highway_tag(value: &str) -> Option<Self> {
        let road_type = match value {
            "motorway" => RoadType::Motorway,
            "motorway_link" => RoadType::MotorwayLink,
            "trunk" | "trunk_link" | "primary" | "primary_link" => RoadType::Primary,
            "secondary" | "secondary_link" => RoadType::Secondary,
            "road" | "tertiary" | "tertiary_link" => RoadType::Tertiary,
            "residential" => RoadType::Residential,
            "living_street" => RoadType::LivingStreet,
            "track" => RoadType::Track,
            "service" => RoadType::Service,
            "unclassified" => RoadType::Unclassified,
            "cycleway" => RoadType::Cycleway,
            "bridleway" | "bus_guideway" | "construction" | "proposed" | "rest_area" => {
                return None;
            }
            _ => RoadType::Unknown,
        };
        Some(road_type)
    }
}

/// Traffic direction relative to the way's point order
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OneWay {
    #[default]
    No,
    Forward,
    Backward,
}

/// Routing-relevant tags of a road way
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RoadTags {
    pub road_type: RoadType,
    /// Tagged speed limit; the road type default applies when absent
    pub speed_kmh: Option<u16>,
    pub name: Option<String>,
    pub oneway: OneWay,
    pub roundabout: bool,
    /// Explicit car restriction: `Some(true)` allowed, `Some(false)` forbidden
    pub car: Option<bool>,
    /// Explicit bicycle restriction: `Some(true)` allowed, `Some(false)` forbidden
    pub bike: Option<bool>,
    /// General `access=no`-style denial, overridable per vehicle
    pub access_denied: bool,
}

impl RoadTags {
    pub fn new(road_type: RoadType) -> Self {
        Self {
            road_type,
            ..Self::default()
        }
    }

    /// Tagged speed, or the road type default for missing or zero values
    pub fn effective_speed_kmh(&self) -> u16 {
        match self.speed_kmh {
            Some(speed) if speed > 0 => speed,
            _ => self.road_type.default_speed_kmh(),
        }
    }

    /// Direction after forcing roundabouts to follow point order
    pub fn effective_oneway(&self) -> OneWay {
        if self.roundabout {
            OneWay::Forward
        } else {
            self.oneway
        }
    }

    /// Access class derived from restriction flags and road type defaults
    pub fn access(&self) -> RoadAccess {
        let mut bike = self.bike;
        let mut car = self.car;
        match self.road_type {
            RoadType::Motorway | RoadType::MotorwayLink => bike = Some(false),
            RoadType::Cycleway => car = Some(false),
            _ => {}
        }

        let allowed = |flag: Option<bool>| {
            (!self.access_denied && flag != Some(false)) || flag == Some(true)
        };
        match (allowed(car), allowed(bike)) {
            (true, true) => RoadAccess::All,
            (false, true) => RoadAccess::BikeOnly,
            (true, false) => RoadAccess::CarOnly,
            (false, false) => RoadAccess::None,
        }
    }
}

/// What a way represents
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WayKind {
    Road(RoadTags),
    Feature(FeatureCategory),
}

/// Ordered list of point identifiers plus its tags
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TaggedWay {
    pub nodes: Vec<i64>,
    pub kind: WayKind,
}

/// Named point of interest
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Poi {
    pub name: String,
    pub position: Coord<f64>,
}

/// Everything the model builder consumes
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawMapFeed {
    /// Region covered by the data, used to close clipped coastlines
    pub bounds: Rect<f64>,
    pub points: HashMap<i64, Coord<f64>>,
    pub ways: Vec<TaggedWay>,
    pub coastlines: Vec<Vec<Coord<f64>>>,
    pub pois: Vec<Poi>,
}

impl RawMapFeed {
    pub fn new(bounds: Rect<f64>) -> Self {
        Self {
            bounds,
            points: HashMap::new(),
            ways: Vec::new(),
            coastlines: Vec::new(),
            pois: Vec::new(),
        }
    }

    pub fn add_point(&mut self, id: i64, position: Coord<f64>) {
        self.points.insert(id, position);
    }

    pub fn add_road(&mut self, nodes: Vec<i64>, tags: RoadTags) {
        self.ways.push(TaggedWay {
            nodes,
            kind: WayKind::Road(tags),
        });
    }

    pub fn add_feature(&mut self, nodes: Vec<i64>, category: FeatureCategory) {
        self.ways.push(TaggedWay {
            nodes,
            kind: WayKind::Feature(category),
        });
    }

    pub fn add_coastline(&mut self, points: Vec<Coord<f64>>) {
        self.coastlines.push(points);
    }

    pub fn add_poi(&mut self, name: impl Into<String>, position: Coord<f64>) {
        self.pois.push(Poi {
            name: name.into(),
            position,
        });
    }

    /// Resolve a way's identifiers, dropping unknown ones
    pub fn resolve(&self, nodes: &[i64]) -> Vec<Coord<f64>> {
        nodes
            .iter()
            .filter_map(|id| self.points.get(id).copied())
            .collect()
    }
}

use crate::error::{CliError, Result};
use crate::feed_file::FeedFile;
use crate::settings::{Command, Place, Settings};
use geo::{Coord, Rect};
use island_map_lib::utils::LocalProjection;
use island_map_lib::{
    Config, CostModel, Endpoint, FeatureCategory, GeometryRecord, MapInfo, MapModel, Road,
    RoadAccess, VehicleClass,
};
use serde::Serialize;
use std::io::Write;

/// A model together with the projection its feed was loaded with
pub struct LoadedMap {
    pub model: MapModel,
    pub projection: LocalProjection,
}

impl LoadedMap {
    pub fn from_feed(file: FeedFile, config: Config) -> Result<Self> {
        let (feed, projection) = file.into_raw_feed()?;
        let model = MapModel::build(feed, config)?;
        Ok(Self { model, projection })
    }

    fn world(&self, (lat, lon): (f64, f64)) -> Coord<f64> {
        self.projection.to_world(lat, lon)
    }

    fn wgs84(&self, coord: Coord<f64>) -> [f64; 2] {
        let (lat, lon) = self.projection.to_wgs84(coord);
        [lat, lon]
    }

    fn endpoint(&self, place: &Place) -> Result<Endpoint> {
        match place {
            Place::At(lat, lon) => Ok(Endpoint::Point(self.world((*lat, *lon)))),
            Place::Poi(name) => self
                .model
                .poi(name)
                .map(|poi| Endpoint::Point(poi.position))
                .ok_or_else(|| CliError::UnknownPoi(name.clone())),
        }
    }
}

/// Build the model configuration from the optional file and flag overrides
pub fn load_config(settings: &Settings) -> Result<Config> {
    let mut config = match &settings.config {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            serde_json::from_reader(std::io::BufReader::new(file))?
        }
        None => Config::default(),
    };
    if let Some(tolerance) = settings.tolerance {
        config.nearest_tolerance = tolerance;
    }
    if let Some(speed) = settings.speed_bound {
        config.speed_bound_kmh = speed;
    }
    Ok(config)
}

#[derive(Debug, Serialize)]
pub struct RoadSummary {
    pub name: Option<String>,
    pub length_m: f64,
    pub speed_kmh: u16,
    pub access: RoadAccess,
    pub synthetic: bool,
    pub points: Vec<[f64; 2]>,
}

#[derive(Debug, Serialize)]
pub struct RouteSummary {
    pub vehicle: VehicleClass,
    pub cost: &'static str,
    pub total_length_m: f64,
    pub travel_minutes: f64,
    pub roads: Vec<RoadSummary>,
}

#[derive(Debug, Serialize)]
pub struct LayerView {
    pub category: FeatureCategory,
    pub buckets: usize,
    pub records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Vec<Vec<Vec<[f64; 2]>>>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Output {
    Info(MapInfo),
    View(Vec<LayerView>),
    Nearest(Option<RoadSummary>),
    Route(RouteSummary),
}

/// Run one command against a loaded map
pub fn execute(map: &mut LoadedMap, command: &Command) -> Result<Output> {
    match command {
        Command::Info => Ok(Output::Info(map.model.info())),
        Command::View {
            min,
            max,
            category,
            geometry,
        } => {
            let rect = Rect::new(map.world(*min), map.world(*max));
            let requested = *category;
            let categories: Vec<FeatureCategory> = match requested {
                Some(category) => vec![category],
                None => FeatureCategory::ALL.to_vec(),
            };
            let layers = categories
                .into_iter()
                .filter_map(|layer| {
                    let buckets = map.model.query_visible(layer, rect);
                    // An explicitly requested layer is reported even when empty
                    if buckets.is_empty() && requested.is_none() {
                        return None;
                    }
                    let records = buckets.iter().map(|bucket| bucket.len()).sum();
                    let geometry = geometry.then(|| {
                        buckets
                            .iter()
                            .flat_map(|bucket| bucket.iter())
                            .map(|record| record_geometry(map, record))
                            .collect()
                    });
                    Some(LayerView {
                        category: layer,
                        buckets: buckets.len(),
                        records,
                        geometry,
                    })
                })
                .collect();
            Ok(Output::View(layers))
        }
        Command::Nearest { at } => {
            let road = map.model.nearest_road(map.world(*at));
            Ok(Output::Nearest(road.map(|road| road_summary(map, road))))
        }
        Command::Route {
            from,
            to,
            bike,
            fastest,
        } => {
            let from = map.endpoint(from)?;
            let to = map.endpoint(to)?;
            let vehicle = if *bike { VehicleClass::Bike } else { VehicleClass::Car };
            let cost = if *fastest && !*bike {
                CostModel::Fastest
            } else {
                CostModel::Shortest
            };
            let route = map.model.find_path(from, to, vehicle, cost)?;
            tracing::info!(
                "Route: {} roads, {:.0} m, {:.1} min",
                route.len(),
                route.total_length(),
                route.travel_minutes()
            );
            Ok(Output::Route(RouteSummary {
                vehicle,
                cost: match cost {
                    CostModel::Shortest => "shortest",
                    CostModel::Fastest => "fastest",
                },
                total_length_m: route.total_length(),
                travel_minutes: route.travel_minutes(),
                roads: route.roads().iter().map(|road| road_summary(map, road)).collect(),
            }))
        }
    }
}

fn road_summary(map: &LoadedMap, road: &Road) -> RoadSummary {
    RoadSummary {
        name: road.name().map(str::to_string),
        length_m: road.length(),
        speed_kmh: road.speed_kmh(),
        access: road.access(),
        synthetic: road.is_synthetic(),
        points: road.points().iter().map(|p| map.wgs84(*p)).collect(),
    }
}

fn record_geometry(map: &LoadedMap, record: &GeometryRecord) -> Vec<Vec<[f64; 2]>> {
    record
        .parts()
        .iter()
        .map(|part| part.iter().map(|p| map.wgs84(*p)).collect())
        .collect()
}

/// Load the feed, build the model, run the command and print its JSON
pub fn run(settings: &Settings, out: &mut impl Write) -> Result<()> {
    profiling::scope!("cli::run");
    let config = load_config(settings)?;
    let file = FeedFile::load(&settings.feed)?;
    let mut map = LoadedMap::from_feed(file, config)?;
    let output = execute(&mut map, &settings.command)?;
    if settings.pretty {
        serde_json::to_writer_pretty(&mut *out, &output)?;
    } else {
        serde_json::to_writer(&mut *out, &output)?;
    }
    writeln!(out)?;
    Ok(())
}

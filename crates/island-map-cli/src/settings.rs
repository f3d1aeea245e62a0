use clap::{Parser, Subcommand};
use island_map_lib::FeatureCategory;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Island Map - build a map model from a JSON feed and query it
pub struct Settings {
    /// Map feed in WGS84 coordinates
    #[clap(short, long, value_name = "FILE")]
    pub feed: PathBuf,

    /// Model configuration as JSON; flags below override it
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Side of the square searched by nearest queries, in meters
    #[clap(long)]
    pub tolerance: Option<f64>,

    /// Optimistic speed for the fastest-route heuristic, in km/h
    #[clap(long)]
    pub speed_bound: Option<f64>,

    /// Pretty-print the JSON output
    #[clap(long, default_value = "false")]
    pub pretty: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Summarise the built model
    Info,

    /// List what a layer shows inside a viewport
    View {
        /// One viewport corner as `lat,lon`
        #[clap(long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
        min: (f64, f64),

        /// Opposite viewport corner as `lat,lon`
        #[clap(long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
        max: (f64, f64),

        /// Single layer to query; every layer when omitted
        #[clap(long, value_parser = parse_category)]
        category: Option<FeatureCategory>,

        /// Include record geometry in the output
        #[clap(long, default_value = "false")]
        geometry: bool,
    },

    /// Find the road closest to a point
    Nearest {
        /// Probe point as `lat,lon`
        #[clap(long, value_parser = parse_lat_lon, allow_hyphen_values = true)]
        at: (f64, f64),
    },

    /// Find a route between two places
    Route {
        /// Start as `lat,lon` or a point-of-interest name
        #[clap(long, value_parser = parse_place, allow_hyphen_values = true)]
        from: Place,

        /// Destination as `lat,lon` or a point-of-interest name
        #[clap(long, value_parser = parse_place, allow_hyphen_values = true)]
        to: Place,

        /// Route for a bike instead of a car (always shortest)
        #[clap(long, default_value = "false")]
        bike: bool,

        /// Minimise travel time instead of distance
        #[clap(long, default_value = "false")]
        fastest: bool,
    },
}

/// Route endpoint as given on the command line
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    At(f64, f64),
    Poi(String),
}

pub fn parse_lat_lon(value: &str) -> Result<(f64, f64), String> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| format!("expected `lat,lon`, got `{value}`"))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("bad latitude: {e}"))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("bad longitude: {e}"))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("`{value}` is outside the WGS84 range"));
    }
    Ok((lat, lon))
}

fn parse_category(value: &str) -> Result<FeatureCategory, String> {
    FeatureCategory::from_name(value).ok_or_else(|| {
        let known: Vec<&str> = FeatureCategory::ALL.iter().map(|c| c.name()).collect();
        format!("unknown layer `{value}`, expected one of: {}", known.join(", "))
    })
}

fn parse_place(value: &str) -> Result<Place, String> {
    if value.trim().is_empty() {
        return Err("empty place".to_string());
    }
    Ok(match parse_lat_lon(value) {
        Ok((lat, lon)) => Place::At(lat, lon),
        Err(_) => Place::Poi(value.to_string()),
    })
}

//! Performance benchmarks for island-map-lib
//!
//! Run with: cargo bench --package island-map-lib

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use geo::{Coord, Rect};
use island_map_lib::{
    Config, CostModel, Endpoint, FeatureCategory, GeometryRecord, IndexConfig, MapModel,
    RawMapFeed, RoadTags, RoadType, SpatialIndex, VehicleClass,
};
use std::hint::black_box;

const SPACING: f64 = 100.0;

/// Square street grid with `size` x `size` junctions, every third street a primary road
fn generate_grid_feed(size: i64) -> RawMapFeed {
    let extent = SPACING * size as f64;
    let mut feed = RawMapFeed::new(Rect::new(
        Coord { x: -SPACING, y: -SPACING },
        Coord { x: extent, y: extent },
    ));
    for row in 0..size {
        for col in 0..size {
            feed.add_point(row * size + col, Coord {
                x: SPACING * col as f64,
                y: SPACING * row as f64,
            });
        }
    }
    for i in 0..size {
        let road_type = if i % 3 == 0 {
            RoadType::Primary
        } else {
            RoadType::Residential
        };
        feed.add_road((0..size).map(|col| i * size + col).collect(), RoadTags::new(road_type));
        feed.add_road((0..size).map(|row| row * size + i).collect(), RoadTags::new(road_type));
    }
    feed
}

/// Small square footprints scattered over the grid blocks
fn generate_buildings(count: usize, extent: f64) -> Vec<GeometryRecord> {
    (0..count)
        .map(|i| {
            // Cheap deterministic scatter
            let t = i as f64;
            let x = (t * 7.31).sin().abs() * extent;
            let y = (t * 3.17).cos().abs() * extent;
            GeometryRecord::new(vec![
                Coord { x, y },
                Coord { x: x + 12.0, y },
                Coord { x: x + 12.0, y: y + 9.0 },
                Coord { x, y: y + 9.0 },
                Coord { x, y },
            ])
            .unwrap()
        })
        .collect()
}

// ============================================================================
// Core Benchmarks - Key performance indicators
// ============================================================================

fn bench_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");
    group.sample_size(20);

    for count in [10_000usize, 100_000] {
        let records = generate_buildings(count, 20_000.0);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("buildings", count), &records, |b, records| {
            let config = IndexConfig {
                leaf_capacity: 32,
                compact: true,
                ..IndexConfig::default()
            };
            b.iter(|| SpatialIndex::build(records.clone(), config).unwrap());
        });
    }

    group.finish();
}

fn bench_viewport_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("viewport_query");

    let index = SpatialIndex::build(generate_buildings(100_000, 20_000.0), IndexConfig::default())
        .unwrap();

    // Street-level view
    let small = Rect::new(Coord { x: 5_000.0, y: 5_000.0 }, Coord { x: 5_800.0, y: 5_600.0 });
    group.bench_function("small_viewport_100k", |b| {
        b.iter(|| index.query_rect(black_box(small)));
    });

    // Whole-island overview
    let large = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 20_000.0, y: 20_000.0 });
    group.bench_function("large_viewport_100k", |b| {
        b.iter(|| index.query_rect(black_box(large)));
    });

    group.finish();
}

fn bench_nearest_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("nearest_query");

    let model = MapModel::build(generate_grid_feed(60), Config::default()).unwrap();
    let probe = Coord { x: 2_345.0, y: 3_021.0 };
    group.bench_function("nearest_road_60x60", |b| {
        b.iter(|| model.nearest_road(black_box(probe)));
    });

    group.finish();
}

fn bench_route_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_search");
    group.sample_size(20);

    let size = 60;
    let mut model = MapModel::build(generate_grid_feed(size), Config::default()).unwrap();
    let far = SPACING * (size - 1) as f64;
    let from = Endpoint::Point(Coord { x: 40.0, y: 3.0 });
    let to = Endpoint::Point(Coord { x: far - 3.0, y: far - 40.0 });

    for (name, cost) in [("shortest", CostModel::Shortest), ("fastest", CostModel::Fastest)] {
        group.bench_function(BenchmarkId::new("grid_60x60", name), |b| {
            b.iter(|| model.find_path(from, to, VehicleClass::Car, cost).unwrap());
        });
    }

    // Drag mode retains the search, so nearby targets are answered from it
    model.set_drag_mode(true, false);
    group.bench_function("drag_60x60", |b| {
        let mut step = 0.0;
        b.iter(|| {
            step = (step + 1.0) % 50.0;
            let target = Endpoint::Point(Coord { x: far - 3.0, y: far - 40.0 - step });
            model.find_path(from, target, VehicleClass::Car, CostModel::Shortest).unwrap()
        });
    });
    model.set_drag_mode(false, false);

    group.finish();
}

fn bench_model_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("model_build");
    group.sample_size(10);

    let feed = generate_grid_feed(60);
    group.throughput(Throughput::Elements(feed.points.len() as u64));
    group.bench_function("grid_60x60", |b| {
        b.iter(|| MapModel::build(feed.clone(), Config::default()).unwrap());
    });

    let model = MapModel::build(feed, Config::default()).unwrap();
    group.bench_function("info", |b| {
        b.iter(|| model.info());
    });
    let viewport = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1_000.0, y: 1_000.0 });
    group.bench_function("visible_roads", |b| {
        b.iter(|| model.query_visible(FeatureCategory::RoadLevel4, viewport));
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    benches,
    bench_index_build,
    bench_viewport_query,
    bench_nearest_query,
    bench_route_search,
    bench_model_build,
);

criterion_main!(benches);

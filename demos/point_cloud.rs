//! Example of point-cloud consolidation over a synthetic batch of routes.
//!
//! Run with: cargo run --release --example point_cloud --features parallel

use route_consolidator::{
    consolidate_points, prepare_point_groups, prepare_routes_parallel, ConsolidationConfig, GpsPoint,
    RouteRecord,
};
use std::time::Instant;

fn main() {
    // 200 routes fanning out of one depot
    let records: Vec<RouteRecord> = (0..200)
        .map(|i| {
            let heading = i as f64 * 0.0314;
            let points: Vec<GpsPoint> = (0..80)
                .map(|j| {
                    let r = j as f64 * 0.002;
                    GpsPoint::new(48.2 + r * heading.sin(), 16.37 + r * heading.cos())
                })
                .collect();
            RouteRecord {
                northeast: points[0],
                southwest: points[0],
                points,
                mass: 1_000.0 + i as f64 * 10.0,
                distance: 17_000.0,
            }
        })
        .collect();

    let start = Instant::now();
    let routes = prepare_routes_parallel(&records);
    println!("Prepared {} routes in {:?}", routes.len(), start.elapsed());

    let config = ConsolidationConfig::default();
    let start = Instant::now();
    let cloud = consolidate_points(prepare_point_groups(&records), &config);
    println!(
        "{} input points -> {} records in {:?} (tolerance {}°)",
        records.iter().map(|r| r.points.len()).sum::<usize>(),
        cloud.len(),
        start.elapsed(),
        config.point_tolerance
    );

    let hottest = cloud.iter().max_by(|a, b| a.intensity.total_cmp(&b.intensity));
    if let Some(record) = hottest {
        println!(
            "Hottest point: ({:.4}, {:.4}) at {:.2} g/m",
            record.point.latitude, record.point.longitude, record.intensity
        );
    }
}

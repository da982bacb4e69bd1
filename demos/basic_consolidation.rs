//! Basic example of consolidating overlapping routes into segments.
//!
//! Run with: cargo run --example basic_consolidation

use route_consolidator::{consolidate, prepare_routes, ConsolidationConfig, GpsPoint, RouteRecord};

fn record(points: &[(f64, f64)], mass: f64, distance: f64) -> RouteRecord {
    let points: Vec<GpsPoint> = points.iter().map(|&(lat, lng)| GpsPoint::new(lat, lng)).collect();
    RouteRecord {
        northeast: points[0],
        southwest: points[0],
        points,
        mass,
        distance,
    }
}

fn main() {
    // Two trips into Vienna sharing the last stretch of road
    let along_a23: Vec<(f64, f64)> = (0..12).map(|i| (48.150 + i as f64 * 0.004, 16.390)).collect();
    let mut from_east: Vec<(f64, f64)> = (0..6).map(|i| (48.150, 16.450 - i as f64 * 0.010)).collect();
    from_east.extend(along_a23.iter().copied());
    let mut from_south: Vec<(f64, f64)> = (0..6).map(|i| (48.100 + i as f64 * 0.008, 16.390)).collect();
    from_south.extend(along_a23.iter().copied());

    let records = vec![
        record(&from_east, 18_000.0, 9_000.0),
        record(&from_south, 12_000.0, 8_000.0),
        // Unrelated trip in Graz
        record(&[(47.070, 15.430), (47.075, 15.440), (47.080, 15.450)], 500.0, 1_000.0),
    ];

    let config = ConsolidationConfig::default();
    let routes = prepare_routes(&records);

    println!("Route Consolidation Example\n");
    println!(
        "Config: route_tolerance={}°, boundary_padding={}, padding_margin={}\n",
        config.route_tolerance, config.boundary_padding, config.padding_margin
    );

    println!("Input:");
    for (i, route) in routes.iter().enumerate() {
        println!(
            "  route-{}: {} points, {:.0}m, intensity {:.3} g/m",
            i,
            route.len(),
            route.distance(),
            route.intensity()
        );
    }

    let solution = consolidate(routes, &config);

    println!("\nOutput ({} segments):", solution.len());
    for (i, segment) in solution.iter().enumerate() {
        println!(
            "  segment-{}: {} points, {:.0}m, intensity {:.3} g/m",
            i,
            segment.len(),
            segment.distance(),
            segment.intensity()
        );
    }
}

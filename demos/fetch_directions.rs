//! Fetch driving directions for a few trips and print the resulting records.
//!
//! Run with: DIRECTIONS_API_KEY=... cargo run --example fetch_directions --features http

use route_consolidator::http::ProgressCallback;
use route_consolidator::{DirectionsFetcher, GpsPoint, TripRecord};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let api_key = match std::env::var("DIRECTIONS_API_KEY") {
        Ok(key) => key,
        Err(_) => {
            eprintln!("Set DIRECTIONS_API_KEY to run this example");
            return;
        }
    };

    let trips = vec![
        TripRecord {
            origin: GpsPoint::new(48.1850, 16.3770),
            destination: GpsPoint::new(47.0707, 15.4395),
            mass: 24_000.0,
        },
        TripRecord {
            origin: GpsPoint::new(48.2082, 16.3738),
            destination: GpsPoint::new(48.3069, 14.2858),
            mass: 31_000.0,
        },
    ];

    let fetcher = match DirectionsFetcher::new(&api_key) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to create fetcher: {}", e);
            return;
        }
    };

    let progress: ProgressCallback = Arc::new(|done: u32, total: u32| println!("  {}/{}", done, total));
    let results = fetcher.fetch_routes(trips, Some(progress)).await;

    for result in results {
        match (&result.record, &result.error) {
            (Some(record), _) => println!(
                "trip {}: {} points, {:.1}km, intensity {:.3} g/m",
                result.trip_index,
                record.points.len(),
                record.distance / 1000.0,
                record.intensity()
            ),
            (None, error) => println!("trip {}: failed ({})", result.trip_index, error.as_deref().unwrap_or("unknown")),
        }
    }
}

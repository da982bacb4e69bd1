//! Route acquisition from a driving-directions provider.
//!
//! Turns origin/destination trips into [`RouteRecord`]s:
//! - Connection pooling for HTTP/2 multiplexing
//! - Request pacing (spaces out request starts)
//! - Parallel fetching with bounded concurrency
//! - Automatic retry with exponential backoff on 429
//!
//! A failed trip is reported in its [`FetchResult`] and never aborts the batch.

use crate::{ConsolidationError, GpsPoint, Result, RouteRecord};
use csv::ReaderBuilder;
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";

// Provider allows 50 req/s per project; stay at 25 req/s
const DISPATCH_INTERVAL_MS: u64 = 40;
const MAX_CONCURRENCY: usize = 16;
const MAX_RETRIES: u32 = 3;
const POLYLINE_PRECISION: u32 = 5;

/// One origin/destination trip with the mass emitted over it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TripRecord {
    pub origin: GpsPoint,
    pub destination: GpsPoint,
    pub mass: f64,
}

/// Outcome of fetching directions for one trip.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Position of the trip in the input batch
    pub trip_index: usize,
    pub record: Option<RouteRecord>,
    pub success: bool,
    pub error: Option<String>,
}

impl FetchResult {
    fn ok(trip_index: usize, record: RouteRecord) -> Self {
        Self {
            trip_index,
            record: Some(record),
            success: true,
            error: None,
        }
    }

    fn failed(trip_index: usize, error: impl Into<String>) -> Self {
        Self {
            trip_index,
            record: None,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Progress callback type
pub type ProgressCallback = Arc<dyn Fn(u32, u32) + Send + Sync>;

// =============================================================================
// Trip input
// =============================================================================

/// Read trips from `;`-separated rows of
/// `station_A_lat;station_A_long;station_B_lat;station_B_long;CO2`.
pub fn read_trip_records_from<R: Read>(reader: R) -> Result<Vec<TripRecord>> {
    let mut csv = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut trips = Vec::new();
    for result in csv.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());
        if record.len() < 5 {
            return Err(ConsolidationError::malformed(
                line,
                format!("expected 5 columns, found {}", record.len()),
            ));
        }
        let number = |idx: usize| -> Result<f64> {
            let field = record.get(idx).unwrap_or("").trim();
            field
                .parse::<f64>()
                .map_err(|_| ConsolidationError::malformed(line, format!("column {} is not a number: {:?}", idx + 1, field)))
        };
        trips.push(TripRecord {
            origin: GpsPoint::new(number(0)?, number(1)?),
            destination: GpsPoint::new(number(2)?, number(3)?),
            mass: number(4)?,
        });
    }
    Ok(trips)
}

/// Read trips from a file.
pub fn read_trip_records(path: impl AsRef<Path>) -> Result<Vec<TripRecord>> {
    read_trip_records_from(File::open(path)?)
}

// =============================================================================
// Provider response
// =============================================================================

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<ApiRoute>,
}

#[derive(Debug, Deserialize)]
struct ApiRoute {
    bounds: ApiBounds,
    legs: Vec<ApiLeg>,
    overview_polyline: ApiPolyline,
}

#[derive(Debug, Deserialize)]
struct ApiBounds {
    northeast: ApiLatLng,
    southwest: ApiLatLng,
}

#[derive(Debug, Deserialize)]
struct ApiLatLng {
    lat: f64,
    lng: f64,
}

impl From<ApiLatLng> for GpsPoint {
    fn from(p: ApiLatLng) -> Self {
        GpsPoint::new(p.lat, p.lng)
    }
}

#[derive(Debug, Deserialize)]
struct ApiLeg {
    distance: ApiValue,
}

#[derive(Debug, Deserialize)]
struct ApiValue {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct ApiPolyline {
    points: String,
}

/// Build a [`RouteRecord`] from a directions response body.
///
/// Uses the first route: its bounds as the corners, the overview polyline as
/// the geometry and the first leg's distance in meters.
pub fn parse_directions_response(body: &[u8], mass: f64) -> std::result::Result<RouteRecord, String> {
    let data: DirectionsResponse =
        serde_json::from_slice(body).map_err(|e| format!("JSON parse error: {}", e))?;

    if let Some(status) = data.status.as_deref() {
        if status != "OK" {
            return Err(match data.error_message {
                Some(message) => format!("Provider status {}: {}", status, message),
                None => format!("Provider status {}", status),
            });
        }
    }

    let route = data.routes.into_iter().next().ok_or("No route in response")?;
    let distance = route.legs.first().ok_or("Route has no legs")?.distance.value;

    let line = polyline::decode_polyline(&route.overview_polyline.points, POLYLINE_PRECISION)
        .map_err(|e| format!("Polyline decode error: {}", e))?;
    let points: Vec<GpsPoint> = line.coords().map(|c| GpsPoint::new(c.y, c.x)).collect();

    Ok(RouteRecord {
        northeast: route.bounds.northeast.into(),
        southwest: route.bounds.southwest.into(),
        points,
        mass,
        distance,
    })
}

// =============================================================================
// Request pacing
// =============================================================================

/// A reserved start time for one request.
#[derive(Debug, Clone, Copy)]
struct Slot {
    /// 1-based position in the order requests were let out
    number: u64,
    start: Instant,
}

#[derive(Debug)]
struct PacerState {
    next_start: Instant,
    issued: u64,
}

/// Hands out request start times at least `interval` apart and tracks how
/// many 429 responses the provider returned in a row.
#[derive(Debug)]
struct RequestPacer {
    interval: Duration,
    state: Mutex<PacerState>,
    throttled_streak: AtomicU32,
}

impl RequestPacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(PacerState {
                next_start: Instant::now(),
                issued: 0,
            }),
            throttled_streak: AtomicU32::new(0),
        }
    }

    /// Reserve the next free start time without waiting for it.
    async fn reserve(&self) -> Slot {
        let mut state = self.state.lock().await;
        let start = state.next_start.max(Instant::now());
        state.next_start = start + self.interval;
        state.issued += 1;
        Slot {
            number: state.issued,
            start,
        }
    }

    /// Reserve a slot and sleep until it opens. The lock is not held while
    /// sleeping.
    async fn acquire(&self) -> Slot {
        let slot = self.reserve().await;
        let wait = slot.start.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            debug!("[Directions] Request #{} waits {:?}", slot.number, wait);
            tokio::time::sleep_until(slot.start.into()).await;
        }
        slot
    }

    fn on_success(&self) {
        self.throttled_streak.store(0, Ordering::Relaxed);
    }

    /// Register a 429 and return how long the request should back off.
    fn on_throttled(&self) -> Duration {
        let streak = self.throttled_streak.fetch_add(1, Ordering::Relaxed) + 1;
        let wait = throttle_backoff(streak);
        warn!("[Directions] 429 #{} in a row, backing off {:?}", streak, wait);
        wait
    }
}

/// Back-off after `streak` consecutive 429 responses: one second, doubling up
/// to eight.
fn throttle_backoff(streak: u32) -> Duration {
    Duration::from_secs(1 << streak.saturating_sub(1).min(3))
}

// =============================================================================
// Fetcher
// =============================================================================

/// Fetches driving directions for batches of trips.
pub struct DirectionsFetcher {
    client: Client,
    api_key: String,
    endpoint: String,
    pacer: RequestPacer,
}

impl DirectionsFetcher {
    /// Create a fetcher for the given provider API key.
    pub fn new(api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(MAX_CONCURRENCY * 2)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConsolidationError::Http {
                message: format!("Failed to create HTTP client: {}", e),
                status_code: None,
            })?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            endpoint: DIRECTIONS_URL.to_string(),
            pacer: RequestPacer::new(Duration::from_millis(DISPATCH_INTERVAL_MS)),
        })
    }

    /// Point the fetcher at a different directions endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Fetch directions for every trip. Results come back in input order.
    pub async fn fetch_routes(
        &self,
        trips: Vec<TripRecord>,
        on_progress: Option<ProgressCallback>,
    ) -> Vec<FetchResult> {
        use futures::stream::{self, StreamExt};

        let total = trips.len() as u32;
        let completed = Arc::new(AtomicU32::new(0));

        info!(
            "[Directions] Starting fetch of {} trips (dispatch interval: {:?}, max concurrent: {})",
            total, self.pacer.interval, MAX_CONCURRENCY
        );

        let start = Instant::now();

        let mut results: Vec<FetchResult> = stream::iter(trips.into_iter().enumerate())
            .map(|(idx, trip)| {
                let completed = Arc::clone(&completed);
                let callback = on_progress.clone();

                async move {
                    let slot = self.pacer.acquire().await;
                    let result = self.fetch_single(idx, &trip).await;

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(
                        "[Progress] {}/{} | request #{} | done@{:.2}s",
                        done,
                        total,
                        slot.number,
                        start.elapsed().as_secs_f64()
                    );

                    if let Some(ref cb) = callback {
                        cb(done, total);
                    }

                    result
                }
            })
            .buffer_unordered(MAX_CONCURRENCY)
            .collect()
            .await;

        results.sort_by_key(|r| r.trip_index);

        let elapsed = start.elapsed();
        let success_count = results.iter().filter(|r| r.success).count();
        info!(
            "[Directions] DONE: {}/{} success ({} errors) in {:.2}s",
            success_count,
            total,
            results.len() - success_count,
            elapsed.as_secs_f64()
        );

        results
    }

    async fn fetch_single(&self, idx: usize, trip: &TripRecord) -> FetchResult {
        let origin = format!("{},{}", trip.origin.latitude, trip.origin.longitude);
        let destination = format!("{},{}", trip.destination.latitude, trip.destination.longitude);
        let mut retries = 0;

        loop {
            let response = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("origin", origin.as_str()),
                    ("destination", destination.as_str()),
                    ("mode", "driving"),
                    ("key", self.api_key.as_str()),
                ])
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > MAX_RETRIES {
                            return FetchResult::failed(idx, "Max retries exceeded (429)");
                        }
                        let wait = self.pacer.on_throttled();
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    self.pacer.on_success();

                    if !status.is_success() {
                        return FetchResult::failed(idx, format!("HTTP {}", status));
                    }

                    let bytes = match resp.bytes().await {
                        Ok(b) => b,
                        Err(e) => return FetchResult::failed(idx, format!("Body download error: {}", e)),
                    };

                    return match parse_directions_response(&bytes, trip.mass) {
                        Ok(record) => {
                            debug!(
                                "[Directions] Trip {}: {} points, {}m",
                                idx,
                                record.points.len(),
                                record.distance
                            );
                            FetchResult::ok(idx, record)
                        }
                        Err(e) => {
                            warn!("[Directions] Trip {}: {}", idx, e);
                            FetchResult::failed(idx, e)
                        }
                    };
                }
                Err(e) => {
                    retries += 1;
                    if retries > MAX_RETRIES {
                        return FetchResult::failed(idx, format!("Request error: {}", e));
                    }
                    let wait = Duration::from_millis(200 * (1 << retries));
                    warn!("[Directions] Trip {}: {}, retry {} after {:?}", idx, e, retries, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

/// Synchronous wrapper - runs [`DirectionsFetcher::fetch_routes`] on a fresh tokio runtime.
pub fn fetch_routes_blocking(
    api_key: &str,
    trips: Vec<TripRecord>,
    on_progress: Option<ProgressCallback>,
) -> Result<Vec<FetchResult>> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let fetcher = DirectionsFetcher::new(api_key)?;
    Ok(rt.block_on(fetcher.fetch_routes(trips, on_progress)))
}

//! Delimited tabular wire format.
//!
//! All files are `;`-separated with a header row:
//!
//! | File | Columns |
//! |------|---------|
//! | Input records | `northeast;southwest;points;<mass>;distance` |
//! | Route output and checkpoints | `northeast;southwest;points;intensity;distance` |
//! | Point output and checkpoints | `lat;long;intensity` |
//!
//! Coordinates are written as `[lat,lng]` and point sequences as
//! `[[lat,lng],...]`. On input, coordinates may also be tuples `(lat, lng)`
//! or provider objects `{'lat': .., 'lng': ..}`, with single or double quotes.

use crate::consolidate::CheckpointSink;
use crate::{ConsolidationError, GpsPoint, PointRecord, Result, Route, RouteRecord};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const DELIMITER: u8 = b';';

pub const RECORD_HEADER: [&str; 5] = ["northeast", "southwest", "points", "mass", "distance"];
pub const ROUTE_HEADER: [&str; 5] = ["northeast", "southwest", "points", "intensity", "distance"];
pub const POINT_HEADER: [&str; 3] = ["lat", "long", "intensity"];

// =============================================================================
// Coordinate parsing
// =============================================================================

/// Rewrite tuple and single-quoted literals into JSON.
fn normalize_literal(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| match c {
            '(' => '[',
            ')' => ']',
            '\'' => '"',
            other => other,
        })
        .collect()
}

fn value_to_point(value: &Value) -> Option<GpsPoint> {
    match value {
        Value::Array(pair) if pair.len() == 2 => Some(GpsPoint::new(pair[0].as_f64()?, pair[1].as_f64()?)),
        Value::Object(map) => {
            let lat = map.get("lat")?.as_f64()?;
            let lng = ["lng", "lon", "long"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_f64))?;
            Some(GpsPoint::new(lat, lng))
        }
        _ => None,
    }
}

/// Parse a single coordinate literal.
///
/// # Example
/// ```
/// use route_consolidator::{io::parse_coordinate, GpsPoint};
///
/// let expected = GpsPoint::new(48.2, 16.3);
/// assert_eq!(parse_coordinate("[48.2, 16.3]").unwrap(), expected);
/// assert_eq!(parse_coordinate("(48.2, 16.3)").unwrap(), expected);
/// assert_eq!(parse_coordinate("{'lat': 48.2, 'lng': 16.3}").unwrap(), expected);
/// ```
pub fn parse_coordinate(text: &str) -> std::result::Result<GpsPoint, String> {
    let value: Value = serde_json::from_str(&normalize_literal(text))
        .map_err(|e| format!("invalid coordinate {:?}: {}", text, e))?;
    value_to_point(&value).ok_or_else(|| format!("invalid coordinate {:?}", text))
}

/// Parse a sequence of coordinate literals.
pub fn parse_points(text: &str) -> std::result::Result<Vec<GpsPoint>, String> {
    let value: Value = serde_json::from_str(&normalize_literal(text))
        .map_err(|e| format!("invalid point sequence: {}", e))?;
    let items = value.as_array().ok_or("point sequence is not a list")?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| value_to_point(item).ok_or_else(|| format!("invalid point #{} in sequence", i)))
        .collect()
}

fn coordinate_json(point: &GpsPoint) -> Result<String> {
    Ok(serde_json::to_string(&point.to_pair())?)
}

fn points_json(points: &[GpsPoint]) -> Result<String> {
    let pairs: Vec<[f64; 2]> = points.iter().map(GpsPoint::to_pair).collect();
    Ok(serde_json::to_string(&pairs)?)
}

// =============================================================================
// Row access
// =============================================================================

struct Row<'a> {
    record: &'a StringRecord,
    line: u64,
}

impl<'a> Row<'a> {
    fn new(record: &'a StringRecord, expected: usize) -> Result<Self> {
        let line = record.position().map_or(0, |p| p.line());
        if record.len() < expected {
            return Err(ConsolidationError::malformed(
                line,
                format!("expected {} columns, found {}", expected, record.len()),
            ));
        }
        Ok(Self { record, line })
    }

    fn field(&self, idx: usize) -> &str {
        self.record.get(idx).unwrap_or("").trim()
    }

    fn number(&self, idx: usize, name: &str) -> Result<f64> {
        self.field(idx).parse::<f64>().map_err(|_| {
            ConsolidationError::malformed(self.line, format!("{} is not a number: {:?}", name, self.field(idx)))
        })
    }

    fn coordinate(&self, idx: usize) -> Result<GpsPoint> {
        parse_coordinate(self.field(idx)).map_err(|e| ConsolidationError::malformed(self.line, e))
    }

    fn points(&self, idx: usize) -> Result<Vec<GpsPoint>> {
        parse_points(self.field(idx)).map_err(|e| ConsolidationError::malformed(self.line, e))
    }
}

fn reader_from<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader)
}

fn writer_to<W: Write>(writer: W) -> csv::Writer<W> {
    WriterBuilder::new().delimiter(DELIMITER).from_writer(writer)
}

// =============================================================================
// Input records
// =============================================================================

/// Read upstream route records from a reader.
pub fn read_route_records_from<R: Read>(reader: R) -> Result<Vec<RouteRecord>> {
    let mut csv = reader_from(reader);
    let mut records = Vec::new();
    for result in csv.records() {
        let record = result?;
        let row = Row::new(&record, 5)?;
        records.push(RouteRecord {
            northeast: row.coordinate(0)?,
            southwest: row.coordinate(1)?,
            points: row.points(2)?,
            mass: row.number(3, "mass")?,
            distance: row.number(4, "distance")?,
        });
    }
    Ok(records)
}

/// Read upstream route records from a file.
pub fn read_route_records(path: impl AsRef<Path>) -> Result<Vec<RouteRecord>> {
    read_route_records_from(File::open(path)?)
}

/// Write upstream route records (mass, not intensity) to a writer.
pub fn write_route_records_to<W: Write>(writer: W, records: &[RouteRecord]) -> Result<()> {
    let mut csv = writer_to(writer);
    csv.write_record(RECORD_HEADER)?;
    for record in records {
        csv.write_record([
            coordinate_json(&record.northeast)?,
            coordinate_json(&record.southwest)?,
            points_json(&record.points)?,
            record.mass.to_string(),
            record.distance.to_string(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Write upstream route records to a file.
pub fn write_route_records(path: impl AsRef<Path>, records: &[RouteRecord]) -> Result<()> {
    write_route_records_to(File::create(path)?, records)
}

// =============================================================================
// Route output
// =============================================================================

/// Write consolidated routes to a writer.
pub fn write_routes_to<W: Write>(writer: W, routes: &[Route]) -> Result<()> {
    let mut csv = writer_to(writer);
    csv.write_record(ROUTE_HEADER)?;
    for route in routes {
        csv.write_record([
            coordinate_json(&route.bounds().northeast())?,
            coordinate_json(&route.bounds().southwest())?,
            points_json(route.points())?,
            route.intensity().to_string(),
            route.distance().to_string(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Write consolidated routes to a file.
pub fn write_routes(path: impl AsRef<Path>, routes: &[Route]) -> Result<()> {
    write_routes_to(File::create(path)?, routes)
}

/// Read consolidated routes (final output or checkpoint) from a reader.
///
/// Bounds and distance are recomputed from the points.
pub fn read_routes_from<R: Read>(reader: R) -> Result<Vec<Route>> {
    let mut csv = reader_from(reader);
    let mut routes = Vec::new();
    for result in csv.records() {
        let record = result?;
        let row = Row::new(&record, 5)?;
        let points = row.points(2)?;
        let intensity = row.number(3, "intensity")?;
        let route = Route::new(points, intensity)
            .ok_or_else(|| ConsolidationError::malformed(row.line, "route has fewer than 2 points"))?;
        routes.push(route);
    }
    Ok(routes)
}

/// Read consolidated routes from a file.
pub fn read_routes(path: impl AsRef<Path>) -> Result<Vec<Route>> {
    read_routes_from(File::open(path)?)
}

// =============================================================================
// Point output
// =============================================================================

/// Write point records to a writer.
pub fn write_points_to<W: Write>(writer: W, records: &[PointRecord]) -> Result<()> {
    let mut csv = writer_to(writer);
    csv.write_record(POINT_HEADER)?;
    for record in records {
        csv.write_record([
            record.point.latitude.to_string(),
            record.point.longitude.to_string(),
            record.intensity.to_string(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Write point records to a file.
pub fn write_points(path: impl AsRef<Path>, records: &[PointRecord]) -> Result<()> {
    write_points_to(File::create(path)?, records)
}

/// Read point records from a reader.
pub fn read_points_from<R: Read>(reader: R) -> Result<Vec<PointRecord>> {
    let mut csv = reader_from(reader);
    let mut records = Vec::new();
    for result in csv.records() {
        let record = result?;
        let row = Row::new(&record, 3)?;
        records.push(PointRecord {
            point: GpsPoint::new(row.number(0, "lat")?, row.number(1, "long")?),
            intensity: row.number(2, "intensity")?,
        });
    }
    Ok(records)
}

/// Read point records from a file.
pub fn read_points(path: impl AsRef<Path>) -> Result<Vec<PointRecord>> {
    read_points_from(File::open(path)?)
}

// =============================================================================
// Checkpoint files
// =============================================================================

/// Writes checkpoints as `<dir>/<prefix>_step_<remaining>.csv` in the same
/// format as the final output.
#[derive(Debug, Clone)]
pub struct CsvCheckpointer {
    dir: PathBuf,
    prefix: String,
}

impl CsvCheckpointer {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Path of the checkpoint written with `remaining` candidates left.
    pub fn path_for(&self, remaining: usize) -> PathBuf {
        self.dir.join(format!("{}_step_{}.csv", self.prefix, remaining))
    }

    fn prepare(&self, remaining: usize) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        Ok(self.path_for(remaining))
    }
}

impl CheckpointSink<Route> for CsvCheckpointer {
    fn write_checkpoint(&mut self, remaining: usize, solution: &[Route]) -> Result<()> {
        let path = self.prepare(remaining)?;
        write_routes(path, solution)
    }
}

impl CheckpointSink<PointRecord> for CsvCheckpointer {
    fn write_checkpoint(&mut self, remaining: usize, solution: &[PointRecord]) -> Result<()> {
        let path = self.prepare(remaining)?;
        write_points(path, solution)
    }
}

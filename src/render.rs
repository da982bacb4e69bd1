//! Map-ready output: intensity-to-color mapping and GeoJSON export.
//!
//! Colors run linearly from yellow (lowest intensity) to red (highest),
//! normalized over the intensity range of the exported set.

use crate::{ConsolidationError, PointRecord, Result, Route};
use serde_json::{json, Value};

/// An sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const YELLOW: Rgb = Rgb { r: 0xFF, g: 0xFF, b: 0x00 };
    pub const RED: Rgb = Rgb { r: 0xCE, g: 0x00, b: 0x00 };

    /// Parse `#RRGGBB` (the leading `#` is optional).
    pub fn from_hex(text: &str) -> Result<Self> {
        let hex = text.trim().trim_start_matches('#');
        let channel = |range: std::ops::Range<usize>| {
            hex.get(range)
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| ConsolidationError::config(format!("invalid color {:?}", text)))
        };
        if hex.len() != 6 {
            return Err(ConsolidationError::config(format!("invalid color {:?}", text)));
        }
        Ok(Rgb {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Linear per-channel interpolation between two colors.
///
/// `ratio` is clamped to `[0, 1]`; channels are truncated, not rounded.
///
/// # Example
/// ```
/// use route_consolidator::render::{interpolate_color, Rgb};
///
/// assert_eq!(interpolate_color(0.0, Rgb::YELLOW, Rgb::RED), "#FFFF00");
/// assert_eq!(interpolate_color(0.5, Rgb::YELLOW, Rgb::RED), "#E67F00");
/// assert_eq!(interpolate_color(7.0, Rgb::YELLOW, Rgb::RED), "#CE0000");
/// ```
pub fn interpolate_color(ratio: f64, from: Rgb, to: Rgb) -> String {
    let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * ratio) as u8;
    Rgb {
        r: mix(from.r, to.r),
        g: mix(from.g, to.g),
        b: mix(from.b, to.b),
    }
    .to_hex()
}

/// Intensity range used to normalize colors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityScale {
    pub min: f64,
    pub max: f64,
}

impl IntensityScale {
    /// Range over the finite values. A degenerate range is widened by one unit.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        for v in values.into_iter().filter(|v| v.is_finite()) {
            min = min.min(v);
            max = max.max(v);
        }
        if min > max {
            return Self { min: 0.0, max: 1.0 };
        }
        if min == max {
            max = min + 1.0;
        }
        Self { min, max }
    }

    /// Position of `value` within the range (not clamped).
    pub fn normalize(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }
}

/// Options shared by both GeoJSON exports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    /// Intensities are divided by this before display (1000 converts g/m to t/km)
    pub unit_scale: f64,
    /// Color of the lowest intensity
    pub low: Rgb,
    /// Color of the highest intensity
    pub high: Rgb,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            unit_scale: 1.0,
            low: Rgb::YELLOW,
            high: Rgb::RED,
        }
    }
}

impl RenderOptions {
    fn display(&self, intensity: f64) -> f64 {
        if self.unit_scale != 0.0 && self.unit_scale.is_finite() {
            intensity / self.unit_scale
        } else {
            intensity
        }
    }
}

fn feature_collection(features: Vec<Value>, scale: IntensityScale) -> Value {
    json!({
        "type": "FeatureCollection",
        "properties": {
            "intensity_min": scale.min,
            "intensity_max": scale.max,
        },
        "features": features,
    })
}

/// Export routes as a GeoJSON FeatureCollection of `LineString`s.
pub fn routes_to_geojson(routes: &[Route], options: &RenderOptions) -> Value {
    let scale = IntensityScale::from_values(routes.iter().map(|r| options.display(r.intensity())));
    let features = routes
        .iter()
        .map(|route| {
            let intensity = options.display(route.intensity());
            let coordinates: Vec<[f64; 2]> = route.points().iter().map(|p| [p.longitude, p.latitude]).collect();
            json!({
                "type": "Feature",
                "geometry": { "type": "LineString", "coordinates": coordinates },
                "properties": {
                    "intensity": intensity,
                    "distance": route.distance(),
                    "color": interpolate_color(scale.normalize(intensity), options.low, options.high),
                },
            })
        })
        .collect();
    feature_collection(features, scale)
}

/// Export point records as a GeoJSON FeatureCollection of `Point`s.
pub fn points_to_geojson(records: &[PointRecord], options: &RenderOptions) -> Value {
    let scale = IntensityScale::from_values(records.iter().map(|r| options.display(r.intensity)));
    let features = records
        .iter()
        .map(|record| {
            let intensity = options.display(record.intensity);
            json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [record.point.longitude, record.point.latitude],
                },
                "properties": {
                    "intensity": intensity,
                    "color": interpolate_color(scale.normalize(intensity), options.low, options.high),
                },
            })
        })
        .collect();
    feature_collection(features, scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GpsPoint;

    #[test]
    fn test_color_parsing() {
        assert_eq!(Rgb::from_hex("#CE0000").unwrap(), Rgb::RED);
        assert_eq!(Rgb::from_hex("ffff00").unwrap(), Rgb::YELLOW);
        assert!(Rgb::from_hex("#FFF").is_err());
        assert!(Rgb::from_hex("#GG0000").is_err());
    }

    #[test]
    fn test_interpolation_clamps() {
        assert_eq!(interpolate_color(-1.0, Rgb::YELLOW, Rgb::RED), "#FFFF00");
        assert_eq!(interpolate_color(1.0, Rgb::YELLOW, Rgb::RED), "#CE0000");
        assert_eq!(interpolate_color(f64::NAN, Rgb::YELLOW, Rgb::RED), "#FFFF00");
    }

    #[test]
    fn test_scale_degenerate_range() {
        let scale = IntensityScale::from_values([4.0, 4.0, f64::NAN]);
        assert_eq!(scale, IntensityScale { min: 4.0, max: 5.0 });
        assert_eq!(scale.normalize(4.0), 0.0);

        let empty = IntensityScale::from_values(std::iter::empty());
        assert_eq!(empty.normalize(0.5), 0.5);
    }

    #[test]
    fn test_routes_geojson() {
        let routes = vec![
            Route::new(vec![GpsPoint::new(48.0, 16.0), GpsPoint::new(48.1, 16.2)], 2000.0).unwrap(),
            Route::new(vec![GpsPoint::new(47.0, 15.0), GpsPoint::new(47.1, 15.2)], 4000.0).unwrap(),
        ];
        let options = RenderOptions {
            unit_scale: 1000.0,
            ..Default::default()
        };
        let geojson = routes_to_geojson(&routes, &options);

        assert_eq!(geojson["type"], "FeatureCollection");
        let features = geojson["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["geometry"]["type"], "LineString");
        assert_eq!(features[0]["geometry"]["coordinates"][0], json!([16.0, 48.0]));
        assert_eq!(features[0]["properties"]["intensity"], 2.0);
        assert_eq!(features[0]["properties"]["color"], "#FFFF00");
        assert_eq!(features[1]["properties"]["color"], "#CE0000");
    }

    #[test]
    fn test_points_geojson() {
        let records = vec![PointRecord {
            point: GpsPoint::new(48.2, 16.3),
            intensity: 3.0,
        }];
        let geojson = points_to_geojson(&records, &RenderOptions::default());
        let feature = &geojson["features"][0];
        assert_eq!(feature["geometry"]["coordinates"], json!([16.3, 48.2]));
        assert_eq!(feature["properties"]["color"], "#FFFF00");
        assert_eq!(geojson["properties"]["intensity_max"], 4.0);
    }
}

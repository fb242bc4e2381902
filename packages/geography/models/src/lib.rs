#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Taxi zone reference types.
//!
//! Zones are the fixed catalog of geographic regions that both trip and
//! collision records are attributed to. They are loaded once when the
//! engine starts and never change for the lifetime of the process.

use serde::{Deserialize, Serialize};

/// Identifier of a taxi zone (`location_id` in the source tables).
pub type ZoneId = u32;

/// A zone catalog row as handed over by the storage layer, with its
/// geometry still in the compact stored text form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneRecord {
    /// Zone identifier.
    pub id: ZoneId,
    /// Display name (e.g. "Astoria").
    pub name: String,
    /// Borough name (e.g. "Queens").
    pub borough: String,
    /// Borough lookup identifier, when the catalog carries one.
    pub borough_id: Option<u32>,
    /// Stored polygon text (`POLYGON ((...))` / `MULTIPOLYGON (((...)))`).
    pub geometry: String,
}

/// Fixed scale-and-offset mapping from stored raw coordinates to
/// (longitude, latitude).
///
/// The transform is shared by the whole zone set; it is never zone-specific.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    /// Multiplier applied to the raw x value.
    pub scale_x: f64,
    /// Multiplier applied to the raw y value.
    pub scale_y: f64,
    /// Longitude offset added after scaling.
    pub offset_x: f64,
    /// Latitude offset added after scaling.
    pub offset_y: f64,
}

impl AffineTransform {
    /// Transform used by the NYC taxi zone shapefile export.
    pub const NYC_TAXI_ZONES: Self = Self {
        scale_x: 0.000_01,
        scale_y: 0.000_01,
        offset_x: -74.1,
        offset_y: 40.5,
    };

    /// Maps a raw `(x, y)` pair to `(longitude, latitude)`.
    #[must_use]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x.mul_add(self.scale_x, self.offset_x),
            y.mul_add(self.scale_y, self.offset_y),
        )
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::NYC_TAXI_ZONES
    }
}

/// A longitude/latitude position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl GeoPoint {
    /// Creates a point from longitude and latitude.
    #[must_use]
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Whether both coordinates are finite numbers.
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }
}

/// Short descriptive view of a zone, used when results are enriched with
/// names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneSummary {
    /// Zone identifier.
    pub location_id: ZoneId,
    /// Display name.
    pub zone: String,
    /// Borough name.
    pub borough: String,
}

impl From<&ZoneRecord> for ZoneSummary {
    fn from(record: &ZoneRecord) -> Self {
        Self {
            location_id: record.id,
            zone: record.name.clone(),
            borough: record.borough.clone(),
        }
    }
}

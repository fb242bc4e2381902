//! Date, time and coordinate parsing for exported CSV columns.
//!
//! TLC and NYPD exports disagree on formats (and change them between
//! releases), so each parser tries the known layouts in turn.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use mobility_safety_geography_models::GeoPoint;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
];

/// Parses a trip timestamp.
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
}

/// Parses a crash date. Accepts a bare date or a midnight timestamp as
/// written by Socrata exports.
#[must_use]
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%m/%d/%Y") {
        return Some(date);
    }
    parse_timestamp(s).map(|ts| ts.date())
}

/// Parses a crash time of day (`H:MM` or `HH:MM:SS`).
#[must_use]
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

/// Builds a point from latitude and longitude columns. Returns `None` if
/// either is missing, not finite, or zero (the exports' placeholder for an
/// unknown location).
#[must_use]
pub fn parse_lat_lng(lat: Option<f64>, lng: Option<f64>) -> Option<GeoPoint> {
    let latitude = lat?;
    let longitude = lng?;
    if !latitude.is_finite() || !longitude.is_finite() || latitude == 0.0 || longitude == 0.0 {
        return None;
    }
    Some(GeoPoint::new(longitude, latitude))
}

/// Treats blank text as absent.
#[must_use]
pub fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

//! Parameter and result types for the engine's report operations.

use chrono::NaiveDate;
use mobility_safety_geography_models::{ZoneId, ZoneSummary};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{CollisionId, DateRange, OutlierMethod, ThresholdBand, TripId, ZoneMetric};

/// Pickup and drop-off totals for a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupsDropoffs {
    /// Zone the totals are for.
    pub zone: ZoneSummary,
    /// Trips that started in the zone.
    pub total_pickups: u64,
    /// Trips that ended in the zone.
    pub total_dropoffs: u64,
}

/// Collision and casualty totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasualtyTotals {
    /// Number of collisions.
    pub collisions: u64,
    /// Persons injured.
    pub persons_injured: u64,
    /// Persons killed.
    pub persons_killed: u64,
}

/// Collisions attributed to a zone, alongside the totals for its borough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneCollisionSummary {
    /// Zone the totals are for.
    pub zone: ZoneSummary,
    /// Collisions attributed to the zone itself.
    pub zone_totals: CasualtyTotals,
    /// Collisions attributed to the zone's borough, including those that
    /// could not be resolved to a zone. `None` if the zone has no borough id.
    pub borough_totals: Option<CasualtyTotals>,
}

/// Fare and distance averages for trips picked up in a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FareDistanceSummary {
    /// Zone the averages are for.
    pub zone: ZoneSummary,
    /// Number of trips averaged.
    pub trip_count: u64,
    /// Mean fare, absent without trips.
    pub average_fare: Option<f64>,
    /// Mean trip distance, absent without trips.
    pub average_distance: Option<f64>,
}

/// Parameters for the joint safety / availability ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyRankingParams {
    /// Only return the row for this zone.
    pub zone_id: Option<ZoneId>,
    /// Restrict both event sets to a date range.
    pub dates: Option<DateRange>,
    /// Maximum number of rows.
    pub limit: Option<usize>,
}

/// A zone's safety and taxi-availability standing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyRankingRow {
    /// Zone the row is for.
    pub zone: ZoneSummary,
    /// Collisions attributed to the zone.
    pub collision_count: u64,
    /// Trips picked up in the zone.
    pub pickup_count: u64,
    /// Rank by fewest collisions (1 = safest).
    pub safety_rank: Option<u32>,
    /// Rank by most pickups (1 = best served).
    pub availability_rank: Option<u32>,
}

/// Meteorological season of a date.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "PascalCase")]
#[strum(serialize_all = "PascalCase")]
pub enum Season {
    /// December through February.
    Winter,
    /// March through May.
    Spring,
    /// June through August.
    Summer,
    /// September through November.
    Fall,
}

impl Season {
    /// Season of a calendar month (1-12).
    #[must_use]
    pub const fn from_month(month: u32) -> Option<Self> {
        match month {
            12 | 1 | 2 => Some(Self::Winter),
            3..=5 => Some(Self::Spring),
            6..=8 => Some(Self::Summer),
            9..=11 => Some(Self::Fall),
            _ => None,
        }
    }
}

/// Collision count for one season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonCount {
    /// Season.
    pub season: Season,
    /// Collisions in that season.
    pub collision_count: u64,
}

/// Collisions per thousand trips for a zone over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionRate {
    /// Zone the rate is for.
    pub zone: ZoneSummary,
    /// Date range covered.
    pub dates: DateRange,
    /// Collisions attributed to the zone.
    pub collisions: u64,
    /// Trips starting or ending in the zone.
    pub trips: u64,
    /// `collisions * 1000 / trips`, absent when there were no trips.
    pub collisions_per_1k_trips: Option<f64>,
}

/// Number of collisions in one hour of one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateHourCount {
    /// Crash date.
    pub date: NaiveDate,
    /// Hour of day (0-23).
    pub hour: u32,
    /// Collisions in that hour.
    pub collision_count: u64,
}

/// Number of trip pickups in an hour of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourCount {
    /// Hour of day (0-23).
    pub hour: u32,
    /// Pickups in that hour over the snapshot.
    pub pickup_count: u64,
}

/// A zone with a count attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneCount {
    /// Zone.
    pub zone: ZoneSummary,
    /// Count for the zone.
    pub count: u64,
}

/// Busiest pickup hours and zones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakHours {
    /// Pickups per hour of day, busiest first.
    pub hours: Vec<HourCount>,
    /// Busiest pickup zones, busiest first.
    pub top_zones: Vec<ZoneCount>,
}

/// Parameters for the tip outlier report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipOutlierParams {
    /// Detection method. Defaults to the configured tip percentile.
    pub method: Option<OutlierMethod>,
    /// Restrict trips to a date range.
    pub dates: Option<DateRange>,
    /// Maximum number of rows. Defaults to the configured limit.
    pub limit: Option<usize>,
}

/// A trip with an anomalous tip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipOutlier {
    /// Trip identifier.
    pub trip_id: TripId,
    /// Pickup timestamp.
    pub pickup_at: chrono::NaiveDateTime,
    /// Drop-off timestamp.
    pub dropoff_at: chrono::NaiveDateTime,
    /// Fare.
    pub fare_amount: f64,
    /// Tip.
    pub tip_amount: f64,
    /// Pickup zone, if it resolves in the catalog.
    pub pickup_zone: Option<ZoneSummary>,
}

/// Tip outlier report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipOutlierResult {
    /// Method used.
    pub method: OutlierMethod,
    /// Band computed over the tips, absent for an empty snapshot.
    pub band: Option<ThresholdBand>,
    /// Trips considered.
    pub sample_size: usize,
    /// Total flagged trips before the limit was applied.
    pub total_outliers: usize,
    /// Flagged trips, largest tip first.
    pub trips: Vec<TipOutlier>,
}

/// Parameters for collision hotspot detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotParams {
    /// Collisions must exceed this. Defaults to the configured value.
    pub min_collisions: Option<u64>,
    /// Pickups must be below this. Defaults to the configured value.
    pub max_pickups: Option<u64>,
    /// Restrict both event sets to a date range.
    pub dates: Option<DateRange>,
}

/// A collision-prone zone that taxis rarely serve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotspot {
    /// Zone.
    pub zone: ZoneSummary,
    /// Collisions attributed to the zone.
    pub collision_count: u64,
    /// Trips picked up in the zone.
    pub pickup_count: u64,
}

/// Parameters for same-day collision / pickup proximity analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityParams {
    /// Date or date range to match on. Required.
    pub dates: Option<DateRange>,
    /// Search radius in metres. Defaults to the configured radius.
    pub radius_meters: Option<f64>,
    /// Maximum number of collisions returned. Defaults to the configured limit.
    pub limit: Option<usize>,
}

/// Flat view of a collision for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionSummary {
    /// Collision identifier.
    pub collision_id: CollisionId,
    /// Crash date.
    pub crash_date: Option<NaiveDate>,
    /// Borough lookup identifier.
    pub borough_id: Option<u32>,
    /// Latitude.
    pub latitude: Option<f64>,
    /// Longitude.
    pub longitude: Option<f64>,
    /// Street name.
    pub on_street_name: Option<String>,
    /// Persons injured.
    pub persons_injured: u32,
    /// Persons killed.
    pub persons_killed: u32,
}

/// Parameters for a zone choropleth export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoroplethParams {
    /// Metric to colour zones by.
    pub metric: ZoneMetric,
    /// Restrict both event sets to a date range.
    pub dates: Option<DateRange>,
}

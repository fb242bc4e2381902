#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Event records and analytics result types.
//!
//! Trip and collision records are immutable facts supplied per request by
//! the storage layer. Everything else in this crate is derived: outlier
//! sets, ranked zones and report rows that exist only for the duration of a
//! single computation.

pub mod reports;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use mobility_safety_geography_models::{GeoPoint, ZoneId};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use reports::*;

/// Identifier of a trip record.
pub type TripId = u64;

/// Identifier of a collision record.
pub type CollisionId = u64;

/// A single taxi trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripRecord {
    /// Trip identifier.
    pub id: TripId,
    /// Zone the trip started in, if known.
    pub pickup_zone_id: Option<ZoneId>,
    /// Zone the trip ended in, if known.
    pub dropoff_zone_id: Option<ZoneId>,
    /// Pickup timestamp (local time).
    pub pickup_at: NaiveDateTime,
    /// Drop-off timestamp (local time).
    pub dropoff_at: NaiveDateTime,
    /// Metered fare.
    pub fare_amount: f64,
    /// Gratuity. Refund-like rows may carry zero or negative values.
    pub tip_amount: f64,
    /// Trip distance in miles.
    pub trip_distance: f64,
}

impl TripRecord {
    /// Calendar date of the pickup.
    #[must_use]
    pub fn pickup_date(&self) -> NaiveDate {
        self.pickup_at.date()
    }

    /// Whether the trip starts or ends in `zone_id`.
    #[must_use]
    pub fn touches_zone(&self, zone_id: ZoneId) -> bool {
        self.pickup_zone_id == Some(zone_id) || self.dropoff_zone_id == Some(zone_id)
    }
}

/// A single traffic collision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionEvent {
    /// Collision identifier.
    pub id: CollisionId,
    /// Zone the collision was attributed to. Some rows only resolve to a
    /// borough.
    pub zone_id: Option<ZoneId>,
    /// Crash date.
    pub crash_date: Option<NaiveDate>,
    /// Crash time of day.
    pub crash_time: Option<NaiveTime>,
    /// Borough lookup identifier.
    pub borough_id: Option<u32>,
    /// Crash location.
    pub location: Option<GeoPoint>,
    /// Number of persons injured.
    pub persons_injured: u32,
    /// Number of persons killed.
    pub persons_killed: u32,
    /// Street the collision happened on.
    pub on_street_name: Option<String>,
    /// Primary contributing factor recorded for the first vehicle.
    pub contributing_factor: Option<String>,
}

impl CollisionEvent {
    /// The `(date, point)` key used by same-day proximity matching, present
    /// only when both halves are known and the point has finite coordinates.
    #[must_use]
    pub fn proximity_key(&self) -> Option<(NaiveDate, GeoPoint)> {
        let point = self.location.filter(GeoPoint::is_finite)?;
        Some((self.crash_date?, point))
    }
}

/// An inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day in the range.
    pub from: NaiveDate,
    /// Last day in the range.
    pub to: NaiveDate,
}

impl DateRange {
    /// Creates a range, swapping the bounds if they are reversed.
    #[must_use]
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        if from <= to {
            Self { from, to }
        } else {
            Self { from: to, to: from }
        }
    }

    /// A range covering a single day.
    #[must_use]
    pub const fn single(date: NaiveDate) -> Self {
        Self {
            from: date,
            to: date,
        }
    }

    /// Whether `date` falls inside the range.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.from == self.to {
            write!(f, "{}", self.from)
        } else {
            write!(f, "{} to {}", self.from, self.to)
        }
    }
}

/// Filter handed to the trip snapshot provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripFilter {
    /// Pickup date range.
    pub dates: Option<DateRange>,
    /// Zone the trip must start or end in.
    pub zone_id: Option<ZoneId>,
}

impl TripFilter {
    /// Whether `trip` passes the filter.
    #[must_use]
    pub fn matches(&self, trip: &TripRecord) -> bool {
        self.dates.is_none_or(|d| d.contains(trip.pickup_date()))
            && self.zone_id.is_none_or(|z| trip.touches_zone(z))
    }
}

/// Filter handed to the collision snapshot provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollisionFilter {
    /// Crash date range. Undated collisions never match a date filter.
    pub dates: Option<DateRange>,
    /// Zone the collision must be attributed to.
    pub zone_id: Option<ZoneId>,
    /// Borough the collision must be attributed to.
    pub borough_id: Option<u32>,
}

impl CollisionFilter {
    /// Whether `collision` passes the filter.
    #[must_use]
    pub fn matches(&self, collision: &CollisionEvent) -> bool {
        self.dates
            .is_none_or(|d| collision.crash_date.is_some_and(|date| d.contains(date)))
            && self.zone_id.is_none_or(|z| collision.zone_id == Some(z))
            && self
                .borough_id
                .is_none_or(|b| collision.borough_id == Some(b))
    }
}

/// How outliers are separated from the bulk of a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutlierMethod {
    /// Tukey fences: `[Q1 - k*IQR, Q3 + k*IQR]`, flag strictly outside.
    Iqr {
        /// Fence multiplier.
        k: f64,
    },
    /// One-sided: flag values strictly above the `p`-th percentile.
    Percentile {
        /// Percentile as a fraction in `[0, 1]`.
        p: f64,
    },
}

impl OutlierMethod {
    /// Default fence multiplier for [`OutlierMethod::Iqr`].
    pub const DEFAULT_IQR_K: f64 = 1.5;
}

impl Default for OutlierMethod {
    fn default() -> Self {
        Self::Iqr {
            k: Self::DEFAULT_IQR_K,
        }
    }
}

/// The band a value must fall inside to not be an outlier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdBand {
    /// Lower fence, absent for one-sided methods.
    pub lower: Option<f64>,
    /// Upper fence.
    pub upper: f64,
}

impl ThresholdBand {
    /// Whether `value` falls strictly outside the band.
    #[must_use]
    pub fn is_outside(&self, value: f64) -> bool {
        value > self.upper || self.lower.is_some_and(|lower| value < lower)
    }
}

/// A single flagged record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outlier<K> {
    /// Record identifier.
    pub id: K,
    /// The measured value.
    pub value: f64,
}

/// Result ordering for an [`OutlierSet`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierOrder {
    /// Largest value first.
    #[default]
    ValueDescending,
    /// Smallest value first.
    ValueAscending,
}

/// Records whose measure fell outside the computed band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlierSet<K> {
    /// Computed band, absent when there was no input to compute it from.
    pub band: Option<ThresholdBand>,
    /// Number of values the band was computed over.
    pub sample_size: usize,
    /// Flagged records.
    pub outliers: Vec<Outlier<K>>,
}

impl<K> OutlierSet<K> {
    /// An empty result for empty input.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            band: None,
            sample_size: 0,
            outliers: Vec::new(),
        }
    }

    /// Whether no record was flagged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outliers.is_empty()
    }
}

impl<K: Ord> OutlierSet<K> {
    /// Orders the outliers by value, breaking ties by ascending id.
    #[must_use]
    pub fn sorted(mut self, order: OutlierOrder) -> Self {
        self.outliers.sort_by(|a, b| {
            let by_value = match order {
                OutlierOrder::ValueDescending => b.value.total_cmp(&a.value),
                OutlierOrder::ValueAscending => a.value.total_cmp(&b.value),
            };
            by_value.then_with(|| a.id.cmp(&b.id))
        });
        self
    }
}

/// Sort direction for a ranking criterion. Rank 1 goes to the first value
/// in this order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortDirection {
    /// Smallest value ranks first.
    Ascending,
    /// Largest value ranks first.
    Descending,
}

/// Per-zone measures that can be ranked or mapped.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ZoneMetric {
    /// Collisions attributed to the zone.
    CollisionCount,
    /// Persons injured in collisions attributed to the zone.
    PersonsInjured,
    /// Persons killed in collisions attributed to the zone.
    PersonsKilled,
    /// Trips picked up in the zone.
    PickupCount,
    /// Trips dropped off in the zone.
    DropoffCount,
    /// Average fare of trips picked up in the zone.
    AverageFare,
    /// Average tip of trips picked up in the zone.
    AverageTip,
}

impl ZoneMetric {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::CollisionCount,
            Self::PersonsInjured,
            Self::PersonsKilled,
            Self::PickupCount,
            Self::DropoffCount,
            Self::AverageFare,
            Self::AverageTip,
        ]
    }
}

/// One ranking criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankCriterion {
    /// Metric to rank by.
    pub metric: ZoneMetric,
    /// Which end of the metric ranks first.
    pub direction: SortDirection,
}

impl RankCriterion {
    /// Creates a criterion.
    #[must_use]
    pub const fn new(metric: ZoneMetric, direction: SortDirection) -> Self {
        Self { metric, direction }
    }
}

/// Measured metrics for one zone. A metric missing from the map is
/// unknown, not zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneMetrics {
    /// Zone identifier.
    pub zone_id: ZoneId,
    /// Metric values.
    pub values: std::collections::BTreeMap<ZoneMetric, f64>,
}

impl ZoneMetrics {
    /// Creates an empty metric set for `zone_id`.
    #[must_use]
    pub const fn new(zone_id: ZoneId) -> Self {
        Self {
            zone_id,
            values: std::collections::BTreeMap::new(),
        }
    }

    /// Adds a metric value.
    #[must_use]
    pub fn with(mut self, metric: ZoneMetric, value: f64) -> Self {
        self.values.insert(metric, value);
        self
    }

    /// Looks up a metric value.
    #[must_use]
    pub fn get(&self, metric: ZoneMetric) -> Option<f64> {
        self.values.get(&metric).copied()
    }
}

/// A zone's position under one criterion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionRank {
    /// Metric ranked.
    pub metric: ZoneMetric,
    /// Direction ranked in.
    pub direction: SortDirection,
    /// The zone's value, `None` if the zone had no value for the metric.
    pub value: Option<f64>,
    /// Competition rank, `None` if the value is missing.
    pub rank: Option<u32>,
}

/// A zone with its independent per-criterion ranks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedZone {
    /// Zone identifier.
    pub zone_id: ZoneId,
    /// One entry per requested criterion, in request order.
    pub ranks: Vec<CriterionRank>,
    /// Caller-defined blended score, only set on request.
    pub composite_score: Option<f64>,
    /// Rank of `composite_score`, only set on request.
    pub composite_rank: Option<u32>,
}

impl RankedZone {
    /// Looks up the entry for `metric`.
    #[must_use]
    pub fn criterion(&self, metric: ZoneMetric) -> Option<&CriterionRank> {
        self.ranks.iter().find(|r| r.metric == metric)
    }

    /// Rank under `metric`, if ranked.
    #[must_use]
    pub fn rank_of(&self, metric: ZoneMetric) -> Option<u32> {
        self.criterion(metric).and_then(|r| r.rank)
    }
}

/// Number of same-day trips picked up near a collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityMatch {
    /// Collision identifier.
    pub collision_id: CollisionId,
    /// Trips picked up within the radius on the collision date.
    pub nearby_trip_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn trip(pickup: Option<ZoneId>, dropoff: Option<ZoneId>, day: u32) -> TripRecord {
        let at = date(2024, 3, day).and_hms_opt(8, 0, 0).unwrap();
        TripRecord {
            id: 1,
            pickup_zone_id: pickup,
            dropoff_zone_id: dropoff,
            pickup_at: at,
            dropoff_at: at,
            fare_amount: 10.0,
            tip_amount: 2.0,
            trip_distance: 1.5,
        }
    }

    fn collision(zone: Option<ZoneId>, day: Option<u32>) -> CollisionEvent {
        CollisionEvent {
            id: 1,
            zone_id: zone,
            crash_date: day.map(|d| date(2024, 3, d)),
            crash_time: None,
            borough_id: Some(2),
            location: Some(GeoPoint::new(-73.9, 40.7)),
            persons_injured: 0,
            persons_killed: 0,
            on_street_name: None,
            contributing_factor: None,
        }
    }

    #[test]
    fn date_range_swaps_reversed_bounds() {
        let range = DateRange::new(date(2024, 3, 9), date(2024, 3, 1));
        assert_eq!(range.from, date(2024, 3, 1));
        assert!(range.contains(date(2024, 3, 5)));
        assert!(!range.contains(date(2024, 3, 10)));
        assert_eq!(range.to_string(), "2024-03-01 to 2024-03-09");
        assert_eq!(DateRange::single(date(2024, 3, 1)).to_string(), "2024-03-01");
    }

    #[test]
    fn trip_filter_matches_pickup_or_dropoff_zone() {
        let filter = TripFilter {
            dates: Some(DateRange::single(date(2024, 3, 2))),
            zone_id: Some(7),
        };
        assert!(filter.matches(&trip(Some(7), None, 2)));
        assert!(filter.matches(&trip(Some(1), Some(7), 2)));
        assert!(!filter.matches(&trip(Some(1), Some(2), 2)));
        assert!(!filter.matches(&trip(Some(7), None, 3)));
    }

    #[test]
    fn collision_filter_never_matches_undated_rows_on_date() {
        let filter = CollisionFilter {
            dates: Some(DateRange::single(date(2024, 3, 2))),
            ..CollisionFilter::default()
        };
        assert!(filter.matches(&collision(Some(1), Some(2))));
        assert!(!filter.matches(&collision(Some(1), None)));
        assert!(CollisionFilter::default().matches(&collision(None, None)));
    }

    #[test]
    fn proximity_key_requires_date_and_location() {
        assert!(collision(None, Some(2)).proximity_key().is_some());
        assert!(collision(None, None).proximity_key().is_none());
        let mut no_point = collision(None, Some(2));
        no_point.location = None;
        assert!(no_point.proximity_key().is_none());
        let mut bad_point = collision(None, Some(2));
        bad_point.location = Some(GeoPoint::new(f64::NAN, 40.7));
        assert!(bad_point.proximity_key().is_none());
        bad_point.location = Some(GeoPoint::new(-73.9, f64::INFINITY));
        assert!(bad_point.proximity_key().is_none());
    }

    #[test]
    fn band_is_strict_on_both_sides() {
        let band = ThresholdBand {
            lower: Some(1.0),
            upper: 5.0,
        };
        assert!(!band.is_outside(1.0));
        assert!(!band.is_outside(5.0));
        assert!(band.is_outside(5.5));
        assert!(band.is_outside(0.5));
    }

    #[test]
    fn outliers_sort_by_value_then_id() {
        let set = OutlierSet {
            band: None,
            sample_size: 3,
            outliers: vec![
                Outlier { id: 3_u64, value: 9.0 },
                Outlier { id: 1, value: 9.0 },
                Outlier { id: 2, value: 12.0 },
            ],
        }
        .sorted(OutlierOrder::ValueDescending);
        let ids: Vec<u64> = set.outliers.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn metric_names_round_trip_through_strum() {
        for metric in ZoneMetric::all() {
            let parsed: ZoneMetric = metric.to_string().parse().unwrap();
            assert_eq!(parsed, *metric);
        }
        assert_eq!(ZoneMetric::PickupCount.as_ref(), "pickup_count");
    }
}

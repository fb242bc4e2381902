//! Report operations.
//!
//! Each report fetches its snapshot through the providers, aggregates in
//! memory and returns typed rows. Lists are fully ordered so repeated runs
//! over the same snapshot return identical output.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate, Timelike};
use mobility_safety_analytics_models::{
    CasualtyTotals, ChoroplethParams, CollisionEvent, CollisionFilter, CollisionRate,
    CollisionSummary, DateHourCount, DateRange, FareDistanceSummary, Hotspot, HotspotParams,
    HourCount, OutlierMethod, OutlierOrder, PeakHours, PickupsDropoffs, ProximityMatch,
    ProximityParams, RankCriterion, RankedZone, SafetyRankingParams, SafetyRankingRow, Season,
    SeasonCount, SortDirection, TipOutlier, TipOutlierParams, TipOutlierResult, TripFilter,
    TripRecord, ZoneCollisionSummary, ZoneCount, ZoneMetric,
};
use mobility_safety_geography_models::{ZoneId, ZoneSummary};
use serde_json::json;

use crate::proximity::{self, ProximityWindow};
use crate::{AnalyticsEngine, AnalyticsError, outliers, ranking};

/// Row limit for listings that do not carry a configured default.
pub const DEFAULT_LIMIT: usize = 10;

/// Safety (fewest collisions) and availability (most pickups) criteria.
pub const SAFETY_CRITERIA: [RankCriterion; 2] = [
    RankCriterion::new(ZoneMetric::CollisionCount, SortDirection::Ascending),
    RankCriterion::new(ZoneMetric::PickupCount, SortDirection::Descending),
];

fn casualty_totals<'a>(collisions: impl IntoIterator<Item = &'a CollisionEvent>) -> CasualtyTotals {
    collisions
        .into_iter()
        .fold(CasualtyTotals::default(), |mut totals, c| {
            totals.collisions += 1;
            totals.persons_injured += u64::from(c.persons_injured);
            totals.persons_killed += u64::from(c.persons_killed);
            totals
        })
}

fn collision_summary(collision: &CollisionEvent) -> CollisionSummary {
    CollisionSummary {
        collision_id: collision.id,
        crash_date: collision.crash_date,
        borough_id: collision.borough_id,
        latitude: collision.location.map(|p| p.lat),
        longitude: collision.location.map(|p| p.lon),
        on_street_name: collision.on_street_name.clone(),
        persons_injured: collision.persons_injured,
        persons_killed: collision.persons_killed,
    }
}

/// Orders collisions by date (undated last), then id.
fn sort_by_date(collisions: &mut [CollisionEvent]) {
    collisions.sort_by(|a, b| {
        match (a.crash_date, b.crash_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
        .then_with(|| a.id.cmp(&b.id))
    });
}

#[allow(clippy::cast_precision_loss)]
fn mean(sum: f64, count: u64) -> Option<f64> {
    (count > 0).then(|| sum / count as f64)
}

/// Trims a free-text parameter, treating blank text as absent.
fn required_text<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, AnalyticsError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AnalyticsError::MissingParameter { name })
}

impl AnalyticsEngine {
    /// Pickup and drop-off totals for a zone.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::UnknownZone`] for an id outside the
    /// catalog, or [`AnalyticsError::Storage`] if trips cannot be read.
    pub fn pickups_dropoffs(&self, zone_id: ZoneId) -> Result<PickupsDropoffs, AnalyticsError> {
        let zone = self.zone(zone_id)?.summary();
        let trips = self.fetch_trips(TripFilter {
            zone_id: Some(zone_id),
            ..TripFilter::default()
        })?;

        Ok(PickupsDropoffs {
            zone,
            total_pickups: trips
                .iter()
                .filter(|t| t.pickup_zone_id == Some(zone_id))
                .count() as u64,
            total_dropoffs: trips
                .iter()
                .filter(|t| t.dropoff_zone_id == Some(zone_id))
                .count() as u64,
        })
    }

    /// Collisions, injuries and deaths attributed to a zone, with the same
    /// totals for its borough.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::UnknownZone`] for an id outside the
    /// catalog, or [`AnalyticsError::Storage`] if collisions cannot be read.
    pub fn collisions_injuries(
        &self,
        zone_id: ZoneId,
        dates: Option<DateRange>,
    ) -> Result<ZoneCollisionSummary, AnalyticsError> {
        let zone = self.zone(zone_id)?;
        let in_zone = self.fetch_collisions(CollisionFilter {
            dates,
            zone_id: Some(zone_id),
            borough_id: None,
        })?;

        let borough_totals = zone
            .record
            .borough_id
            .map(|borough_id| {
                self.fetch_collisions(CollisionFilter {
                    dates,
                    zone_id: None,
                    borough_id: Some(borough_id),
                })
            })
            .transpose()?
            .map(|collisions| casualty_totals(&collisions));

        Ok(ZoneCollisionSummary {
            zone: zone.summary(),
            zone_totals: casualty_totals(&in_zone),
            borough_totals,
        })
    }

    /// Average fare and distance of trips picked up in a zone.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::UnknownZone`] for an id outside the
    /// catalog, or [`AnalyticsError::Storage`] if trips cannot be read.
    pub fn fare_trip_distance(&self, zone_id: ZoneId) -> Result<FareDistanceSummary, AnalyticsError> {
        let zone = self.zone(zone_id)?.summary();
        let trips = self.fetch_trips(TripFilter {
            zone_id: Some(zone_id),
            ..TripFilter::default()
        })?;

        let (count, fare_sum, distance_sum) = trips
            .iter()
            .filter(|t| t.pickup_zone_id == Some(zone_id))
            .fold((0_u64, 0.0, 0.0), |(n, fare, distance), t| {
                (n + 1, fare + t.fare_amount, distance + t.trip_distance)
            });

        Ok(FareDistanceSummary {
            zone,
            trip_count: count,
            average_fare: mean(fare_sum, count),
            average_distance: mean(distance_sum, count),
        })
    }

    /// Ranks zones by fewest collisions (safety) and most pickups
    /// (availability), each ranked independently.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::UnknownZone`] if the zone filter names a
    /// zone outside the catalog, or [`AnalyticsError::Storage`] if a
    /// snapshot cannot be read.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn safety_ranking(
        &self,
        params: &SafetyRankingParams,
    ) -> Result<Vec<SafetyRankingRow>, AnalyticsError> {
        if let Some(zone_id) = params.zone_id {
            self.zone(zone_id)?;
        }

        let ranked = self.rank_zones(&SAFETY_CRITERIA, params.dates)?;

        let count = |z: &RankedZone, metric| {
            z.criterion(metric).and_then(|r| r.value).unwrap_or(0.0) as u64
        };

        Ok(ranked
            .iter()
            .filter(|z| params.zone_id.is_none_or(|id| id == z.zone_id))
            .filter_map(|z| {
                Some(SafetyRankingRow {
                    zone: self.summary(z.zone_id)?,
                    collision_count: count(z, ZoneMetric::CollisionCount),
                    pickup_count: count(z, ZoneMetric::PickupCount),
                    safety_rank: z.rank_of(ZoneMetric::CollisionCount),
                    availability_rank: z.rank_of(ZoneMetric::PickupCount),
                })
            })
            .take(params.limit.unwrap_or(usize::MAX))
            .collect())
    }

    /// Zones that saw both taxi trips (pickup or drop-off) and collisions.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Storage`] if a snapshot cannot be read.
    pub fn active_zones(&self, dates: Option<DateRange>) -> Result<Vec<ZoneSummary>, AnalyticsError> {
        let trips = self.fetch_trips(TripFilter {
            dates,
            ..TripFilter::default()
        })?;
        let collisions = self.fetch_collisions(CollisionFilter {
            dates,
            ..CollisionFilter::default()
        })?;

        let with_trips: BTreeSet<ZoneId> = trips
            .iter()
            .flat_map(|t| [t.pickup_zone_id, t.dropoff_zone_id])
            .flatten()
            .collect();
        let with_collisions: BTreeSet<ZoneId> =
            collisions.iter().filter_map(|c| c.zone_id).collect();

        Ok(with_trips
            .intersection(&with_collisions)
            .filter_map(|&zone_id| self.summary(zone_id))
            .collect())
    }

    /// Collision counts per meteorological season, busiest first.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Storage`] if collisions cannot be read.
    pub fn safety_by_season(
        &self,
        dates: Option<DateRange>,
    ) -> Result<Vec<SeasonCount>, AnalyticsError> {
        let collisions = self.fetch_collisions(CollisionFilter {
            dates,
            ..CollisionFilter::default()
        })?;

        let mut counts: BTreeMap<Season, u64> = BTreeMap::new();
        for date in collisions.iter().filter_map(|c| c.crash_date) {
            if let Some(season) = Season::from_month(date.month()) {
                *counts.entry(season).or_default() += 1;
            }
        }

        let mut seasons: Vec<SeasonCount> = counts
            .into_iter()
            .map(|(season, collision_count)| SeasonCount {
                season,
                collision_count,
            })
            .collect();
        seasons.sort_by(|a, b| {
            b.collision_count
                .cmp(&a.collision_count)
                .then_with(|| a.season.cmp(&b.season))
        });
        Ok(seasons)
    }

    /// Collisions per thousand trips touching a zone over a date range.
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::MissingParameter`] if the zone or dates are not
    ///   given.
    /// * [`AnalyticsError::UnknownZone`] for an id outside the catalog.
    /// * [`AnalyticsError::Storage`] if a snapshot cannot be read.
    #[allow(clippy::cast_precision_loss)]
    pub fn collision_rate(
        &self,
        zone_id: Option<ZoneId>,
        dates: Option<DateRange>,
    ) -> Result<CollisionRate, AnalyticsError> {
        let zone_id = zone_id.ok_or(AnalyticsError::MissingParameter { name: "zone_id" })?;
        let dates = dates.ok_or(AnalyticsError::MissingParameter { name: "date" })?;
        let zone = self.zone(zone_id)?.summary();

        let collisions = self
            .fetch_collisions(CollisionFilter {
                dates: Some(dates),
                zone_id: Some(zone_id),
                borough_id: None,
            })?
            .len() as u64;
        let trips = self
            .fetch_trips(TripFilter {
                dates: Some(dates),
                zone_id: Some(zone_id),
            })?
            .len() as u64;

        Ok(CollisionRate {
            zone,
            dates,
            collisions,
            trips,
            collisions_per_1k_trips: (trips > 0)
                .then(|| collisions as f64 * 1000.0 / trips as f64),
        })
    }

    /// Date-hours with more than one collision.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Storage`] if collisions cannot be read.
    pub fn repeated_collision_hours(
        &self,
        dates: Option<DateRange>,
    ) -> Result<Vec<DateHourCount>, AnalyticsError> {
        let collisions = self.fetch_collisions(CollisionFilter {
            dates,
            ..CollisionFilter::default()
        })?;

        let mut counts: BTreeMap<(NaiveDate, u32), u64> = BTreeMap::new();
        for collision in &collisions {
            if let (Some(date), Some(time)) = (collision.crash_date, collision.crash_time) {
                *counts.entry((date, time.hour())).or_default() += 1;
            }
        }

        let mut repeated: Vec<DateHourCount> = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|((date, hour), collision_count)| DateHourCount {
                date,
                hour,
                collision_count,
            })
            .collect();
        repeated.sort_by(|a, b| {
            b.collision_count
                .cmp(&a.collision_count)
                .then_with(|| (a.date, a.hour).cmp(&(b.date, b.hour)))
        });
        Ok(repeated)
    }

    /// Busiest pickup hours of the day and busiest pickup zones.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Storage`] if trips cannot be read.
    pub fn peak_hours(
        &self,
        dates: Option<DateRange>,
        limit: Option<usize>,
    ) -> Result<PeakHours, AnalyticsError> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        let trips = self.fetch_trips(TripFilter {
            dates,
            ..TripFilter::default()
        })?;

        let mut by_hour: BTreeMap<u32, u64> = BTreeMap::new();
        let mut by_zone: BTreeMap<ZoneId, u64> = BTreeMap::new();
        for trip in &trips {
            *by_hour.entry(trip.pickup_at.hour()).or_default() += 1;
            if let Some(zone_id) = trip.pickup_zone_id {
                *by_zone.entry(zone_id).or_default() += 1;
            }
        }

        let mut hours: Vec<HourCount> = by_hour
            .into_iter()
            .map(|(hour, pickup_count)| HourCount { hour, pickup_count })
            .collect();
        hours.sort_by(|a, b| b.pickup_count.cmp(&a.pickup_count).then(a.hour.cmp(&b.hour)));
        hours.truncate(limit);

        Ok(PeakHours {
            hours,
            top_zones: self.top_zone_counts(by_zone, limit),
        })
    }

    /// Trips with anomalous tips, largest tip first.
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::InvalidParameter`] for an out-of-range method.
    /// * [`AnalyticsError::Storage`] if trips cannot be read.
    pub fn tip_outliers(&self, params: &TipOutlierParams) -> Result<TipOutlierResult, AnalyticsError> {
        let method = params.method.unwrap_or(OutlierMethod::Percentile {
            p: self.config.outliers.tip_percentile,
        });
        let limit = params.limit.unwrap_or(self.config.outliers.limit);

        let trips = self.fetch_trips(TripFilter {
            dates: params.dates,
            ..TripFilter::default()
        })?;
        let by_id: BTreeMap<_, &TripRecord> = trips.iter().map(|t| (t.id, t)).collect();
        let tips: Vec<_> = trips.iter().map(|t| (t.id, t.tip_amount)).collect();

        let set = outliers::detect_outliers(&tips, method)?.sorted(OutlierOrder::ValueDescending);
        let total_outliers = set.outliers.len();

        let flagged = set
            .outliers
            .iter()
            .filter_map(|o| by_id.get(&o.id))
            .take(limit)
            .map(|trip| TipOutlier {
                trip_id: trip.id,
                pickup_at: trip.pickup_at,
                dropoff_at: trip.dropoff_at,
                fare_amount: trip.fare_amount,
                tip_amount: trip.tip_amount,
                pickup_zone: trip.pickup_zone_id.and_then(|z| self.summary(z)),
            })
            .collect();

        Ok(TipOutlierResult {
            method,
            band: set.band,
            sample_size: set.sample_size,
            total_outliers,
            trips: flagged,
        })
    }

    /// Zones with many collisions but few pickups.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Storage`] if a snapshot cannot be read.
    pub fn collision_hotspots(&self, params: &HotspotParams) -> Result<Vec<Hotspot>, AnalyticsError> {
        let min_collisions = params
            .min_collisions
            .unwrap_or(self.config.hotspots.min_collisions);
        let max_pickups = params.max_pickups.unwrap_or(self.config.hotspots.max_pickups);

        let trips = self.fetch_trips(TripFilter {
            dates: params.dates,
            ..TripFilter::default()
        })?;
        let collisions = self.fetch_collisions(CollisionFilter {
            dates: params.dates,
            ..CollisionFilter::default()
        })?;

        let mut hotspots: Vec<Hotspot> = self
            .tally(&trips, &collisions)
            .into_iter()
            .filter(|(_, t)| t.collisions > min_collisions && t.pickups < max_pickups)
            .filter_map(|(zone_id, t)| {
                Some(Hotspot {
                    zone: self.summary(zone_id)?,
                    collision_count: t.collisions,
                    pickup_count: t.pickups,
                })
            })
            .collect();
        hotspots.sort_by(|a, b| {
            b.collision_count
                .cmp(&a.collision_count)
                .then(a.pickup_count.cmp(&b.pickup_count))
                .then(a.zone.location_id.cmp(&b.zone.location_id))
        });
        Ok(hotspots)
    }

    /// Collisions with the most trips picked up nearby on the same day.
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::MissingParameter`] if no date is given.
    /// * [`AnalyticsError::InvalidParameter`] for a bad radius.
    /// * [`AnalyticsError::Storage`] if a snapshot cannot be read.
    pub fn proximity_analysis(
        &self,
        params: &ProximityParams,
    ) -> Result<Vec<ProximityMatch>, AnalyticsError> {
        let dates = params
            .dates
            .ok_or(AnalyticsError::MissingParameter { name: "date" })?;
        let window = ProximityWindow {
            dates: Some(dates),
            radius_meters: params
                .radius_meters
                .unwrap_or(self.config.proximity.radius_meters),
        };

        let collisions = self.fetch_collisions(CollisionFilter {
            dates: Some(dates),
            ..CollisionFilter::default()
        })?;
        let trips = self.fetch_trips(TripFilter {
            dates: Some(dates),
            ..TripFilter::default()
        })?;

        let counts = proximity::match_same_day(&self.index, &collisions, &trips, &window)?;
        Ok(proximity::top_matches(
            &counts,
            Some(params.limit.unwrap_or(self.config.proximity.limit)),
        ))
    }

    /// Collisions whose street name contains `street_name`, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::MissingParameter`] for a blank name, or
    /// [`AnalyticsError::Storage`] if collisions cannot be read.
    pub fn collisions_on_street(
        &self,
        street_name: &str,
        dates: Option<DateRange>,
    ) -> Result<Vec<CollisionSummary>, AnalyticsError> {
        let needle = required_text(Some(street_name), "street_name")?.to_lowercase();
        let mut collisions: Vec<CollisionEvent> = self
            .fetch_collisions(CollisionFilter {
                dates,
                ..CollisionFilter::default()
            })?
            .into_iter()
            .filter(|c| {
                c.on_street_name
                    .as_deref()
                    .is_some_and(|street| street.to_lowercase().contains(&needle))
            })
            .collect();

        sort_by_date(&mut collisions);
        Ok(collisions.iter().map(collision_summary).collect())
    }

    /// Distinct recorded contributing factors, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Storage`] if collisions cannot be read.
    pub fn contributing_factors(&self) -> Result<Vec<String>, AnalyticsError> {
        let factors: BTreeSet<String> = self
            .fetch_collisions(CollisionFilter::default())?
            .iter()
            .filter_map(|c| c.contributing_factor.as_deref())
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(ToString::to_string)
            .collect();
        Ok(factors.into_iter().collect())
    }

    /// Zones with a collision on `date` whose contributing factor matches
    /// `factor`, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::MissingParameter`] if either parameter is
    /// missing, or [`AnalyticsError::Storage`] if collisions cannot be read.
    pub fn zones_with_factor(
        &self,
        date: Option<NaiveDate>,
        factor: Option<&str>,
    ) -> Result<Vec<ZoneSummary>, AnalyticsError> {
        let date = date.ok_or(AnalyticsError::MissingParameter { name: "date" })?;
        let factor = required_text(factor, "factor")?;

        let zones: BTreeSet<ZoneId> = self
            .fetch_collisions(CollisionFilter {
                dates: Some(DateRange::single(date)),
                ..CollisionFilter::default()
            })?
            .iter()
            .filter(|c| {
                c.contributing_factor
                    .as_deref()
                    .is_some_and(|f| f.trim().eq_ignore_ascii_case(factor))
            })
            .filter_map(|c| c.zone_id)
            .collect();

        Ok(zones
            .into_iter()
            .filter_map(|zone_id| self.summary(zone_id))
            .collect())
    }

    /// Collisions per zone of a borough over a date range, busiest first.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::MissingParameter`] if either parameter is
    /// missing, or [`AnalyticsError::Storage`] if collisions cannot be read.
    pub fn borough_collisions(
        &self,
        borough: Option<&str>,
        dates: Option<DateRange>,
    ) -> Result<Vec<ZoneCount>, AnalyticsError> {
        let borough = required_text(borough, "borough")?;
        let dates = dates.ok_or(AnalyticsError::MissingParameter { name: "date" })?;

        let mut counts: BTreeMap<ZoneId, u64> = BTreeMap::new();
        for collision in self.fetch_collisions(CollisionFilter {
            dates: Some(dates),
            ..CollisionFilter::default()
        })? {
            let in_borough = collision
                .zone_id
                .and_then(|z| self.zones.get(&z))
                .filter(|zone| zone.record.borough.eq_ignore_ascii_case(borough));
            if let Some(zone) = in_borough {
                *counts.entry(zone.id()).or_default() += 1;
            }
        }

        Ok(self.top_zone_counts(counts, usize::MAX))
    }

    /// Collisions in a date range, oldest first, one page at a time.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::MissingParameter`] if no date range is
    /// given, or [`AnalyticsError::Storage`] if collisions cannot be read.
    pub fn collisions_in_range(
        &self,
        dates: Option<DateRange>,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<CollisionSummary>, AnalyticsError> {
        let dates = dates.ok_or(AnalyticsError::MissingParameter { name: "date" })?;
        let mut collisions = self.fetch_collisions(CollisionFilter {
            dates: Some(dates),
            ..CollisionFilter::default()
        })?;
        sort_by_date(&mut collisions);

        Ok(collisions
            .iter()
            .skip(offset.unwrap_or(0))
            .take(limit.unwrap_or(DEFAULT_LIMIT))
            .map(collision_summary)
            .collect())
    }

    /// Every zone as a `GeoJSON` feature coloured by `params.metric`.
    ///
    /// Features carry `locationId`, `zone`, `borough`, `value` (null when
    /// the zone has no value) and `fill` properties. The ramp spans the
    /// observed minimum and maximum.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Storage`] if a snapshot cannot be read.
    pub fn zone_choropleth(
        &self,
        params: &ChoroplethParams,
    ) -> Result<geojson::FeatureCollection, AnalyticsError> {
        let values: BTreeMap<ZoneId, f64> = self
            .zone_metrics(params.dates)?
            .into_iter()
            .filter_map(|m| Some((m.zone_id, m.get(params.metric)?)))
            .filter(|(_, v)| v.is_finite())
            .collect();

        let min = values.values().copied().reduce(f64::min);
        let max = values.values().copied().reduce(f64::max);
        let gradient = self.config.gradient();
        log::debug!(
            "Choropleth of {} over {} zones, range {min:?}..{max:?}",
            params.metric,
            values.len()
        );

        let features = self
            .zones()
            .map(|zone| {
                let value = values.get(&zone.id()).copied();
                let fill = gradient.color_for(value, min, max);

                let mut properties = geojson::JsonObject::new();
                properties.insert("locationId".to_string(), json!(zone.id()));
                properties.insert("zone".to_string(), json!(zone.record.name));
                properties.insert("borough".to_string(), json!(zone.record.borough));
                properties.insert("value".to_string(), json!(value));
                properties.insert("fill".to_string(), json!(fill.to_hex()));

                geojson::Feature {
                    bbox: None,
                    geometry: Some(zone.geometry.to_geojson()),
                    id: Some(geojson::feature::Id::Number(zone.id().into())),
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        Ok(geojson::FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }

    /// Zone counts, largest first, ties by zone id.
    fn top_zone_counts(&self, counts: BTreeMap<ZoneId, u64>, limit: usize) -> Vec<ZoneCount> {
        let mut rows: Vec<ZoneCount> = counts
            .into_iter()
            .filter_map(|(zone_id, count)| {
                Some(ZoneCount {
                    zone: self.summary(zone_id)?,
                    count,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then(a.zone.location_id.cmp(&b.zone.location_id))
        });
        rows.truncate(limit);
        rows
    }
}

/// Blends safety and availability ranks into one score (lower is
/// better) for callers that want a single ordering.
pub fn blend_safety_availability(zones: &mut [RankedZone]) {
    ranking::apply_composite(
        zones,
        |z| {
            let safety = z.rank_of(ZoneMetric::CollisionCount)?;
            let availability = z.rank_of(ZoneMetric::PickupCount)?;
            Some(f64::from(safety) + f64::from(availability))
        },
        SortDirection::Ascending,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::{self, date};

    fn june(from: u32, to: u32) -> Option<DateRange> {
        Some(DateRange::new(date(6, from), date(6, to)))
    }

    fn ids(zones: &[ZoneSummary]) -> Vec<ZoneId> {
        zones.iter().map(|z| z.location_id).collect()
    }

    #[test]
    fn pickups_and_dropoffs_are_counted_separately() {
        let result = fixtures::engine().pickups_dropoffs(1).unwrap();
        assert_eq!(result.zone.zone, "Alpha");
        assert_eq!(result.total_pickups, 3);
        assert_eq!(result.total_dropoffs, 2);
    }

    #[test]
    fn collision_totals_include_borough() {
        let result = fixtures::engine().collisions_injuries(1, None).unwrap();
        assert_eq!(
            result.zone_totals,
            CasualtyTotals {
                collisions: 2,
                persons_injured: 2,
                persons_killed: 0
            }
        );
        let borough = result.borough_totals.unwrap();
        assert_eq!(borough.collisions, 4);
        assert_eq!(borough.persons_injured, 3);
    }

    #[test]
    fn fare_and_distance_average_pickups() {
        let result = fixtures::engine().fare_trip_distance(1).unwrap();
        assert_eq!(result.trip_count, 3);
        assert_eq!(result.average_fare, Some(20.0));
        assert_eq!(result.average_distance, Some(2.0));
    }

    #[test]
    fn unknown_zone_is_an_error() {
        let engine = fixtures::engine();
        assert!(matches!(
            engine.pickups_dropoffs(42),
            Err(AnalyticsError::UnknownZone { zone_id: 42 })
        ));
        assert!(matches!(
            engine.safety_ranking(&SafetyRankingParams {
                zone_id: Some(42),
                ..SafetyRankingParams::default()
            }),
            Err(AnalyticsError::UnknownZone { zone_id: 42 })
        ));
    }

    #[test]
    fn safety_and_availability_are_ranked_separately() {
        let rows = fixtures::engine()
            .safety_ranking(&SafetyRankingParams::default())
            .unwrap();
        let summary: Vec<(ZoneId, Option<u32>, Option<u32>)> = rows
            .iter()
            .map(|r| (r.zone.location_id, r.safety_rank, r.availability_rank))
            .collect();
        assert_eq!(
            summary,
            vec![(2, Some(1), Some(2)), (1, Some(2), Some(1)), (3, Some(2), Some(3))]
        );
        assert_eq!(rows[0].collision_count, 1);
        assert_eq!(rows[1].pickup_count, 3);
    }

    #[test]
    fn safety_ranking_filters_to_one_zone() {
        let rows = fixtures::engine()
            .safety_ranking(&SafetyRankingParams {
                zone_id: Some(3),
                ..SafetyRankingParams::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].safety_rank, Some(2));
    }

    #[test]
    fn blended_rank_is_opt_in() {
        let engine = fixtures::engine();
        let mut ranked = engine
            .rank_zones(
                &[
                    RankCriterion::new(ZoneMetric::CollisionCount, SortDirection::Ascending),
                    RankCriterion::new(ZoneMetric::PickupCount, SortDirection::Descending),
                ],
                None,
            )
            .unwrap();
        assert!(ranked.iter().all(|z| z.composite_score.is_none()));

        blend_safety_availability(&mut ranked);
        // zone 1: 2 + 1, zone 2: 1 + 2, zone 3: 2 + 3
        let order: Vec<(ZoneId, Option<u32>)> =
            ranked.iter().map(|z| (z.zone_id, z.composite_rank)).collect();
        assert_eq!(order, vec![(1, Some(1)), (2, Some(1)), (3, Some(3))]);
    }

    #[test]
    fn active_zones_need_trips_and_collisions() {
        let engine = fixtures::engine();
        assert_eq!(ids(&engine.active_zones(None).unwrap()), vec![1, 2, 3]);
        assert_eq!(ids(&engine.active_zones(june(1, 1)).unwrap()), vec![1]);
    }

    #[test]
    fn seasons_are_counted_busiest_first() {
        let seasons = fixtures::engine().safety_by_season(None).unwrap();
        assert_eq!(
            seasons,
            vec![
                SeasonCount {
                    season: Season::Summer,
                    collision_count: 5
                },
                SeasonCount {
                    season: Season::Winter,
                    collision_count: 1
                },
            ]
        );
    }

    #[test]
    fn collision_rate_per_thousand_trips() {
        let engine = fixtures::engine();
        let rate = engine.collision_rate(Some(1), june(1, 2)).unwrap();
        assert_eq!(rate.collisions, 2);
        assert_eq!(rate.trips, 4);
        assert_eq!(rate.collisions_per_1k_trips, Some(500.0));

        assert!(matches!(
            engine.collision_rate(None, june(1, 2)),
            Err(AnalyticsError::MissingParameter { name: "zone_id" })
        ));
        assert!(matches!(
            engine.collision_rate(Some(1), None),
            Err(AnalyticsError::MissingParameter { name: "date" })
        ));
    }

    #[test]
    fn collision_rate_without_trips_is_absent() {
        let rate = fixtures::engine()
            .collision_rate(Some(3), Some(DateRange::single(date(1, 15))))
            .unwrap();
        assert_eq!(rate.collisions, 1);
        assert_eq!(rate.trips, 0);
        assert_eq!(rate.collisions_per_1k_trips, None);
    }

    #[test]
    fn only_repeated_hours_are_listed() {
        let hours = fixtures::engine().repeated_collision_hours(None).unwrap();
        assert_eq!(
            hours,
            vec![DateHourCount {
                date: date(6, 1),
                hour: 8,
                collision_count: 2
            }]
        );
    }

    #[test]
    fn peak_hours_and_zones() {
        let peak = fixtures::engine().peak_hours(None, Some(2)).unwrap();
        assert_eq!(
            peak.hours,
            vec![
                HourCount {
                    hour: 8,
                    pickup_count: 4
                },
                HourCount {
                    hour: 9,
                    pickup_count: 1
                },
            ]
        );
        let zones: Vec<(ZoneId, u64)> = peak
            .top_zones
            .iter()
            .map(|z| (z.zone.location_id, z.count))
            .collect();
        assert_eq!(zones, vec![(1, 3), (2, 2)]);
    }

    #[test]
    fn tip_outliers_default_to_configured_percentile() {
        let result = fixtures::engine()
            .tip_outliers(&TipOutlierParams::default())
            .unwrap();
        assert_eq!(result.method, OutlierMethod::Percentile { p: 0.95 });
        assert_eq!(result.sample_size, 7);
        assert_eq!(result.total_outliers, 1);
        assert_eq!(result.trips[0].trip_id, 4);
        assert_eq!(result.trips[0].pickup_zone.as_ref().unwrap().zone, "Bravo");
    }

    #[test]
    fn tip_outliers_with_iqr() {
        let result = fixtures::engine()
            .tip_outliers(&TipOutlierParams {
                method: Some(OutlierMethod::Iqr { k: 1.5 }),
                ..TipOutlierParams::default()
            })
            .unwrap();
        let band = result.band.unwrap();
        assert!((band.upper - 7.875).abs() < 1e-9);
        assert_eq!(result.trips.len(), 1);
    }

    #[test]
    fn hotspots_use_thresholds() {
        let engine = fixtures::engine();
        assert!(engine.collision_hotspots(&HotspotParams::default()).unwrap().is_empty());

        let hotspots = engine
            .collision_hotspots(&HotspotParams {
                min_collisions: Some(1),
                max_pickups: Some(2),
                dates: None,
            })
            .unwrap();
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].zone.location_id, 3);
        assert_eq!(hotspots[0].collision_count, 2);
        assert_eq!(hotspots[0].pickup_count, 1);
    }

    #[test]
    fn proximity_counts_nearby_same_day_pickups() {
        let engine = fixtures::engine();
        let wide = engine
            .proximity_analysis(&ProximityParams {
                dates: june(1, 1),
                ..ProximityParams::default()
            })
            .unwrap();
        let counts: Vec<(u64, u64)> = wide
            .iter()
            .map(|m| (m.collision_id, m.nearby_trip_count))
            .collect();
        assert_eq!(counts, vec![(101, 4), (102, 4), (104, 4)]);

        let tight = engine
            .proximity_analysis(&ProximityParams {
                dates: june(1, 1),
                radius_meters: Some(0.0),
                limit: Some(2),
            })
            .unwrap();
        let counts: Vec<(u64, u64)> = tight
            .iter()
            .map(|m| (m.collision_id, m.nearby_trip_count))
            .collect();
        assert_eq!(counts, vec![(101, 3), (102, 3)]);
    }

    #[test]
    fn proximity_without_date_is_rejected() {
        let err = fixtures::engine()
            .proximity_analysis(&ProximityParams::default())
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::MissingParameter { name: "date" }));
    }

    #[test]
    fn street_search_ignores_case() {
        let engine = fixtures::engine();
        let ids: Vec<u64> = engine
            .collisions_on_street("broadway", None)
            .unwrap()
            .iter()
            .map(|c| c.collision_id)
            .collect();
        assert_eq!(ids, vec![101, 102]);
        assert!(matches!(
            engine.collisions_on_street("  ", None),
            Err(AnalyticsError::MissingParameter {
                name: "street_name"
            })
        ));
    }

    #[test]
    fn factors_are_distinct_and_non_blank() {
        let factors = fixtures::engine().contributing_factors().unwrap();
        assert_eq!(factors, vec!["Driver Inattention/Distraction", "Unsafe Speed"]);
    }

    #[test]
    fn zones_with_factor_on_date() {
        let engine = fixtures::engine();
        let zones = engine
            .zones_with_factor(Some(date(6, 1)), Some("unsafe speed"))
            .unwrap();
        assert_eq!(ids(&zones), vec![1]);
        assert!(matches!(
            engine.zones_with_factor(None, Some("Unsafe Speed")),
            Err(AnalyticsError::MissingParameter { name: "date" })
        ));
        assert!(matches!(
            engine.zones_with_factor(Some(date(6, 1)), None),
            Err(AnalyticsError::MissingParameter { name: "factor" })
        ));
    }

    #[test]
    fn borough_collisions_count_per_zone() {
        let rows = fixtures::engine()
            .borough_collisions(Some("manhattan"), june(1, 2))
            .unwrap();
        let counts: Vec<(ZoneId, u64)> = rows
            .iter()
            .map(|r| (r.zone.location_id, r.count))
            .collect();
        assert_eq!(counts, vec![(1, 2), (2, 1)]);
    }

    #[test]
    fn collisions_in_range_are_paginated() {
        let engine = fixtures::engine();
        let page: Vec<u64> = engine
            .collisions_in_range(june(1, 2), Some(2), Some(1))
            .unwrap()
            .iter()
            .map(|c| c.collision_id)
            .collect();
        assert_eq!(page, vec![102, 104]);

        let first = &engine.collisions_in_range(june(1, 2), None, None).unwrap()[0];
        assert_eq!(first.collision_id, 101);
        assert_eq!(first.longitude, Some(fixtures::IN_ZONE_1.lon));
    }

    #[test]
    fn choropleth_colours_by_observed_range() {
        let collection = fixtures::engine()
            .zone_choropleth(&ChoroplethParams {
                metric: ZoneMetric::PickupCount,
                dates: None,
            })
            .unwrap();
        assert_eq!(collection.features.len(), 3);

        let fill = |i: usize| {
            collection.features[i].properties.as_ref().unwrap()["fill"]
                .as_str()
                .unwrap()
                .to_string()
        };
        assert_eq!(fill(0), "#d7191c");
        assert_eq!(fill(2), "#abd9e9");

        let first = collection.features[0].properties.as_ref().unwrap();
        assert_eq!(first["locationId"], json!(1));
        assert_eq!(first["zone"], json!("Alpha"));
        assert_eq!(first["value"], json!(3.0));
        assert!(collection.features[0].geometry.is_some());
    }

    #[test]
    fn choropleth_of_missing_metric_is_neutral() {
        let collection = fixtures::engine()
            .zone_choropleth(&ChoroplethParams {
                metric: ZoneMetric::AverageFare,
                dates: Some(DateRange::single(date(6, 1))),
            })
            .unwrap();
        let zone_3 = collection.features[2].properties.as_ref().unwrap();
        assert_eq!(zone_3["value"], serde_json::Value::Null);
        assert_eq!(zone_3["fill"], json!("#f0f0f0"));
    }
}

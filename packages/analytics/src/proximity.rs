//! Same-day proximity matching between collisions and trip pickups.
//!
//! A collision is matched against every trip picked up on the same
//! calendar date in a zone within the search radius of the collision
//! point. Each trip counts once per collision; zones are only the spatial
//! join key.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use mobility_safety_analytics_models::{
    CollisionEvent, CollisionId, DateRange, ProximityMatch, TripRecord,
};
use mobility_safety_geography_models::ZoneId;
use mobility_safety_spatial::SpatialIndex;

use crate::AnalyticsError;

/// Date window and search radius for a match run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityWindow {
    /// Dates to match on. Required.
    pub dates: Option<DateRange>,
    /// Search radius in metres.
    pub radius_meters: f64,
}

/// Counts, for each collision in the window, the trips picked up on the
/// same date in a zone within the radius.
///
/// Collisions without both a date and a finite point, and trips without a
/// pickup zone, are skipped. Collisions with no nearby trips are left out of the
/// result.
///
/// # Errors
///
/// * [`AnalyticsError::MissingParameter`] if the window has no dates.
/// * [`AnalyticsError::InvalidParameter`] if the radius is negative or not
///   finite.
pub fn match_same_day(
    index: &SpatialIndex,
    collisions: &[CollisionEvent],
    trips: &[TripRecord],
    window: &ProximityWindow,
) -> Result<BTreeMap<CollisionId, u64>, AnalyticsError> {
    let dates = window
        .dates
        .ok_or(AnalyticsError::MissingParameter { name: "date" })?;
    let radius = window.radius_meters;
    if !radius.is_finite() || radius < 0.0 {
        return Err(AnalyticsError::invalid(
            "radius_meters",
            format!("must be a non-negative number of metres, got {radius}"),
        ));
    }

    let mut pickups: BTreeMap<NaiveDate, BTreeMap<ZoneId, u64>> = BTreeMap::new();
    for trip in trips {
        let Some(zone_id) = trip.pickup_zone_id else {
            continue;
        };
        let date = trip.pickup_date();
        if dates.contains(date) {
            *pickups.entry(date).or_default().entry(zone_id).or_default() += 1;
        }
    }

    let mut counts = BTreeMap::new();
    for collision in collisions {
        let Some((date, point)) = collision.proximity_key() else {
            continue;
        };
        if !dates.contains(date) {
            continue;
        }
        let Some(by_zone) = pickups.get(&date) else {
            continue;
        };

        let nearby: u64 = index
            .zones_within_distance(Some(point), radius)?
            .iter()
            .filter_map(|zone_id| by_zone.get(zone_id))
            .sum();
        if nearby > 0 {
            counts.insert(collision.id, nearby);
        }
    }

    log::debug!(
        "Matched {} of {} collisions against {} trips for {dates} within {radius} m",
        counts.len(),
        collisions.len(),
        trips.len()
    );

    Ok(counts)
}

/// Orders matches by count descending then collision id, keeping at most
/// `limit`.
#[must_use]
pub fn top_matches(counts: &BTreeMap<CollisionId, u64>, limit: Option<usize>) -> Vec<ProximityMatch> {
    let mut matches: Vec<ProximityMatch> = counts
        .iter()
        .map(|(&collision_id, &nearby_trip_count)| ProximityMatch {
            collision_id,
            nearby_trip_count,
        })
        .collect();
    matches.sort_by(|a, b| {
        b.nearby_trip_count
            .cmp(&a.nearby_trip_count)
            .then_with(|| a.collision_id.cmp(&b.collision_id))
    });
    if let Some(limit) = limit {
        matches.truncate(limit);
    }
    matches
}

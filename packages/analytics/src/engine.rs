//! The analytics engine: decoded zone catalog, spatial index and the
//! storage providers that feed each request.

use std::collections::BTreeMap;
use std::sync::Arc;

use mobility_safety_analytics_models::{
    CollisionEvent, CollisionFilter, DateRange, RankCriterion, RankedZone, TripFilter, TripRecord,
    ZoneMetric, ZoneMetrics,
};
use mobility_safety_geography::ZoneGeometry;
use mobility_safety_geography_models::{GeoPoint, ZoneId, ZoneRecord, ZoneSummary};
use mobility_safety_spatial::SpatialIndex;

use crate::provider::{CollisionSnapshotProvider, TripSnapshotProvider, ZoneCatalogProvider};
use crate::{AnalyticsError, EngineConfig, ranking};

/// A catalog zone with its decoded geometry.
#[derive(Debug, Clone)]
pub struct Zone {
    /// Catalog row.
    pub record: ZoneRecord,
    /// Geometry decoded from `record.geometry`.
    pub geometry: ZoneGeometry,
}

impl Zone {
    /// Zone id.
    #[must_use]
    pub const fn id(&self) -> ZoneId {
        self.record.id
    }

    /// Short descriptive view.
    #[must_use]
    pub fn summary(&self) -> ZoneSummary {
        ZoneSummary::from(&self.record)
    }
}

/// Per-zone running totals over a trip and collision snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ZoneTally {
    pub collisions: u64,
    pub persons_injured: u64,
    pub persons_killed: u64,
    pub pickups: u64,
    pub dropoffs: u64,
    pub fare_sum: f64,
    pub tip_sum: f64,
}

impl ZoneTally {
    #[allow(clippy::cast_precision_loss)]
    fn metrics(&self, zone_id: ZoneId) -> ZoneMetrics {
        let metrics = ZoneMetrics::new(zone_id)
            .with(ZoneMetric::CollisionCount, self.collisions as f64)
            .with(ZoneMetric::PersonsInjured, self.persons_injured as f64)
            .with(ZoneMetric::PersonsKilled, self.persons_killed as f64)
            .with(ZoneMetric::PickupCount, self.pickups as f64)
            .with(ZoneMetric::DropoffCount, self.dropoffs as f64);

        if self.pickups == 0 {
            return metrics;
        }
        let n = self.pickups as f64;
        metrics
            .with(ZoneMetric::AverageFare, self.fare_sum / n)
            .with(ZoneMetric::AverageTip, self.tip_sum / n)
    }
}

/// Answers analytical queries over trips and collisions.
///
/// Holds only immutable reference data plus shared providers, so it can be
/// wrapped in an `Arc` and used from several threads.
pub struct AnalyticsEngine {
    pub(crate) config: EngineConfig,
    pub(crate) zones: BTreeMap<ZoneId, Zone>,
    pub(crate) index: SpatialIndex,
    trips: Arc<dyn TripSnapshotProvider>,
    collisions: Arc<dyn CollisionSnapshotProvider>,
}

impl std::fmt::Debug for AnalyticsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsEngine")
            .field("config", &self.config)
            .field("zones", &self.zones.len())
            .field("indexed", &self.index.len())
            .finish_non_exhaustive()
    }
}

impl AnalyticsEngine {
    /// Loads and decodes the zone catalog, builds the spatial index and
    /// keeps the event providers for later requests.
    ///
    /// # Errors
    ///
    /// * [`AnalyticsError::Storage`] if the catalog cannot be read.
    /// * [`AnalyticsError::Decode`] if any zone's geometry is malformed.
    pub fn new(
        config: EngineConfig,
        catalog: &dyn ZoneCatalogProvider,
        trips: Arc<dyn TripSnapshotProvider>,
        collisions: Arc<dyn CollisionSnapshotProvider>,
    ) -> Result<Self, AnalyticsError> {
        config.validate()?;

        let mut zones = BTreeMap::new();
        for record in catalog.zones()? {
            let zone_id = record.id;
            let geometry = mobility_safety_geography::decode(&record.geometry, &config.transform)
                .map_err(|source| AnalyticsError::Decode { zone_id, source })?;

            if geometry
                .polygons()
                .iter()
                .any(|rings| rings.first().is_some_and(|exterior| exterior.len() < 4))
            {
                log::warn!("Zone {zone_id} has an exterior ring with fewer than 4 coordinates");
            }
            if zones.insert(zone_id, Zone { record, geometry }).is_some() {
                log::warn!("Zone {zone_id} appears more than once in the catalog, keeping the last");
            }
        }

        let index = SpatialIndex::build(
            zones
                .values()
                .map(|zone| (zone.id(), zone.geometry.to_multi_polygon())),
        );
        log::info!("Loaded {} zones ({} indexed)", zones.len(), index.len());

        Ok(Self {
            config,
            zones,
            index,
            trips,
            collisions,
        })
    }

    /// Builds an engine over a single store that provides all three record
    /// sets.
    ///
    /// # Errors
    ///
    /// See [`AnalyticsEngine::new`].
    pub fn from_store<S>(config: EngineConfig, store: Arc<S>) -> Result<Self, AnalyticsError>
    where
        S: ZoneCatalogProvider + TripSnapshotProvider + CollisionSnapshotProvider + 'static,
    {
        let catalog = Arc::clone(&store);
        Self::new(config, catalog.as_ref(), store.clone(), store)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The spatial index over the catalog.
    #[must_use]
    pub const fn spatial_index(&self) -> &SpatialIndex {
        &self.index
    }

    /// All zones, ordered by id.
    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    /// Looks up a zone.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::UnknownZone`] if the id is not in the
    /// catalog.
    pub fn zone(&self, zone_id: ZoneId) -> Result<&Zone, AnalyticsError> {
        self.zones
            .get(&zone_id)
            .ok_or(AnalyticsError::UnknownZone { zone_id })
    }

    pub(crate) fn summary(&self, zone_id: ZoneId) -> Option<ZoneSummary> {
        self.zones.get(&zone_id).map(Zone::summary)
    }

    pub(crate) fn fetch_trips(&self, filter: TripFilter) -> Result<Vec<TripRecord>, AnalyticsError> {
        let trips = self.trips.trips(&filter)?;
        log::debug!("Fetched {} trips for {filter:?}", trips.len());
        Ok(trips)
    }

    pub(crate) fn fetch_collisions(
        &self,
        filter: CollisionFilter,
    ) -> Result<Vec<CollisionEvent>, AnalyticsError> {
        let collisions = self.collisions.collisions(&filter)?;
        log::debug!("Fetched {} collisions for {filter:?}", collisions.len());
        Ok(collisions)
    }

    /// Totals per catalog zone. Every catalog zone gets an entry; events
    /// attributed to zones outside the catalog are ignored.
    pub(crate) fn tally(
        &self,
        trips: &[TripRecord],
        collisions: &[CollisionEvent],
    ) -> BTreeMap<ZoneId, ZoneTally> {
        let mut tallies: BTreeMap<ZoneId, ZoneTally> =
            self.zones.keys().map(|&id| (id, ZoneTally::default())).collect();

        for collision in collisions {
            if let Some(t) = collision.zone_id.and_then(|z| tallies.get_mut(&z)) {
                t.collisions += 1;
                t.persons_injured += u64::from(collision.persons_injured);
                t.persons_killed += u64::from(collision.persons_killed);
            }
        }
        for trip in trips {
            if let Some(t) = trip.pickup_zone_id.and_then(|z| tallies.get_mut(&z)) {
                t.pickups += 1;
                t.fare_sum += trip.fare_amount;
                t.tip_sum += trip.tip_amount;
            }
            if let Some(t) = trip.dropoff_zone_id.and_then(|z| tallies.get_mut(&z)) {
                t.dropoffs += 1;
            }
        }

        tallies
    }

    /// Every catalog zone's metrics over the snapshot for `dates`.
    ///
    /// Averages are left out for zones without pickups.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Storage`] if a snapshot cannot be read.
    pub fn zone_metrics(&self, dates: Option<DateRange>) -> Result<Vec<ZoneMetrics>, AnalyticsError> {
        let trips = self.fetch_trips(TripFilter {
            dates,
            ..TripFilter::default()
        })?;
        let collisions = self.fetch_collisions(CollisionFilter {
            dates,
            ..CollisionFilter::default()
        })?;

        Ok(self
            .tally(&trips, &collisions)
            .into_iter()
            .map(|(zone_id, tally)| tally.metrics(zone_id))
            .collect())
    }

    /// Ranks every zone independently under each criterion.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::MissingParameter`] for an empty criteria
    /// list, or [`AnalyticsError::Storage`] if a snapshot cannot be read.
    pub fn rank_zones(
        &self,
        criteria: &[RankCriterion],
        dates: Option<DateRange>,
    ) -> Result<Vec<RankedZone>, AnalyticsError> {
        if criteria.is_empty() {
            return Err(AnalyticsError::MissingParameter { name: "criteria" });
        }
        Ok(ranking::rank(&self.zone_metrics(dates)?, criteria))
    }

    /// Zones within `radius_meters` of `point`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Spatial`] if the point is not a finite
    /// position or the radius is invalid.
    pub fn zones_near(
        &self,
        point: GeoPoint,
        radius_meters: f64,
    ) -> Result<Vec<ZoneSummary>, AnalyticsError> {
        Ok(self
            .index
            .zones_within_distance(Some(point), radius_meters)?
            .into_iter()
            .filter_map(|zone_id| self.summary(zone_id))
            .collect())
    }

    /// The zone containing `point`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Spatial`] if the point is not a finite
    /// position.
    pub fn zone_at(&self, point: GeoPoint) -> Result<Option<ZoneSummary>, AnalyticsError> {
        Ok(self
            .index
            .zone_containing(Some(point))?
            .and_then(|zone_id| self.summary(zone_id)))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! A three-zone catalog with a weekend of trips and collisions.
    //!
    //! Zones 1 and 2 are adjacent ~844 m wide squares in Manhattan, zone 3
    //! is ~16 km east in Queens.

    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use mobility_safety_analytics_models::{CollisionEvent, TripRecord};
    use mobility_safety_geography_models::{GeoPoint, ZoneId, ZoneRecord};

    use crate::{AnalyticsEngine, EngineConfig, MemoryStore};

    pub const IN_ZONE_1: GeoPoint = GeoPoint::new(-73.995, 40.705);
    pub const IN_ZONE_2: GeoPoint = GeoPoint::new(-73.985, 40.705);
    pub const IN_ZONE_3: GeoPoint = GeoPoint::new(-73.795, 40.705);

    pub fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, day).unwrap()
    }

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        date(6, day).and_hms_opt(hour, minute, 0).unwrap()
    }

    fn zone(id: ZoneId, name: &str, borough: &str, borough_id: u32, geometry: &str) -> ZoneRecord {
        ZoneRecord {
            id,
            name: name.to_string(),
            borough: borough.to_string(),
            borough_id: Some(borough_id),
            geometry: geometry.to_string(),
        }
    }

    pub fn zones() -> Vec<ZoneRecord> {
        vec![
            zone(
                1,
                "Alpha",
                "Manhattan",
                1,
                "POLYGON ((10000 20000, 11000 20000, 11000 21000, 10000 21000, 10000 20000))",
            ),
            zone(
                2,
                "Bravo",
                "Manhattan",
                1,
                "POLYGON ((11000 20000, 12000 20000, 12000 21000, 11000 21000, 11000 20000))",
            ),
            zone(
                3,
                "Charlie",
                "Queens",
                4,
                "MULTIPOLYGON ((30000 20000, 31000 20000, 31000 21000, 30000 21000, 30000 20000))",
            ),
        ]
    }

    #[allow(clippy::too_many_arguments)]
    fn trip(
        id: u64,
        pickup: Option<ZoneId>,
        dropoff: Option<ZoneId>,
        pickup_at: NaiveDateTime,
        fare_amount: f64,
        tip_amount: f64,
        trip_distance: f64,
    ) -> TripRecord {
        TripRecord {
            id,
            pickup_zone_id: pickup,
            dropoff_zone_id: dropoff,
            pickup_at,
            dropoff_at: pickup_at + chrono::Duration::minutes(15),
            fare_amount,
            tip_amount,
            trip_distance,
        }
    }

    pub fn trips() -> Vec<TripRecord> {
        vec![
            trip(1, Some(1), Some(2), at(1, 8, 15), 10.0, 2.0, 1.0),
            trip(2, Some(1), Some(3), at(1, 8, 45), 20.0, 3.0, 2.0),
            trip(3, Some(1), Some(1), at(1, 17, 10), 30.0, 4.0, 3.0),
            trip(4, Some(2), Some(1), at(1, 8, 30), 15.0, 25.0, 1.5),
            trip(5, Some(2), None, at(2, 9, 0), 12.0, 2.5, 1.2),
            trip(6, Some(3), Some(2), at(2, 8, 5), 40.0, 5.0, 10.0),
            trip(7, None, Some(3), at(2, 23, 0), 8.0, 0.0, 0.5),
        ]
    }

    #[allow(clippy::too_many_arguments)]
    fn collision(
        id: u64,
        zone_id: Option<ZoneId>,
        crash_date: NaiveDate,
        hour: Option<u32>,
        borough_id: u32,
        location: Option<GeoPoint>,
        injured_killed: (u32, u32),
        street: Option<&str>,
        factor: Option<&str>,
    ) -> CollisionEvent {
        CollisionEvent {
            id,
            zone_id,
            crash_date: Some(crash_date),
            crash_time: hour.and_then(|h| NaiveTime::from_hms_opt(h, 20, 0)),
            borough_id: Some(borough_id),
            location,
            persons_injured: injured_killed.0,
            persons_killed: injured_killed.1,
            on_street_name: street.map(ToString::to_string),
            contributing_factor: factor.map(ToString::to_string),
        }
    }

    #[rustfmt::skip]
    pub fn collisions() -> Vec<CollisionEvent> {
        let distraction = Some("Driver Inattention/Distraction");
        let speed = Some("Unsafe Speed");
        vec![
            collision(101, Some(1), date(6, 1), Some(8), 1, Some(IN_ZONE_1), (2, 0), Some("BROADWAY"), distraction),
            collision(102, Some(1), date(6, 1), Some(8), 1, Some(IN_ZONE_1), (0, 0), Some("Broadway"), speed),
            collision(103, Some(3), date(6, 2), Some(14), 4, Some(IN_ZONE_3), (1, 1), Some("QUEENS BLVD"), speed),
            collision(104, None, date(6, 1), Some(12), 1, Some(IN_ZONE_2), (1, 0), Some("5 AVENUE"), distraction),
            collision(105, Some(3), date(1, 15), Some(10), 4, None, (0, 0), None, None),
            collision(106, Some(2), date(6, 2), None, 1, Some(IN_ZONE_2), (0, 0), Some("5 AVENUE"), Some("  ")),
        ]
    }

    pub fn store() -> MemoryStore {
        MemoryStore::new(zones(), trips(), collisions())
    }

    pub fn engine() -> AnalyticsEngine {
        AnalyticsEngine::from_store(EngineConfig::embedded().unwrap(), Arc::new(store())).unwrap()
    }
}

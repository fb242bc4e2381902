#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial index over the taxi zone catalog.
//!
//! Zone polygons are projected into a local metric frame once, bulk loaded
//! into an R-tree keyed by their bounding boxes, and then queried with a
//! two-phase filter: a cheap envelope intersection prunes candidates before
//! the exact point-to-polygon test runs. The index is immutable after
//! construction and safe to share between threads.

pub mod projection;

use std::collections::BTreeSet;

use geo::{BoundingRect, Contains, Distance, Euclidean, MultiPolygon, Point};
use mobility_safety_geography_models::{GeoPoint, ZoneId};
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;

pub use projection::LocalProjection;

/// Errors returned by point queries.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SpatialError {
    /// The query point is absent (or not a finite coordinate).
    #[error("Point has no location")]
    NoLocation,

    /// The search radius is negative or not finite.
    #[error("Invalid search radius: {radius}")]
    InvalidRadius {
        /// The rejected radius in metres.
        radius: f64,
    },
}

/// A projected zone polygon stored in the R-tree.
struct ZoneEntry {
    zone_id: ZoneId,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for ZoneEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl ZoneEntry {
    fn distance_to(&self, point: &Point<f64>) -> f64 {
        if self.polygon.contains(point) {
            return 0.0;
        }
        self.polygon
            .iter()
            .map(|polygon| Euclidean.distance(point, polygon))
            .fold(f64::INFINITY, f64::min)
    }
}

/// R-tree index over zone polygons in a projected metric frame.
pub struct SpatialIndex {
    projection: LocalProjection,
    zones: RTree<ZoneEntry>,
}

impl SpatialIndex {
    /// Builds the index from `(zone id, geographic polygon)` pairs.
    ///
    /// The projection is centred on the extent of all zones. Zones with no
    /// coordinates are left out since nothing can be near them.
    #[must_use]
    pub fn build(zones: impl IntoIterator<Item = (ZoneId, MultiPolygon<f64>)>) -> Self {
        let zones: Vec<(ZoneId, MultiPolygon<f64>)> = zones.into_iter().collect();
        let projection = LocalProjection::for_extent(zones.iter().map(|(_, geometry)| geometry));

        let entries: Vec<ZoneEntry> = zones
            .into_iter()
            .filter_map(|(zone_id, geometry)| {
                let polygon = projection.project_multi_polygon(&geometry);
                let Some(rect) = polygon.bounding_rect() else {
                    log::warn!("Zone {zone_id} has empty geometry, leaving it out of the index");
                    return None;
                };
                Some(ZoneEntry {
                    zone_id,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                    polygon,
                })
            })
            .collect();

        let zones = RTree::bulk_load(entries);
        log::info!(
            "Built spatial index over {} zones (origin {:.4}, {:.4})",
            zones.size(),
            projection.origin().lon,
            projection.origin().lat
        );

        Self { projection, zones }
    }

    /// Number of indexed zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.size()
    }

    /// Whether the index holds no zones.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.size() == 0
    }

    /// The projection used for distance tests.
    #[must_use]
    pub const fn projection(&self) -> &LocalProjection {
        &self.projection
    }

    /// Returns every zone whose boundary or interior lies within
    /// `radius_meters` of `point`.
    ///
    /// # Errors
    ///
    /// * [`SpatialError::NoLocation`] if `point` is absent.
    /// * [`SpatialError::InvalidRadius`] if the radius is negative or not
    ///   finite.
    pub fn zones_within_distance(
        &self,
        point: Option<GeoPoint>,
        radius_meters: f64,
    ) -> Result<BTreeSet<ZoneId>, SpatialError> {
        if !radius_meters.is_finite() || radius_meters < 0.0 {
            return Err(SpatialError::InvalidRadius {
                radius: radius_meters,
            });
        }
        let point = self.project_query(point)?;
        let (x, y) = (point.x(), point.y());
        let query_env = AABB::from_corners(
            [x - radius_meters, y - radius_meters],
            [x + radius_meters, y + radius_meters],
        );

        Ok(self
            .zones
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.distance_to(&point) <= radius_meters)
            .map(|entry| entry.zone_id)
            .collect())
    }

    /// Looks up the zone containing `point`.
    ///
    /// Zones in the catalog do not overlap in practice; if they do, the
    /// lowest zone id wins so the answer is deterministic.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::NoLocation`] if `point` is absent.
    pub fn zone_containing(&self, point: Option<GeoPoint>) -> Result<Option<ZoneId>, SpatialError> {
        let point = self.project_query(point)?;
        let query_env = AABB::from_point([point.x(), point.y()]);

        Ok(self
            .zones
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.contains(&point))
            .map(|entry| entry.zone_id)
            .min())
    }

    fn project_query(&self, point: Option<GeoPoint>) -> Result<Point<f64>, SpatialError> {
        match point {
            Some(p) if p.is_finite() => Ok(self.projection.project_point(p)),
            _ => Err(SpatialError::NoLocation),
        }
    }
}

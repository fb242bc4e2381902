//! Local metric projection.
//!
//! Zone catalogs cover a single metro area, so an equirectangular
//! projection about the catalog centre keeps distances within a fraction
//! of a percent while letting the distance tests run in plain Euclidean
//! metres.

use geo::{BoundingRect, Coord, MapCoords, MultiPolygon, Point};
use mobility_safety_geography_models::GeoPoint;

/// Metres per degree of latitude (and of longitude at the equator).
pub const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// Equirectangular projection anchored at a reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalProjection {
    origin: GeoPoint,
    meters_per_deg_lon: f64,
}

impl LocalProjection {
    /// Creates a projection centred on `origin`.
    #[must_use]
    pub fn new(origin: GeoPoint) -> Self {
        Self {
            origin,
            meters_per_deg_lon: METERS_PER_DEG_LAT * origin.lat.to_radians().cos(),
        }
    }

    /// Creates a projection centred on the bounding box of `geometries`.
    ///
    /// Falls back to `(0, 0)` when there is nothing to measure.
    #[must_use]
    pub fn for_extent<'a>(geometries: impl IntoIterator<Item = &'a MultiPolygon<f64>>) -> Self {
        let mut bounds: Option<(Coord<f64>, Coord<f64>)> = None;

        for rect in geometries.into_iter().filter_map(|g| g.bounding_rect()) {
            let (min, max) = (rect.min(), rect.max());
            bounds = Some(match bounds {
                None => (min, max),
                Some((lo, hi)) => (
                    Coord {
                        x: lo.x.min(min.x),
                        y: lo.y.min(min.y),
                    },
                    Coord {
                        x: hi.x.max(max.x),
                        y: hi.y.max(max.y),
                    },
                ),
            });
        }

        let origin = bounds.map_or(GeoPoint::new(0.0, 0.0), |(lo, hi)| {
            GeoPoint::new(f64::midpoint(lo.x, hi.x), f64::midpoint(lo.y, hi.y))
        });

        Self::new(origin)
    }

    /// The reference point of the projection.
    #[must_use]
    pub const fn origin(&self) -> GeoPoint {
        self.origin
    }

    /// Projects a longitude/latitude pair to metres east/north of the origin.
    #[must_use]
    pub fn project(&self, lon: f64, lat: f64) -> Coord<f64> {
        Coord {
            x: (lon - self.origin.lon) * self.meters_per_deg_lon,
            y: (lat - self.origin.lat) * METERS_PER_DEG_LAT,
        }
    }

    /// Projects a [`GeoPoint`].
    #[must_use]
    pub fn project_point(&self, point: GeoPoint) -> Point<f64> {
        Point::from(self.project(point.lon, point.lat))
    }

    /// Projects every coordinate of a multi-polygon.
    #[must_use]
    pub fn project_multi_polygon(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        geometry.map_coords(|c| self.project(c.x, c.y))
    }
}

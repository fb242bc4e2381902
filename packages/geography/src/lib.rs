#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Taxi zone geometry decoding.
//!
//! Zone shapes are stored as compact polygon text whose coordinates are
//! raw integers in a shifted, scaled frame. [`decode()`] turns that text
//! into rings of `(longitude, latitude)` coordinates that the spatial
//! index and GeoJSON consumers can work with.

pub mod decode;

pub use decode::decode;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use thiserror::Error;

/// Errors that can occur while decoding stored zone geometry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The text does not follow either supported polygon layout.
    #[error("Unrecognized geometry format: {message}")]
    UnrecognizedFormat {
        /// Description of what did not match.
        message: String,
    },

    /// A coordinate token could not be parsed as a finite number pair.
    #[error("Invalid coordinate '{token}' in ring {ring}")]
    InvalidCoordinate {
        /// The offending token as it appeared in the input.
        token: String,
        /// Zero-based ring index, counted across the whole geometry.
        ring: usize,
    },
}

/// A single ring of `(longitude, latitude)` coordinates, exactly as listed
/// in the source text. Closure is not checked or repaired.
pub type Ring = Vec<Coord<f64>>;

/// Decoded zone geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneGeometry {
    /// One polygon: exterior ring followed by any interior rings.
    Polygon(Vec<Ring>),
    /// Several polygons, each a list of rings.
    MultiPolygon(Vec<Vec<Ring>>),
}

impl ZoneGeometry {
    /// Returns the constituent polygons as ring slices.
    #[must_use]
    pub fn polygons(&self) -> Vec<&[Ring]> {
        match self {
            Self::Polygon(rings) => vec![rings.as_slice()],
            Self::MultiPolygon(polygons) => polygons.iter().map(Vec::as_slice).collect(),
        }
    }

    /// Whether the geometry has no coordinates at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coord_count() == 0
    }

    /// Total number of coordinates over all rings.
    #[must_use]
    pub fn coord_count(&self) -> usize {
        self.polygons()
            .iter()
            .flat_map(|rings| rings.iter())
            .map(Vec::len)
            .sum()
    }

    /// Converts to a [`MultiPolygon`] for spatial predicates.
    ///
    /// Polygons with an empty exterior ring are dropped. `geo` closes open
    /// rings on construction, which is what the predicates expect.
    #[must_use]
    pub fn to_multi_polygon(&self) -> MultiPolygon<f64> {
        let polygons = self
            .polygons()
            .into_iter()
            .filter_map(|rings| {
                let (exterior, interiors) = rings.split_first()?;
                if exterior.is_empty() {
                    return None;
                }
                Some(Polygon::new(
                    LineString::from(exterior.clone()),
                    interiors
                        .iter()
                        .map(|ring| LineString::from(ring.clone()))
                        .collect(),
                ))
            })
            .collect();

        MultiPolygon(polygons)
    }

    /// Converts to a `GeoJSON` geometry, passing ring contents through
    /// unchanged.
    #[must_use]
    pub fn to_geojson(&self) -> geojson::Geometry {
        let value = match self {
            Self::Polygon(rings) => geojson::Value::Polygon(rings_to_positions(rings)),
            Self::MultiPolygon(polygons) => geojson::Value::MultiPolygon(
                polygons
                    .iter()
                    .map(|rings| rings_to_positions(rings))
                    .collect(),
            ),
        };
        geojson::Geometry::new(value)
    }
}

fn rings_to_positions(rings: &[Ring]) -> Vec<Vec<Vec<f64>>> {
    rings
        .iter()
        .map(|ring| ring.iter().map(|c| vec![c.x, c.y]).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64) -> Ring {
        vec![
            Coord { x: x0, y: y0 },
            Coord { x: x0 + 1.0, y: y0 },
            Coord { x: x0 + 1.0, y: y0 + 1.0 },
            Coord { x: x0, y: y0 },
        ]
    }

    #[test]
    fn counts_coordinates_across_polygons() {
        let geometry =
            ZoneGeometry::MultiPolygon(vec![vec![square(0.0, 0.0)], vec![square(5.0, 5.0)]]);
        assert_eq!(geometry.coord_count(), 8);
        assert_eq!(geometry.polygons().len(), 2);
        assert!(!geometry.is_empty());
    }

    #[test]
    fn empty_exterior_is_dropped_from_multi_polygon() {
        let geometry = ZoneGeometry::MultiPolygon(vec![vec![Vec::new()], vec![square(0.0, 0.0)]]);
        assert_eq!(geometry.to_multi_polygon().0.len(), 1);
    }

    #[test]
    fn empty_polygon_converts_to_empty_multi_polygon() {
        let geometry = ZoneGeometry::Polygon(Vec::new());
        assert!(geometry.is_empty());
        assert!(geometry.to_multi_polygon().0.is_empty());
    }

    #[test]
    fn geojson_keeps_ring_as_given() {
        let ring = vec![
            Coord { x: 1.0, y: 2.0 },
            Coord { x: 3.0, y: 4.0 },
            Coord { x: 5.0, y: 6.0 },
        ];
        let geometry = ZoneGeometry::Polygon(vec![ring]);
        match geometry.to_geojson().value {
            geojson::Value::Polygon(rings) => {
                assert_eq!(rings.len(), 1);
                assert_eq!(rings[0].len(), 3);
                assert_eq!(rings[0][2], vec![5.0, 6.0]);
            }
            other => panic!("expected polygon, got {other:?}"),
        }
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Analytical query engine over taxi trips and traffic collisions.
//!
//! The engine decodes the zone catalog once, builds a spatial index over
//! it, and then answers report requests against trip and collision
//! snapshots supplied by a storage provider. The algorithmic pieces
//! (proximity matching, outlier detection, ranking, colour ramps) are
//! plain functions in their own modules so they can be used without an
//! engine.

pub mod color;
pub mod config;
pub mod engine;
pub mod outliers;
pub mod provider;
pub mod proximity;
pub mod ranking;
pub mod reports;

use mobility_safety_geography::DecodeError;
use mobility_safety_geography_models::ZoneId;
use mobility_safety_spatial::SpatialError;
use thiserror::Error;

pub use config::EngineConfig;
pub use engine::AnalyticsEngine;
pub use provider::{
    CollisionSnapshotProvider, MemoryStore, StorageError, TripSnapshotProvider,
    ZoneCatalogProvider,
};

/// Errors that can occur during analytics operations.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// A zone's stored geometry could not be decoded.
    #[error("Failed to decode geometry of zone {zone_id}: {source}")]
    Decode {
        /// Zone whose geometry was rejected.
        zone_id: ZoneId,
        /// Underlying decode failure.
        #[source]
        source: DecodeError,
    },

    /// A spatial query was rejected.
    #[error("Spatial query failed: {0}")]
    Spatial(#[from] SpatialError),

    /// The storage provider failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A required request parameter was not supplied.
    #[error("Missing required parameter '{name}'")]
    MissingParameter {
        /// Parameter name.
        name: &'static str,
    },

    /// A request parameter is out of range.
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// A zone id is not in the catalog.
    #[error("Unknown zone: {zone_id}")]
    UnknownZone {
        /// The requested zone.
        zone_id: ZoneId,
    },

    /// Engine configuration could not be loaded or is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },
}

impl AnalyticsError {
    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}

//! Storage seams.
//!
//! The engine never reads files or databases itself. Zone catalogs and
//! event snapshots come from these traits, injected at construction, so
//! the same engine runs over CSV exports, fixtures or anything else that
//! can produce the records.

use mobility_safety_analytics_models::{CollisionEvent, CollisionFilter, TripFilter, TripRecord};
use mobility_safety_geography_models::ZoneRecord;
use thiserror::Error;

/// Errors raised by storage providers.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing store failed to read or parse its data.
    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A row was read but holds an unusable value.
    #[error("Invalid record in {source_name} (line {line}): {message}")]
    InvalidRecord {
        /// File or table the row came from.
        source_name: String,
        /// One-based line number, 0 if unknown.
        line: u64,
        /// What is wrong with the row.
        message: String,
    },
}

impl StorageError {
    /// Wraps an error raised by a provider's underlying store.
    pub fn backend(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Backend(error.into())
    }
}

/// Supplies the zone catalog, read once at engine construction.
pub trait ZoneCatalogProvider {
    /// Returns every zone in the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the catalog cannot be read.
    fn zones(&self) -> Result<Vec<ZoneRecord>, StorageError>;
}

/// Supplies trip snapshots per request.
pub trait TripSnapshotProvider: Send + Sync {
    /// Returns the trips matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the trips cannot be read.
    fn trips(&self, filter: &TripFilter) -> Result<Vec<TripRecord>, StorageError>;
}

/// Supplies collision snapshots per request.
pub trait CollisionSnapshotProvider: Send + Sync {
    /// Returns the collisions matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the collisions cannot be read.
    fn collisions(&self, filter: &CollisionFilter) -> Result<Vec<CollisionEvent>, StorageError>;
}

/// Provider backed by owned vectors.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// Zone catalog.
    pub zones: Vec<ZoneRecord>,
    /// Trip records.
    pub trips: Vec<TripRecord>,
    /// Collision records.
    pub collisions: Vec<CollisionEvent>,
}

impl MemoryStore {
    /// Creates a store from its three record sets.
    #[must_use]
    pub const fn new(
        zones: Vec<ZoneRecord>,
        trips: Vec<TripRecord>,
        collisions: Vec<CollisionEvent>,
    ) -> Self {
        Self {
            zones,
            trips,
            collisions,
        }
    }
}

impl ZoneCatalogProvider for MemoryStore {
    fn zones(&self) -> Result<Vec<ZoneRecord>, StorageError> {
        Ok(self.zones.clone())
    }
}

impl TripSnapshotProvider for MemoryStore {
    fn trips(&self, filter: &TripFilter) -> Result<Vec<TripRecord>, StorageError> {
        Ok(self
            .trips
            .iter()
            .filter(|trip| filter.matches(trip))
            .cloned()
            .collect())
    }
}

impl CollisionSnapshotProvider for MemoryStore {
    fn collisions(&self, filter: &CollisionFilter) -> Result<Vec<CollisionEvent>, StorageError> {
        Ok(self
            .collisions
            .iter()
            .filter(|collision| filter.matches(collision))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn backend_error_keeps_its_source() {
        let inner = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad row");
        let err = StorageError::backend(inner);
        assert!(matches!(err, StorageError::Backend(_)));
        assert_eq!(err.to_string(), "Storage backend error: bad row");
        assert_eq!(err.source().map(ToString::to_string).as_deref(), Some("bad row"));
    }

    #[test]
    fn backend_accepts_plain_messages() {
        let err = StorageError::backend("connection reset");
        assert_eq!(err.to_string(), "Storage backend error: connection reset");
    }
}

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Flat-file snapshot storage.
//!
//! A data directory holds three CSV exports: the zone catalog, taxi trips
//! and traffic collisions. [`CsvSnapshotStore`] implements the engine's
//! provider traits over them, streaming each file per request and applying
//! the request filter while reading.

pub mod parsing;
pub mod paths;
pub mod rows;

use std::fs::File;
use std::path::{Path, PathBuf};

use mobility_safety_analytics::{
    CollisionSnapshotProvider, StorageError, TripSnapshotProvider, ZoneCatalogProvider,
};
use mobility_safety_analytics_models::{CollisionEvent, CollisionFilter, TripFilter, TripRecord};
use mobility_safety_geography_models::ZoneRecord;

/// Provider over a directory of CSV exports.
#[derive(Debug, Clone)]
pub struct CsvSnapshotStore {
    dir: PathBuf,
}

impl CsvSnapshotStore {
    /// Opens a data directory.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory or any of the three
    /// files does not exist.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        for path in [
            paths::zones_path(&dir),
            paths::trips_path(&dir),
            paths::collisions_path(&dir),
        ] {
            if !path.is_file() {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} not found", path.display()),
                )));
            }
        }

        log::info!("Using CSV snapshots in {}", dir.display());
        Ok(Self { dir })
    }

    /// The data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn open_file(path: &Path) -> Result<(File, String), StorageError> {
        let file = File::open(path)?;
        Ok((file, path.display().to_string()))
    }
}

impl ZoneCatalogProvider for CsvSnapshotStore {
    fn zones(&self) -> Result<Vec<ZoneRecord>, StorageError> {
        let (file, name) = Self::open_file(&paths::zones_path(&self.dir))?;
        rows::read_zones(file, &name)
    }
}

impl TripSnapshotProvider for CsvSnapshotStore {
    fn trips(&self, filter: &TripFilter) -> Result<Vec<TripRecord>, StorageError> {
        let (file, name) = Self::open_file(&paths::trips_path(&self.dir))?;
        rows::read_trips(file, &name, filter)
    }
}

impl CollisionSnapshotProvider for CsvSnapshotStore {
    fn collisions(&self, filter: &CollisionFilter) -> Result<Vec<CollisionEvent>, StorageError> {
        let (file, name) = Self::open_file(&paths::collisions_path(&self.dir))?;
        rows::read_collisions(file, &name, filter)
    }
}

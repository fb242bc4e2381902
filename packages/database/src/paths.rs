//! Canonical file paths for the CSV data directory.

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV_VAR: &str = "MOBILITY_SAFETY_DATA_DIR";

/// Zone catalog file name.
pub const ZONES_FILE: &str = "zones.csv";

/// Trip snapshot file name.
pub const TRIPS_FILE: &str = "trips.csv";

/// Collision snapshot file name.
pub const COLLISIONS_FILE: &str = "collisions.csv";

/// Returns the data directory: [`DATA_DIR_ENV_VAR`] if set, otherwise
/// `data/` under the current directory.
#[must_use]
pub fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV_VAR).map_or_else(|| PathBuf::from("data"), PathBuf::from)
}

/// Returns the zone catalog path within `dir`.
#[must_use]
pub fn zones_path(dir: &Path) -> PathBuf {
    dir.join(ZONES_FILE)
}

/// Returns the trip snapshot path within `dir`.
#[must_use]
pub fn trips_path(dir: &Path) -> PathBuf {
    dir.join(TRIPS_FILE)
}

/// Returns the collision snapshot path within `dir`.
#[must_use]
pub fn collisions_path(dir: &Path) -> PathBuf {
    dir.join(COLLISIONS_FILE)
}

//! CSV row layouts and their conversion into engine records.
//!
//! Readers take any [`Read`] so the same code serves files on disk and
//! in-memory fixtures. Event rows that cannot be converted are skipped with
//! a warning, as are collisions that carry a point but no date. A bad zone
//! row fails the whole catalog.

use std::io::Read;

use mobility_safety_analytics::StorageError;
use mobility_safety_analytics_models::{CollisionEvent, CollisionFilter, TripFilter, TripRecord};
use mobility_safety_geography_models::{ZoneId, ZoneRecord};
use serde::Deserialize;

use crate::parsing::{non_blank, parse_date, parse_lat_lng, parse_time, parse_timestamp};

#[derive(Debug, Deserialize)]
struct ZoneRow {
    #[serde(alias = "LocationID", alias = "locationid")]
    location_id: ZoneId,
    zone: String,
    borough: String,
    #[serde(default)]
    borough_id: Option<u32>,
    #[serde(alias = "the_geom", alias = "geometry")]
    geometry_shp: String,
}

#[derive(Debug, Deserialize)]
struct TripRow {
    #[serde(default)]
    trip_id: Option<u64>,
    #[serde(default, alias = "PULocationID")]
    pu_location_id: Option<ZoneId>,
    #[serde(default, alias = "DOLocationID")]
    do_location_id: Option<ZoneId>,
    tpep_pickup_datetime: String,
    tpep_dropoff_datetime: String,
    #[serde(default)]
    fare_amount: Option<f64>,
    #[serde(default)]
    tip_amount: Option<f64>,
    #[serde(default)]
    trip_distance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CollisionRow {
    collision_id: u64,
    #[serde(default)]
    location_id: Option<ZoneId>,
    #[serde(default)]
    crash_date: Option<String>,
    #[serde(default)]
    crash_time: Option<String>,
    #[serde(default)]
    borough_id: Option<u32>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    number_of_persons_injured: Option<u32>,
    #[serde(default)]
    number_of_persons_killed: Option<u32>,
    #[serde(default)]
    on_street_name: Option<String>,
    #[serde(default, alias = "contributing_factor")]
    contributing_factor_vehicle_1: Option<String>,
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

impl TripRow {
    fn into_record(self, line: u64) -> Result<TripRecord, String> {
        let pickup_at = parse_timestamp(&self.tpep_pickup_datetime)
            .ok_or_else(|| format!("bad pickup time '{}'", self.tpep_pickup_datetime))?;
        let dropoff_at = parse_timestamp(&self.tpep_dropoff_datetime)
            .ok_or_else(|| format!("bad dropoff time '{}'", self.tpep_dropoff_datetime))?;

        Ok(TripRecord {
            id: self.trip_id.unwrap_or(line),
            pickup_zone_id: self.pu_location_id,
            dropoff_zone_id: self.do_location_id,
            pickup_at,
            dropoff_at,
            fare_amount: self.fare_amount.unwrap_or(0.0),
            tip_amount: self.tip_amount.unwrap_or(0.0),
            trip_distance: self.trip_distance.unwrap_or(0.0),
        })
    }
}

impl CollisionRow {
    fn into_record(self) -> Result<CollisionEvent, String> {
        let crash_date = non_blank(self.crash_date)
            .map(|text| parse_date(&text).ok_or_else(|| format!("bad crash date '{text}'")))
            .transpose()?;
        let crash_time = non_blank(self.crash_time).and_then(|text| parse_time(&text));
        let location = parse_lat_lng(self.latitude, self.longitude);
        if location.is_some() && crash_date.is_none() {
            return Err("located collision has no crash date".to_string());
        }

        Ok(CollisionEvent {
            id: self.collision_id,
            zone_id: self.location_id,
            crash_date,
            crash_time,
            borough_id: self.borough_id,
            location,
            persons_injured: self.number_of_persons_injured.unwrap_or(0),
            persons_killed: self.number_of_persons_killed.unwrap_or(0),
            on_street_name: non_blank(self.on_street_name),
            contributing_factor: non_blank(self.contributing_factor_vehicle_1),
        })
    }
}

/// Reads the zone catalog.
///
/// # Errors
///
/// * [`StorageError::Backend`] if the CSV is malformed or a row does not fit
///   the zone layout.
/// * [`StorageError::InvalidRecord`] if a zone has no geometry.
pub fn read_zones(reader: impl Read, source_name: &str) -> Result<Vec<ZoneRecord>, StorageError> {
    let mut reader = csv_reader(reader);
    let headers = reader.headers().map_err(StorageError::backend)?.clone();

    let mut zones = Vec::new();
    let mut raw = csv::StringRecord::new();

    while reader.read_record(&mut raw).map_err(StorageError::backend)? {
        let row: ZoneRow = raw
            .deserialize(Some(&headers))
            .map_err(StorageError::backend)?;
        if row.geometry_shp.is_empty() {
            return Err(StorageError::InvalidRecord {
                source_name: source_name.to_string(),
                line: raw.position().map_or(0, csv::Position::line),
                message: format!("zone {} has no geometry", row.location_id),
            });
        }
        zones.push(ZoneRecord {
            id: row.location_id,
            name: row.zone,
            borough: row.borough,
            borough_id: row.borough_id,
            geometry: row.geometry_shp,
        });
    }

    log::info!("Read {} zones from {source_name}", zones.len());
    Ok(zones)
}

/// Reads the trips matching `filter`, skipping rows that cannot be
/// converted.
///
/// # Errors
///
/// Returns [`StorageError::Backend`] if the header cannot be read.
pub fn read_trips(
    reader: impl Read,
    source_name: &str,
    filter: &TripFilter,
) -> Result<Vec<TripRecord>, StorageError> {
    let mut reader = csv_reader(reader);
    let headers = reader.headers().map_err(StorageError::backend)?.clone();

    let mut trips = Vec::new();
    let mut skipped = 0_u64;
    let mut raw = csv::StringRecord::new();

    while reader.read_record(&mut raw).map_err(StorageError::backend)? {
        let line = raw.position().map_or(0, csv::Position::line);
        let converted = raw
            .deserialize::<TripRow>(Some(&headers))
            .map_err(|e| e.to_string())
            .and_then(|row| row.into_record(line));

        match converted {
            Ok(trip) if filter.matches(&trip) => trips.push(trip),
            Ok(_) => {}
            Err(message) => {
                log::warn!("Skipping trip row at {source_name}:{line}: {message}");
                skipped += 1;
            }
        }
    }

    log::debug!("Read {} trips from {source_name} ({skipped} skipped)", trips.len());
    Ok(trips)
}

/// Reads the collisions matching `filter`, skipping rows that cannot be
/// converted.
///
/// # Errors
///
/// Returns [`StorageError::Backend`] if the header cannot be read.
pub fn read_collisions(
    reader: impl Read,
    source_name: &str,
    filter: &CollisionFilter,
) -> Result<Vec<CollisionEvent>, StorageError> {
    let mut reader = csv_reader(reader);
    let headers = reader.headers().map_err(StorageError::backend)?.clone();

    let mut collisions = Vec::new();
    let mut skipped = 0_u64;
    let mut raw = csv::StringRecord::new();

    while reader.read_record(&mut raw).map_err(StorageError::backend)? {
        let line = raw.position().map_or(0, csv::Position::line);
        let converted = raw
            .deserialize::<CollisionRow>(Some(&headers))
            .map_err(|e| e.to_string())
            .and_then(CollisionRow::into_record);

        match converted {
            Ok(collision) if filter.matches(&collision) => collisions.push(collision),
            Ok(_) => {}
            Err(message) => {
                log::warn!("Skipping collision row at {source_name}:{line}: {message}");
                skipped += 1;
            }
        }
    }

    log::debug!(
        "Read {} collisions from {source_name} ({skipped} skipped)",
        collisions.len()
    );
    Ok(collisions)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use mobility_safety_analytics_models::DateRange;
    use mobility_safety_geography_models::GeoPoint;

    use super::*;

    const ZONES: &str = "\
location_id,zone,borough,borough_id,geometry_shp
1,Newark Airport,EWR,5,\"POLYGON ((0 0, 10 0, 10 10, 0 0))\"
4,Alphabet City,Manhattan,1,\"MULTIPOLYGON (((0 0, 1 0, 1 1, 0 0)))\"
";

    const TRIPS: &str = "\
trip_id,pu_location_id,do_location_id,tpep_pickup_datetime,tpep_dropoff_datetime,fare_amount,tip_amount,trip_distance
1,4,1,2024-06-01 08:15:00,2024-06-01 08:40:00,52.0,10.5,16.2
2,,4,2024-06-02 09:00:00,2024-06-02 09:10:00,8.5,0,1.1
3,4,4,not a time,2024-06-02 09:10:00,8.5,0,1.1
4,4,1,2024-06-03 10:00:00,2024-06-03 10:30:00,45.0,,15.0
";

    const COLLISIONS: &str = "\
collision_id,location_id,crash_date,crash_time,borough_id,latitude,longitude,number_of_persons_injured,number_of_persons_killed,on_street_name,contributing_factor_vehicle_1
100,4,2024-06-01,8:20,1,40.7260,-73.9800,2,0,AVENUE B  ,Unsafe Speed
101,,06/02/2024,13:05,1,0,0,0,0,,
102,4,someday,10:00,1,40.7,-73.9,0,0,,
103,1,,,5,,,1,1,,Unspecified
104,1,,,5,40.69,-74.17,0,0,,
";

    #[test]
    fn reads_zone_catalog() {
        let zones = read_zones(ZONES.as_bytes(), "zones.csv").unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones[1].id, 4);
        assert_eq!(zones[1].name, "Alphabet City");
        assert_eq!(zones[1].borough_id, Some(1));
        assert!(zones[1].geometry.starts_with("MULTIPOLYGON"));
    }

    #[test]
    fn zone_without_geometry_is_an_error() {
        let text = "location_id,zone,borough,borough_id,geometry_shp\n7,Astoria,Queens,4,\n";
        let err = read_zones(text.as_bytes(), "zones.csv").unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord { line: 2, .. }));
    }

    #[test]
    fn malformed_zone_row_is_a_backend_error() {
        let text = "location_id,zone,borough,borough_id,geometry_shp\nseven,Astoria,Queens,4,POLYGON ((0 0, 1 0, 1 1, 0 0))\n";
        let err = read_zones(text.as_bytes(), "zones.csv").unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
    }

    #[test]
    fn reads_trips_and_skips_bad_rows() {
        let trips = read_trips(TRIPS.as_bytes(), "trips.csv", &TripFilter::default()).unwrap();
        let ids: Vec<u64> = trips.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
        assert_eq!(trips[1].pickup_zone_id, None);
        assert!((trips[0].tip_amount - 10.5).abs() < f64::EPSILON);
        assert!(trips[2].tip_amount.abs() < f64::EPSILON);
    }

    #[test]
    fn trip_filter_is_applied_while_reading() {
        let filter = TripFilter {
            dates: Some(DateRange::single(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())),
            zone_id: None,
        };
        let trips = read_trips(TRIPS.as_bytes(), "trips.csv", &filter).unwrap();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].id, 1);
    }

    #[test]
    fn reads_collisions() {
        let collisions =
            read_collisions(COLLISIONS.as_bytes(), "collisions.csv", &CollisionFilter::default())
                .unwrap();
        let ids: Vec<u64> = collisions.iter().map(|c| c.id).collect();
        // 102 has an unreadable date, 104 a point without a date
        assert_eq!(ids, vec![100, 101, 103]);

        let first = &collisions[0];
        assert_eq!(first.zone_id, Some(4));
        assert_eq!(first.location, Some(GeoPoint::new(-73.98, 40.726)));
        assert_eq!(first.persons_injured, 2);
        assert_eq!(first.on_street_name.as_deref(), Some("AVENUE B"));
        assert_eq!(first.contributing_factor.as_deref(), Some("Unsafe Speed"));

        let second = &collisions[1];
        assert_eq!(second.zone_id, None);
        assert_eq!(second.location, None);
        assert_eq!(second.crash_date, NaiveDate::from_ymd_opt(2024, 6, 2));
        assert_eq!(second.on_street_name, None);

        let undated = &collisions[2];
        assert_eq!(undated.crash_date, None);
        assert_eq!(undated.crash_time, None);
        assert_eq!(undated.location, None);
    }

    #[test]
    fn collision_filter_is_applied_while_reading() {
        let filter = CollisionFilter {
            zone_id: Some(4),
            ..CollisionFilter::default()
        };
        let collisions = read_collisions(COLLISIONS.as_bytes(), "collisions.csv", &filter).unwrap();
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].id, 100);
    }
}

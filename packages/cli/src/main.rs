#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the mobility-safety analytics engine.
//!
//! Every report prints pretty JSON on stdout; logs go to stderr and are
//! controlled with `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use mobility_safety_analytics::reports::{SAFETY_CRITERIA, blend_safety_availability};
use mobility_safety_analytics::{AnalyticsEngine, EngineConfig};
use mobility_safety_analytics_models::{
    ChoroplethParams, DateRange, HotspotParams, OutlierMethod, ProximityParams,
    SafetyRankingParams, TipOutlierParams, ZoneMetric,
};
use mobility_safety_database::{CsvSnapshotStore, paths};
use mobility_safety_geography_models::{GeoPoint, ZoneId};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "mobility_safety",
    about = "Taxi trip and traffic collision analytics over NYC taxi zones"
)]
struct Cli {
    /// Directory holding zones.csv, trips.csv and collisions.csv
    /// (defaults to `MOBILITY_SAFETY_DATA_DIR`, then `data/`)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// TOML file merged over the built-in engine configuration
    /// (defaults to `MOBILITY_SAFETY_CONFIG`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

/// Optional inclusive date range. A single bound selects one day.
#[derive(Args, Clone, Copy)]
struct DateArgs {
    /// First day (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last day (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl DateArgs {
    fn range(self) -> Option<DateRange> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Some(DateRange::new(from, to)),
            (Some(day), None) | (None, Some(day)) => Some(DateRange::single(day)),
            (None, None) => None,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    /// Tukey fences around the interquartile range
    Iqr,
    /// Values above a percentile
    Percentile,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode stored zone polygon text and print it as `GeoJSON`
    Decode {
        /// Polygon text, e.g. "POLYGON ((0 0, 10 0, 10 10, 0 0))"
        geometry: String,
    },
    /// List zones within a radius of a point
    ZonesNear {
        /// Longitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Latitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// Radius in metres (defaults to the configured proximity radius)
        #[arg(long)]
        radius: Option<f64>,
    },
    /// Find the zone containing a point
    ZoneAt {
        /// Longitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Latitude in degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
    },
    /// Pickup and drop-off totals for a zone
    PickupsDropoffs {
        /// Zone id
        zone: ZoneId,
    },
    /// Collisions, injuries and deaths in a zone and its borough
    CollisionsInjuries {
        /// Zone id
        zone: ZoneId,
        #[command(flatten)]
        dates: DateArgs,
    },
    /// Average fare and trip distance for pickups in a zone
    FareTripDistance {
        /// Zone id
        zone: ZoneId,
    },
    /// Rank zones by safety (fewest collisions) and taxi availability
    SafetyRanking {
        /// Only show this zone
        #[arg(long)]
        zone: Option<ZoneId>,
        #[command(flatten)]
        dates: DateArgs,
        /// Maximum number of rows
        #[arg(long)]
        limit: Option<usize>,
        /// Add a blended rank (sum of both ranks, lower is better)
        #[arg(long)]
        blend: bool,
    },
    /// Zones with both taxi trips and collisions
    ActiveZones {
        #[command(flatten)]
        dates: DateArgs,
    },
    /// Collision counts per season
    SafetyBySeason {
        #[command(flatten)]
        dates: DateArgs,
    },
    /// Collisions per 1000 trips in a zone
    CollisionRate {
        /// Zone id
        #[arg(long)]
        zone: Option<ZoneId>,
        #[command(flatten)]
        dates: DateArgs,
    },
    /// Hours of a day that saw more than one collision
    RepeatedCollisionHours {
        #[command(flatten)]
        dates: DateArgs,
    },
    /// Busiest pickup hours and zones
    PeakHours {
        #[command(flatten)]
        dates: DateArgs,
        /// Number of hours and zones to show
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Trips with anomalous tips
    TipOutliers {
        /// Detection method (defaults to the configured tip percentile)
        #[arg(long, value_enum)]
        method: Option<MethodArg>,
        /// IQR fence multiplier
        #[arg(long)]
        k: Option<f64>,
        /// Percentile as a fraction in [0, 1]
        #[arg(long)]
        p: Option<f64>,
        #[command(flatten)]
        dates: DateArgs,
        /// Maximum number of trips
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Zones with many collisions and few pickups
    Hotspots {
        /// Collisions must exceed this
        #[arg(long)]
        min_collisions: Option<u64>,
        /// Pickups must be below this
        #[arg(long)]
        max_pickups: Option<u64>,
        #[command(flatten)]
        dates: DateArgs,
    },
    /// Collisions with the most same-day pickups nearby
    Proximity {
        #[command(flatten)]
        dates: DateArgs,
        /// Search radius in metres
        #[arg(long)]
        radius: Option<f64>,
        /// Maximum number of collisions
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Collisions on a street (case-insensitive substring match)
    CollisionsOnStreet {
        /// Street name
        name: String,
        #[command(flatten)]
        dates: DateArgs,
    },
    /// Distinct contributing factors
    ContributingFactors,
    /// Zones with a collision caused by a factor on a date
    ZonesWithFactor {
        /// Crash date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Contributing factor
        #[arg(long)]
        factor: Option<String>,
    },
    /// Collisions per zone in a borough
    BoroughCollisions {
        /// Borough name
        #[arg(long)]
        borough: Option<String>,
        #[command(flatten)]
        dates: DateArgs,
    },
    /// Collisions in a date range, oldest first
    CollisionsInRange {
        #[command(flatten)]
        dates: DateArgs,
        /// Page size
        #[arg(long)]
        limit: Option<usize>,
        /// Rows to skip
        #[arg(long)]
        offset: Option<usize>,
    },
    /// Zones as a `GeoJSON` choropleth of a metric
    Choropleth {
        /// Metric (e.g. `collision_count`, `pickup_count`, `average_tip`)
        #[arg(long, default_value = "collision_count", value_parser = parse_metric)]
        metric: ZoneMetric,
        #[command(flatten)]
        dates: DateArgs,
    },
}

fn parse_metric(s: &str) -> Result<ZoneMetric, String> {
    s.parse().map_err(|_| {
        let names: Vec<&str> = ZoneMetric::all().iter().map(AsRef::as_ref).collect();
        format!("unknown metric '{s}', expected one of: {}", names.join(", "))
    })
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn outlier_method(
    method: Option<MethodArg>,
    k: Option<f64>,
    p: Option<f64>,
    config: &EngineConfig,
) -> Option<OutlierMethod> {
    match method {
        Some(MethodArg::Iqr) => Some(OutlierMethod::Iqr {
            k: k.unwrap_or(config.outliers.iqr_k),
        }),
        Some(MethodArg::Percentile) => Some(OutlierMethod::Percentile {
            p: p.unwrap_or(config.outliers.tip_percentile),
        }),
        None => p.map(|p| OutlierMethod::Percentile { p }),
    }
}

#[allow(clippy::too_many_lines)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref())?;

    if let Commands::Decode { geometry } = &cli.command {
        let decoded = mobility_safety_geography::decode(geometry, &config.transform)?;
        return print_json(&decoded.to_geojson());
    }

    let dir = cli.data_dir.unwrap_or_else(paths::data_dir);
    log::debug!("Reading snapshots from {}", dir.display());
    let store = Arc::new(CsvSnapshotStore::open(dir)?);
    let engine = AnalyticsEngine::from_store(config, store)?;

    match cli.command {
        Commands::Decode { .. } => {}
        Commands::ZonesNear { lon, lat, radius } => {
            let radius = radius.unwrap_or(config.proximity.radius_meters);
            print_json(&engine.zones_near(GeoPoint::new(lon, lat), radius)?)?;
        }
        Commands::ZoneAt { lon, lat } => {
            print_json(&engine.zone_at(GeoPoint::new(lon, lat))?)?;
        }
        Commands::PickupsDropoffs { zone } => {
            print_json(&engine.pickups_dropoffs(zone)?)?;
        }
        Commands::CollisionsInjuries { zone, dates } => {
            print_json(&engine.collisions_injuries(zone, dates.range())?)?;
        }
        Commands::FareTripDistance { zone } => {
            print_json(&engine.fare_trip_distance(zone)?)?;
        }
        Commands::SafetyRanking {
            zone,
            dates,
            limit,
            blend,
        } => {
            if blend {
                let mut ranked = engine.rank_zones(&SAFETY_CRITERIA, dates.range())?;
                blend_safety_availability(&mut ranked);
                ranked.retain(|z| zone.is_none_or(|id| id == z.zone_id));
                ranked.truncate(limit.unwrap_or(usize::MAX));
                print_json(&ranked)?;
            } else {
                print_json(&engine.safety_ranking(&SafetyRankingParams {
                    zone_id: zone,
                    dates: dates.range(),
                    limit,
                })?)?;
            }
        }
        Commands::ActiveZones { dates } => {
            print_json(&engine.active_zones(dates.range())?)?;
        }
        Commands::SafetyBySeason { dates } => {
            print_json(&engine.safety_by_season(dates.range())?)?;
        }
        Commands::CollisionRate { zone, dates } => {
            print_json(&engine.collision_rate(zone, dates.range())?)?;
        }
        Commands::RepeatedCollisionHours { dates } => {
            print_json(&engine.repeated_collision_hours(dates.range())?)?;
        }
        Commands::PeakHours { dates, limit } => {
            print_json(&engine.peak_hours(dates.range(), limit)?)?;
        }
        Commands::TipOutliers {
            method,
            k,
            p,
            dates,
            limit,
        } => {
            print_json(&engine.tip_outliers(&TipOutlierParams {
                method: outlier_method(method, k, p, engine.config()),
                dates: dates.range(),
                limit,
            })?)?;
        }
        Commands::Hotspots {
            min_collisions,
            max_pickups,
            dates,
        } => {
            print_json(&engine.collision_hotspots(&HotspotParams {
                min_collisions,
                max_pickups,
                dates: dates.range(),
            })?)?;
        }
        Commands::Proximity {
            dates,
            radius,
            limit,
        } => {
            print_json(&engine.proximity_analysis(&ProximityParams {
                dates: dates.range(),
                radius_meters: radius,
                limit,
            })?)?;
        }
        Commands::CollisionsOnStreet { name, dates } => {
            print_json(&engine.collisions_on_street(&name, dates.range())?)?;
        }
        Commands::ContributingFactors => {
            print_json(&engine.contributing_factors()?)?;
        }
        Commands::ZonesWithFactor { date, factor } => {
            print_json(&engine.zones_with_factor(date, factor.as_deref())?)?;
        }
        Commands::BoroughCollisions { borough, dates } => {
            print_json(&engine.borough_collisions(borough.as_deref(), dates.range())?)?;
        }
        Commands::CollisionsInRange {
            dates,
            limit,
            offset,
        } => {
            print_json(&engine.collisions_in_range(dates.range(), limit, offset)?)?;
        }
        Commands::Choropleth { metric, dates } => {
            print_json(&engine.zone_choropleth(&ChoroplethParams {
                metric,
                dates: dates.range(),
            })?)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn single_bound_selects_one_day() {
        let only_from = DateArgs {
            from: Some(day(3)),
            to: None,
        };
        assert_eq!(only_from.range(), Some(DateRange::single(day(3))));

        let both = DateArgs {
            from: Some(day(9)),
            to: Some(day(1)),
        };
        assert_eq!(both.range(), Some(DateRange::new(day(1), day(9))));

        let none = DateArgs {
            from: None,
            to: None,
        };
        assert_eq!(none.range(), None);
    }

    #[test]
    fn parses_report_arguments() {
        let cli = Cli::parse_from([
            "mobility_safety",
            "--data-dir",
            "/tmp/data",
            "proximity",
            "--from",
            "2024-06-01",
            "--radius",
            "800",
        ]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/data")));
        match cli.command {
            Commands::Proximity { dates, radius, .. } => {
                assert_eq!(dates.range(), Some(DateRange::single(day(1))));
                assert_eq!(radius, Some(800.0));
            }
            _ => panic!("expected proximity"),
        }
    }

    #[test]
    fn parses_negative_coordinates_and_metrics() {
        let cli = Cli::parse_from([
            "mobility_safety",
            "zones-near",
            "--lon",
            "-73.99",
            "--lat",
            "40.7",
        ]);
        assert!(
            matches!(cli.command, Commands::ZonesNear { lon, .. } if (lon + 73.99).abs() < 1e-9)
        );

        let cli = Cli::parse_from(["mobility_safety", "choropleth", "--metric", "average_tip"]);
        assert!(matches!(
            cli.command,
            Commands::Choropleth {
                metric: ZoneMetric::AverageTip,
                ..
            }
        ));
    }

    #[test]
    fn outlier_method_falls_back_to_config() {
        let config = EngineConfig::embedded().unwrap();
        assert_eq!(
            outlier_method(Some(MethodArg::Iqr), None, None, &config),
            Some(OutlierMethod::Iqr { k: 1.5 })
        );
        assert_eq!(
            outlier_method(None, None, Some(0.5), &config),
            Some(OutlierMethod::Percentile { p: 0.5 })
        );
        assert_eq!(outlier_method(None, None, None, &config), None);
    }
}

//! Distribution-based outlier detection.
//!
//! Works on any `(id, value)` list, so the same detector serves tips,
//! fares or per-zone counts.

use mobility_safety_analytics_models::{Outlier, OutlierMethod, OutlierSet, ThresholdBand};

use crate::AnalyticsError;

/// Returns the `p`-th percentile of ascending `sorted` values using linear
/// interpolation between closest ranks (`r = p * (n - 1)`).
///
/// Returns `None` for empty input. `p` is expected in `[0, 1]`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (p.clamp(0.0, 1.0) * last as f64).clamp(0.0, last as f64);
    let lower = rank.floor();
    let lo = lower as usize;
    let hi = (rank.ceil() as usize).min(last);

    Some((rank - lower).mul_add(sorted[hi] - sorted[lo], sorted[lo]))
}

/// Returns the first and third quartiles of ascending `sorted` values.
#[must_use]
pub fn quartiles(sorted: &[f64]) -> Option<(f64, f64)> {
    Some((percentile(sorted, 0.25)?, percentile(sorted, 0.75)?))
}

/// Computes the band for `method` over ascending `sorted` values.
fn band_for(sorted: &[f64], method: OutlierMethod) -> Option<ThresholdBand> {
    match method {
        OutlierMethod::Iqr { k } => {
            let (q1, q3) = quartiles(sorted)?;
            let iqr = q3 - q1;
            Some(ThresholdBand {
                lower: Some(k.mul_add(-iqr, q1)),
                upper: k.mul_add(iqr, q3),
            })
        }
        OutlierMethod::Percentile { p } => Some(ThresholdBand {
            lower: None,
            upper: percentile(sorted, p)?,
        }),
    }
}

fn validate(method: OutlierMethod) -> Result<(), AnalyticsError> {
    match method {
        OutlierMethod::Iqr { k } if !k.is_finite() || k < 0.0 => Err(AnalyticsError::invalid(
            "k",
            format!("IQR multiplier must be a non-negative number, got {k}"),
        )),
        OutlierMethod::Percentile { p } if !(0.0..=1.0).contains(&p) => Err(
            AnalyticsError::invalid("p", format!("percentile must be within [0, 1], got {p}")),
        ),
        _ => Ok(()),
    }
}

/// Flags the records whose value falls strictly outside the band computed
/// by `method`.
///
/// Non-finite values are dropped before the band is computed. Outliers are
/// returned in input order; use [`OutlierSet::sorted`] to order them.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidParameter`] if the IQR multiplier is
/// negative or not finite, or the percentile is outside `[0, 1]`.
pub fn detect_outliers<K: Copy + Ord>(
    values: &[(K, f64)],
    method: OutlierMethod,
) -> Result<OutlierSet<K>, AnalyticsError> {
    validate(method)?;

    let finite: Vec<(K, f64)> = values
        .iter()
        .copied()
        .filter(|(_, value)| value.is_finite())
        .collect();
    if finite.len() < values.len() {
        log::debug!(
            "Dropped {} non-finite values before outlier detection",
            values.len() - finite.len()
        );
    }

    let mut sorted: Vec<f64> = finite.iter().map(|(_, value)| *value).collect();
    sorted.sort_by(f64::total_cmp);

    let Some(band) = band_for(&sorted, method) else {
        return Ok(OutlierSet::empty());
    };
    log::debug!(
        "Outlier band over {} values: lower={:?} upper={}",
        sorted.len(),
        band.lower,
        band.upper
    );

    let outliers = finite
        .into_iter()
        .filter(|(_, value)| band.is_outside(*value))
        .map(|(id, value)| Outlier { id, value })
        .collect();

    Ok(OutlierSet {
        band: Some(band),
        sample_size: sorted.len(),
        outliers,
    })
}

#[cfg(test)]
mod tests {
    use mobility_safety_analytics_models::OutlierOrder;

    use super::*;

    fn ids(set: &OutlierSet<u32>) -> Vec<u32> {
        set.outliers.iter().map(|o| o.id).collect()
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let sorted = [1.0, 2.0, 4.0, 8.0];
        assert_eq!(percentile(&sorted, 0.0), Some(1.0));
        assert_eq!(percentile(&sorted, 1.0), Some(8.0));
        // r = 1.5, halfway between 2 and 4
        assert_eq!(percentile(&sorted, 0.5), Some(3.0));
        assert_eq!(percentile(&[], 0.5), None);
        assert_eq!(percentile(&[7.0], 0.9), Some(7.0));
    }

    #[test]
    fn single_value_has_no_iqr_outliers() {
        let set = detect_outliers(&[(1_u32, 42.0)], OutlierMethod::default()).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.sample_size, 1);
        let band = set.band.unwrap();
        assert_eq!(band.lower, Some(42.0));
        assert!((band.upper - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_input_gives_empty_set() {
        let set = detect_outliers::<u32>(&[], OutlierMethod::Percentile { p: 0.9 }).unwrap();
        assert_eq!(set, OutlierSet::empty());
    }

    #[test]
    fn iqr_flags_both_tails() {
        let values: Vec<(u32, f64)> = vec![
            (1, 10.0),
            (2, 11.0),
            (3, 12.0),
            (4, 13.0),
            (5, 14.0),
            (6, 100.0),
            (7, -50.0),
        ];
        let set = detect_outliers(&values, OutlierMethod::Iqr { k: 1.5 })
            .unwrap()
            .sorted(OutlierOrder::ValueDescending);
        assert_eq!(ids(&set), vec![6, 7]);
    }

    #[test]
    fn percentile_threshold_shifts_with_data() {
        let base: Vec<(u32, f64)> = vec![(1, 1.0), (2, 2.0), (3, 4.0), (4, 8.0)];
        let shifted: Vec<(u32, f64)> = base.iter().map(|(id, v)| (*id, v + 10.0)).collect();
        let method = OutlierMethod::Percentile { p: 0.5 };

        let a = detect_outliers(&base, method).unwrap();
        let b = detect_outliers(&shifted, method).unwrap();

        let (ta, tb) = (a.band.unwrap().upper, b.band.unwrap().upper);
        assert!((tb - (ta + 10.0)).abs() < 1e-9);
        assert_eq!(ids(&a), ids(&b));
        assert_eq!(ids(&a), vec![3, 4]);
    }

    #[test]
    fn non_finite_values_are_ignored() {
        let values = vec![(1_u32, 1.0), (2, f64::NAN), (3, f64::INFINITY), (4, 2.0)];
        let set = detect_outliers(&values, OutlierMethod::Percentile { p: 0.5 }).unwrap();
        assert_eq!(set.sample_size, 2);
        assert_eq!(ids(&set), vec![4]);
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        let values = [(1_u32, 1.0)];
        assert!(matches!(
            detect_outliers(&values, OutlierMethod::Percentile { p: 1.5 }),
            Err(AnalyticsError::InvalidParameter { name: "p", .. })
        ));
        assert!(matches!(
            detect_outliers(&values, OutlierMethod::Iqr { k: -1.0 }),
            Err(AnalyticsError::InvalidParameter { name: "k", .. })
        ));
        assert!(matches!(
            detect_outliers(&values, OutlierMethod::Iqr { k: f64::NAN }),
            Err(AnalyticsError::InvalidParameter { name: "k", .. })
        ));
    }
}

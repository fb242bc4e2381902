//! Multi-criteria zone ranking.
//!
//! Every criterion is ranked on its own with standard competition ranking
//! (`1, 1, 3`) and the results are joined by zone id. Blending criteria into
//! one score only happens through [`apply_composite`], with a combination
//! function supplied by the caller.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use mobility_safety_analytics_models::{
    CriterionRank, RankCriterion, RankedZone, SortDirection, ZoneMetrics,
};

fn compare(direction: SortDirection, a: f64, b: f64) -> Ordering {
    match direction {
        SortDirection::Ascending => a.total_cmp(&b),
        SortDirection::Descending => b.total_cmp(&a),
    }
}

/// Assigns competition ranks to `values` in `direction`.
///
/// Equal values share a rank and the next distinct value skips ahead by
/// the size of the tie. Non-finite values are not ranked.
#[must_use]
pub fn competition_ranks<K: Copy + Ord>(
    values: impl IntoIterator<Item = (K, f64)>,
    direction: SortDirection,
) -> BTreeMap<K, u32> {
    let mut values: Vec<(K, f64)> = values
        .into_iter()
        .filter(|(_, value)| value.is_finite())
        .collect();
    values.sort_by(|a, b| compare(direction, a.1, b.1).then_with(|| a.0.cmp(&b.0)));

    let mut ranks = BTreeMap::new();
    let mut current = 0_u32;
    let mut previous: Option<f64> = None;

    for (position, (key, value)) in values.into_iter().enumerate() {
        if previous.is_none_or(|p| p.total_cmp(&value) != Ordering::Equal) {
            current = u32::try_from(position + 1).unwrap_or(u32::MAX);
            previous = Some(value);
        }
        ranks.insert(key, current);
    }

    ranks
}

/// Orders missing ranks after every present one.
fn by_rank(a: Option<u32>, b: Option<u32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Ranks `zones` independently under each of `criteria`.
///
/// Every input zone appears in the output. A zone without a value for a
/// criterion gets `None` for that criterion's value and rank. The output is
/// ordered by the first criterion's rank (missing last), then zone id.
#[must_use]
pub fn rank(zones: &[ZoneMetrics], criteria: &[RankCriterion]) -> Vec<RankedZone> {
    let per_criterion: Vec<BTreeMap<_, u32>> = criteria
        .iter()
        .map(|criterion| {
            competition_ranks(
                zones
                    .iter()
                    .filter_map(|z| z.get(criterion.metric).map(|v| (z.zone_id, v))),
                criterion.direction,
            )
        })
        .collect();

    let mut ranked: Vec<RankedZone> = zones
        .iter()
        .map(|zone| RankedZone {
            zone_id: zone.zone_id,
            ranks: criteria
                .iter()
                .zip(&per_criterion)
                .map(|(criterion, ranks)| CriterionRank {
                    metric: criterion.metric,
                    direction: criterion.direction,
                    value: zone.get(criterion.metric).filter(|v| v.is_finite()),
                    rank: ranks.get(&zone.zone_id).copied(),
                })
                .collect(),
            composite_score: None,
            composite_rank: None,
        })
        .collect();

    ranked.sort_by(|a, b| {
        let first = |z: &RankedZone| z.ranks.first().and_then(|r| r.rank);
        by_rank(first(a), first(b)).then_with(|| a.zone_id.cmp(&b.zone_id))
    });

    ranked
}

/// Computes a caller-defined blended score for each zone and ranks it.
///
/// `combine` sees the per-criterion ranks and values and returns the
/// score, or `None` if the zone cannot be scored. The slice is reordered by
/// composite rank (missing last), then zone id.
pub fn apply_composite<F>(zones: &mut [RankedZone], combine: F, direction: SortDirection)
where
    F: Fn(&RankedZone) -> Option<f64>,
{
    for zone in zones.iter_mut() {
        zone.composite_score = combine(zone).filter(|score| score.is_finite());
    }

    let ranks = competition_ranks(
        zones
            .iter()
            .filter_map(|z| z.composite_score.map(|score| (z.zone_id, score))),
        direction,
    );
    for zone in zones.iter_mut() {
        zone.composite_rank = ranks.get(&zone.zone_id).copied();
    }

    zones.sort_by(|a, b| {
        by_rank(a.composite_rank, b.composite_rank).then_with(|| a.zone_id.cmp(&b.zone_id))
    });
}

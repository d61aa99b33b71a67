//! Shared vertical scale for an old/new chart pair.

use serde::Serialize;

use crate::types::ChartSeries;

/// Fraction of the combined span added above and below.
const PADDING_RATIO: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisBounds {
    pub min: f64,
    pub max: f64,
}

/// Bounds covering every bar (prices and forecasts) of both charts, padded
/// by 10% of the span and rounded outward to integers.
///
/// `None` when neither chart contributes a range; callers then autoscale
/// each chart on its own.
pub fn synchronized_bounds(
    old: Option<&ChartSeries>,
    new: Option<&ChartSeries>,
) -> Option<AxisBounds> {
    let ranges = [old, new]
        .into_iter()
        .flatten()
        .filter_map(ChartSeries::price_range);

    let (lo, hi) = ranges.fold(None, |acc: Option<(f64, f64)>, (lo, hi)| match acc {
        Some((a, b)) => Some((a.min(lo), b.max(hi))),
        None => Some((lo, hi)),
    })?;

    let padding = (hi - lo) * PADDING_RATIO;
    Some(AxisBounds {
        min: (lo - padding).floor(),
        max: (hi + padding).ceil(),
    })
}

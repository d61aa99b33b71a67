//! Run comparison.
//!
//! A pure function over two completed runs: signal deltas, a summary that
//! partitions every signal of both runs, a merged graph with node
//! provenance, and one shared axis scale per charted ticker. Nothing here
//! touches the live run state.

pub mod axis;
pub mod graph;
pub mod signals;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

pub use axis::{synchronized_bounds, AxisBounds};
pub use graph::{merge_graphs, MergedGraph, MergedNode, NodeProvenance};
pub use signals::{ChangeThresholds, DeltaStatus, SignalDelta};

use crate::types::RunData;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Per-status counts. `total` equals the number of deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonSummary {
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub total: usize,
}

impl ComparisonSummary {
    fn tally(deltas: &[SignalDelta]) -> Self {
        let mut summary = Self { total: deltas.len(), ..Self::default() };
        for delta in deltas {
            match delta.status {
                DeltaStatus::New => summary.new += 1,
                DeltaStatus::Changed => summary.changed += 1,
                DeltaStatus::Unchanged => summary.unchanged += 1,
                DeltaStatus::Removed => summary.removed += 1,
            }
        }
        summary
    }
}

impl fmt::Display for ComparisonSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} new, {} changed, {} unchanged, {} removed ({} total)",
            self.new, self.changed, self.unchanged, self.removed, self.total
        )
    }
}

/// View filter over the delta list. `Unchanged` deltas show only under `All`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeltaFilter {
    #[default]
    All,
    New,
    Changed,
    Removed,
}

impl DeltaFilter {
    pub fn admits(&self, status: DeltaStatus) -> bool {
        match self {
            DeltaFilter::All => true,
            DeltaFilter::New => status == DeltaStatus::New,
            DeltaFilter::Changed => status == DeltaStatus::Changed,
            DeltaFilter::Removed => status == DeltaStatus::Removed,
        }
    }
}

impl std::str::FromStr for DeltaFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(DeltaFilter::All),
            "new" => Ok(DeltaFilter::New),
            "changed" => Ok(DeltaFilter::Changed),
            "removed" => Ok(DeltaFilter::Removed),
            other => Err(format!("unknown delta filter: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub old_run_id: String,
    pub new_run_id: String,
    pub deltas: Vec<SignalDelta>,
    pub summary: ComparisonSummary,
    pub graph: MergedGraph,
    /// Shared scale per ticker listed on any delta. Tickers whose charts
    /// carry no usable range are absent.
    pub axis_bounds: BTreeMap<String, AxisBounds>,
}

impl ComparisonResult {
    pub fn filtered(&self, filter: DeltaFilter) -> impl Iterator<Item = &SignalDelta> {
        self.deltas.iter().filter(move |d| filter.admits(d.status))
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Compare two runs with the default change thresholds.
pub fn compare(old: &RunData, new: &RunData) -> ComparisonResult {
    compare_with(old, new, &ChangeThresholds::default())
}

pub fn compare_with(old: &RunData, new: &RunData, thresholds: &ChangeThresholds) -> ComparisonResult {
    let mut deltas = signals::diff_signals(&old.signals, &new.signals, thresholds);
    signals::attach_tickers(&mut deltas, &old.charts, &new.charts);

    let mut axis_bounds = BTreeMap::new();
    for ticker in deltas.iter().flat_map(|d| d.tickers.iter()) {
        if axis_bounds.contains_key(ticker) {
            continue;
        }
        if let Some(bounds) = synchronized_bounds(old.charts.get(ticker), new.charts.get(ticker)) {
            axis_bounds.insert(ticker.clone(), bounds);
        }
    }

    let summary = ComparisonSummary::tally(&deltas);
    debug!(
        old_run = %old.run_id,
        new_run = %new.run_id,
        summary = %summary,
        "Runs compared"
    );

    ComparisonResult {
        old_run_id: old.run_id.clone(),
        new_run_id: new.run_id.clone(),
        deltas,
        summary,
        graph: merge_graphs(&old.graph, &new.graph),
        axis_bounds,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

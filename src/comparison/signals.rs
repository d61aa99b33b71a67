//! Signal deltas between two runs.
//!
//! Signals are matched by exact title. A signal found only in the newer run
//! is `New`, only in the older run `Removed`; otherwise its score deltas
//! decide between `Changed` and `Unchanged`.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::types::{ChartSeries, Signal};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Minimum score movement (exclusive) that counts as a change.
#[derive(Debug, Clone, Copy)]
pub struct ChangeThresholds {
    pub sentiment: f64,
    pub confidence: f64,
    /// Intensity is compared exactly: any non-zero delta is a change, and a
    /// NaN delta always is.
    pub intensity: f64,
}

impl Default for ChangeThresholds {
    fn default() -> Self {
        Self {
            sentiment: 0.01,
            confidence: 0.01,
            intensity: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Delta types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaStatus {
    New,
    Changed,
    Unchanged,
    Removed,
}

impl fmt::Display for DeltaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaStatus::New => write!(f, "new"),
            DeltaStatus::Changed => write!(f, "changed"),
            DeltaStatus::Unchanged => write!(f, "unchanged"),
            DeltaStatus::Removed => write!(f, "removed"),
        }
    }
}

/// The classified difference of one signal between two runs.
///
/// `signal` is the newer version, or the old one for `Removed`. The score
/// deltas are present only when the title exists in both runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalDelta {
    pub signal: Signal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_signal: Option<Signal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity_delta: Option<f64>,
    pub status: DeltaStatus,
    /// Tickers of `signal` that have a chart in either run, sorted.
    pub tickers: Vec<String>,
}

impl SignalDelta {
    pub fn title(&self) -> &str {
        &self.signal.title
    }

    fn appeared(signal: Signal) -> Self {
        Self::bare(signal, DeltaStatus::New)
    }

    fn vanished(signal: Signal) -> Self {
        Self::bare(signal, DeltaStatus::Removed)
    }

    fn bare(signal: Signal, status: DeltaStatus) -> Self {
        Self {
            signal,
            old_signal: None,
            sentiment_delta: None,
            confidence_delta: None,
            intensity_delta: None,
            status,
            tickers: Vec::new(),
        }
    }

    fn matched(old: Signal, new: Signal, thresholds: &ChangeThresholds) -> Self {
        let sentiment = new.sentiment_score - old.sentiment_score;
        let confidence = new.confidence - old.confidence;
        let intensity = new.intensity - old.intensity;
        let changed = sentiment.abs() > thresholds.sentiment
            || confidence.abs() > thresholds.confidence
            || intensity.is_nan()
            || intensity.abs() > thresholds.intensity;
        Self {
            signal: new,
            old_signal: Some(old),
            sentiment_delta: Some(sentiment),
            confidence_delta: Some(confidence),
            intensity_delta: Some(intensity),
            status: if changed { DeltaStatus::Changed } else { DeltaStatus::Unchanged },
            tickers: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Collapse duplicate titles to their last occurrence, keeping first-seen order.
fn by_title(signals: &[Signal]) -> Vec<Signal> {
    let mut slot: BTreeMap<&str, usize> = BTreeMap::new();
    let mut out: Vec<Signal> = Vec::with_capacity(signals.len());
    for signal in signals {
        match slot.get(signal.title.as_str()) {
            Some(&i) => out[i] = signal.clone(),
            None => {
                slot.insert(signal.title.as_str(), out.len());
                out.push(signal.clone());
            }
        }
    }
    out
}

/// Classify every signal of both runs: newer-run signals first (in their
/// order), then removed signals in older-run order.
pub fn diff_signals(
    old: &[Signal],
    new: &[Signal],
    thresholds: &ChangeThresholds,
) -> Vec<SignalDelta> {
    let old = by_title(old);
    let new = by_title(new);

    let mut old_by_title: BTreeMap<&str, &Signal> =
        old.iter().map(|s| (s.title.as_str(), s)).collect();
    let new_titles: BTreeSet<&str> = new.iter().map(|s| s.title.as_str()).collect();

    let mut deltas = Vec::with_capacity(old.len() + new.len());
    for signal in &new {
        let delta = match old_by_title.remove(signal.title.as_str()) {
            Some(previous) => SignalDelta::matched(previous.clone(), signal.clone(), thresholds),
            None => SignalDelta::appeared(signal.clone()),
        };
        deltas.push(delta);
    }
    for signal in &old {
        if !new_titles.contains(signal.title.as_str()) {
            deltas.push(SignalDelta::vanished(signal.clone()));
        }
    }
    deltas
}

/// Attach to each delta the tickers that have a chart in either run.
pub fn attach_tickers(
    deltas: &mut [SignalDelta],
    old_charts: &BTreeMap<String, ChartSeries>,
    new_charts: &BTreeMap<String, ChartSeries>,
) {
    for delta in deltas {
        delta.tickers = delta
            .signal
            .tickers()
            .into_iter()
            .filter(|t| old_charts.contains_key(*t) || new_charts.contains_key(*t))
            .map(str::to_string)
            .collect();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

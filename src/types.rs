//! Shared types for the SIGNAL FLUX client.
//!
//! These types form the data model used across all modules: the live run
//! view maintained by the reconciler, the payloads carried on the wire, and
//! the completed-run records consumed by the comparison engine.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ---------------------------------------------------------------------------
// Run status
// ---------------------------------------------------------------------------

/// Lifecycle status of a run as reported by the job server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Cancelling,
    Cancelled,
}

impl RunStatus {
    /// Whether the run has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "idle"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelling => write!(f, "cancelling"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Scalar view of the current run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RunSnapshot {
    pub run_id: Option<String>,
    pub status: RunStatus,
    pub phase: String,
    /// 0–100
    pub progress: u8,
}

impl fmt::Display for RunSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}%) {}",
            self.run_id.as_deref().unwrap_or("-"),
            self.status,
            self.progress,
            self.phase,
        )
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Kind of a console step. Unknown kinds collapse to `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Error,
    Warning,
    Result,
    Signal,
    ToolCall,
    Thought,
    Phase,
    #[default]
    #[serde(other)]
    Default,
}

/// One entry of the chronological agent log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub agent: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub step_type: StepType,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.timestamp, self.agent, self.content)
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// A news item cited by a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSource {
    #[serde(default, deserialize_with = "null_as_default")]
    pub source_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
}

/// A ticker affected by a signal.
///
/// Accepts either a bare code (`"600519"` or `600519`) or an object
/// `{ "ticker": ..., "name": ... }` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TickerRepr")]
pub struct ImpactTicker {
    pub ticker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TickerCode {
    Text(String),
    Number(serde_json::Number),
}

impl TickerCode {
    fn into_string(self) -> String {
        match self {
            TickerCode::Text(s) => s,
            TickerCode::Number(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TickerRepr {
    Bare(TickerCode),
    Entry {
        ticker: TickerCode,
        #[serde(default)]
        name: Option<String>,
    },
}

impl From<TickerRepr> for ImpactTicker {
    fn from(repr: TickerRepr) -> Self {
        match repr {
            TickerRepr::Bare(code) => ImpactTicker { ticker: code.into_string(), name: None },
            TickerRepr::Entry { ticker, name } => ImpactTicker { ticker: ticker.into_string(), name },
        }
    }
}

/// A discrete finding produced by the analysis job.
///
/// `title` is the identity key: two signals are the same signal iff their
/// titles are exactly equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sentiment_score: f64,
    /// 0.0–1.0
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub intensity: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reasoning: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sources: Vec<SignalSource>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub impact_tickers: Vec<ImpactTicker>,
}

impl Signal {
    /// Distinct ticker codes this signal references.
    pub fn tickers(&self) -> BTreeSet<&str> {
        self.impact_tickers.iter().map(|t| t.ticker.as_str()).collect()
    }

    /// Helper to build a test signal with neutral scores.
    #[cfg(test)]
    pub fn sample(title: &str) -> Self {
        Signal {
            title: title.to_string(),
            sentiment_score: 0.5,
            confidence: 0.8,
            intensity: 3.0,
            reasoning: format!("Reasoning for {title}"),
            sources: Vec::new(),
            impact_tickers: Vec::new(),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (sentiment: {:+.2} | confidence: {:.0}% | intensity: {})",
            self.title,
            self.sentiment_score,
            self.confidence * 100.0,
            self.intensity,
        )
    }
}

// ---------------------------------------------------------------------------
// Charts
// ---------------------------------------------------------------------------

/// One OHLC bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub open: f64,
    pub high: f64,
    pub low: f64,
    #[serde(default)]
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl PriceBar {
    #[cfg(test)]
    pub fn range(low: f64, high: f64) -> Self {
        PriceBar { date: String::new(), open: low, high, low, close: high, volume: None }
    }
}

/// Price history (plus optional forecasts) for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    #[serde(default)]
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub prices: Vec<PriceBar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast: Option<Vec<PriceBar>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast_base: Option<Vec<PriceBar>>,
}

impl ChartSeries {
    /// A series is valid only if it carries at least one price bar.
    pub fn is_valid(&self) -> bool {
        !self.prices.is_empty()
    }

    /// All bars: prices, then forecast, then forecast base.
    pub fn bars(&self) -> impl Iterator<Item = &PriceBar> {
        self.prices
            .iter()
            .chain(self.forecast.iter().flatten())
            .chain(self.forecast_base.iter().flatten())
    }

    /// `(min low, max high)` across every bar, ignoring non-finite values.
    /// `None` for an invalid series.
    pub fn price_range(&self) -> Option<(f64, f64)> {
        if !self.is_valid() {
            return None;
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for bar in self.bars() {
            if bar.low.is_finite() && bar.low < min {
                min = bar.low;
            }
            if bar.high.is_finite() && bar.high > max {
                max = bar.high;
            }
        }
        (min <= max).then_some((min, max))
    }

    /// Helper to build a test series from `(low, high)` pairs.
    #[cfg(test)]
    pub fn sample(ticker: &str, ranges: &[(f64, f64)]) -> Self {
        ChartSeries {
            ticker: ticker.to_string(),
            name: None,
            prices: ranges.iter().map(|&(l, h)| PriceBar::range(l, h)).collect(),
            forecast: None,
            forecast_base: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub label: String,
}

/// Directed labelled graph of signal propagation / impact.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One past run as listed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub run_id: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub signal_count: u32,
    #[serde(default)]
    pub parent_run_id: Option<String>,
    #[serde(default)]
    pub report_path: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub time_since_last_run: Option<String>,
}

impl HistoryItem {
    /// A tracked update is a run derived from an earlier run.
    pub fn is_tracked_update(&self) -> bool {
        self.parent_run_id.is_some()
    }

    /// Start time parsed from the server's ISO-8601 timestamp.
    pub fn started(&self) -> Option<NaiveDateTime> {
        self.started_at.as_deref().and_then(parse_iso)
    }

    /// Human-readable duration: `42s`, `3m 5s`, or `-`.
    pub fn duration_label(&self) -> String {
        match self.duration_seconds {
            Some(s) if s > 0 && s < 60 => format!("{s}s"),
            Some(s) if s >= 60 => format!("{}m {}s", s / 60, s % 60),
            _ => "-".to_string(),
        }
    }
}

/// Past runs grouped by their query text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryGroup {
    pub query: String,
    #[serde(default)]
    pub run_count: u32,
    #[serde(default)]
    pub runs: Vec<HistoryItem>,
    #[serde(default)]
    pub last_run_at: Option<String>,
}

/// Treat an explicit JSON `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse the server's timestamps, with or without fractional seconds.
pub fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

// ---------------------------------------------------------------------------
// Completed run data
// ---------------------------------------------------------------------------

/// Structured output of one run: the input to the comparison engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunData {
    pub run_id: String,
    #[serde(default)]
    pub signals: Vec<Signal>,
    #[serde(default)]
    pub charts: BTreeMap<String, ChartSeries>,
    #[serde(default)]
    pub graph: Graph,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_content: Option<String>,
}

impl RunData {
    /// Drop charts without price bars. Returns the tickers removed.
    pub fn retain_valid_charts(&mut self) -> Vec<String> {
        let invalid: Vec<String> = self
            .charts
            .iter()
            .filter(|(_, c)| !c.is_valid())
            .map(|(t, _)| t.clone())
            .collect();
        for ticker in &invalid {
            self.charts.remove(ticker);
        }
        invalid
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for SIGNAL FLUX.
#[derive(Debug, thiserror::Error)]
pub enum FluxError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed frame: {0}")]
    Decode(String),

    #[error("Unrecognised message type: {0}")]
    UnknownMessage(String),

    #[error("Rejected {kind} payload: {reason}")]
    Validation { kind: String, reason: String },

    #[error("API error ({endpoint}): {message}")]
    Api { endpoint: String, message: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Typed payloads for server messages whose `data` is not a plain model type.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::types::{null_as_default, ChartSeries, FluxError, Graph, RunStatus, Signal, Step};

/// Full authoritative state sent on connect and in reply to `get_status`.
#[derive(Debug, Clone, PartialEq)]
pub struct InitSnapshot {
    pub run_id: Option<String>,
    pub status: RunStatus,
    pub is_running: bool,
    pub query: Option<String>,
    pub phase: Option<String>,
    pub progress: Option<u32>,
    pub steps: Vec<Step>,
    pub signals: Vec<Signal>,
    /// Charts that passed validation, keyed by ticker.
    pub charts: BTreeMap<String, ChartSeries>,
    /// Tickers whose chart entry was dropped, with the reason.
    pub rejected_charts: Vec<(String, String)>,
    pub graph: Option<Graph>,
}

#[derive(Debug, Deserialize)]
pub(super) struct InitWire {
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    status: Option<RunStatus>,
    #[serde(default)]
    is_running: bool,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    phase: Option<String>,
    #[serde(default)]
    progress: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    steps: Vec<Step>,
    #[serde(default, deserialize_with = "null_as_default")]
    signals: Vec<Signal>,
    #[serde(default, deserialize_with = "null_as_default")]
    charts: BTreeMap<String, Value>,
    #[serde(default)]
    graph: Option<Graph>,
}

impl From<InitWire> for InitSnapshot {
    fn from(wire: InitWire) -> Self {
        let mut charts = BTreeMap::new();
        let mut rejected_charts = Vec::new();
        for (ticker, raw) in wire.charts {
            match validate_chart(raw, Some(&ticker)) {
                Ok(series) => {
                    charts.insert(ticker, series);
                }
                Err(e) => rejected_charts.push((ticker, e.to_string())),
            }
        }
        InitSnapshot {
            run_id: wire.run_id,
            status: wire.status.unwrap_or_default(),
            is_running: wire.is_running,
            query: wire.query,
            phase: wire.phase,
            progress: wire.progress,
            steps: wire.steps,
            signals: wire.signals,
            charts,
            rejected_charts,
            graph: wire.graph,
        }
    }
}

/// Parse and validate one chart payload.
///
/// `key` is the ticker the payload was filed under (init snapshots); it
/// fills in a missing `ticker` field.
pub fn validate_chart(raw: Value, key: Option<&str>) -> Result<ChartSeries, FluxError> {
    if raw.is_null() {
        return Err(invalid_chart("null payload"));
    }
    let mut series: ChartSeries =
        serde_json::from_value(raw).map_err(|e| invalid_chart(&e.to_string()))?;
    if series.ticker.is_empty() {
        match key {
            Some(k) => series.ticker = k.to_string(),
            None => return Err(invalid_chart("missing ticker")),
        }
    }
    if !series.is_valid() {
        return Err(invalid_chart("empty prices"));
    }
    Ok(series)
}

fn invalid_chart(reason: &str) -> FluxError {
    FluxError::Validation { kind: "chart".to_string(), reason: reason.to_string() }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProgressUpdate {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub progress: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompletedNotice {
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub signal_count: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobFailure {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusUpdate {
    pub status: RunStatus,
}

//! Run state reconciler.
//!
//! Holds the single live view of the current run and applies decoded server
//! messages to it. [`RunState::apply`] is the only mutation path; everything
//! else reads through accessors. Side effects the client has to perform
//! (commands to send, notifications to raise) are returned as [`Effect`]s
//! instead of being executed here, so the reducer is testable without a
//! socket.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::protocol::payloads::InitSnapshot;
use crate::protocol::{ClientCommand, ServerMessage};
use crate::types::{
    ChartSeries, Graph, HistoryItem, QueryGroup, RunData, RunSnapshot, RunStatus, Signal, Step,
};

// ---------------------------------------------------------------------------
// Effects
// ---------------------------------------------------------------------------

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn run_completed(signal_count: usize) -> Self {
        Notification {
            title: "Analysis complete".to_string(),
            body: format!("Found {signal_count} signals"),
        }
    }
}

/// Work requested by a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send(ClientCommand),
    Notify(Notification),
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Live state of the current run plus the cached history lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    run_id: Option<String>,
    status: RunStatus,
    phase: String,
    progress: u8,
    error: Option<String>,
    steps: Vec<Step>,
    signals: Vec<Signal>,
    charts: BTreeMap<String, ChartSeries>,
    graph: Graph,
    history: Vec<HistoryItem>,
    query_groups: Vec<QueryGroup>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            run_id: self.run_id.clone(),
            status: self.status,
            phase: self.phase.clone(),
            progress: self.progress,
        }
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Message carried by the last `error` event, while the run is failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn charts(&self) -> &BTreeMap<String, ChartSeries> {
        &self.charts
    }

    pub fn chart(&self, ticker: &str) -> Option<&ChartSeries> {
        self.charts.get(ticker)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn history(&self) -> &[HistoryItem] {
        &self.history
    }

    pub fn query_groups(&self) -> &[QueryGroup] {
        &self.query_groups
    }

    /// Structured data of the held run, for comparison once it completes.
    pub fn to_run_data(&self) -> Option<RunData> {
        let run_id = self.run_id.clone()?;
        Some(RunData {
            run_id,
            signals: self.signals.clone(),
            charts: self.charts.clone(),
            graph: self.graph.clone(),
            report_path: None,
            report_content: None,
        })
    }

    // -- Reducer ----------------------------------------------------------

    /// Apply one server message. Returns the effects the caller must perform.
    pub fn apply(&mut self, msg: ServerMessage) -> Vec<Effect> {
        debug!(kind = msg.kind(), "Applying server message");
        match msg {
            ServerMessage::Init(snapshot) => {
                self.apply_init(snapshot);
                Vec::new()
            }
            ServerMessage::Progress(update) => {
                self.set_progress(update.phase, update.progress);
                Vec::new()
            }
            ServerMessage::Step(step) => {
                self.steps.push(step);
                Vec::new()
            }
            ServerMessage::Signal(signal) => {
                self.upsert_signal(signal);
                Vec::new()
            }
            ServerMessage::Chart(series) => {
                self.accept_chart(series);
                Vec::new()
            }
            ServerMessage::Graph(graph) => {
                self.graph = graph;
                Vec::new()
            }
            ServerMessage::Completed(notice) => {
                self.status = RunStatus::Completed;
                info!(
                    run_id = ?notice.run_id.as_deref().or(self.run_id.as_deref()),
                    signals = notice.signal_count,
                    "Run completed"
                );
                let mut effects: Vec<Effect> =
                    ClientCommand::REFRESH_HISTORY.into_iter().map(Effect::Send).collect();
                effects.push(Effect::Notify(Notification::run_completed(notice.signal_count)));
                effects
            }
            ServerMessage::Error(failure) => {
                warn!(run_id = ?self.run_id, message = %failure.message, "Run failed");
                self.status = RunStatus::Failed;
                self.error = Some(failure.message);
                Vec::new()
            }
            ServerMessage::Status(update) => {
                match update.status {
                    RunStatus::Idle | RunStatus::Cancelled => self.reset_to_idle(),
                    RunStatus::Cancelling => info!(run_id = ?self.run_id, "Run cancelling"),
                    other => debug!(status = %other, "Ignoring status update"),
                }
                Vec::new()
            }
            ServerMessage::History(items) => {
                self.history = items;
                Vec::new()
            }
            ServerMessage::QueryGroups(groups) => {
                self.query_groups = groups;
                Vec::new()
            }
        }
    }

    /// Full resynchronisation from an authoritative snapshot.
    fn apply_init(&mut self, snapshot: InitSnapshot) {
        for (ticker, reason) in &snapshot.rejected_charts {
            warn!(ticker = %ticker, reason = %reason, "Skipping invalid chart in snapshot");
        }

        match snapshot.run_id {
            Some(run_id) if snapshot.is_running => {
                if self.run_id.as_deref() != Some(run_id.as_str()) {
                    self.clear_run_data();
                }
                info!(run_id = %run_id, "Synced running state from server");
                self.run_id = Some(run_id);
                self.status = RunStatus::Running;
                self.error = None;
                if let (Some(phase), Some(progress)) = (snapshot.phase, snapshot.progress) {
                    self.set_progress(phase, progress);
                }
                self.steps = snapshot.steps;
                self.signals.clear();
                for signal in snapshot.signals {
                    self.upsert_signal(signal);
                }
                for (_, series) in snapshot.charts {
                    self.accept_chart(series);
                }
                if let Some(graph) = snapshot.graph {
                    self.graph = graph;
                }
            }
            Some(run_id) if snapshot.status == RunStatus::Completed => {
                if self.run_id.as_deref() != Some(run_id.as_str()) {
                    self.clear_run_data();
                }
                info!(run_id = %run_id, "Server reports completed run");
                self.run_id = Some(run_id);
                self.error = None;
                self.status = RunStatus::Completed;
            }
            _ => {
                info!("Server is idle, resetting local run state");
                self.reset_to_idle();
            }
        }
    }

    fn set_progress(&mut self, phase: String, progress: u32) {
        self.phase = phase;
        self.progress = progress.min(100) as u8;
    }

    /// Signals are keyed by title: a repeat replaces the held version in place.
    fn upsert_signal(&mut self, signal: Signal) {
        match self.signals.iter_mut().find(|s| s.title == signal.title) {
            Some(existing) => {
                debug!(title = %signal.title, "Replacing known signal");
                *existing = signal;
            }
            None => self.signals.push(signal),
        }
    }

    /// Store a chart; a series without prices never replaces a held one.
    fn accept_chart(&mut self, series: ChartSeries) {
        if !series.is_valid() || series.ticker.is_empty() {
            warn!(ticker = %series.ticker, "Dropping invalid chart update");
            return;
        }
        self.charts.insert(series.ticker.clone(), series);
    }

    /// Collections stay visible; only the scalar run fields are cleared.
    fn reset_to_idle(&mut self) {
        self.run_id = None;
        self.status = RunStatus::Idle;
        self.phase.clear();
        self.progress = 0;
        self.error = None;
    }

    fn clear_run_data(&mut self) {
        self.steps.clear();
        self.signals.clear();
        self.charts.clear();
        self.graph = Graph::default();
    }
}

/// Pure form of [`RunState::apply`].
pub fn reduce(mut state: RunState, msg: ServerMessage) -> (RunState, Vec<Effect>) {
    let effects = state.apply(msg);
    (state, effects)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

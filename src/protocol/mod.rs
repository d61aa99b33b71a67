//! Wire vocabulary between the client and the job server.
//!
//! Inbound frames are `{ "type": ..., "data": ... }` JSON objects decoded
//! into [`ServerMessage`], one variant per message type with a fully typed
//! payload. Outbound frames are `{ "command": ..., ...extra }` objects
//! encoded from [`ClientCommand`].

pub mod payloads;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::types::{FluxError, Graph, HistoryItem, QueryGroup, Signal, Step};
use payloads::{
    validate_chart, CompletedNotice, InitSnapshot, InitWire, JobFailure, ProgressUpdate,
    StatusUpdate,
};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A decoded server → client message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Init(InitSnapshot),
    Progress(ProgressUpdate),
    Step(Step),
    Signal(Signal),
    /// Only constructed by [`decode`] for charts with at least one price bar.
    Chart(crate::types::ChartSeries),
    Graph(Graph),
    Completed(CompletedNotice),
    Error(JobFailure),
    Status(StatusUpdate),
    History(Vec<HistoryItem>),
    QueryGroups(Vec<QueryGroup>),
}

impl ServerMessage {
    /// Wire name of this message type.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Init(_) => "init",
            ServerMessage::Progress(_) => "progress",
            ServerMessage::Step(_) => "step",
            ServerMessage::Signal(_) => "signal",
            ServerMessage::Chart(_) => "chart",
            ServerMessage::Graph(_) => "graph",
            ServerMessage::Completed(_) => "completed",
            ServerMessage::Error(_) => "error",
            ServerMessage::Status(_) => "status",
            ServerMessage::History(_) => "history",
            ServerMessage::QueryGroups(_) => "query_groups",
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Decode one text frame.
///
/// Returns `FluxError::Decode` for frames that are not JSON envelopes or whose
/// payload does not match the type's shape, `FluxError::UnknownMessage` for
/// types outside the vocabulary, and `FluxError::Validation` for well-formed
/// but semantically invalid payloads (a chart without prices).
pub fn decode(frame: &str) -> Result<ServerMessage, FluxError> {
    let envelope: Envelope =
        serde_json::from_str(frame).map_err(|e| FluxError::Decode(e.to_string()))?;
    let data = envelope.data;

    let msg = match envelope.kind.as_str() {
        "init" => ServerMessage::Init(InitSnapshot::from(payload::<InitWire>("init", data)?)),
        "progress" => ServerMessage::Progress(payload("progress", data)?),
        "step" => ServerMessage::Step(payload("step", data)?),
        "signal" => ServerMessage::Signal(payload("signal", data)?),
        "chart" => ServerMessage::Chart(validate_chart(data, None)?),
        "graph" => ServerMessage::Graph(payload("graph", data)?),
        "completed" => ServerMessage::Completed(payload("completed", data)?),
        "error" => ServerMessage::Error(payload("error", data)?),
        "status" => ServerMessage::Status(payload("status", data)?),
        "history" => ServerMessage::History(payload("history", data)?),
        "query_groups" => ServerMessage::QueryGroups(payload("query_groups", data)?),
        other => return Err(FluxError::UnknownMessage(other.to_string())),
    };
    Ok(msg)
}

fn payload<T: for<'de> Deserialize<'de>>(kind: &str, data: Value) -> Result<T, FluxError> {
    serde_json::from_value(data).map_err(|e| FluxError::Decode(format!("{kind}: {e}")))
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// A client → server command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    GetStatus,
    GetHistory,
    GetQueryGroups,
}

impl ClientCommand {
    /// Sent on every (re)connect: the server is the source of truth.
    pub const BOOTSTRAP: [ClientCommand; 3] = [
        ClientCommand::GetStatus,
        ClientCommand::GetHistory,
        ClientCommand::GetQueryGroups,
    ];

    /// Sent after a run completes to refresh the history views.
    pub const REFRESH_HISTORY: [ClientCommand; 2] =
        [ClientCommand::GetHistory, ClientCommand::GetQueryGroups];
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientCommand::GetStatus => write!(f, "get_status"),
            ClientCommand::GetHistory => write!(f, "get_history"),
            ClientCommand::GetQueryGroups => write!(f, "get_query_groups"),
        }
    }
}

/// Encode a command as a text frame.
pub fn encode(command: &ClientCommand) -> Result<String, FluxError> {
    serde_json::to_string(command).map_err(|e| FluxError::Decode(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! In-memory job server for integration testing.
//!
//! Implements `Connector` so a `LiveClient` can be driven end to end with
//! no sockets. Test code keeps a clone of the server to push frames, drop
//! the connection, refuse new ones, and read back the commands the client
//! sent.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use url::Url;

use signal_flux::connection::{Connector, Session};
use signal_flux::engine::Notifier;
use signal_flux::reconciler::Notification;

struct Link {
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

#[derive(Default)]
struct ServerState {
    refuse: bool,
    urls: Vec<String>,
    links: Vec<Link>,
}

/// A mock job server. Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct MockJobServer {
    state: Arc<Mutex<ServerState>>,
}

impl MockJobServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse (or accept again) subsequent connection attempts.
    pub fn set_refusing(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }

    /// Every URL a connection was attempted with, refused ones included.
    pub fn attempts(&self) -> Vec<String> {
        self.state.lock().unwrap().urls.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().unwrap().links.len()
    }

    /// Queue a frame on the newest connection.
    pub fn push(&self, frame: Value) {
        let state = self.state.lock().unwrap();
        let link = state.links.last().expect("no connection");
        if let Some(tx) = &link.to_client {
            let _ = tx.send(frame.to_string());
        }
    }

    /// Queue a raw text frame on the newest connection.
    pub fn push_raw(&self, frame: &str) {
        let state = self.state.lock().unwrap();
        if let Some(tx) = state.links.last().and_then(|l| l.to_client.as_ref()) {
            let _ = tx.send(frame.to_string());
        }
    }

    /// Close the newest connection from the server side.
    pub fn drop_connection(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(link) = state.links.last_mut() {
            link.to_client = None;
        }
    }

    /// Drain the command names received on the newest connection.
    pub fn received_commands(&self) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        let Some(link) = state.links.last_mut() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        while let Ok(text) = link.from_client.try_recv() {
            let v: Value = serde_json::from_str(&text).expect("command is JSON");
            out.push(v["command"].as_str().unwrap_or_default().to_string());
        }
        out
    }
}

pub struct MockSession {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Session for MockSession {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.outbound.send(text).map_err(|_| anyhow!("server gone"))
    }

    async fn next_text(&mut self) -> Option<Result<String>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

#[async_trait]
impl Connector for MockJobServer {
    type Session = MockSession;

    async fn open(&self, url: &Url) -> Result<MockSession> {
        let mut state = self.state.lock().unwrap();
        state.urls.push(url.to_string());
        if state.refuse {
            return Err(anyhow!("connection refused"));
        }
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        state.links.push(Link { to_client: Some(to_client), from_client });
        Ok(MockSession { inbound, outbound })
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Records every notification it is asked to show.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    pub shown: Arc<Mutex<Vec<Notification>>>,
}

impl Notifier for RecordingNotifier {
    fn request_permission(&self) -> bool {
        true
    }

    fn notify(&self, notification: &Notification) {
        self.shown.lock().unwrap().push(notification.clone());
    }
}

// ---------------------------------------------------------------------------
// Frame builders
// ---------------------------------------------------------------------------

pub fn step(agent: &str, content: &str) -> Value {
    json!({"timestamp": "2024-05-01T09:30:00", "agent": agent, "type": "thought", "content": content})
}

pub fn signal(title: &str, sentiment: f64) -> Value {
    json!({
        "title": title,
        "sentiment_score": sentiment,
        "confidence": 0.8,
        "intensity": 3,
        "reasoning": "",
        "sources": [],
        "impact_tickers": [{"ticker": "600519", "name": "Kweichow Moutai"}]
    })
}

pub fn chart(ticker: &str, lows_highs: &[(f64, f64)]) -> Value {
    let prices: Vec<Value> = lows_highs
        .iter()
        .enumerate()
        .map(|(i, (l, h))| json!({"date": format!("2024-04-{:02}", i + 1), "open": l, "high": h, "low": l, "close": h}))
        .collect();
    json!({"ticker": ticker, "prices": prices})
}

pub fn init_running(run_id: &str, progress: u32, steps: Vec<Value>, signals: Vec<Value>) -> Value {
    json!({
        "type": "init",
        "data": {
            "run_id": run_id,
            "status": "running",
            "is_running": true,
            "query": "A-share semiconductor outlook",
            "phase": "Analysing",
            "progress": progress,
            "steps": steps,
            "signals": signals,
            "charts": {},
            "graph": {"nodes": [], "edges": []}
        }
    })
}

pub fn init_idle() -> Value {
    json!({"type": "init", "data": {"run_id": null, "status": "idle", "is_running": false}})
}

pub fn event(kind: &str, data: Value) -> Value {
    json!({"type": kind, "data": data})
}

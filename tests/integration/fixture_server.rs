//! Real-socket fixture: an axum server speaking the job server's WebSocket
//! protocol and REST surface on an ephemeral port.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

use signal_flux::api::{ApiClient, RegisterRequest};
use signal_flux::connection::ws::WsConnector;
use signal_flux::connection::{ConnectionManager, LinkEvent};
use signal_flux::engine::LiveClient;
use signal_flux::types::{FluxError, RunStatus};

use crate::mock_server::{self, RecordingNotifier};

const TOKEN: &str = "fixture-token";

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

async fn spawn_fixture() -> SocketAddr {
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/register", post(register))
        .route("/api/hot-news", get(hot_news))
        .route("/api/suggest-queries", post(suggest))
        .route("/api/run/:run_id/data", get(run_data));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn ws_handler(ws: WebSocketUpgrade, Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    if params.get("token").map(String::as_str) != Some(TOKEN) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(handle_socket)
}

/// Answers `get_status` with a running snapshot, then streams a short run
/// and closes.
async fn handle_socket(socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else { continue };
        let command: Value = serde_json::from_str(&text).unwrap_or_default();
        if command["command"] != "get_status" {
            continue;
        }
        let frames = [
            mock_server::init_running(
                "20240501_093000",
                10,
                vec![mock_server::step("scanner", "Fetched headlines")],
                vec![],
            ),
            mock_server::event("signal", mock_server::signal("Liquor demand softens", -0.2)),
            mock_server::event("chart", mock_server::chart("600519", &[(1500.0, 1580.0)])),
            mock_server::event("completed", json!({"run_id": "20240501_093000", "signal_count": 1})),
        ];
        for frame in frames {
            if sender.send(Message::Text(frame.to_string())).await.is_err() {
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
        break;
    }
    // Drain until the client hangs up so no unread data resets the stream.
    while let Some(Ok(_)) = receiver.next().await {}
}

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

async fn login(Json(body): Json<Credentials>) -> impl IntoResponse {
    if body.username == "ana" && body.password == "hunter2" {
        (StatusCode::OK, Json(json!({"access_token": TOKEN, "token_type": "bearer"})))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Incorrect username or password"})))
    }
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {TOKEN}"))
        .unwrap_or(false)
}

async fn me(headers: HeaderMap) -> impl IntoResponse {
    if bearer_ok(&headers) {
        (StatusCode::OK, Json(json!({"id": 1, "username": "ana", "is_active": true})))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Not authenticated"})))
    }
}

async fn register(Json(body): Json<Value>) -> impl IntoResponse {
    if body["invitation_code"] == "INV-OK" {
        (StatusCode::OK, Json(json!({"id": 2, "username": body["username"]})))
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({"detail": "Invalid invitation code"})))
    }
}

async fn hot_news(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    let count: usize = params.get("count").and_then(|c| c.parse().ok()).unwrap_or(8);
    let sources: Vec<Value> = params
        .get("sources")
        .map(String::as_str)
        .unwrap_or("")
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|src| {
            let items: Vec<Value> = (1..=count)
                .map(|rank| json!({"id": rank, "source": src, "rank": rank, "title": format!("{src} headline {rank}"), "url": ""}))
                .collect();
            json!({"source": src, "source_name": src.to_uppercase(), "items": items})
        })
        .collect();
    Json(json!({"updated_at": "2024-05-01T09:30:00", "sources": sources}))
}

async fn suggest(Json(body): Json<Value>) -> impl IntoResponse {
    let title = body["title"].as_str().unwrap_or_default().to_string();
    if title == "boom" {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "model unavailable"})));
    }
    (StatusCode::OK, Json(json!({"title": title, "suggestions": [format!("{title} sector rotation")]})))
}

async fn run_data(Path(run_id): Path<String>) -> impl IntoResponse {
    if run_id == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Run not found"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "run_id": run_id,
            "signals": [mock_server::signal("Liquor demand softens", -0.2)],
            "charts": {
                "600519": mock_server::chart("600519", &[(1500.0, 1580.0)]),
                "000858": {"ticker": "000858", "prices": []}
            },
            "graph": {"nodes": [{"id": "liquor", "label": "Liquor"}], "edges": []},
            "report_path": null
        })),
    )
}

fn api(addr: SocketAddr) -> ApiClient {
    ApiClient::new(Url::parse(&format!("http://{addr}")).unwrap(), Duration::from_secs(5)).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_live_run_over_websocket() {
    let addr = spawn_fixture().await;
    let endpoint = Url::parse(&format!("ws://{addr}/ws")).unwrap();
    let notifier = RecordingNotifier::default();
    let connection = ConnectionManager::new(WsConnector, endpoint, Duration::from_secs(3));
    let mut client = LiveClient::new(connection, notifier.clone());

    let token = api(addr).login("ana", &secrecy::SecretString::new("hunter2".into())).await.unwrap();
    assert!(client.login(token).await);

    let mut frames = 0;
    loop {
        match client.step().await {
            Some(LinkEvent::Frame(_)) => frames += 1,
            Some(LinkEvent::Disconnected) => break,
            other => panic!("unexpected link event {other:?}"),
        }
    }
    assert_eq!(frames, 4);

    let state = client.state();
    assert_eq!(state.run_id(), Some("20240501_093000"));
    assert_eq!(state.status(), RunStatus::Completed);
    assert_eq!(state.signals().len(), 1);
    assert!(state.chart("600519").is_some());
    assert_eq!(notifier.shown.lock().unwrap().len(), 1);

    // Server closed; the client schedules a reconnect and logout cancels it.
    assert!(client.connection().retry_pending());
    client.logout().await;
    assert!(!client.connection().retry_pending());
}

#[tokio::test]
async fn test_websocket_rejects_bad_token() {
    let addr = spawn_fixture().await;
    let endpoint = Url::parse(&format!("ws://{addr}/ws")).unwrap();
    let connection = ConnectionManager::new(WsConnector, endpoint, Duration::from_secs(3));
    let mut client = LiveClient::new(connection, RecordingNotifier::default());

    assert!(!client.login(secrecy::SecretString::new("wrong".into())).await);
    assert!(client.connection().retry_pending());
    client.logout().await;
}

#[tokio::test]
async fn test_sign_in_and_register() {
    let addr = spawn_fixture().await;
    let api = api(addr);

    let session = api.sign_in("ana", &secrecy::SecretString::new("hunter2".into())).await.unwrap();
    assert_eq!(session.user.username, "ana");

    let err = api.login("ana", &secrecy::SecretString::new("nope".into())).await.unwrap_err();
    match err.downcast_ref::<FluxError>() {
        Some(FluxError::Auth(detail)) => assert_eq!(detail, "Incorrect username or password"),
        other => panic!("expected auth error, got {other:?}"),
    }

    let ok = RegisterRequest { username: "ben".into(), password: "pw".into(), invitation_code: "INV-OK".into() };
    api.register(&ok).await.unwrap();
    let bad = RegisterRequest { invitation_code: "nope".into(), ..ok };
    let err = api.register(&bad).await.unwrap_err();
    assert!(err.to_string().contains("Invalid invitation code"));
}

#[tokio::test]
async fn test_hot_news_defaults_and_single_source() {
    let addr = spawn_fixture().await;
    let api = api(addr);

    let none: [&str; 0] = [];
    let all = api.hot_news(&none, 8).await.unwrap();
    let sources: Vec<&str> = all.sources.iter().map(|g| g.source.as_str()).collect();
    assert_eq!(sources, vec!["cls", "wallstreetcn", "xueqiu", "eastmoney", "yicai"]);
    assert_eq!(all.item_count(), 40);

    let one = api.hot_news(&["xueqiu"], 3).await.unwrap();
    assert_eq!(one.sources.len(), 1);
    assert_eq!(one.sources[0].items[2].rank, 3);
    assert_eq!(one.sources[0].display_name(), "XUEQIU");
}

#[tokio::test]
async fn test_suggestions_and_fallback() {
    let addr = spawn_fixture().await;
    let api = api(addr);

    assert_eq!(
        api.suggest_queries_or_fallback("Baijiu prices slide").await,
        vec!["Baijiu prices slide sector rotation".to_string()]
    );
    let fallback = api.suggest_queries_or_fallback("boom").await;
    assert_eq!(fallback, signal_flux::api::fallback_suggestions("boom"));
}

#[tokio::test]
async fn test_run_data_filters_invalid_charts() {
    let addr = spawn_fixture().await;
    let api = api(addr).with_token(secrecy::SecretString::new(TOKEN.into()));

    let data = api.run_data("20240501_093000").await.unwrap();
    assert_eq!(data.run_id, "20240501_093000");
    assert_eq!(data.charts.len(), 1);
    assert!(data.charts.contains_key("600519"));
    assert_eq!(data.graph.nodes.len(), 1);

    let err = api.run_data("missing").await.unwrap_err();
    assert!(matches!(err.downcast_ref::<FluxError>(), Some(FluxError::Api { .. })));

    // Comparing a run with itself: everything unchanged.
    let result = signal_flux::comparison::compare(&data, &data);
    assert_eq!(result.summary.unchanged, 1);
    assert_eq!(result.summary.total, 1);
}

//! SIGNAL FLUX: live client and run comparison for a signal-analysis job server
//!
//! Entry point. Loads configuration, initialises structured logging,
//! resolves credentials, and runs one sub-command:
//!
//! - `watch` (default): follow the live run until Ctrl+C
//! - `compare <old_run_id> <new_run_id>`: diff two finished runs
//! - `news [source]`: list hot headlines
//! - `suggest <title>`: query suggestions for a headline

use anyhow::{bail, Result};
use secrecy::SecretString;
use tracing::{info, warn};

use signal_flux::api::ApiClient;
use signal_flux::comparison::{self, DeltaFilter};
use signal_flux::config::AppConfig;
use signal_flux::connection::ws::WsConnector;
use signal_flux::connection::ConnectionManager;
use signal_flux::engine::{LiveClient, TracingNotifier};

const BANNER: &str = r#"
 ____ ___ ____ _   _    _    _       _____ _    _   ___  __
/ ___|_ _/ ___| \ | |  / \  | |     |  ___| |  | | | \ \/ /
\___ \| | |  _|  \| | / _ \ | |     | |_  | |  | | | |\  /
 ___) | | |_| | |\  |/ ___ \| |___  |  _| | |__| |_| |/  \
|____/___\____|_| \_/_/   \_\_____| |_|   |_____\___//_/\_\

  Live signal tracking and run comparison
"#;

const USAGE: &str = "usage: signal-flux [watch | compare <old_run_id> <new_run_id> | news [source] | suggest <title>]";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("SIGNAL_FLUX_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("watch");

    let api = ApiClient::new(cfg.api_base()?, cfg.request_timeout())?;

    match command {
        "watch" => watch(&cfg, &api).await,
        "compare" => {
            let (Some(old_id), Some(new_id)) = (args.get(1), args.get(2)) else {
                bail!("{USAGE}");
            };
            compare(&cfg, api, old_id, new_id).await
        }
        "news" => news(&cfg, &api, args.get(1).map(String::as_str)).await,
        "suggest" => {
            let title = args[1..].join(" ");
            if title.trim().is_empty() {
                bail!("{USAGE}");
            }
            for (i, suggestion) in api.suggest_queries_or_fallback(title.trim()).await.iter().enumerate() {
                println!("{:>2}. {suggestion}", i + 1);
            }
            Ok(())
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    }
}

// ---------------------------------------------------------------------------
// Sub-commands
// ---------------------------------------------------------------------------

async fn watch(cfg: &AppConfig, api: &ApiClient) -> Result<()> {
    println!("{BANNER}");
    info!(
        ws_url = %cfg.server.ws_url,
        reconnect_delay_secs = cfg.connection.reconnect_delay_secs,
        notifications = cfg.notifications.enabled,
        "SIGNAL FLUX starting up"
    );

    let connection = ConnectionManager::new(WsConnector, cfg.ws_endpoint()?, cfg.reconnect_delay());
    let mut client = LiveClient::new(connection, TracingNotifier::new(cfg.notifications.enabled));

    match resolve_token(cfg, api).await {
        Some(token) => {
            if !client.login(token).await {
                warn!(
                    delay_secs = cfg.connection.reconnect_delay_secs,
                    "Initial connection failed, will keep retrying"
                );
            }
        }
        None => warn!(
            token_env = %cfg.auth.token_env,
            "No credentials available, live view stays disconnected"
        ),
    }

    info!("Watching live run. Press Ctrl+C to stop.");
    client
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    let state = client.state();
    info!(
        snapshot = %state.snapshot(),
        signals = state.signals().len(),
        charts = state.charts().len(),
        "Shutdown complete"
    );
    Ok(())
}

async fn compare(cfg: &AppConfig, api: ApiClient, old_id: &str, new_id: &str) -> Result<()> {
    let api = match resolve_token(cfg, &api).await {
        Some(token) => api.with_token(token),
        None => api,
    };

    let old = api.run_data(old_id).await?;
    let new = api.run_data(new_id).await?;
    let result = comparison::compare(&old, &new);

    info!(
        old_run = %result.old_run_id,
        new_run = %result.new_run_id,
        summary = %result.summary,
        "Comparison complete"
    );
    for delta in result.filtered(DeltaFilter::All) {
        info!(status = %delta.status, title = %delta.title(), tickers = ?delta.tickers, "Delta");
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn news(cfg: &AppConfig, api: &ApiClient, source: Option<&str>) -> Result<()> {
    let response = match source {
        Some(source) => api.hot_news(&[source], cfg.news.count).await?,
        None => api.hot_news(&cfg.news.sources, cfg.news.count).await?,
    };

    println!("Updated {}", response.updated_at);
    for group in &response.sources {
        println!("\n== {} ==", group.display_name());
        for item in &group.items {
            println!("{:>3}. {}  {}", item.rank, item.title, item.url);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// A token from the environment, else a username/password login.
async fn resolve_token(cfg: &AppConfig, api: &ApiClient) -> Option<SecretString> {
    if let Ok(token) = AppConfig::resolve_env(&cfg.auth.token_env) {
        if !token.trim().is_empty() {
            return Some(SecretString::new(token));
        }
    }

    let username = cfg.auth.username_env.as_deref().and_then(|env| AppConfig::resolve_env(env).ok())?;
    let password = cfg.auth.password_env.as_deref().and_then(|env| AppConfig::resolve_env(env).ok())?;

    match api.sign_in(&username, &SecretString::new(password)).await {
        Ok(session) => Some(session.token),
        Err(e) => {
            warn!(username = %username, error = %e, "Login failed");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("signal_flux=info"));

    let json_logging = std::env::var("SIGNAL_FLUX_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

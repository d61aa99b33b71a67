//! WebSocket transport (tokio-tungstenite).

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use super::{Connector, Session};

/// Opens WebSocket sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

pub struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connector for WsConnector {
    type Session = WsSession;

    async fn open(&self, url: &Url) -> Result<WsSession> {
        let (stream, response) = connect_async(url.as_str())
            .await
            .with_context(|| format!("WebSocket handshake failed for {}", redacted(url)))?;
        debug!(status = %response.status(), "WebSocket handshake complete");
        Ok(WsSession { stream })
    }
}

#[async_trait]
impl Session for WsSession {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .context("WebSocket send failed")
    }

    async fn next_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => debug!("Ignoring non-UTF-8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "Close frame received");
                    return None;
                }
                // Ping/pong are answered by tungstenite itself.
                Ok(_) => continue,
                Err(e) => return Some(Err(e).context("WebSocket receive failed")),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// URL with the query string removed, safe to log.
fn redacted(url: &Url) -> String {
    let mut clean = url.clone();
    clean.set_query(None);
    clean.to_string()
}

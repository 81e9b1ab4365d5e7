//! WebSocket connector
//!
//! Opens the backend's socket endpoint with a bearer `Authorization`
//! header, splits the stream, and pumps text frames between the socket and
//! the [`Connection`] channels on two background tasks.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::error::{ChatError, Result};
use crate::realtime::{Connection, Connector};

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str, token: &str) -> Result<Connection> {
        let mut request = url.into_client_request().map_err(ChatError::WebSocket)?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ChatError::Authentication("credential is not a valid header".into()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(ChatError::WebSocket)?;
        tracing::info!(url, status = %response.status(), "Realtime connection established");

        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
        let shutdown = CancellationToken::new();

        let writer_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_shutdown.cancelled() => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        break;
                    }
                    frame = outbound_rx.recv() => {
                        let Some(frame) = frame else { break };
                        if let Err(e) = sink.send(WsMessage::text(frame)).await {
                            tracing::warn!("Realtime write failed: {e}");
                            writer_shutdown.cancel();
                            break;
                        }
                    }
                }
            }
        });

        let reader_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reader_shutdown.cancelled() => break,
                    next = source.next() => match next {
                        Some(Ok(WsMessage::Text(text))) => {
                            if inbound_tx.send(text.to_string()).is_err() {
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            tracing::info!(?frame, "Realtime connection closed by server");
                            break;
                        }
                        // Ping/pong are answered by tungstenite; binary is not used.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!("Realtime read failed: {e}");
                            break;
                        }
                        None => break,
                    }
                }
            }
            reader_shutdown.cancel();
        });

        Ok(Connection {
            outbound_tx,
            inbound_rx,
            shutdown,
        })
    }
}

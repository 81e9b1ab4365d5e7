//! Realtime channel to the advising backend
//!
//! A [`Connector`] opens one authenticated connection and hands back a
//! [`Connection`]: a pair of string channels plus a shutdown token. The
//! [`client::EventClient`] speaks the [`protocol`] over those channels and
//! knows nothing about sockets, so the same code runs over
//! [`websocket::WebSocketConnector`] in production and
//! [`fake::FakeConnector`] in tests.

pub mod client;
pub mod fake;
pub mod protocol;
pub mod websocket;

pub use client::{start_read_loop, EventClient, EventHandler};
pub use protocol::ServerEvent;
pub use websocket::WebSocketConnector;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// An open realtime connection.
///
/// Frames written to `outbound_tx` go to the server; frames from the server
/// appear on `inbound_rx`. Cancelling `shutdown` closes the connection; the
/// connector also cancels it when the peer goes away.
#[derive(Debug)]
pub struct Connection {
    pub outbound_tx: mpsc::UnboundedSender<String>,
    pub inbound_rx: mpsc::UnboundedReceiver<String>,
    pub shutdown: CancellationToken,
}

/// Opens realtime connections.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    /// Connect to `url`, authenticating with bearer `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or the
    /// server refuses the credential.
    async fn connect(&self, url: &str, token: &str) -> Result<Connection>;
}

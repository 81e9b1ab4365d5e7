//! advisor-chat - terminal client library for the academic advising chat
//!
//! Students and their academic advisors exchange messages through a backend
//! that offers both an HTTP API and a live event channel. This library keeps
//! a local view of one conversation in sync with that backend.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `transport`: live channel with HTTP fallback, plus listener registration
//! - `realtime`: event protocol, ack correlation, WebSocket and in-process connectors
//! - `api`: HTTP client for the backend
//! - `store`: ordered, de-duplicated message log of the active conversation
//! - `reconciler`: per-counterpart unread counters and read acknowledgements
//! - `directory`: counterparts, containers and the active-conversation state machine
//! - `sync`: the client tying the above together
//! - `view`: presentation projection (date groups, times, read ticks)
//! - `config`, `session`, `error`, `cli`, `commands`: the application shell
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use advisor_chat::commands::ClientContext;
//! use advisor_chat::realtime::WebSocketConnector;
//! use advisor_chat::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let ctx = ClientContext::new(config)?;
//!     let mut client = ctx.chat_client(Arc::new(WebSocketConnector::new())).await?;
//!     println!("{}", client.view().render());
//!     client.stop().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod realtime;
pub mod reconciler;
pub mod session;
pub mod store;
pub mod sync;
pub mod transport;
pub mod view;

// Re-export commonly used types
pub use config::Config;
pub use error::{ChatError, Result};
pub use models::{ChatBox, ConversationTarget, Message, Role, User};
pub use sync::ChatClient;
pub use transport::ChatTransport;

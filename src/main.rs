//! advisor-chat - terminal client for the academic advising chat
//!
#![doc = "advisor-chat - terminal client for the academic advising chat"]
#![doc = "Main entry point for the advisor-chat application."]

use std::sync::Arc;

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use advisor_chat::cli::{Cli, Commands};
use advisor_chat::commands::{self, ClientContext};
use advisor_chat::config::{Config, LoggingConfig};
use advisor_chat::realtime::{Connector, WebSocketConnector};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Initialize tracing
    init_tracing(&config.logging);

    // Validate configuration
    config.validate()?;

    let ctx = ClientContext::new(config)?;
    let connector: Arc<dyn Connector> = Arc::new(WebSocketConnector::new());

    // Execute command
    match cli.command {
        Commands::Login { code, password } => {
            tracing::info!("Signing in as {}", code);
            commands::auth::login(&ctx, code, password).await?;
            Ok(())
        }
        Commands::Logout => {
            tracing::info!("Signing out");
            commands::auth::logout(&ctx).await?;
            Ok(())
        }
        Commands::Whoami => {
            commands::auth::whoami(&ctx).await?;
            Ok(())
        }
        Commands::Contacts => {
            commands::conversations::contacts(&ctx, connector).await?;
            Ok(())
        }
        Commands::Boxes => {
            commands::conversations::boxes(&ctx, connector).await?;
            Ok(())
        }
        Commands::OpenBox { with } => {
            tracing::info!("Opening conversation container with user {}", with);
            commands::conversations::open_box(&ctx, connector, with).await?;
            Ok(())
        }
        Commands::History { target } => {
            commands::conversations::history(&ctx, connector, target.target()).await?;
            Ok(())
        }
        Commands::Send { target, message } => {
            tracing::info!("Sending a single message");
            commands::conversations::send(&ctx, connector, target.target(), &message).await?;
            Ok(())
        }
        Commands::Chat { target, location } => {
            tracing::info!("Starting interactive chat session");
            if let Some(location) = &location {
                tracing::debug!("Resolving location: {}", location);
            }
            commands::chat::run_chat(&ctx, connector, target.target(), location).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins over the configured level. Logs go to stderr so they do
/// not interleave with conversation output.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("advisor_chat={}", logging.level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

//! Command-line interface definition for advisor-chat
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for signing in, browsing conversations, and chatting.

use clap::{Args, Parser, Subcommand};

use crate::models::{ChatBoxId, ConversationTarget, UserId};

/// advisor-chat - terminal client for the academic advising chat
///
/// Talk to your advisor (or your students) with live delivery and read
/// receipts, falling back to plain HTTP when the live channel is down.
#[derive(Parser, Debug, Clone)]
#[command(name = "advisor-chat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the backend API URL
    #[arg(long)]
    pub api_url: Option<String>,

    /// Never open the live connection; use HTTP for everything
    #[arg(long)]
    pub no_realtime: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Which conversation a command addresses
#[derive(Args, Debug, Clone, Default)]
#[group(required = false, multiple = false)]
pub struct TargetArgs {
    /// Counterpart user id (direct conversation)
    #[arg(short = 'w', long = "with")]
    pub with: Option<UserId>,

    /// Conversation container id
    #[arg(short = 'b', long = "box")]
    pub chat_box: Option<ChatBoxId>,
}

impl TargetArgs {
    /// The addressed conversation, if one was given
    pub fn target(&self) -> Option<ConversationTarget> {
        match (self.with, self.chat_box) {
            (Some(user), _) => Some(ConversationTarget::Direct(user)),
            (None, Some(chat_box)) => Some(ConversationTarget::Container(chat_box)),
            (None, None) => None,
        }
    }
}

/// Available commands for advisor-chat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Sign in and persist the session credential
    Login {
        /// Student or staff code
        #[arg(long)]
        code: String,

        /// Password (read from ADVISOR_CHAT_PASSWORD when omitted)
        #[arg(long, env = "ADVISOR_CHAT_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign out and forget the stored credential
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List conversation counterparts with unread counts
    Contacts,

    /// List conversation containers
    Boxes,

    /// Look up or create the container shared with a counterpart
    OpenBox {
        /// Counterpart user id
        #[arg(short = 'w', long = "with")]
        with: UserId,
    },

    /// Print a conversation and mark the counterpart's messages read
    History {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Send a single message
    Send {
        #[command(flatten)]
        target: TargetArgs,

        /// Message text
        message: String,
    },

    /// Start an interactive chat session
    Chat {
        #[command(flatten)]
        target: TargetArgs,

        /// Navigation location to resolve (e.g. /advisor-chat/12)
        #[arg(long)]
        location: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            api_url: None,
            no_realtime: false,
            command: Commands::Whoami,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        assert!(!cli.no_realtime);
    }

    #[test]
    fn test_parse_send_with_counterpart() {
        let cli = Cli::try_parse_from(["advisor-chat", "send", "--with", "42", "Hello"]).unwrap();
        match cli.command {
            Commands::Send { target, message } => {
                assert_eq!(target.target(), Some(ConversationTarget::Direct(42)));
                assert_eq!(message, "Hello");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_history_with_box() {
        let cli = Cli::try_parse_from(["advisor-chat", "history", "--box", "9"]).unwrap();
        match cli.command {
            Commands::History { target } => {
                assert_eq!(target.target(), Some(ConversationTarget::Container(9)));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_with_and_box_are_exclusive() {
        let result =
            Cli::try_parse_from(["advisor-chat", "history", "--with", "1", "--box", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_chat_with_location_and_flags() {
        let cli = Cli::try_parse_from([
            "advisor-chat",
            "--no-realtime",
            "--verbose",
            "chat",
            "--location",
            "/advisor-chat/12",
        ])
        .unwrap();
        assert!(cli.no_realtime);
        assert!(cli.verbose);
        match cli.command {
            Commands::Chat { target, location } => {
                assert_eq!(target.target(), None);
                assert_eq!(location.as_deref(), Some("/advisor-chat/12"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}

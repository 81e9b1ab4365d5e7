//! Special commands parser for interactive chat sessions
//!
//! Lines starting with `/` control the session instead of being sent:
//! switching conversation, reconnecting the live channel, listing contacts
//! and leaving. Commands are case-insensitive; their arguments are not.

use thiserror::Error;

use crate::models::ConversationTarget;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command was given an unsupported argument
    #[error("Unsupported argument for {command}: {arg}\n\nType '/help' to see valid usage")]
    UnsupportedArgument { command: String, arg: String },

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },
}

/// Special commands that can be executed during an interactive session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Make another conversation active
    Switch(ConversationTarget),

    /// Open (or create) the container shared with a counterpart
    OpenBox(i64),

    /// Tear down and re-open the live connection
    Reconnect,

    /// Show counterparts and unread counts
    Contacts,

    /// Redraw the active conversation
    Show,

    /// Connection and conversation status
    Status,

    /// Display help information
    Help,

    /// Leave the session
    Exit,

    /// Not a command; the line is a message
    None,
}

const SWITCH_USAGE: &str = "/switch <user:ID|box:ID>";
const OPEN_USAGE: &str = "/open <USER_ID>";

/// Parse one input line.
///
/// # Examples
///
/// ```
/// use advisor_chat::commands::special_commands::{parse_special_command, SpecialCommand};
/// use advisor_chat::models::ConversationTarget;
///
/// let cmd = parse_special_command("/switch user:42").unwrap();
/// assert_eq!(cmd, SpecialCommand::Switch(ConversationTarget::Direct(42)));
///
/// let cmd = parse_special_command("Hello").unwrap();
/// assert_eq!(cmd, SpecialCommand::None);
///
/// assert!(parse_special_command("/foo").is_err());
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (command, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((command, arg)) => (command.to_lowercase(), arg.trim()),
        None => (trimmed.to_lowercase(), ""),
    };

    match (command.as_str(), arg) {
        ("/switch" | "/s", "") => Err(CommandError::MissingArgument {
            command: "/switch".to_string(),
            usage: SWITCH_USAGE.to_string(),
        }),
        ("/switch" | "/s", arg) => arg
            .parse::<ConversationTarget>()
            .map(SpecialCommand::Switch)
            .map_err(|_| CommandError::UnsupportedArgument {
                command: "/switch".to_string(),
                arg: arg.to_string(),
            }),

        ("/open", "") => Err(CommandError::MissingArgument {
            command: "/open".to_string(),
            usage: OPEN_USAGE.to_string(),
        }),
        ("/open", arg) => arg.parse::<i64>().map(SpecialCommand::OpenBox).map_err(|_| {
            CommandError::UnsupportedArgument {
                command: "/open".to_string(),
                arg: arg.to_string(),
            }
        }),

        ("/reconnect", "") => Ok(SpecialCommand::Reconnect),
        ("/contacts", "") => Ok(SpecialCommand::Contacts),
        ("/show", "") => Ok(SpecialCommand::Show),
        ("/status", "") => Ok(SpecialCommand::Status),
        ("/help" | "/?", "") => Ok(SpecialCommand::Help),
        ("/quit" | "/exit" | "/q", "") => Ok(SpecialCommand::Exit),

        (
            command @ ("/reconnect" | "/contacts" | "/show" | "/status" | "/help" | "/quit"
            | "/exit"),
            arg,
        ) => Err(CommandError::UnsupportedArgument {
            command: command.to_string(),
            arg: arg.to_string(),
        }),

        (other, _) => Err(CommandError::UnknownCommand(other.to_string())),
    }
}

/// Print the interactive help text.
pub fn print_help() {
    println!(
        r#"
Interactive Chat Commands
=========================

  <text>              - Send a message to the active conversation
  /switch user:ID     - Chat directly with user ID
  /switch box:ID      - Chat in conversation container ID
  /open USER_ID       - Open (or create) the container shared with USER_ID
  /contacts           - List counterparts with unread counts
  /show               - Redraw the active conversation
  /status             - Show connection and conversation status
  /reconnect          - Re-open the live connection
  /help               - Show this help
  /quit               - Leave the session
"#
    );
}

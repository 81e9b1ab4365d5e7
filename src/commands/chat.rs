//! Interactive chat session
//!
//! Reads lines with rustyline on a dedicated thread and multiplexes them
//! with live events from the [`ChatClient`]. Plain lines are sent to the
//! active conversation; lines starting with `/` are session commands.

use std::sync::Arc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;

use crate::commands::conversations::print_contacts;
use crate::commands::special_commands::{parse_special_command, print_help, SpecialCommand};
use crate::commands::ClientContext;
use crate::error::Result;
use crate::models::ConversationTarget;
use crate::realtime::Connector;
use crate::sync::{ActivationOutcome, ChatClient, SyncUpdate};
use crate::view::{message_line, render_line};

/// One event from the line-reader thread.
#[derive(Debug)]
enum Input {
    Line(String),
    Interrupted,
    Eof,
    Failed(String),
}

/// Spawn the blocking line reader.
fn spawn_reader(prompt: String) -> mpsc::UnboundedReceiver<Input> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                let _ = tx.send(Input::Failed(e.to_string()));
                return;
            }
        };
        loop {
            let input = match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(trimmed);
                    Input::Line(trimmed.to_string())
                }
                Err(ReadlineError::Interrupted) => Input::Interrupted,
                Err(ReadlineError::Eof) => Input::Eof,
                Err(err) => Input::Failed(err.to_string()),
            };
            let last = !matches!(input, Input::Line(_));
            if tx.send(input).is_err() || last {
                break;
            }
        }
    });
    rx
}

/// Start an interactive chat session.
///
/// The initial conversation is `target` if given, otherwise the one
/// named by `location`, otherwise the first available one.
pub async fn run_chat(
    ctx: &ClientContext,
    connector: Arc<dyn Connector>,
    target: Option<ConversationTarget>,
    location: Option<String>,
) -> Result<()> {
    let mut client = ctx.chat_client(connector).await?;

    println!("{}", "Advisor chat. Type /help for commands.".bold());
    if !client.is_connected().await {
        println!("{}", "Live updates unavailable; messages go over HTTP.".yellow());
    }

    let initial = client.directory().resolve_active(target, location.as_deref());
    match initial {
        Some(initial) => switch_to(&mut client, initial).await?,
        None => {
            println!("{}", "No conversation available yet.".dimmed());
            print_contacts(client.directory(), client.reconciler());
        }
    }

    let mut input = spawn_reader("> ".to_string());

    loop {
        tokio::select! {
            line = input.recv() => {
                let line = match line {
                    Some(Input::Line(line)) => line,
                    Some(Input::Interrupted) => {
                        println!("CTRL-C");
                        break;
                    }
                    Some(Input::Eof) | None => {
                        println!("CTRL-D");
                        break;
                    }
                    Some(Input::Failed(err)) => {
                        eprintln!("Error: {:?}", err);
                        break;
                    }
                };
                if !handle_line(&mut client, &line).await {
                    break;
                }
            }
            event = client.next_event() => {
                let Some(event) = event else { break };
                match client.handle_event(event).await {
                    Ok(update) => print_update(&client, update),
                    Err(e) => tracing::warn!("Failed to apply live event: {e}"),
                }
            }
        }
    }

    client.stop().await;
    println!("Goodbye!");
    Ok(())
}

/// Handle one input line. Returns `false` when the session should end.
async fn handle_line(client: &mut ChatClient, line: &str) -> bool {
    let command = match parse_special_command(line) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            return true;
        }
    };

    let result = match command {
        SpecialCommand::None => match client.send(line).await {
            Ok(message) => {
                if let Some(me) = client.current_user() {
                    println!("{}", render_line(&message_line(&message, me.user_id)));
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
        SpecialCommand::Switch(target) => switch_to(client, target).await,
        SpecialCommand::OpenBox(counterpart) => match client.open_container(counterpart).await {
            Ok((_, outcome)) => {
                show_outcome(client, outcome);
                Ok(())
            }
            Err(e) => Err(e),
        },
        SpecialCommand::Reconnect => match client.reconnect().await {
            Ok(()) => {
                if client.is_connected().await {
                    println!("{}", "Reconnected.".green());
                } else {
                    println!("{}", "Live connection unavailable.".yellow());
                }
                Ok(())
            }
            Err(e) => Err(e),
        },
        SpecialCommand::Contacts => {
            print_contacts(client.directory(), client.reconciler());
            Ok(())
        }
        SpecialCommand::Show => {
            print!("{}", client.view().render());
            Ok(())
        }
        SpecialCommand::Status => {
            print_status(client).await;
            Ok(())
        }
        SpecialCommand::Help => {
            print_help();
            Ok(())
        }
        SpecialCommand::Exit => return false,
    };

    if let Err(e) = result {
        eprintln!("{}", format!("Error: {}", e).red());
    }
    true
}

async fn switch_to(client: &mut ChatClient, target: ConversationTarget) -> Result<()> {
    let outcome = client.activate(target).await?;
    show_outcome(client, outcome);
    Ok(())
}

fn show_outcome(client: &ChatClient, outcome: ActivationOutcome) {
    match outcome {
        ActivationOutcome::Applied | ActivationOutcome::Failed(_) => {
            print!("{}", client.view().render());
        }
        ActivationOutcome::Stale => {}
    }
}

fn print_update(client: &ChatClient, update: SyncUpdate) {
    let Some(me) = client.current_user().map(|u| u.user_id) else {
        return;
    };
    match update {
        SyncUpdate::Appended(id) => {
            if let Some(message) = client.store().get(id) {
                if !message.is_from(me) {
                    println!("{}", render_line(&message_line(message, me)));
                }
            }
        }
        SyncUpdate::Unread { counterpart, count } => {
            let name = client
                .directory()
                .counterpart(counterpart)
                .map(|u| u.display_label())
                .unwrap_or_else(|| format!("user #{}", counterpart));
            println!("{}", format!("New message from {} ({} unread)", name, count).cyan());
        }
        SyncUpdate::Read(id) => {
            tracing::debug!(message_id = id, "Message read by counterpart");
        }
        SyncUpdate::Buffered(_) | SyncUpdate::Ignored => {}
    }
}

async fn print_status(client: &ChatClient) {
    let connection = if client.is_connected().await {
        "live".green()
    } else {
        "HTTP only".yellow()
    };
    println!("Connection: {}", connection);
    match client.directory().active() {
        Some(target) => {
            let me = client.current_user().map(|u| u.user_id).unwrap_or_default();
            println!(
                "Conversation: {} ({} messages)",
                client.directory().label(target, me),
                client.store().len()
            );
        }
        None => println!("Conversation: none"),
    }
    println!("Unread elsewhere: {}", client.view().unread_elsewhere);
}

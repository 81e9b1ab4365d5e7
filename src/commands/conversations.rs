//! Non-interactive conversation commands
//!
//! `contacts`, `boxes`, `open-box`, `history` and `send`. Each runs against
//! a freshly started [`ChatClient`] (or, for `send`, the bare transport) and
//! prints a compact listing.

use std::sync::Arc;

use colored::Colorize;

use crate::commands::ClientContext;
use crate::directory::ConversationDirectory;
use crate::error::{ChatError, Result};
use crate::models::{ChatBox, ConversationTarget, Message, User, UserId};
use crate::realtime::Connector;
use crate::reconciler::ReadStateReconciler;
use crate::sync::{ActivationOutcome, ChatClient};
use crate::view::ConversationView;

/// Print counterparts with their unread counts.
pub fn print_contacts(directory: &ConversationDirectory, reconciler: &ReadStateReconciler) {
    if let Some(notice) = directory.notice() {
        println!("{}", notice.yellow());
    }
    if directory.counterparts().is_empty() {
        println!("{}", "No contacts.".dimmed());
        return;
    }
    for user in directory.counterparts() {
        let unread = reconciler.unread_count(user.user_id);
        let marker = if directory.default_counterpart() == Some(user.user_id) {
            " (your advisor)"
        } else {
            ""
        };
        if unread > 0 {
            println!(
                "{:>6}  {}{}  {}",
                user.user_id,
                user.display_label().bold(),
                marker,
                format!("{} unread", unread).cyan()
            );
        } else {
            println!("{:>6}  {}{}", user.user_id, user.display_label(), marker);
        }
    }
}

/// Counterparts for the signed-in role, with unread counts.
pub async fn contacts(ctx: &ClientContext, connector: Arc<dyn Connector>) -> Result<Vec<(User, u32)>> {
    let mut client = ctx.chat_client(connector).await?;
    print_contacts(client.directory(), client.reconciler());
    let rows: Vec<(User, u32)> = client
        .directory()
        .counterparts()
        .iter()
        .map(|u| (u.clone(), client.unread_count(u.user_id)))
        .collect();
    client.stop().await;
    Ok(rows)
}

/// Conversation containers of the signed-in user.
pub async fn boxes(ctx: &ClientContext, connector: Arc<dyn Connector>) -> Result<Vec<ChatBox>> {
    let mut client = ctx.chat_client(connector).await?;
    let me = current_user_id(&client)?;
    let containers = client.directory().containers().to_vec();
    if let Some(notice) = client.directory().notice() {
        println!("{}", notice.yellow());
    }
    if containers.is_empty() {
        println!("{}", "No conversations yet.".dimmed());
    }
    for chat_box in &containers {
        let unread = chat_box
            .partner_of(me)
            .map(|partner| client.unread_count(partner))
            .unwrap_or(0);
        let label = chat_box.partner_label(me);
        if unread > 0 {
            println!(
                "box:{:<6} {}  {}",
                chat_box.id,
                label.bold(),
                format!("{} unread", unread).cyan()
            );
        } else {
            println!("box:{:<6} {}", chat_box.id, label);
        }
    }
    client.stop().await;
    Ok(containers)
}

/// Look up or create the container shared with `counterpart`.
pub async fn open_box(
    ctx: &ClientContext,
    connector: Arc<dyn Connector>,
    counterpart: UserId,
) -> Result<ChatBox> {
    let mut client = ctx.chat_client(connector).await?;
    let chat_box = client.directory_mut().ensure_container(counterpart).await?;
    println!("Conversation box:{} with user #{}", chat_box.id, counterpart);
    client.stop().await;
    Ok(chat_box)
}

/// Print a conversation; the counterpart's unread messages are marked read.
pub async fn history(
    ctx: &ClientContext,
    connector: Arc<dyn Connector>,
    target: Option<ConversationTarget>,
) -> Result<ConversationView> {
    let mut client = ctx.chat_client(connector).await?;
    let target = client
        .directory()
        .resolve_active(target, None)
        .ok_or(ChatError::NoActiveConversation)?;

    if let ActivationOutcome::Failed(notice) = client.activate(target).await? {
        tracing::warn!("{}", notice);
    }
    let view = client.view();
    print!("{}", view.render());
    client.stop().await;
    Ok(view)
}

/// Send one message to `target`.
///
/// Goes over the live channel when it can be opened, over HTTP otherwise.
pub async fn send(
    ctx: &ClientContext,
    connector: Arc<dyn Connector>,
    target: Option<ConversationTarget>,
    content: &str,
) -> Result<Message> {
    if content.trim().is_empty() {
        return Err(ChatError::Validation("message is empty".to_string()).into());
    }
    ctx.restore().await?;

    let target = match target {
        Some(target) => target,
        None => {
            let mut directory = ConversationDirectory::new(ctx.session.clone(), Arc::clone(&ctx.api));
            directory.refresh().await?;
            directory
                .resolve_active(None, None)
                .ok_or(ChatError::NoActiveConversation)?
        }
    };

    let transport = ctx.transport(connector);
    if let Err(e) = transport.connect().await {
        tracing::warn!("Realtime unavailable, sending over HTTP: {e}");
    }
    let message = transport.send(target, content).await;
    transport.disconnect().await;
    let message = message?;

    println!("{} ({}, id {})", "Sent".green(), target, message.id);
    Ok(message)
}

fn current_user_id(client: &ChatClient) -> Result<UserId> {
    client
        .current_user()
        .map(|u| u.user_id)
        .ok_or_else(|| ChatError::MissingCredentials("not signed in".to_string()).into())
}

/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `auth`: login, logout and whoami
- `conversations`: contacts, containers, history and one-shot send
- `chat`: interactive chat session

Every handler starts from a [`ClientContext`]: the loaded configuration, the
session context, the REST client and the credential store. Handlers that
touch the realtime channel also take the [`Connector`] to use, so tests can
substitute the in-process fake.
*/

use std::sync::Arc;

use crate::api::ApiClient;
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::realtime::Connector;
use crate::session::{credential_store, CredentialStore, SessionContext};
use crate::sync::ChatClient;
use crate::transport::ChatTransport;

// Interactive chat session
pub mod chat;

// Contacts, containers, history and send
pub mod conversations;

// Slash-command parser for the interactive session
pub mod special_commands;

/// Shared building blocks for command handlers.
pub struct ClientContext {
    pub config: Config,
    pub session: SessionContext,
    pub api: Arc<ApiClient>,
    pub credentials: Box<dyn CredentialStore>,
}

impl ClientContext {
    /// Build a context using the credential backend selected in `config`.
    pub fn new(config: Config) -> Result<Self> {
        let credentials = credential_store(&config.credentials);
        Self::with_store(config, credentials)
    }

    /// Build a context around an explicit credential store.
    pub fn with_store(config: Config, credentials: Box<dyn CredentialStore>) -> Result<Self> {
        let session = SessionContext::new();
        let api = Arc::new(ApiClient::new(&config.server, session.clone())?);
        Ok(Self {
            config,
            session,
            api,
            credentials,
        })
    }

    /// Install the stored session.
    ///
    /// # Errors
    ///
    /// [`ChatError::MissingCredentials`] when nothing is stored.
    pub async fn restore(&self) -> Result<()> {
        if self.session.is_active().await {
            return Ok(());
        }
        match self.credentials.load()? {
            Some(session) => {
                self.session.begin(session).await;
                Ok(())
            }
            None => Err(ChatError::MissingCredentials(
                "not signed in; run `advisor-chat login`".to_string(),
            )
            .into()),
        }
    }

    /// Transport over `connector` sharing this context's session.
    pub fn transport(&self, connector: Arc<dyn Connector>) -> Arc<ChatTransport> {
        Arc::new(ChatTransport::new(
            self.config.server.clone(),
            self.config.realtime.clone(),
            self.session.clone(),
            Arc::clone(&self.api),
            connector,
        ))
    }

    /// Restore the session and start a [`ChatClient`].
    pub async fn chat_client(&self, connector: Arc<dyn Connector>) -> Result<ChatClient> {
        self.restore().await?;
        let mut client = ChatClient::new(self.session.clone(), self.transport(connector));
        client.start().await?;
        Ok(client)
    }
}

// Authentication command handlers
pub mod auth {
    use super::*;
    use crate::models::{LoginCredentials, User};
    use crate::session::Session;
    use colored::Colorize;

    /// Sign in and persist the session.
    ///
    /// # Errors
    ///
    /// [`ChatError::Validation`] without a password; authentication and
    /// storage errors otherwise.
    pub async fn login(ctx: &ClientContext, code: String, password: Option<String>) -> Result<User> {
        let password = password.filter(|p| !p.is_empty()).ok_or_else(|| {
            ChatError::Validation(
                "password required; pass --password or set ADVISOR_CHAT_PASSWORD".to_string(),
            )
        })?;

        let auth = ctx
            .api
            .login(&LoginCredentials {
                student_code: code,
                password,
            })
            .await?;

        let session = Session {
            access_token: auth.access_token,
            user: auth.user.clone(),
        };
        ctx.credentials.save(&session)?;
        ctx.session.begin(session).await;

        println!(
            "{} {} ({})",
            "Signed in as".green(),
            auth.user.display_label().bold(),
            auth.user.role
        );
        Ok(auth.user)
    }

    /// Sign out. The local credential is removed even if the backend call
    /// fails.
    pub async fn logout(ctx: &ClientContext) -> Result<()> {
        if ctx.restore().await.is_err() {
            println!("Not signed in.");
            return Ok(());
        }
        if let Err(e) = ctx.api.logout().await {
            tracing::warn!("Backend logout failed; clearing local session anyway: {e}");
        }
        ctx.session.end().await;
        ctx.credentials.clear()?;
        println!("{}", "Signed out.".green());
        Ok(())
    }

    /// Show the signed-in user.
    pub async fn whoami(ctx: &ClientContext) -> Result<User> {
        ctx.restore().await?;
        let user = ctx.session.require_user().await?;
        println!("{} ({}, id {})", user.display_label().bold(), user.role, user.user_id);
        if let Some(email) = &user.email {
            println!("  {}", email);
        }
        Ok(user)
    }

}

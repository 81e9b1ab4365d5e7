//! REST client for the advising backend
//!
//! [`ApiClient`] covers every HTTP endpoint the chat client consumes:
//! authentication, directory listings, conversation containers, message
//! history, and the request/response fallbacks for sending and
//! acknowledging messages when the realtime channel is unavailable.
//!
//! Every call except [`ApiClient::login`] carries the bearer credential of
//! the shared [`SessionContext`]. A `401` is reported as
//! [`ChatError::Authentication`]; any other non-success status as
//! [`ChatError::Api`].

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::ServerConfig;
use crate::error::{ChatError, Result};
use crate::models::{
    AuthResponse, ChatBox, ChatBoxId, LoginCredentials, Message, MessageId, User, UserId,
};
use crate::session::SessionContext;

/// HTTP client bound to one backend and one session context.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: url::Url,
    session: SessionContext,
}

impl ApiClient {
    /// Build a client for the backend described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] if `api_url` is not a valid URL, or an
    /// HTTP error if the underlying client cannot be constructed.
    pub fn new(config: &ServerConfig, session: SessionContext) -> Result<Self> {
        let mut base = url::Url::parse(&config.api_url)
            .map_err(|e| ChatError::Config(format!("Invalid api_url: {}", e)))?;
        // Relative joins replace the last path segment unless it ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            http,
            base,
            session,
        })
    }

    /// The session context this client authenticates with.
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    fn url(&self, path: &str) -> Result<url::Url> {
        self.base
            .join(path)
            .map_err(|e| ChatError::Config(format!("Invalid endpoint path '{}': {}", path, e)).into())
    }

    async fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.session.credential().await.ok_or_else(|| {
            ChatError::MissingCredentials("no access token in session".to_string())
        })?;
        Ok(req.bearer_auth(token))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let req = self.authorized(self.http.get(self.url(path)?)).await?;
        execute(req).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
        let req = self
            .authorized(self.http.post(self.url(path)?).json(&body))
            .await?;
        execute(req).await
    }

    // -----------------------------------------------------------------------
    // Authentication
    // -----------------------------------------------------------------------

    /// Exchange a student/staff code and password for a session.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Authentication`] when the backend rejects the
    /// credentials or answers without a token or user.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse> {
        tracing::info!(code = %credentials.student_code, "Signing in");
        let req = self.http.post(self.url("auth/login")?).json(credentials);
        let value: serde_json::Value = execute(req).await?;
        let auth: AuthResponse = serde_json::from_value(value).map_err(|e| {
            ChatError::Authentication(format!("invalid login response from server: {}", e))
        })?;
        if auth.access_token.is_empty() {
            return Err(
                ChatError::Authentication("server returned an empty access token".to_string())
                    .into(),
            );
        }
        Ok(auth)
    }

    /// Invalidate the current credential on the backend.
    pub async fn logout(&self) -> Result<()> {
        let req = self
            .authorized(self.http.post(self.url("auth/logout")?).json(&json!({})))
            .await?;
        let response = req.send().await?;
        check_status(response).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Directory
    // -----------------------------------------------------------------------

    /// All students visible to the signed-in user.
    pub async fn students(&self) -> Result<Vec<User>> {
        self.get("students").await
    }

    /// All advisors.
    pub async fn advisors(&self) -> Result<Vec<User>> {
        self.get("advisors").await
    }

    /// The signed-in student's assigned advisor, if any.
    pub async fn my_advisor(&self) -> Result<Option<User>> {
        match self.get::<Option<User>>("users/my-advisor").await {
            Ok(advisor) => Ok(advisor),
            Err(e) => match e.downcast_ref::<ChatError>() {
                Some(ChatError::Api { status: 404, .. }) => Ok(None),
                _ => Err(e),
            },
        }
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Message history with `counterpart`.
    pub async fn messages_with(&self, counterpart: UserId) -> Result<Vec<Message>> {
        self.get(&format!("chat/messages/{}", counterpart)).await
    }

    /// Message history inside container `chat_box`.
    pub async fn messages_in_box(&self, chat_box: ChatBoxId) -> Result<Vec<Message>> {
        self.get(&format!("chat/boxes/{}/messages", chat_box)).await
    }

    /// Every unread message addressed to the signed-in user.
    pub async fn unread_messages(&self) -> Result<Vec<Message>> {
        self.get("chat/unread").await
    }

    /// Send `content` to `receiver`.
    pub async fn send_message(&self, receiver: UserId, content: &str) -> Result<Message> {
        self.post(
            "chat/messages",
            json!({ "receiverId": receiver, "content": content }),
        )
        .await
    }

    /// Send `content` into container `chat_box`.
    pub async fn send_to_box(&self, chat_box: ChatBoxId, content: &str) -> Result<Message> {
        self.post(
            &format!("chat/boxes/{}/messages", chat_box),
            json!({ "content": content }),
        )
        .await
    }

    /// Mark `message` read.
    pub async fn mark_read(&self, message: MessageId) -> Result<Message> {
        self.post(&format!("chat/messages/{}/read", message), json!({}))
            .await
    }

    // -----------------------------------------------------------------------
    // Containers
    // -----------------------------------------------------------------------

    /// Containers the signed-in user participates in.
    pub async fn chat_boxes(&self) -> Result<Vec<ChatBox>> {
        self.get("chat/boxes").await
    }

    /// A single container.
    pub async fn chat_box(&self, id: ChatBoxId) -> Result<ChatBox> {
        self.get(&format!("chat/boxes/{}", id)).await
    }

    /// Create a container for an explicit student–advisor pair.
    pub async fn create_chat_box(&self, student: UserId, advisor: UserId) -> Result<ChatBox> {
        self.post(
            "chat/boxes",
            json!({ "student_id": student, "advisor_id": advisor }),
        )
        .await
    }

    /// Create a container with `counterpart`; the backend infers the other
    /// participant from the caller's role.
    pub async fn create_chat_box_with(&self, counterpart: UserId) -> Result<ChatBox> {
        self.post(&format!("chat/boxes/{}", counterpart), json!({}))
            .await
    }
}

async fn execute<T: DeserializeOwned>(req: RequestBuilder) -> Result<T> {
    let response = check_status(req.send().await?).await?;
    Ok(response.json::<T>().await?)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::debug!(status = status.as_u16(), body = %body, "Backend returned an error");

    if status == StatusCode::UNAUTHORIZED {
        return Err(ChatError::Authentication(
            "session expired or invalid; sign in again".to_string(),
        )
        .into());
    }

    let message = if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        body
    };
    Err(ChatError::Api {
        status: status.as_u16(),
        message,
    }
    .into())
}

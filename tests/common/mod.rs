use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use advisor_chat::api::ApiClient;
use advisor_chat::config::{RealtimeConfig, ServerConfig};
use advisor_chat::models::{MessageId, Role, User, UserId};
use advisor_chat::realtime::fake::{FakeConnector, FakeServer};
use advisor_chat::realtime::protocol::{ClientFrame, MARK_AS_READ, SEND_MESSAGE};
use advisor_chat::session::{Session, SessionContext};
use advisor_chat::sync::{ChatClient, SyncUpdate};
use advisor_chat::transport::ChatTransport;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Signed-in advisor.
#[allow(dead_code)]
pub const ME: UserId = 100;
/// Student counterparts.
#[allow(dead_code)]
pub const AN: UserId = 42;
#[allow(dead_code)]
pub const MAI: UserId = 7;

#[allow(dead_code)]
pub fn user(id: UserId, name: &str, role: Role) -> User {
    User {
        user_id: id,
        username: name.to_string(),
        role,
        email: None,
        student_code: None,
        class_name: None,
        phone_number: None,
    }
}

#[allow(dead_code)]
pub fn user_json(id: UserId, name: &str, role: &str) -> Value {
    json!({ "user_id": id, "username": name, "role": role })
}

#[allow(dead_code)]
fn name_of(id: UserId) -> (&'static str, &'static str) {
    match id {
        ME => ("binh", "advisor"),
        AN => ("an", "student"),
        MAI => ("mai", "student"),
        _ => ("someone", "student"),
    }
}

/// Message JSON from `from` to `to`, `minute` minutes into the test day.
#[allow(dead_code)]
pub fn message_json(id: MessageId, from: UserId, to: UserId, minute: u32, is_read: bool) -> Value {
    let (sender, sender_role) = name_of(from);
    let (receiver, receiver_role) = name_of(to);
    json!({
        "id": id,
        "content": format!("message {}", id),
        "sender": { "user_id": from, "username": sender, "role": sender_role },
        "receiver": { "user_id": to, "username": receiver, "role": receiver_role },
        "is_read": is_read,
        "created_at": format!("2024-03-01T{:02}:{:02}:00Z", 8 + minute / 60, minute % 60),
    })
}

/// Chat box JSON pairing `student` with `advisor`.
#[allow(dead_code)]
pub fn chat_box_json(id: i64, student: UserId, advisor: UserId) -> Value {
    json!({
        "id": id,
        "student_id": student,
        "advisor_id": advisor,
        "created_at": "2024-03-01T08:00:00Z",
    })
}

#[allow(dead_code)]
pub async fn mount_get(server: &MockServer, at: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[allow(dead_code)]
pub async fn mount_status(server: &MockServer, verb: &str, at: &str, status: u16) {
    Mock::given(method(verb))
        .and(path(at))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Directory listings for an advisor with students 42 and 7 and no
/// containers.
#[allow(dead_code)]
pub async fn mount_advisor_directory(server: &MockServer) {
    mount_advisor_directory_with_boxes(server, json!([])).await;
}

/// Same students as [`mount_advisor_directory`], with `boxes` as the
/// container listing.
#[allow(dead_code)]
pub async fn mount_advisor_directory_with_boxes(server: &MockServer, boxes: Value) {
    mount_get(
        server,
        "/students",
        json!([user_json(AN, "an", "student"), user_json(MAI, "mai", "student")]),
    )
    .await;
    mount_get(server, "/chat/boxes", boxes).await;
}

/// Message JSON addressed to container `chat_box`.
#[allow(dead_code)]
pub fn box_message_json(id: MessageId, from: UserId, chat_box: i64, minute: u32, is_read: bool) -> Value {
    let mut message = message_json(id, from, ME, minute, is_read);
    message["chat_box_id"] = json!(chat_box);
    message
}

/// Everything a test needs around one [`ChatTransport`].
#[allow(dead_code)]
pub struct Harness {
    pub mock: MockServer,
    pub session: SessionContext,
    pub api: Arc<ApiClient>,
    pub transport: Arc<ChatTransport>,
    pub connector: FakeConnector,
    pub server: FakeServer,
}

#[allow(dead_code)]
impl Harness {
    /// Signed in as advisor [`ME`], realtime enabled over the fake connector.
    pub async fn advisor() -> Self {
        Self::signed_in(user(ME, "binh", Role::Advisor)).await
    }

    pub async fn signed_in(me: User) -> Self {
        let session = SessionContext::with_session(Session {
            access_token: "tok".to_string(),
            user: me,
        });
        Self::with_session(session).await
    }

    pub async fn with_session(session: SessionContext) -> Self {
        let mock = MockServer::start().await;
        let server_config = ServerConfig {
            api_url: mock.uri(),
            ..ServerConfig::default()
        };
        let api = Arc::new(ApiClient::new(&server_config, session.clone()).expect("api client"));
        let (connector, server) = FakeConnector::new();
        let transport = Arc::new(ChatTransport::new(
            server_config,
            RealtimeConfig {
                enabled: true,
                ack_timeout_seconds: 1,
            },
            session.clone(),
            Arc::clone(&api),
            Arc::new(connector.clone()),
        ));
        Self {
            mock,
            session,
            api,
            transport,
            connector,
            server,
        }
    }

    pub fn client(&self) -> ChatClient {
        ChatClient::new(self.session.clone(), Arc::clone(&self.transport))
    }
}

/// Cooperative server behaviour: `sendMessage` is confirmed as message 1003
/// from [`ME`]; `markAsRead` echoes the message back as read.
#[allow(dead_code)]
pub fn cooperative(frame: &ClientFrame) -> Result<Value, String> {
    match frame.event.as_str() {
        SEND_MESSAGE => {
            let receiver = frame.data["receiverId"].as_i64().unwrap_or(AN);
            let mut sent = message_json(1003, ME, receiver, 30, false);
            sent["content"] = frame.data["content"].clone();
            Ok(sent)
        }
        MARK_AS_READ => {
            let id = frame.data["messageId"].as_i64().ok_or("missing messageId")?;
            Ok(message_json(id, AN, ME, 0, true))
        }
        other => Err(format!("unexpected event {}", other)),
    }
}

/// Wait for the next live event and apply it.
#[allow(dead_code)]
pub async fn next_update(client: &mut ChatClient) -> SyncUpdate {
    let event = tokio::time::timeout(Duration::from_secs(2), client.next_event())
        .await
        .expect("timed out waiting for a live event")
        .expect("inbox closed");
    client.handle_event(event).await.expect("apply event")
}

#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

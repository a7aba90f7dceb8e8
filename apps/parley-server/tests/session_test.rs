// End-to-end tests over a real TCP socket

use chrono::Duration;
use futures::{SinkExt, StreamExt};
use parley_core::{EngineConfig, Gateway, TokenAuthenticator};
use parley_server::{build_gateway, serve, ServerConfig};
use parley_store::UserId;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tempfile::NamedTempFile;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};

const SECRET: &str = "parley-server-test-secret-0123456789";

struct Server {
    _db_file: NamedTempFile,
    addr: SocketAddr,
    gateway: Gateway,
    auth: TokenAuthenticator,
}

impl Server {
    async fn start() -> Self {
        let db_file = NamedTempFile::new().expect("Failed to create temp file");
        let config = ServerConfig {
            db_path: db_file.path().to_path_buf(),
            jwt_secret: SECRET.to_string(),
            engine: EngineConfig::default(),
        };
        let gateway = build_gateway(&config).await.expect("Failed to build gateway");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, gateway.clone()));

        Self {
            _db_file: db_file,
            addr,
            gateway,
            auth: TokenAuthenticator::new(SECRET).unwrap(),
        }
    }

    async fn user(&self, name: &str) -> UserId {
        let id = UserId::from(name);
        self.gateway
            .service()
            .store()
            .users()
            .create(&id, name, None)
            .await
            .expect("Failed to create user");
        id
    }

    async fn befriend(&self, a: &UserId, b: &UserId) {
        let contacts = self.gateway.service().store().contacts();
        contacts.add(a, b, None).await.unwrap();
        contacts.add(b, a, None).await.unwrap();
    }

    async fn client(&self, handshake: Value) -> Client {
        let stream = TcpStream::connect(self.addr).await.expect("Failed to connect");
        let mut lines = Framed::new(stream, LinesCodec::new());
        lines.send(handshake.to_string()).await.unwrap();
        Client { lines }
    }

    /// Connect and complete the handshake as `user`
    async fn login(&self, user: &UserId) -> Client {
        let token = self.auth.issue(user, Duration::hours(1)).unwrap();
        let mut client = self.client(json!({ "token": token })).await;
        let welcome = client.recv().await.expect("No welcome frame");
        assert_eq!(welcome["event"], "connected");
        assert_eq!(welcome["data"]["userId"], user.as_str());
        client
    }
}

struct Client {
    lines: Framed<TcpStream, LinesCodec>,
}

impl Client {
    async fn recv(&mut self) -> Option<Value> {
        let next = tokio::time::timeout(std::time::Duration::from_secs(5), self.lines.next())
            .await
            .expect("Timed out waiting for a frame");
        next.map(|line| serde_json::from_str(&line.unwrap()).unwrap())
    }

    async fn request(&mut self, frame: Value) {
        self.lines.send(frame.to_string()).await.unwrap();
    }

    /// Read frames until the reply to `id`, returning it with any pushes seen
    async fn reply(&mut self, id: u64) -> (Value, Vec<Value>) {
        let mut pushes = Vec::new();
        loop {
            let frame = self.recv().await.expect("Connection closed");
            if frame.get("ack") == Some(&json!(id)) {
                return (frame, pushes);
            }
            pushes.push(frame);
        }
    }
}

#[tokio::test]
async fn test_bad_handshake_closes_connection() {
    let server = Server::start().await;
    server.user("alice").await;

    let mut client = server.client(json!({ "token": "not-a-jwt" })).await;
    assert!(client.recv().await.is_none());

    let mut client = server.client(json!({})).await;
    assert!(client.recv().await.is_none());

    let mut client = server.client(json!("hello")).await;
    assert!(client.recv().await.is_none());

    assert_eq!(server.gateway.service().hub().connection_count(), 0);
}

#[tokio::test]
async fn test_direct_message_round_trip() {
    let server = Server::start().await;
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;
    server.befriend(&alice, &bob).await;

    let mut bob_client = server.login(&bob).await;
    let mut alice_client = server.login(&alice).await;

    let presence = bob_client.recv().await.unwrap();
    assert_eq!(
        presence,
        json!({ "event": "userOnline", "data": { "userId": "alice" } })
    );

    alice_client
        .request(json!({
            "id": 1,
            "event": "sendMessage",
            "data": { "receiverId": "bob", "content": "hello bob" }
        }))
        .await;
    let (reply, _) = alice_client.reply(1).await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["data"]["content"], "hello bob");

    let push = bob_client.recv().await.unwrap();
    assert_eq!(push["event"], "newMessage");
    assert_eq!(push["data"]["senderId"], "alice");
    assert_eq!(push["data"]["id"], reply["data"]["id"]);

    bob_client
        .request(json!({ "id": 7, "event": "getUnreadCount" }))
        .await;
    let (reply, _) = bob_client.reply(7).await;
    assert_eq!(reply["data"], 1);

    bob_client
        .request(json!({
            "id": 8,
            "event": "markConversationRead",
            "data": { "userId": "alice" }
        }))
        .await;
    let (reply, _) = bob_client.reply(8).await;
    assert_eq!(reply["data"]["unreadCount"], 0);
    assert_eq!(reply["data"]["lastMessage"], "hello bob");
}

#[tokio::test]
async fn test_errors_are_replies_not_disconnects() {
    let server = Server::start().await;
    let alice = server.user("alice").await;
    server.user("bob").await;

    let mut client = server.login(&alice).await;

    client.request(json!("not an object")).await;
    let frame = client.recv().await.unwrap();
    assert_eq!(frame["ack"], Value::Null);
    assert_eq!(frame["code"], "INVALID_ARGUMENT");

    client
        .request(json!({ "id": 2, "event": "dropEverything", "data": {} }))
        .await;
    let (reply, _) = client.reply(2).await;
    assert_eq!(reply["code"], "INVALID_ARGUMENT");

    // Not contacts
    client
        .request(json!({
            "id": 3,
            "event": "sendMessage",
            "data": { "receiverId": "bob", "content": "hi" }
        }))
        .await;
    let (reply, _) = client.reply(3).await;
    assert_eq!(reply["code"], "PERMISSION_DENIED");
    assert!(reply.get("success").is_none());

    client
        .request(json!({ "id": 4, "event": "getConversations" }))
        .await;
    let (reply, _) = client.reply(4).await;
    assert_eq!(reply["data"], json!([]));
}

#[tokio::test]
async fn test_closing_socket_goes_offline() {
    let server = Server::start().await;
    let alice = server.user("alice").await;
    let bob = server.user("bob").await;

    let mut alice_client = server.login(&alice).await;
    let bob_client = server.login(&bob).await;
    let online = alice_client.recv().await.unwrap();
    assert_eq!(online["event"], "userOnline");

    drop(bob_client);

    let offline = alice_client.recv().await.unwrap();
    assert_eq!(
        offline,
        json!({ "event": "userOffline", "data": { "userId": "bob" } })
    );
    assert!(!server.gateway.service().hub().is_online(&bob));
}

#[tokio::test]
async fn test_oversized_line_is_rejected_without_disconnect() {
    let server = Server::start().await;
    let alice = server.user("alice").await;
    let mut client = server.login(&alice).await;

    let huge = json!({
        "id": 1,
        "event": "sendMessage",
        "data": { "receiverId": "bob", "content": "x".repeat(70_000) }
    });
    client.request(huge).await;
    client
        .request(json!({ "id": 2, "event": "getUnreadCount" }))
        .await;

    let frame = client.recv().await.expect("Connection closed");
    assert_eq!(frame["ack"], Value::Null);
    assert_eq!(frame["code"], "INVALID_ARGUMENT");

    let (reply, _) = client.reply(2).await;
    assert_eq!(reply["data"], 0);
    assert!(server.gateway.service().hub().is_online(&alice));
}

#[tokio::test]
async fn test_short_secret_is_refused() {
    let db_file = NamedTempFile::new().unwrap();
    let config = ServerConfig {
        db_path: db_file.path().to_path_buf(),
        jwt_secret: "too-short".to_string(),
        engine: EngineConfig::default(),
    };
    assert!(build_gateway(&config).await.is_err());
}

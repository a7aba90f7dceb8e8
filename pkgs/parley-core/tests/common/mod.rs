// Shared fixtures for engine integration tests

#![allow(dead_code)]

use chrono::Duration;
use futures::channel::mpsc;
use parley_core::{
    ChatService, EngineConfig, Gateway, Hub, ServerEvent, Session, StoreOracle,
    TokenAuthenticator,
};
use parley_store::{GroupInfo, Store, StoreConfig, UserId};
use std::sync::Arc;
use tempfile::NamedTempFile;

pub const SECRET: &str = "parley-test-secret-0123456789abcdef";

pub type Inbox = mpsc::UnboundedReceiver<ServerEvent>;

pub struct Harness {
    _db_file: NamedTempFile,
    pub store: Store,
    pub service: Arc<ChatService>,
    pub gateway: Gateway,
    pub auth: Arc<TokenAuthenticator>,
}

pub async fn harness() -> Harness {
    harness_with(EngineConfig::default()).await
}

pub async fn harness_with(config: EngineConfig) -> Harness {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let store = Store::open(StoreConfig {
        db_path: db_file.path().to_path_buf(),
    })
    .await
    .expect("Failed to open store");

    let oracle = Arc::new(StoreOracle::new(&store));
    let service = Arc::new(ChatService::new(
        store.clone(),
        Arc::new(Hub::new()),
        oracle,
        config,
    ));
    let auth = Arc::new(TokenAuthenticator::new(SECRET).expect("Failed to build authenticator"));
    let gateway = Gateway::new(service.clone(), auth.clone());

    Harness {
        _db_file: db_file,
        store,
        service,
        gateway,
        auth,
    }
}

impl Harness {
    pub async fn user(&self, name: &str) -> UserId {
        let id = UserId::from(name);
        self.store
            .users()
            .create(&id, name, None)
            .await
            .expect("Failed to create user");
        id
    }

    /// Make `a` and `b` mutual contacts
    pub async fn befriend(&self, a: &UserId, b: &UserId) {
        let contacts = self.store.contacts();
        contacts.add(a, b, None).await.expect("Failed to add contact");
        contacts.add(b, a, None).await.expect("Failed to add contact");
    }

    pub async fn group(&self, creator: &UserId, name: &str, members: &[UserId]) -> GroupInfo {
        self.store
            .groups()
            .create(creator, name, None, members)
            .await
            .expect("Failed to create group")
    }

    pub fn token(&self, user: &UserId) -> String {
        self.auth
            .issue(user, Duration::hours(1))
            .expect("Failed to issue token")
    }

    pub async fn connect(&self, user: &UserId) -> (Session, Inbox) {
        let (tx, rx) = mpsc::unbounded();
        let token = self.token(user);
        let session = self
            .gateway
            .connect(Some(&token), tx)
            .await
            .expect("Failed to connect");
        (session, rx)
    }
}

pub fn drain(inbox: &mut Inbox) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = inbox.try_next() {
        events.push(event);
    }
    events
}

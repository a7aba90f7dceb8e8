//! Parley Core - real-time delivery and conversation-state engine
//!
//! This crate keeps three things consistent under concurrent access: who is
//! reachable right now, what has been durably stored, and what has been read.
//!
//! # Architecture
//!
//! - **ConnectionRegistry**: live connection <-> user mapping, the source of
//!   truth for presence
//! - **RoomRouter**: `user:<id>` and `group:<id>` subscriptions for targeted
//!   and broadcast fanout
//! - **Hub**: both of the above behind one lock, plus presence and group
//!   membership notifications
//! - **MessageIngest**: validation and persistence, the only write path
//! - **DeliveryFanout**: best-effort push of persisted messages
//! - **ReadStateTracker**: read flags and unread counts
//! - **ConversationAggregator**: the ranked direct + group conversation feed
//! - **Gateway**: handshake authentication and request dispatch for
//!   transports
//!
//! Contact and group rules are consulted through a [`MembershipOracle`];
//! credentials are checked by an [`Authenticator`] once per connection.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use futures::channel::mpsc;
//! use parley_core::{
//!     ChatService, EngineConfig, Gateway, Hub, Request, StoreOracle, TokenAuthenticator,
//! };
//! use parley_store::{Store, StoreConfig, UserId};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open(StoreConfig::default()).await?;
//! let oracle = Arc::new(StoreOracle::new(&store));
//! let service = Arc::new(ChatService::new(
//!     store,
//!     Arc::new(Hub::new()),
//!     oracle,
//!     EngineConfig::default(),
//! ));
//! let auth = Arc::new(TokenAuthenticator::new("0123456789abcdef0123456789abcdef")?);
//! let gateway = Gateway::new(service, auth);
//!
//! let (outbox, _pushes) = mpsc::unbounded();
//! let session = gateway.connect(Some("<token>"), outbox).await?;
//! let ack = gateway
//!     .handle(
//!         &session,
//!         Request::SendMessage {
//!             receiver_id: UserId::from("bob"),
//!             content: "Hello!".into(),
//!         },
//!     )
//!     .await;
//! println!("{:?}", ack);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod conversations;
pub mod error;
pub mod events;
pub mod fanout;
pub mod gateway;
pub mod hub;
pub mod ingest;
pub mod oracle;
pub mod read_state;
pub mod registry;
pub mod rooms;
pub mod service;

pub use auth::{Authenticator, Claims, TokenAuthenticator};
pub use config::EngineConfig;
pub use conversations::{ConversationAggregator, ConversationItem};
pub use error::{ChatError, Result};
pub use events::{Ack, MessagePayload, Request, ServerEvent};
pub use fanout::DeliveryFanout;
pub use gateway::{Gateway, Session};
pub use hub::{DeliveryReport, Hub};
pub use ingest::MessageIngest;
pub use oracle::{MembershipOracle, StoreOracle};
pub use read_state::ReadStateTracker;
pub use registry::{ConnectionId, ConnectionRegistry, Departure, Outbox};
pub use rooms::{RoomName, RoomRouter};
pub use service::ChatService;

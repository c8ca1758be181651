//! `coopdesk-realtime`
//!
//! **Responsibility:** server-pushed change notifications.
//!
//! This crate provides:
//! - Dot-delimited subjects scoped by entity, event kind and owner
//! - A transport abstraction (in-memory for tests/dev, Redis pub/sub optional)
//! - A process-wide connection owner with explicit subscription handles
//!
//! Delivery is asynchronous and unordered relative to local mutations; the
//! only consumer contract is "something under this subject changed".

pub mod connection;
pub mod in_memory;
pub mod message;
#[cfg(feature = "redis")]
pub mod redis_pubsub;
pub mod subject;
pub mod transport;

pub use connection::{ConnectionState, RealtimeConnection, SubscriptionHandle};
pub use in_memory::InMemoryTransport;
pub use message::{RealtimeMessage, decode_message};
#[cfg(feature = "redis")]
pub use redis_pubsub::RedisPubSubTransport;
pub use subject::Subject;
pub use transport::{RealtimeTransport, Subscription, TransportError};

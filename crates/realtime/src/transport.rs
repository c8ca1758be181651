//! Publish/subscribe transport abstraction (mechanics only).
//!
//! A transport moves opaque byte payloads between publishers and subscribers
//! of a subject. It makes minimal assumptions:
//!
//! - **Best-effort delivery**: messages published while nobody listens are lost
//! - **No ordering across subjects**
//! - **No reconnect**: when the connection drops, every open [`Subscription`]
//!   ends and [`RealtimeTransport::lost`] reports the reason; reconnecting is
//!   the connection owner's job.

use async_trait::async_trait;
use coopdesk_core::ApiError;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::subject::Subject;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("realtime transport is not connected")]
    NotConnected,

    #[error("realtime backend error: {0}")]
    Backend(String),
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        ApiError::realtime(err.to_string())
    }
}

/// Raw message stream for one subject.
///
/// `recv` yields `None` once the transport drops the subscription (connection
/// closed or lost). Dropping the `Subscription` unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    subject: Subject,
    receiver: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Subscription {
    pub fn new(subject: Subject, receiver: mpsc::UnboundedReceiver<Vec<u8>>) -> Self {
        Self { subject, receiver }
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    /// Wait for the next payload.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.recv().await
    }

    /// Take a payload if one is already queued.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.receiver.try_recv().ok()
    }
}

/// Transport-agnostic pub/sub connection.
///
/// Implementations must be safe to share across tasks (`Send + Sync`).
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Open the underlying connection. Calling it while connected is a no-op.
    async fn connect(&self) -> Result<(), TransportError>;

    async fn publish(&self, subject: &Subject, payload: Vec<u8>) -> Result<(), TransportError>;

    async fn subscribe(&self, subject: &Subject) -> Result<Subscription, TransportError>;

    /// Close normally; open subscriptions end.
    async fn close(&self);

    /// Watch for abnormal connection loss. The value is `Some(reason)` once
    /// the connection dropped without `close` being called.
    fn lost(&self) -> watch::Receiver<Option<String>>;
}

//! In-memory transport for tests/dev.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::subject::Subject;
use crate::transport::{RealtimeTransport, Subscription, TransportError};

/// Process-local pub/sub.
///
/// - Exact subject match (no wildcards)
/// - Best-effort fan-out; dead subscribers are dropped while publishing
/// - `sever` simulates a dropped connection
#[derive(Debug)]
pub struct InMemoryTransport {
    inner: Mutex<Inner>,
    lost_tx: watch::Sender<Option<String>>,
}

#[derive(Debug, Default)]
struct Inner {
    connected: bool,
    subscribers: HashMap<Subject, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the connection as if the network went away.
    pub fn sever(&self, reason: impl Into<String>) {
        self.shutdown();
        self.lost_tx.send_replace(Some(reason.into()));
    }

    /// Number of live subscriptions on `subject`.
    pub fn subscriber_count(&self, subject: &Subject) -> usize {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(_) => return 0,
        };
        match inner.subscribers.get_mut(subject) {
            Some(subs) => {
                subs.retain(|tx| !tx.is_closed());
                subs.len()
            }
            None => 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().map(|i| i.connected).unwrap_or(false)
    }

    fn shutdown(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.connected = false;
            // Dropping the senders ends every open subscription.
            inner.subscribers.clear();
        }
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        let (lost_tx, _) = watch::channel(None);
        Self {
            inner: Mutex::new(Inner::default()),
            lost_tx,
        }
    }
}

#[async_trait]
impl RealtimeTransport for InMemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| TransportError::Backend("in-memory transport poisoned".into()))?;
        if !inner.connected {
            inner.connected = true;
            self.lost_tx.send_replace(None);
        }
        Ok(())
    }

    async fn publish(&self, subject: &Subject, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| TransportError::Backend("in-memory transport poisoned".into()))?;
        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        if let Some(subs) = inner.subscribers.get_mut(subject) {
            subs.retain(|tx| tx.send(payload.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, subject: &Subject) -> Result<Subscription, TransportError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| TransportError::Backend("in-memory transport poisoned".into()))?;
        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.entry(subject.clone()).or_default().push(tx);
        Ok(Subscription::new(subject.clone(), rx))
    }

    async fn close(&self) {
        self.shutdown();
    }

    fn lost(&self) -> watch::Receiver<Option<String>> {
        self.lost_tx.subscribe()
    }
}

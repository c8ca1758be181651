//! Redis pub/sub-backed transport (optional).
//!
//! Redis pub/sub is not durable: messages published while a subscriber is
//! offline are dropped. That matches the invalidation use case, where a missed
//! message only means a later refetch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use redis::Commands;
use tokio::sync::{mpsc, watch};

use crate::subject::Subject;
use crate::transport::{RealtimeTransport, Subscription, TransportError};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Redis pub/sub transport; one Redis channel per subject.
#[derive(Debug)]
pub struct RedisPubSubTransport {
    client: redis::Client,
    connected: Arc<AtomicBool>,
    lost_tx: Arc<watch::Sender<Option<String>>>,
}

impl RedisPubSubTransport {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, TransportError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| TransportError::Backend(e.to_string()))?;
        let (lost_tx, _) = watch::channel(None);
        Ok(Self {
            client,
            connected: Arc::new(AtomicBool::new(false)),
            lost_tx: Arc::new(lost_tx),
        })
    }

    fn require_connected(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

#[async_trait]
impl RealtimeTransport for RedisPubSubTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let client = self.client.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = client.get_connection()?;
            redis::cmd("PING").query::<String>(&mut conn)
        })
        .await
        .map_err(|e| TransportError::Backend(e.to_string()))?
        .map_err(|e| TransportError::Backend(e.to_string()))?;

        self.connected.store(true, Ordering::SeqCst);
        self.lost_tx.send_replace(None);
        Ok(())
    }

    async fn publish(&self, subject: &Subject, payload: Vec<u8>) -> Result<(), TransportError> {
        self.require_connected()?;

        let client = self.client.clone();
        let channel = subject.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = client.get_connection()?;
            conn.publish::<_, _, i64>(channel, payload)
        })
        .await
        .map_err(|e| TransportError::Backend(e.to_string()))?
        .map_err(|e| TransportError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn subscribe(&self, subject: &Subject) -> Result<Subscription, TransportError> {
        self.require_connected()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let channel = subject.to_string();
        let connected = self.connected.clone();
        let lost_tx = self.lost_tx.clone();

        // Background thread that receives pub/sub messages and forwards them.
        // It exits when the subscription is dropped, the transport is closed,
        // or Redis fails (which is reported as a lost connection).
        thread::spawn(move || {
            let report_loss = |reason: String| {
                if connected.swap(false, Ordering::SeqCst) {
                    tracing::warn!(%reason, "redis realtime connection lost");
                    lost_tx.send_replace(Some(reason));
                }
            };

            let mut conn = match client.get_connection() {
                Ok(c) => c,
                Err(e) => return report_loss(e.to_string()),
            };
            let mut pubsub = conn.as_pubsub();
            if let Err(e) = pubsub.subscribe(&channel) {
                return report_loss(e.to_string());
            }
            if let Err(e) = pubsub.set_read_timeout(Some(POLL_INTERVAL)) {
                return report_loss(e.to_string());
            }

            loop {
                if tx.is_closed() || !connected.load(Ordering::SeqCst) {
                    return;
                }

                let msg = match pubsub.get_message() {
                    Ok(m) => m,
                    Err(e) if e.is_timeout() => continue,
                    Err(e) => return report_loss(e.to_string()),
                };

                let payload: Vec<u8> = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                if tx.send(payload).is_err() {
                    return;
                }
            }
        });

        Ok(Subscription::new(subject.clone(), rx))
    }

    async fn close(&self) {
        // Subscriber threads observe the flag on their next poll and exit,
        // dropping their senders.
        self.connected.store(false, Ordering::SeqCst);
    }

    fn lost(&self) -> watch::Receiver<Option<String>> {
        self.lost_tx.subscribe()
    }
}

//! Realtime connection owner.
//!
//! One `RealtimeConnection` exists per process (shared as `Arc`). It walks the
//! state machine
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Closed { error } -> Disconnected
//! ```
//!
//! and hands out [`SubscriptionHandle`]s. There is no automatic reconnect:
//! after a loss the owner must call [`RealtimeConnection::connect`] again.

use std::sync::{Arc, Mutex as StdMutex, Weak};

use coopdesk_core::ApiError;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::message::{RealtimeMessage, decode_message};
use crate::subject::Subject;
use crate::transport::RealtimeTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Transient state on the way back to `Disconnected`; `error` is `None`
    /// for a normal close.
    Closed { error: Option<String> },
}

type LossCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Live connection bookkeeping. Cancelling `token` ends every subscription
/// opened on this connection.
struct Session {
    id: Uuid,
    token: CancellationToken,
    monitor: JoinHandle<()>,
}

pub struct RealtimeConnection {
    transport: Arc<dyn RealtimeTransport>,
    session: Mutex<Option<Session>>,
    state_tx: watch::Sender<ConnectionState>,
    on_lost: StdMutex<Vec<LossCallback>>,
}

impl core::fmt::Debug for RealtimeConnection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RealtimeConnection")
            .field("state", &*self.state_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl RealtimeConnection {
    pub fn new(transport: Arc<dyn RealtimeTransport>) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Arc::new(Self {
            transport,
            session: Mutex::new(None),
            state_tx,
            on_lost: StdMutex::new(Vec::new()),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Observe every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Register a callback fired once per abnormal close, with the reason.
    pub fn on_connection_lost(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        if let Ok(mut callbacks) = self.on_lost.lock() {
            callbacks.push(Arc::new(callback));
        }
    }

    /// Open the connection. Re-entrant calls reuse the live connection.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ApiError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        if let Err(err) = self.transport.connect().await {
            tracing::warn!(error = %err, "realtime connect failed");
            self.set_state(ConnectionState::Closed {
                error: Some(err.to_string()),
            });
            self.set_state(ConnectionState::Disconnected);
            return Err(err.into());
        }

        let id = Uuid::now_v7();
        let token = CancellationToken::new();
        let monitor = tokio::spawn(monitor_loss(
            Arc::downgrade(self),
            id,
            token.clone(),
            self.transport.lost(),
        ));

        *session = Some(Session { id, token, monitor });
        self.set_state(ConnectionState::Connected);
        tracing::info!(session = %id, "realtime connected");
        Ok(())
    }

    /// Close normally (logout). Every open subscription ends.
    pub async fn disconnect(&self) {
        let session = self.session.lock().await.take();
        let Some(session) = session else {
            return;
        };

        session.token.cancel();
        session.monitor.abort();
        self.transport.close().await;

        self.set_state(ConnectionState::Closed { error: None });
        self.set_state(ConnectionState::Disconnected);
        tracing::info!(session = %session.id, "realtime disconnected");
    }

    /// Subscribe to `subject`; decoded payloads go to `on_message` until the
    /// handle is closed or dropped, or the connection changes.
    pub async fn subscribe<F>(&self, subject: Subject, on_message: F) -> Result<SubscriptionHandle, ApiError>
    where
        F: Fn(RealtimeMessage) + Send + Sync + 'static,
    {
        let session = self.session.lock().await;
        let Some(session) = session.as_ref() else {
            return Err(ApiError::realtime("realtime connection is not established"));
        };

        let mut raw = self.transport.subscribe(&subject).await?;
        let token = session.token.child_token();
        let task_token = token.clone();
        let task_subject = subject.clone();

        let task = tokio::spawn(async move {
            loop {
                let bytes = tokio::select! {
                    _ = task_token.cancelled() => break,
                    msg = raw.recv() => match msg {
                        Some(bytes) => bytes,
                        None => break,
                    },
                };

                match decode_message(&bytes) {
                    Ok(payload) => on_message(RealtimeMessage {
                        subject: task_subject.clone(),
                        payload,
                    }),
                    Err(err) => {
                        tracing::warn!(subject = %task_subject, error = %err, "dropping undecodable realtime message");
                    }
                }
            }
            tracing::debug!(subject = %task_subject, "realtime subscription ended");
        });

        tracing::debug!(subject = %subject, "realtime subscription opened");
        Ok(SubscriptionHandle {
            id: Uuid::now_v7(),
            subject,
            token,
            task,
        })
    }

    /// Publish a JSON payload (tools, tests, and optimistic fan-out).
    pub async fn publish_json<T: Serialize>(&self, subject: &Subject, payload: &T) -> Result<(), ApiError> {
        if !self.is_connected() {
            return Err(ApiError::realtime("realtime connection is not established"));
        }
        let bytes = serde_json::to_vec(payload)
            .map_err(|e| ApiError::precondition(format!("failed to encode realtime payload: {e}")))?;
        self.transport.publish(subject, bytes).await?;
        Ok(())
    }

    async fn handle_loss(&self, session_id: Uuid, reason: String) {
        {
            let mut session = self.session.lock().await;
            match session.as_ref() {
                Some(s) if s.id == session_id => {
                    if let Some(s) = session.take() {
                        s.token.cancel();
                    }
                }
                _ => return,
            }
        }

        tracing::warn!(session = %session_id, %reason, "realtime connection lost");
        self.set_state(ConnectionState::Closed {
            error: Some(reason.clone()),
        });

        let callbacks = self
            .on_lost
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default();
        for callback in callbacks {
            callback(&reason);
        }

        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }
}

async fn monitor_loss(
    connection: Weak<RealtimeConnection>,
    session_id: Uuid,
    token: CancellationToken,
    mut lost: watch::Receiver<Option<String>>,
) {
    let reason = tokio::select! {
        _ = token.cancelled() => return,
        changed = lost.wait_for(|v| v.is_some()) => match changed {
            Ok(value) => value.clone().unwrap_or_default(),
            Err(_) => "realtime transport dropped".to_string(),
        },
    };

    if let Some(connection) = connection.upgrade() {
        connection.handle_loss(session_id, reason).await;
    }
}

/// An open subscription. Closing (or dropping) it unsubscribes.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: Uuid,
    subject: Subject,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }

    pub fn close(&self) {
        self.token.cancel();
    }

    /// Close and wait until the delivery task has stopped.
    pub async fn closed(mut self) {
        self.token.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

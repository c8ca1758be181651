//! Application-state container.
//!
//! Session, scope and teller-batch state live in one typed container that is
//! created once and injected (`Arc<AppState>`) into whatever needs it. There
//! is no global: tests build as many independent containers as they like.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use coopdesk_core::{BranchId, EntityId, OrganizationId, UserId};
use serde::{Deserialize, Serialize};

/// Authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

/// Organization/branch the user currently operates on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub organization_id: Option<OrganizationId>,
    pub branch_id: Option<BranchId>,
}

/// Currently open teller transaction batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBatch {
    pub batch_id: EntityId,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Slices {
    auth: Option<AuthSession>,
    scope: Scope,
    batch: Option<TransactionBatch>,
}

#[derive(Debug, Default)]
pub struct AppState {
    slices: RwLock<Slices>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session (login). Replaces any previous session and clears
    /// state that belonged to it.
    pub fn init(&self, session: AuthSession, scope: Scope) {
        if let Ok(mut s) = self.slices.write() {
            *s = Slices {
                auth: Some(session),
                scope,
                batch: None,
            };
        }
    }

    /// End the session (logout). Every slice returns to its initial value.
    pub fn reset(&self) {
        if let Ok(mut s) = self.slices.write() {
            *s = Slices::default();
        }
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.slices.read().ok().and_then(|s| s.auth.clone())
    }

    pub fn token(&self) -> Option<String> {
        self.slices
            .read()
            .ok()
            .and_then(|s| s.auth.as_ref().map(|a| a.token.clone()))
    }

    pub fn is_authenticated(&self) -> bool {
        self.session()
            .is_some_and(|s| !s.is_expired_at(Utc::now()))
    }

    pub fn scope(&self) -> Scope {
        self.slices.read().map(|s| s.scope.clone()).unwrap_or_default()
    }

    pub fn set_scope(&self, scope: Scope) {
        if let Ok(mut s) = self.slices.write() {
            s.scope = scope;
        }
    }

    pub fn transaction_batch(&self) -> Option<TransactionBatch> {
        self.slices.read().ok().and_then(|s| s.batch.clone())
    }

    /// Open a teller batch; returns the batch it replaced, if any.
    pub fn open_batch(&self, batch_id: EntityId) -> Option<TransactionBatch> {
        let mut s = self.slices.write().ok()?;
        s.batch.replace(TransactionBatch {
            batch_id,
            opened_at: Utc::now(),
        })
    }

    pub fn close_batch(&self) -> Option<TransactionBatch> {
        self.slices.write().ok().and_then(|mut s| s.batch.take())
    }
}

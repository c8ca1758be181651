//! Realtime → cache invalidation bridge.

use std::sync::Arc;

use coopdesk_core::ApiResult;
use coopdesk_realtime::{RealtimeConnection, RealtimeMessage, Subject, SubscriptionHandle};

use crate::cache::QueryCache;

/// "When `subject` fires, invalidate these prefixes."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationRule {
    pub subject: Subject,
    pub prefixes: Vec<String>,
}

impl InvalidationRule {
    pub fn new(subject: Subject, prefix: impl Into<String>) -> Self {
        Self {
            subject,
            prefixes: vec![prefix.into()],
        }
    }

    pub fn and(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }
}

/// Owns the subscriptions that keep the cache in step with server events.
///
/// Dropping the invalidator (or calling [`RealtimeInvalidator::close`])
/// unsubscribes everything it opened.
#[derive(Debug)]
pub struct RealtimeInvalidator {
    connection: Arc<RealtimeConnection>,
    cache: Arc<QueryCache>,
    handles: Vec<SubscriptionHandle>,
}

impl RealtimeInvalidator {
    pub fn new(connection: Arc<RealtimeConnection>, cache: Arc<QueryCache>) -> Self {
        Self {
            connection,
            cache,
            handles: Vec::new(),
        }
    }

    /// Subscribe one rule. Requires a live connection.
    pub async fn install(&mut self, rule: InvalidationRule) -> ApiResult<()> {
        let cache = self.cache.clone();
        let prefixes = rule.prefixes;

        self.install_with(rule.subject, move |message| {
            for prefix in &prefixes {
                let count = cache.invalidate_prefix(prefix);
                tracing::debug!(subject = %message.subject, prefix, count, "invalidated by realtime event");
            }
        })
        .await
    }

    /// Subscribe `subject` with a custom reaction. The subscription is owned
    /// (and closed) like the rule-based ones.
    pub async fn install_with<F>(&mut self, subject: Subject, on_message: F) -> ApiResult<()>
    where
        F: Fn(RealtimeMessage) + Send + Sync + 'static,
    {
        let handle = self.connection.subscribe(subject, on_message).await?;
        self.handles.push(handle);
        Ok(())
    }

    pub async fn install_all(&mut self, rules: impl IntoIterator<Item = InvalidationRule>) -> ApiResult<()> {
        for rule in rules {
            self.install(rule).await?;
        }
        Ok(())
    }

    /// Subjects with a live subscription.
    pub fn active_subjects(&self) -> Vec<&Subject> {
        self.handles
            .iter()
            .filter(|h| h.is_active())
            .map(|h| h.subject())
            .collect()
    }

    pub fn close(&mut self) {
        for handle in self.handles.drain(..) {
            handle.close();
        }
    }
}

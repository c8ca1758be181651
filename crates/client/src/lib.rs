//! `coopdesk-client`
//!
//! **Responsibility:** the data layer of the cooperative back-office client.
//!
//! This crate provides:
//! - Authenticated HTTP access with error normalization
//! - A generic resource factory (CRUD, search, bulk delete, export)
//! - A keyed query cache with prefix invalidation and request de-duplication
//! - Realtime-driven cache invalidation
//! - Process-wide session state and user notifications
//!
//! The API remains the authority; nothing here persists data locally.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod hooks;
pub mod http;
pub mod invalidation;
pub mod notify;
pub mod resource;
pub mod state;

use std::sync::Arc;

use coopdesk_core::{ApiResult, ResourceDescriptor};
use coopdesk_realtime::RealtimeConnection;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use cache::{FetchPolicy, QueryCache};
pub use catalog::{CatalogEntry, EventKind};
pub use config::{ClientConfig, ConfigError};
pub use download::ExportScope;
pub use hooks::{CachedResource, MutationOptions, QueryOptions};
pub use http::HttpClient;
pub use invalidation::{InvalidationRule, RealtimeInvalidator};
pub use notify::{Notification, NotificationLevel, Notifier, RecordingNotifier, TracingNotifier};
pub use resource::{BulkDelete, Resource};
pub use state::{AppState, AuthSession, Scope, TransactionBatch};

/// Everything one process shares: configuration, session state, the HTTP
/// client, the query cache and the notification sink.
///
/// Cloning is cheap; clones share the same cache and state.
#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    state: Arc<AppState>,
    http: HttpClient,
    cache: Arc<QueryCache>,
    notifier: Arc<dyn Notifier>,
}

impl core::fmt::Debug for Client {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Client")
            .field("api_url", &self.config.api_url.as_str())
            .field("cached_queries", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(config: ClientConfig, notifier: Arc<dyn Notifier>) -> ApiResult<Self> {
        let state = Arc::new(AppState::new());
        let http = HttpClient::new(&config, state.clone())?;
        let cache = Arc::new(
            QueryCache::new(config.stale_time, config.query_retry).with_idle_time(config.cache_idle_time),
        );
        Ok(Self {
            config,
            state,
            http,
            cache,
            notifier,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Cache-bound handle for any descriptor.
    pub fn resource<T, C, U>(&self, descriptor: ResourceDescriptor) -> CachedResource<T, C, U>
    where
        T: Serialize + DeserializeOwned,
        C: Serialize,
        U: Serialize,
    {
        let resource = Resource::new(descriptor, self.http.clone());
        CachedResource::new(resource, self.cache.clone(), self.notifier.clone())
    }

    /// Cache-bound handle for a catalog entry.
    pub fn entity<T, C, U>(&self, entry: CatalogEntry) -> ApiResult<CachedResource<T, C, U>>
    where
        T: Serialize + DeserializeOwned,
        C: Serialize,
        U: Serialize,
    {
        Ok(self.resource(entry.descriptor()?))
    }

    /// Invalidator bound to this client's cache.
    pub fn invalidator(&self, connection: Arc<RealtimeConnection>) -> RealtimeInvalidator {
        RealtimeInvalidator::new(connection, self.cache.clone())
    }

    /// Logout: session state returns to its initial values and every cached
    /// query is dropped, so nothing fetched under the old token survives.
    pub fn sign_out(&self) {
        self.state.reset();
        self.cache.clear();
        tracing::info!("session cleared");
    }
}

//! Cache-bound operations over a [`Resource`].
//!
//! [`CachedResource`] is what screens talk to. Reads go through the shared
//! [`QueryCache`] under structured keys; successful writes invalidate every
//! key of the resource's prefix. Failures (and, for writes, successes) raise
//! at most one notification per call, controlled by `show_message`.

use std::sync::Arc;
use std::time::Duration;

use coopdesk_core::{ApiResult, EntityId, PaginatedQuery, PaginatedResult, QueryKey};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::{FetchPolicy, QueryCache};
use crate::notify::{Notification, Notifier};
use crate::resource::Resource;

/// Options of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// `false` defers the query; the call returns its zero value without
    /// touching the network (or the cached value if there is one).
    pub enabled: bool,
    /// Retry count override; `None` uses the cache default.
    pub retry: Option<u32>,
    /// Notify on failure.
    pub show_message: bool,
    /// Stale window override.
    pub stale_time: Option<Duration>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            retry: None,
            show_message: true,
            stale_time: None,
        }
    }
}

impl QueryOptions {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn silent(mut self) -> Self {
        self.show_message = false;
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    fn policy(&self) -> FetchPolicy {
        FetchPolicy {
            stale_time: self.stale_time,
            retry: self.retry,
        }
    }
}

/// Options of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOptions {
    /// Notify on success and on failure.
    pub show_message: bool,
    /// Message of the success notification; a generic one is used otherwise.
    pub success_message: Option<String>,
    /// Extra prefixes to invalidate on success (dependent resources).
    pub invalidate_extra: Vec<String>,
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self {
            show_message: true,
            success_message: None,
            invalidate_extra: Vec::new(),
        }
    }
}

impl MutationOptions {
    pub fn silent(mut self) -> Self {
        self.show_message = false;
        self
    }

    pub fn success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    pub fn also_invalidate(mut self, prefix: impl Into<String>) -> Self {
        self.invalidate_extra.push(prefix.into());
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Mutation {
    Create,
    Update,
    Delete,
    DeleteMany,
}

impl Mutation {
    fn default_message(self, label: &str) -> String {
        match self {
            Mutation::Create => format!("{label} created"),
            Mutation::Update => format!("{label} updated"),
            Mutation::Delete => format!("{label} deleted"),
            Mutation::DeleteMany => format!("selected {label} records deleted"),
        }
    }
}

pub struct CachedResource<T, C = T, U = C> {
    resource: Resource<T, C, U>,
    cache: Arc<QueryCache>,
    notifier: Arc<dyn Notifier>,
}

impl<T, C, U> Clone for CachedResource<T, C, U> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
            cache: self.cache.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<T, C, U> CachedResource<T, C, U>
where
    T: Serialize + DeserializeOwned,
    C: Serialize,
    U: Serialize,
{
    pub fn new(resource: Resource<T, C, U>, cache: Arc<QueryCache>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            resource,
            cache,
            notifier,
        }
    }

    pub fn resource(&self) -> &Resource<T, C, U> {
        &self.resource
    }

    pub fn prefix(&self) -> &str {
        self.resource.prefix()
    }

    pub fn all_key(&self) -> QueryKey {
        QueryKey::all(self.prefix())
    }

    pub fn by_id_key(&self, id: &EntityId) -> QueryKey {
        QueryKey::by_id(self.prefix(), id)
    }

    pub fn paginated_key(&self, query: &PaginatedQuery) -> QueryKey {
        QueryKey::paginated(self.prefix(), query)
    }

    pub fn parent_key(&self, parent_kind: &str, parent_id: &EntityId) -> QueryKey {
        QueryKey::by_parent(self.prefix(), parent_kind, parent_id)
    }

    // ── reads ───────────────────────────────────────────────────────────

    pub async fn get_all(&self, options: &QueryOptions) -> ApiResult<Vec<T>> {
        let key = self.all_key();
        if !options.enabled {
            return Ok(self.cache.peek(&key).unwrap_or_default());
        }
        let result = self
            .cache
            .fetch(&key, options.policy(), || self.resource.get_all())
            .await;
        self.report_query(result, options)
    }

    pub async fn get_by_id(&self, id: &EntityId, options: &QueryOptions) -> ApiResult<Option<T>> {
        if !options.enabled {
            return Ok(self.cache.peek(&self.by_id_key(id)));
        }
        if let Err(err) = id.require() {
            return self.report_query(Err(err), options);
        }
        let key = self.by_id_key(id);
        let result = self
            .cache
            .fetch(&key, options.policy(), || self.resource.get_by_id(id))
            .await;
        self.report_query(result, options).map(Some)
    }

    pub async fn get_paginated(&self, query: &PaginatedQuery, options: &QueryOptions) -> ApiResult<PaginatedResult<T>> {
        if !options.enabled {
            return Ok(self.peek_paginated(query));
        }
        let key = self.paginated_key(query);
        let result = self
            .cache
            .fetch(&key, options.policy(), || self.resource.get_paginated(query))
            .await;
        self.report_query(result, options)
    }

    pub async fn get_all_for_parent(
        &self,
        parent_kind: &str,
        parent_id: &EntityId,
        options: &QueryOptions,
    ) -> ApiResult<Vec<T>> {
        let key = self.parent_key(parent_kind, parent_id);
        if !options.enabled {
            return Ok(self.cache.peek(&key).unwrap_or_default());
        }
        let result = self
            .cache
            .fetch(&key, options.policy(), || {
                self.resource.get_all_for_parent(parent_kind, parent_id)
            })
            .await;
        self.report_query(result, options)
    }

    /// Cached page (possibly stale) or the zero-valued placeholder. Never
    /// touches the network.
    pub fn peek_paginated(&self, query: &PaginatedQuery) -> PaginatedResult<T> {
        self.cache
            .peek(&self.paginated_key(query))
            .unwrap_or_else(|| PaginatedResult::placeholder(query.pagination))
    }

    // ── writes ──────────────────────────────────────────────────────────

    pub async fn create(&self, payload: &C, options: &MutationOptions) -> ApiResult<T> {
        let result = self.resource.create(payload).await;
        self.report_mutation(Mutation::Create, result, options)
    }

    pub async fn update_by_id(&self, id: &EntityId, payload: &U, options: &MutationOptions) -> ApiResult<T> {
        let result = self.resource.update_by_id(id, payload).await;
        self.report_mutation(Mutation::Update, result, options)
    }

    pub async fn delete_by_id(&self, id: &EntityId, options: &MutationOptions) -> ApiResult<()> {
        let result = self.resource.delete_by_id(id).await;
        self.report_mutation(Mutation::Delete, result, options)
    }

    pub async fn delete_many(&self, ids: &[EntityId], options: &MutationOptions) -> ApiResult<()> {
        let result = self.resource.delete_many(ids).await;
        self.report_mutation(Mutation::DeleteMany, result, options)
    }

    /// Invalidate everything cached for this resource.
    pub fn invalidate(&self) -> usize {
        self.cache.invalidate_prefix(self.prefix())
    }

    fn report_query<R>(&self, result: ApiResult<R>, options: &QueryOptions) -> ApiResult<R> {
        if let Err(err) = &result {
            if options.show_message {
                self.notifier.notify(Notification::error(err.message()));
            }
        }
        result
    }

    fn report_mutation<R>(&self, mutation: Mutation, result: ApiResult<R>, options: &MutationOptions) -> ApiResult<R> {
        match &result {
            Ok(_) => {
                self.cache.invalidate_prefix(self.prefix());
                for prefix in &options.invalidate_extra {
                    self.cache.invalidate_prefix(prefix);
                }
                if options.show_message {
                    let message = options
                        .success_message
                        .clone()
                        .unwrap_or_else(|| mutation.default_message(self.prefix()));
                    self.notifier.notify(Notification::success(message));
                }
            }
            Err(err) => {
                tracing::debug!(resource = self.prefix(), ?mutation, error = %err, "mutation failed");
                if options.show_message {
                    self.notifier.notify(Notification::error(err.message()));
                }
            }
        }
        result
    }
}

//! Keyed, time-windowed cache of server data.
//!
//! - Values are stored type-erased as JSON and deserialized per read.
//! - A value younger than the stale window is served without a request.
//! - Concurrent reads of an equal key share one fetch and its outcome,
//!   success or failure (per-key async lock plus a completion counter).
//! - Invalidation marks entries stale; it never deletes data, so a failed
//!   refetch still leaves the last good value available through `peek`.
//! - Entries without a value are dropped once their fetch fails, and entries
//!   unused for the idle window are swept when new keys arrive.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use coopdesk_core::{ApiError, ApiResult, QueryKey};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;

use crate::config::{DEFAULT_CACHE_IDLE_TIME, DEFAULT_QUERY_RETRY, DEFAULT_STALE_TIME};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Per-read overrides of the cache defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchPolicy {
    pub stale_time: Option<Duration>,
    pub retry: Option<u32>,
}

#[derive(Debug)]
struct EntryState {
    value: Option<Value>,
    fetched_at: Option<Instant>,
    stale: bool,
    /// Bumped by every invalidation; a fetch that started under an older
    /// generation stores its result as stale.
    generation: u64,
    /// Bumped whenever a fetch finishes, successfully or not.
    completed: u64,
    /// Failure of the most recent fetch, handed to callers that waited on it.
    last_error: Option<ApiError>,
    last_used: Instant,
}

impl Default for EntryState {
    fn default() -> Self {
        Self {
            value: None,
            fetched_at: None,
            stale: false,
            generation: 0,
            completed: 0,
            last_error: None,
            last_used: Instant::now(),
        }
    }
}

#[derive(Debug, Default)]
struct Entry {
    fetch_lock: tokio::sync::Mutex<()>,
    state: Mutex<EntryState>,
}

impl Entry {
    fn fresh_value(&self, stale_time: Duration) -> Option<Value> {
        let state = self.state.lock().ok()?;
        let fetched_at = state.fetched_at?;
        if state.stale || fetched_at.elapsed() >= stale_time {
            return None;
        }
        state.value.clone()
    }

    fn generation(&self) -> u64 {
        self.state.lock().map(|s| s.generation).unwrap_or_default()
    }

    fn completed(&self) -> u64 {
        self.state.lock().map(|s| s.completed).unwrap_or_default()
    }

    fn has_value(&self) -> bool {
        self.state.lock().map(|s| s.value.is_some()).unwrap_or_default()
    }

    fn touch(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.last_used = Instant::now();
        }
    }

    fn idle_for(&self) -> Duration {
        self.state.lock().map(|s| s.last_used.elapsed()).unwrap_or_default()
    }

    fn store(&self, value: Value, started_generation: u64) {
        if let Ok(mut state) = self.state.lock() {
            let now = Instant::now();
            state.value = Some(value);
            state.fetched_at = Some(now);
            state.last_used = now;
            state.stale = state.generation != started_generation;
            state.completed += 1;
            state.last_error = None;
        }
    }

    fn fail(&self, err: ApiError) {
        if let Ok(mut state) = self.state.lock() {
            state.completed += 1;
            state.last_error = Some(err);
        }
    }

    /// Outcome of the fetch that finished last. `None` when that fetch
    /// produced nothing `T` can be read from.
    fn outcome<T: DeserializeOwned>(&self) -> Option<ApiResult<T>> {
        let state = self.state.lock().ok()?;
        if let Some(err) = &state.last_error {
            return Some(Err(err.clone()));
        }
        let value = state.value.clone()?;
        serde_json::from_value(value).ok().map(Ok)
    }

    fn invalidate(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.stale = true;
            state.generation += 1;
        }
    }
}

#[derive(Debug)]
pub struct QueryCache {
    entries: Mutex<HashMap<QueryKey, Arc<Entry>>>,
    stale_time: Duration,
    idle_time: Duration,
    retry: u32,
    last_sweep: Mutex<Instant>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_TIME, DEFAULT_QUERY_RETRY)
    }
}

impl QueryCache {
    pub fn new(stale_time: Duration, retry: u32) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            stale_time,
            idle_time: DEFAULT_CACHE_IDLE_TIME,
            retry,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// How long an entry may go unread before it is evicted.
    pub fn with_idle_time(mut self, idle_time: Duration) -> Self {
        self.idle_time = idle_time;
        self
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    pub fn idle_time(&self) -> Duration {
        self.idle_time
    }

    /// Read `key`, fetching through `fetcher` when missing or stale.
    ///
    /// `fetcher` may be called more than once when retries are enabled.
    pub async fn fetch<T, F, Fut>(&self, key: &QueryKey, policy: FetchPolicy, fetcher: F) -> ApiResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        let stale_time = policy.stale_time.unwrap_or(self.stale_time);
        let entry = self.entry(key)?;
        entry.touch();

        if let Some(value) = cached_as::<T>(&entry, stale_time) {
            tracing::trace!(%key, "cache hit");
            return Ok(value);
        }

        let seen = entry.completed();
        let _fetching = entry.fetch_lock.lock().await;

        // A fetch finished while we waited; its outcome is ours too.
        if entry.completed() != seen {
            if let Some(outcome) = entry.outcome::<T>() {
                tracing::trace!(%key, "shared in-flight fetch");
                return outcome;
            }
        }
        if let Some(value) = cached_as::<T>(&entry, stale_time) {
            tracing::trace!(%key, "cache hit after in-flight fetch");
            return Ok(value);
        }

        let generation = entry.generation();
        let retry = policy.retry.unwrap_or(self.retry);
        match fetch_with_retry(key, retry, &fetcher).await {
            Ok(fetched) => {
                match serde_json::to_value(&fetched) {
                    Ok(value) => entry.store(value, generation),
                    Err(err) => tracing::warn!(%key, error = %err, "fetched value is not cacheable"),
                }
                Ok(fetched)
            }
            Err(err) => {
                entry.fail(err.clone());
                self.forget_if_empty(key, &entry);
                Err(err)
            }
        }
    }

    /// The cached value regardless of staleness.
    pub fn peek<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let entry = self.entries.lock().ok()?.get(key).cloned()?;
        entry.touch();
        let value = entry.state.lock().ok()?.value.clone()?;
        serde_json::from_value(value).ok()
    }

    /// Write a value directly (e.g. seeding a `by-id` entry from a mutation
    /// response). The value counts as freshly fetched.
    pub fn set<T: Serialize>(&self, key: &QueryKey, value: &T) -> ApiResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| ApiError::local(format!("value is not cacheable: {e}")))?;
        let entry = self.entry(key)?;
        let generation = entry.generation();
        entry.store(value, generation);
        Ok(())
    }

    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        self.entries
            .lock()
            .ok()
            .and_then(|e| e.get(key).cloned())
            .is_some_and(|entry| entry.fresh_value(self.stale_time).is_some())
    }

    /// How many times `key` has been invalidated, or `None` when it is not
    /// cached.
    pub fn generation(&self, key: &QueryKey) -> Option<u64> {
        let entry = self.entries.lock().ok()?.get(key).cloned()?;
        Some(entry.generation())
    }

    /// Mark every entry under `prefix` stale. Returns how many were marked.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let Ok(entries) = self.entries.lock() else {
            return 0;
        };
        let mut count = 0;
        for (key, entry) in entries.iter() {
            if key.has_prefix(prefix) {
                entry.invalidate();
                count += 1;
            }
        }
        tracing::debug!(prefix, count, "cache invalidated");
        count
    }

    /// Mark one entry stale. Unknown keys are ignored.
    pub fn invalidate_key(&self, key: &QueryKey) -> bool {
        let entry = self.entries.lock().ok().and_then(|e| e.get(key).cloned());
        match entry {
            Some(entry) => {
                entry.invalidate();
                true
            }
            None => false,
        }
    }

    /// Drop every entry under `prefix` (e.g. data of another branch after a
    /// scope switch).
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        let before = entries.len();
        entries.retain(|key, _| !key.has_prefix(prefix));
        before - entries.len()
    }

    /// Drop entries nobody has read for the idle window. Entries with a
    /// fetch in flight are kept. Returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        let Ok(mut entries) = self.entries.lock() else {
            return 0;
        };
        self.sweep(&mut entries)
    }

    /// Drop everything (logout).
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, key: &QueryKey) -> ApiResult<Arc<Entry>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| ApiError::local("query cache lock poisoned"))?;
        if let Some(entry) = entries.get(key) {
            return Ok(entry.clone());
        }
        if self.sweep_due() {
            self.sweep(&mut entries);
        }
        Ok(entries.entry(key.clone()).or_default().clone())
    }

    fn sweep_due(&self) -> bool {
        let Ok(mut last) = self.last_sweep.lock() else {
            return false;
        };
        if last.elapsed() < self.idle_time {
            return false;
        }
        *last = Instant::now();
        true
    }

    fn sweep(&self, entries: &mut HashMap<QueryKey, Arc<Entry>>) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| entry.fetch_lock.try_lock().is_err() || entry.idle_for() < self.idle_time);
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, "idle cache entries evicted");
        }
        evicted
    }

    /// Remove `entry` from the map if it never held a value. Callers still
    /// waiting on it keep their own handle and read its outcome.
    fn forget_if_empty(&self, key: &QueryKey, entry: &Arc<Entry>) {
        if entry.has_value() {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            if entries.get(key).is_some_and(|current| Arc::ptr_eq(current, entry)) {
                entries.remove(key);
            }
        }
    }
}

fn cached_as<T: DeserializeOwned>(entry: &Entry, stale_time: Duration) -> Option<T> {
    let value = entry.fresh_value(stale_time)?;
    // A shape mismatch is treated as a miss and refetched.
    serde_json::from_value(value).ok()
}

async fn fetch_with_retry<T, F, Fut>(key: &QueryKey, retry: u32, fetcher: &F) -> ApiResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut delay = RETRY_BASE_DELAY;
    let mut attempt = 0;
    loop {
        match fetcher().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < retry && err.is_retryable() => {
                attempt += 1;
                tracing::debug!(%key, attempt, error = %err, "retrying query");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(err) => return Err(err),
        }
    }
}

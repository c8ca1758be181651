//! Resource data-layer factory.
//!
//! One generic [`Resource`] replaces the per-entity API modules: given a
//! descriptor it exposes the conventional CRUD + search calls of a backend
//! collection. Each method performs exactly one HTTP call and returns
//! [`ApiError`] on any failure; preconditions are checked before the call.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use coopdesk_core::{ApiError, ApiResult, EntityId, PaginatedQuery, PaginatedResult, ResourceDescriptor};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::download::{self, ExportScope};
use crate::http::HttpClient;

/// Body of `DELETE /{resource}/bulk-delete`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDelete {
    pub ids: Vec<EntityId>,
}

/// Typed client for one backend collection.
///
/// `T` is the entity returned by the server, `C` the create payload and `U`
/// the update payload (both default to the entity itself).
#[derive(Debug)]
pub struct Resource<T, C = T, U = C> {
    descriptor: ResourceDescriptor,
    http: HttpClient,
    _types: PhantomData<fn() -> (T, C, U)>,
}

impl<T, C, U> Clone for Resource<T, C, U> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            http: self.http.clone(),
            _types: PhantomData,
        }
    }
}

impl<T, C, U> Resource<T, C, U>
where
    T: DeserializeOwned,
    C: Serialize,
    U: Serialize,
{
    pub fn new(descriptor: ResourceDescriptor, http: HttpClient) -> Self {
        Self {
            descriptor,
            http,
            _types: PhantomData,
        }
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    pub fn prefix(&self) -> &str {
        self.descriptor.cache_key_prefix()
    }

    /// `POST /{resource}`
    pub async fn create(&self, payload: &C) -> ApiResult<T> {
        self.http.post_json(self.descriptor.base_url(), payload).await
    }

    /// `GET /{resource}/{id}`
    pub async fn get_by_id(&self, id: &EntityId) -> ApiResult<T> {
        let path = self.descriptor.path(&[id.require()?]);
        self.http.get_json(&path).await
    }

    /// `PUT /{resource}/{id}`
    pub async fn update_by_id(&self, id: &EntityId, payload: &U) -> ApiResult<T> {
        let path = self.descriptor.path(&[id.require()?]);
        self.http.put_json(&path, payload).await
    }

    /// `DELETE /{resource}/{id}`
    pub async fn delete_by_id(&self, id: &EntityId) -> ApiResult<()> {
        let path = self.descriptor.path(&[id.require()?]);
        self.http.delete(&path).await
    }

    /// `DELETE /{resource}/bulk-delete`; partial failures are reported by
    /// the server as one aggregate error.
    pub async fn delete_many(&self, ids: &[EntityId]) -> ApiResult<()> {
        if ids.is_empty() {
            return Err(ApiError::precondition("no records selected for deletion"));
        }
        for id in ids {
            id.require()?;
        }
        let body = BulkDelete { ids: ids.to_vec() };
        self.http
            .delete_with_body(&self.descriptor.path(&["bulk-delete"]), &body)
            .await
    }

    /// `GET /{resource}`
    pub async fn get_all(&self) -> ApiResult<Vec<T>> {
        self.http.get_json(self.descriptor.base_url()).await
    }

    /// `GET /{resource}/search?pageIndex&pageSize&sort&filter`
    pub async fn get_paginated(&self, query: &PaginatedQuery) -> ApiResult<PaginatedResult<T>> {
        let pairs = query.to_query_pairs()?;
        let page: PaginatedResult<T> = self
            .http
            .get_json_with_query(&self.descriptor.path(&["search"]), &pairs)
            .await?;
        if !page.is_well_formed() {
            tracing::warn!(
                resource = self.prefix(),
                total_size = page.total_size,
                total_page = page.total_page,
                page_size = page.page_size,
                returned = page.data.len(),
                "server returned an inconsistent page envelope"
            );
        }
        Ok(page)
    }

    /// `GET /{resource}/{parent_kind}/{parent_id}`: children of a parent
    /// entity (e.g. holidays of one branch).
    pub async fn get_all_for_parent(&self, parent_kind: &str, parent_id: &EntityId) -> ApiResult<Vec<T>> {
        if parent_kind.trim().is_empty() {
            return Err(ApiError::precondition("parent kind is required"));
        }
        let path = self.descriptor.path(&[parent_kind, parent_id.require()?]);
        self.http.get_json(&path).await
    }

    /// Download an export of the collection into `dest_dir/file_name`.
    pub async fn export(&self, scope: &ExportScope, file_name: &str, dest_dir: &Path) -> ApiResult<PathBuf> {
        let target = download::target_path(dest_dir, file_name)?;
        let (segment, query) = scope.request()?;
        let bytes = self
            .http
            .get_bytes(&self.descriptor.path(&[segment]), &query)
            .await?;
        download::write_file(&target, &bytes).await?;
        tracing::info!(resource = self.prefix(), path = %target.display(), bytes = bytes.len(), "export saved");
        Ok(target)
    }
}

//! Authenticated REST calls against the back-office API.

use std::sync::Arc;

use coopdesk_core::{ApiError, ApiResult};
use reqwest::{Method, RequestBuilder, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::{normalize_response, normalize_transport};
use crate::state::AppState;

pub const ORGANIZATION_HEADER: &str = "x-organization-id";
pub const BRANCH_HEADER: &str = "x-branch-id";

/// Thin wrapper over `reqwest::Client`.
///
/// Every call attaches the API root, the bearer token of the current session
/// and the session scope headers; every failure comes back as [`ApiError`].
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    state: Arc<AppState>,
    fallback_token: Option<String>,
}

impl HttpClient {
    pub fn new(config: &ClientConfig, state: Arc<AppState>) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.api_url.clone(),
            state,
            fallback_token: config.auth_token.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Absolute URL of an API-relative path.
    pub fn url(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::precondition(format!("invalid request path {path:?}: {e}")))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let url = self.url(path)?;
        self.send_json(Method::GET, url, |r| r).await
    }

    pub async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> ApiResult<T> {
        let url = self.url_with_query(path, query)?;
        self.send_json(Method::GET, url, |r| r).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        let url = self.url(path)?;
        self.send_json(Method::POST, url, |r| r.json(body)).await
    }

    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        let url = self.url(path)?;
        self.send_json(Method::PUT, url, |r| r.json(body)).await
    }

    pub async fn delete(&self, path: &str) -> ApiResult<()> {
        let url = self.url(path)?;
        self.send_empty(Method::DELETE, url, |r| r).await
    }

    pub async fn delete_with_body<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiResult<()> {
        let url = self.url(path)?;
        self.send_empty(Method::DELETE, url, |r| r.json(body)).await
    }

    /// Raw bytes of a download endpoint.
    pub async fn get_bytes(&self, path: &str, query: &[(String, String)]) -> ApiResult<Vec<u8>> {
        let url = self.url_with_query(path, query)?;
        let response = self.send(Method::GET, url, |r| r).await?;
        let bytes = response.bytes().await.map_err(|e| normalize_transport(&e))?;
        Ok(bytes.to_vec())
    }

    fn url_with_query(&self, path: &str, query: &[(String, String)]) -> ApiResult<Url> {
        let mut url = self.url(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in query {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut req = self.http.request(method, url);

        if let Some(token) = self.state.token().or_else(|| self.fallback_token.clone()) {
            req = req.bearer_auth(token);
        }

        let scope = self.state.scope();
        if let Some(org) = scope.organization_id {
            req = req.header(ORGANIZATION_HEADER, org.as_str());
        }
        if let Some(branch) = scope.branch_id {
            req = req.header(BRANCH_HEADER, branch.as_str());
        }
        req
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> ApiResult<reqwest::Response> {
        tracing::debug!(%method, path = url.path(), "api request");
        let req = build(self.request(method.clone(), url.clone()));

        let response = req.send().await.map_err(|e| {
            let err = normalize_transport(&e);
            tracing::warn!(%method, path = url.path(), error = %err, "api transport failure");
            err
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = normalize_response(status, &body);
        tracing::warn!(%method, path = url.path(), status = status.as_u16(), error = %err, "api request failed");
        Err(err)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> ApiResult<T> {
        let response = self.send(method, url, build).await?;
        let body = response.text().await.map_err(|e| normalize_transport(&e))?;
        serde_json::from_str(&body).map_err(|e| ApiError::decode(format!("unexpected response body: {e}")))
    }

    async fn send_empty(
        &self,
        method: Method,
        url: Url,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> ApiResult<()> {
        self.send(method, url, build).await?;
        Ok(())
    }
}

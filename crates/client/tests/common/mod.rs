//! In-process mock of the back-office REST API.
//!
//! Serves every collection generically under `/{resource}` and records what
//! it saw so tests can assert on request counts, headers and bodies. The
//! `broken` collection always fails.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use coopdesk_client::{Client, ClientConfig, RecordingNotifier};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Default)]
pub struct Store {
    collections: HashMap<String, BTreeMap<u64, Value>>,
    next_id: u64,
    hits: HashMap<String, usize>,
    pub bulk_deletes: Vec<Vec<String>>,
    pub last_query: HashMap<String, String>,
    pub last_headers: HashMap<String, String>,
}

impl Store {
    fn hit(&mut self, key: String, headers: &HeaderMap) {
        *self.hits.entry(key).or_default() += 1;
        self.last_headers = headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
    }

    fn insert(&mut self, resource: &str, mut item: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id;
        item["id"] = json!(id.to_string());
        self.collections
            .entry(resource.to_string())
            .or_default()
            .insert(id, item.clone());
        item
    }

    fn items(&self, resource: &str) -> Vec<Value> {
        self.collections
            .get(resource)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }
}

pub type Shared = Arc<Mutex<Store>>;

pub struct TestServer {
    pub base_url: String,
    pub store: Shared,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let store: Shared = Arc::new(Mutex::new(Store::default()));
        let app = router(store.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            store,
            handle,
        }
    }

    /// Client (with a recording notifier) pointed at this server.
    pub fn client(&self) -> (Client, Arc<RecordingNotifier>) {
        let config = ClientConfig::new(&self.base_url)
            .unwrap()
            .with_token("test-token");
        let notifier = Arc::new(RecordingNotifier::new());
        let client = Client::new(config, notifier.clone()).unwrap();
        (client, notifier)
    }

    /// Number of requests seen for `"METHOD /path"`, e.g. `"GET /branch/search"`.
    pub fn hits(&self, key: &str) -> usize {
        self.store.lock().unwrap().hits.get(key).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.store.lock().unwrap().hits.values().sum()
    }

    pub fn seed(&self, resource: &str, item: Value) -> Value {
        self.store.lock().unwrap().insert(resource, item)
    }

    pub fn seed_branches(&self, count: usize) {
        for n in 1..=count {
            self.seed(
                "branch",
                json!({ "organizationId": "1", "name": format!("Branch {n}") }),
            );
        }
    }

    pub fn len(&self, resource: &str) -> usize {
        self.store.lock().unwrap().items(resource).len()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn router(store: Shared) -> Router {
    Router::new()
        .route("/:resource", get(list).post(create))
        .route("/:resource/search", get(search))
        .route("/:resource/bulk-delete", delete(bulk_delete))
        .route("/:resource/export", get(export_all))
        .route("/:resource/export-search", get(export_search))
        .route("/:resource/export-selected", get(export_selected))
        .route("/:resource/:id", get(get_one).put(update).delete(delete_one))
        // `/{resource}/{parent_kind}/{parent_id}`; the router needs one name per position.
        .route("/:resource/:id/:parent_id", get(list_for_parent))
        .with_state(store)
}

fn failure(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn broken() -> Response {
    failure(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "message": "ledger service unavailable" }),
    )
}

async fn list(State(store): State<Shared>, Path(resource): Path<String>, headers: HeaderMap) -> Response {
    let mut s = store.lock().unwrap();
    s.hit(format!("GET /{resource}"), &headers);
    if resource == "broken" {
        return broken();
    }
    Json(s.items(&resource)).into_response()
}

async fn create(
    State(store): State<Shared>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut s = store.lock().unwrap();
    s.hit(format!("POST /{resource}"), &headers);
    let named = body
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|n| !n.trim().is_empty());
    if !named {
        return failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "errors": [{ "field": "name", "message": "name is required" }] }),
        );
    }
    let item = s.insert(&resource, body);
    (StatusCode::CREATED, Json(item)).into_response()
}

async fn search(
    State(store): State<Shared>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    // Long enough for concurrent callers to overlap.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut s = store.lock().unwrap();
    s.hit(format!("GET /{resource}/search"), &headers);
    s.last_query = params.clone();

    let page_index: u64 = params.get("pageIndex").and_then(|v| v.parse().ok()).unwrap_or(1);
    let page_size: u64 = params.get("pageSize").and_then(|v| v.parse().ok()).unwrap_or(10);
    if page_size == 0 {
        return failure(StatusCode::BAD_REQUEST, json!({ "message": "pageSize must be positive" }));
    }

    let items = s.items(&resource);
    let total_size = items.len() as u64;
    let skip = page_index.saturating_sub(1) * page_size;
    let data: Vec<Value> = items
        .into_iter()
        .skip(skip as usize)
        .take(page_size as usize)
        .collect();

    Json(json!({
        "data": data,
        "pages": [],
        "totalSize": total_size,
        "totalPage": total_size.div_ceil(page_size),
        "pageIndex": page_index,
        "pageSize": page_size,
    }))
    .into_response()
}

async fn get_one(
    State(store): State<Shared>,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut s = store.lock().unwrap();
    s.hit(format!("GET /{resource}/{id}"), &headers);
    let found = id
        .parse::<u64>()
        .ok()
        .and_then(|n| s.collections.get(&resource).and_then(|c| c.get(&n)).cloned());
    match found {
        Some(item) => Json(item).into_response(),
        None => failure(
            StatusCode::NOT_FOUND,
            json!({ "error": { "message": format!("{resource} {id} not found") } }),
        ),
    }
}

async fn update(
    State(store): State<Shared>,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut s = store.lock().unwrap();
    s.hit(format!("PUT /{resource}/{id}"), &headers);
    let Some(n) = id.parse::<u64>().ok() else {
        return failure(StatusCode::BAD_REQUEST, json!({ "message": "malformed id" }));
    };
    let Some(item) = s.collections.get_mut(&resource).and_then(|c| c.get_mut(&n)) else {
        return failure(StatusCode::NOT_FOUND, json!({ "message": "not found" }));
    };
    if let (Some(target), Some(patch)) = (item.as_object_mut(), body.as_object()) {
        for (k, v) in patch {
            target.insert(k.clone(), v.clone());
        }
    }
    Json(item.clone()).into_response()
}

async fn delete_one(
    State(store): State<Shared>,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut s = store.lock().unwrap();
    s.hit(format!("DELETE /{resource}/{id}"), &headers);
    let removed = id
        .parse::<u64>()
        .ok()
        .and_then(|n| s.collections.get_mut(&resource).and_then(|c| c.remove(&n)));
    match removed {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => failure(
            StatusCode::NOT_FOUND,
            json!({ "message": format!("{resource} {id} not found") }),
        ),
    }
}

#[derive(Deserialize)]
struct BulkBody {
    ids: Vec<String>,
}

async fn bulk_delete(
    State(store): State<Shared>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Json(body): Json<BulkBody>,
) -> Response {
    let mut s = store.lock().unwrap();
    s.hit(format!("DELETE /{resource}/bulk-delete"), &headers);
    s.bulk_deletes.push(body.ids.clone());
    // Unknown ids are skipped; the server only reports aggregate failure.
    if let Some(collection) = s.collections.get_mut(&resource) {
        for id in &body.ids {
            if let Ok(n) = id.parse::<u64>() {
                collection.remove(&n);
            }
        }
    }
    StatusCode::OK.into_response()
}

fn csv(items: &[Value]) -> String {
    let mut out = String::from("id,name\n");
    for item in items {
        let id = item["id"].as_str().unwrap_or_default();
        let name = item["name"].as_str().unwrap_or_default();
        out.push_str(&format!("{id},{name}\n"));
    }
    out
}

fn attachment(body: String) -> Response {
    (
        [
            ("content-type", "text/csv"),
            ("content-disposition", "attachment; filename=\"server-name.csv\""),
        ],
        body,
    )
        .into_response()
}

async fn export_all(State(store): State<Shared>, Path(resource): Path<String>, headers: HeaderMap) -> Response {
    let mut s = store.lock().unwrap();
    s.hit(format!("GET /{resource}/export"), &headers);
    attachment(csv(&s.items(&resource)))
}

async fn export_search(
    State(store): State<Shared>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut s = store.lock().unwrap();
    s.hit(format!("GET /{resource}/export-search"), &headers);
    s.last_query = params;
    attachment(csv(&s.items(&resource)))
}

async fn export_selected(
    State(store): State<Shared>,
    Path(resource): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut s = store.lock().unwrap();
    s.hit(format!("GET /{resource}/export-selected"), &headers);
    let wanted: Vec<String> = params
        .get("ids")
        .map(|ids| ids.split(',').map(str::to_string).collect())
        .unwrap_or_default();
    s.last_query = params;
    let selected: Vec<Value> = s
        .items(&resource)
        .into_iter()
        .filter(|item| item["id"].as_str().is_some_and(|id| wanted.iter().any(|w| w == id)))
        .collect();
    attachment(csv(&selected))
}

async fn list_for_parent(
    State(store): State<Shared>,
    Path((resource, kind, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    let mut s = store.lock().unwrap();
    s.hit(format!("GET /{resource}/{kind}/{id}"), &headers);
    let field = format!("{kind}Id");
    let children: Vec<Value> = s
        .items(&resource)
        .into_iter()
        .filter(|item| item[&field].as_str() == Some(id.as_str()))
        .collect();
    Json(children).into_response()
}

//! Test doubles and common utilities for the contract tests
//!
//! [`FakeKibana`] is an in-memory stand-in for the three Kibana endpoints
//! kbsync talks to. It injects server-owned fields on reads like the real
//! thing, records every request, and can be told to fail the next call.

#![allow(dead_code)]

use kbsync_core::error::{Error, Result};
use kbsync_core::traits::{HttpMethod, RemoteClient};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Alias Kibana reports for a space that never had its log source configured
pub const DEFAULT_LOG_ALIAS: &str = "filebeat-*,kibana_sample_data_logs*";

#[derive(Default)]
struct Store {
    index_patterns: HashMap<(String, String), Value>,
    saved_objects: HashMap<(String, String), Value>,
    log_sources: HashMap<String, String>,
}

/// In-memory Kibana
pub struct FakeKibana {
    store: Mutex<Store>,
    next_ids: Mutex<VecDeque<String>>,
    id_counter: AtomicUsize,
    requests: Mutex<Vec<(HttpMethod, String, Option<Value>)>>,
    fail_next: Mutex<Option<Error>>,
}

impl FakeKibana {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(Store::default()),
            next_ids: Mutex::new(VecDeque::new()),
            id_counter: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
        })
    }

    /// Id the next index pattern create will be assigned
    pub fn assign_next_id(&self, id: &str) {
        self.next_ids.lock().unwrap().push_back(id.to_string());
    }

    /// Fail the next request with `err`, without touching the store
    pub fn fail_next(&self, err: Error) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<(HttpMethod, String, Option<Value>)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of requests with a state-changing verb
    pub fn write_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(method, _, _)| method.is_write())
            .count()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    /// Remove an index pattern behind kbsync's back
    pub fn delete_index_pattern_out_of_band(&self, space: &str, id: &str) {
        self.store
            .lock()
            .unwrap()
            .index_patterns
            .remove(&(space.to_string(), id.to_string()));
    }

    /// Remove a saved object behind kbsync's back
    pub fn delete_saved_object_out_of_band(&self, space: &str, id: &str) {
        self.store
            .lock()
            .unwrap()
            .saved_objects
            .remove(&(space.to_string(), id.to_string()));
    }

    pub fn index_pattern_count(&self) -> usize {
        self.store.lock().unwrap().index_patterns.len()
    }

    pub fn saved_object(&self, space: &str, id: &str) -> Option<Value> {
        self.store
            .lock()
            .unwrap()
            .saved_objects
            .get(&(space.to_string(), id.to_string()))
            .cloned()
    }

    pub fn log_alias(&self, space: &str) -> Option<String> {
        self.store.lock().unwrap().log_sources.get(space).cloned()
    }

    fn next_id(&self) -> String {
        self.next_ids.lock().unwrap().pop_front().unwrap_or_else(|| {
            let n = self.id_counter.fetch_add(1, Ordering::SeqCst);
            format!("generated-{}", n)
        })
    }

    fn route(&self, method: HttpMethod, path: &str, body: Option<&Value>) -> Result<Value> {
        let path = path.split('?').next().unwrap_or_default();
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let mut store = self.store.lock().unwrap();

        match (method, segments.as_slice()) {
            (HttpMethod::Post, ["s", space, "api", "index_patterns", "index_pattern"]) => {
                let inner = body
                    .and_then(|b| b.get("index_pattern"))
                    .cloned()
                    .ok_or_else(|| Error::api(400, "missing index_pattern"))?;
                let id = self.next_id();
                let mut stored = json!({
                    "id": id,
                    "title": inner["title"].clone(),
                    "fields": {},
                    "version": "WzEsMV0="
                });
                if let Some(field) = inner.get("timeFieldName") {
                    stored["timeFieldName"] = field.clone();
                }
                store
                    .index_patterns
                    .insert((space.to_string(), id), stored.clone());
                Ok(json!({ "index_pattern": stored }))
            }
            (method, ["s", space, "api", "index_patterns", "index_pattern", id]) => {
                let key = (space.to_string(), id.to_string());
                match method {
                    HttpMethod::Get => store
                        .index_patterns
                        .get(&key)
                        .map(|p| json!({ "index_pattern": p }))
                        .ok_or_else(not_found),
                    HttpMethod::Post => {
                        let existing = store.index_patterns.get_mut(&key).ok_or_else(not_found)?;
                        if let Some(title) = body.and_then(|b| b.pointer("/index_pattern/title")) {
                            existing["title"] = title.clone();
                        }
                        Ok(json!({ "index_pattern": existing.clone() }))
                    }
                    HttpMethod::Delete => store
                        .index_patterns
                        .remove(&key)
                        .map(|_| Value::Null)
                        .ok_or_else(not_found),
                    _ => Err(Error::api(405, "Method Not Allowed")),
                }
            }
            (method, ["s", space, "api", "saved_objects", object_type, id]) => {
                let key = (space.to_string(), id.to_string());
                match method {
                    HttpMethod::Post | HttpMethod::Put => {
                        if method == HttpMethod::Put && !store.saved_objects.contains_key(&key) {
                            return Err(not_found());
                        }
                        let mut stored = body.cloned().unwrap_or_else(|| json!({}));
                        stored["id"] = json!(id);
                        stored["type"] = json!(object_type);
                        stored["namespaces"] = json!([space]);
                        stored["updated_at"] = json!("2024-05-01T10:00:00.000Z");
                        stored["version"] = json!("WzEsMV0=");
                        stored["references"] = json!([]);
                        store.saved_objects.insert(key, stored.clone());
                        Ok(stored)
                    }
                    HttpMethod::Get => store.saved_objects.get(&key).cloned().ok_or_else(not_found),
                    HttpMethod::Delete => store
                        .saved_objects
                        .remove(&key)
                        .map(|_| json!({}))
                        .ok_or_else(not_found),
                    _ => Err(Error::api(405, "Method Not Allowed")),
                }
            }
            (
                method,
                ["s", space, "api", "infra", "log_source_configurations", "default"],
            ) => match method {
                HttpMethod::Get => {
                    let alias = store
                        .log_sources
                        .get(*space)
                        .cloned()
                        .unwrap_or_else(|| DEFAULT_LOG_ALIAS.to_string());
                    Ok(json!({
                        "data": {
                            "id": "default",
                            "version": "WzMsMV0=",
                            "configuration": { "name": "Default", "logAlias": alias }
                        }
                    }))
                }
                HttpMethod::Patch => {
                    let alias = body
                        .and_then(|b| b.pointer("/data/logAlias"))
                        .and_then(Value::as_str)
                        .ok_or_else(|| Error::api(400, "missing data.logAlias"))?;
                    store.log_sources.insert(space.to_string(), alias.to_string());
                    Ok(json!({
                        "source": { "configuration": { "logAlias": alias } }
                    }))
                }
                _ => Err(Error::api(405, "Method Not Allowed")),
            },
            _ => Err(not_found()),
        }
    }
}

fn not_found() -> Error {
    Error::api(404, "Not Found")
}

#[async_trait::async_trait]
impl RemoteClient for FakeKibana {
    async fn request(&self, method: HttpMethod, path: &str, body: Option<&Value>) -> Result<Value> {
        self.requests
            .lock()
            .unwrap()
            .push((method, path.to_string(), body.cloned()));

        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }

        self.route(method, path, body)
    }

    fn client_name(&self) -> &'static str {
        "fake-kibana"
    }
}

/// Coerce the fake into the trait object the core expects
pub fn as_client(fake: &Arc<FakeKibana>) -> Arc<dyn RemoteClient> {
    fake.clone()
}

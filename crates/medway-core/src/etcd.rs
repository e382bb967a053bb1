//! etcd coordination store
//!
//! TigerStyle: Speaks the etcd v3 JSON gateway through [`HttpClient`]. Keys
//! and values travel base64-encoded and int64 fields as decimal strings.
//! Unary calls try each endpoint in order until one answers.
//!
//! Watches remember the last revision seen per prefix, so a re-subscribe
//! resumes after it instead of dropping the changes made in between. A
//! watch cancelled by compaction forgets the revision and starts fresh.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::future::ready;
use futures::stream::{self, StreamExt};
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::constants::LEASE_TTL_SECS_MAX;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpRequest};
use crate::io::TimeProvider;
use crate::store::{
    CoordinationStore, KeepAliveStream, LeaseId, LeaseTick, WatchEvent, WatchStream,
};

/// Default client endpoint of a local etcd
pub const ETCD_ENDPOINT_DEFAULT: &str = "http://127.0.0.1:2379";

/// Request timeout of the watch client; a watch ends and is resumed after this
pub const ETCD_WATCH_TIMEOUT_MS: u64 = 60 * 60 * 1000;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum Int64Repr {
    Text(String),
    Number(i64),
}

fn de_i64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    match Int64Repr::deserialize(deserializer)? {
        Int64Repr::Number(n) => Ok(n),
        Int64Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ResponseHeader {
    #[serde(deserialize_with = "de_i64")]
    revision: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KeyValue {
    key: String,
    value: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RangeResponse {
    kvs: Vec<KeyValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeleteRangeResponse {
    #[serde(deserialize_with = "de_i64")]
    deleted: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LeaseResponse {
    #[serde(rename = "ID", deserialize_with = "de_i64")]
    id: i64,
    #[serde(rename = "TTL", deserialize_with = "de_i64")]
    ttl: i64,
    error: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct KeepAliveEnvelope {
    result: Option<LeaseResponse>,
    error: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WatchResponse {
    header: ResponseHeader,
    canceled: bool,
    #[serde(deserialize_with = "de_i64")]
    compact_revision: i64,
    cancel_reason: String,
    events: Vec<WireEvent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireEvent {
    /// Absent for PUT
    #[serde(rename = "type")]
    kind: String,
    kv: KeyValue,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WatchEnvelope {
    result: Option<WatchResponse>,
    error: Option<Value>,
}

// =============================================================================
// Encoding
// =============================================================================

fn encode(text: &str) -> String {
    BASE64.encode(text.as_bytes())
}

fn decode(operation: &str, encoded: &str) -> Result<String> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| Error::store_operation_failed(operation, encoded, format!("bad base64: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::store_operation_failed(operation, encoded, format!("not UTF-8: {}", e)))
}

/// Smallest key greater than every key starting with `prefix`
pub fn prefix_range_end(prefix: &str) -> Vec<u8> {
    let mut end = prefix.as_bytes().to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    // every byte was 0xff: the whole keyspace from prefix on
    vec![0]
}

fn lease_not_found(reason: &str) -> bool {
    reason.contains("lease not found")
}

// =============================================================================
// Watch Decoding
// =============================================================================

enum WatchFrame {
    Batch { revision: i64, events: Vec<WatchEvent> },
    Closed { compacted: bool },
}

fn decode_watch_line(line: &str) -> WatchFrame {
    let envelope: WatchEnvelope = match serde_json::from_str(line) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "Watch frame not decodable, closing watch");
            return WatchFrame::Closed { compacted: false };
        }
    };
    if let Some(error) = envelope.error {
        tracing::warn!(error = %error, "Watch failed on the server");
        return WatchFrame::Closed { compacted: false };
    }
    let Some(response) = envelope.result else {
        return WatchFrame::Batch {
            revision: 0,
            events: Vec::new(),
        };
    };
    if response.canceled {
        tracing::warn!(
            compact_revision = response.compact_revision,
            reason = %response.cancel_reason,
            "Watch cancelled by server"
        );
        return WatchFrame::Closed {
            compacted: response.compact_revision > 0,
        };
    }

    let mut events = Vec::with_capacity(response.events.len());
    for event in response.events {
        let key = match decode("watch", &event.kv.key) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, "Watch event key skipped");
                continue;
            }
        };
        if event.kind == "DELETE" {
            events.push(WatchEvent::delete(key));
            continue;
        }
        match decode("watch", &event.kv.value) {
            Ok(value) => events.push(WatchEvent::put(key, value)),
            Err(e) => tracing::warn!(key = %key, error = %e, "Watch event value skipped"),
        }
    }
    WatchFrame::Batch {
        revision: response.header.revision,
        events,
    }
}

struct WatchState {
    buffer: String,
    prefix: String,
    revisions: Arc<Mutex<HashMap<String, i64>>>,
    closed: bool,
}

impl WatchState {
    fn remember(&self, revision: i64) {
        if revision <= 0 {
            return;
        }
        if let Ok(mut revisions) = self.revisions.lock() {
            let seen = revisions.entry(self.prefix.clone()).or_insert(0);
            *seen = (*seen).max(revision);
        }
    }

    fn forget(&self) {
        if let Ok(mut revisions) = self.revisions.lock() {
            revisions.remove(&self.prefix);
        }
    }

    /// Events of every complete line in the buffer
    fn drain(&mut self) -> Vec<WatchEvent> {
        let mut out = Vec::new();
        while let Some(newline_idx) = self.buffer.find('\n') {
            let line = self.buffer[..newline_idx].trim().to_string();
            self.buffer.drain(..=newline_idx);
            if line.is_empty() {
                continue;
            }
            match decode_watch_line(&line) {
                WatchFrame::Batch { revision, events } => {
                    self.remember(revision);
                    out.extend(events);
                }
                WatchFrame::Closed { compacted } => {
                    if compacted {
                        self.forget();
                    }
                    self.closed = true;
                    break;
                }
            }
        }
        out
    }
}

// =============================================================================
// Store
// =============================================================================

/// Coordination store backed by an etcd cluster
#[derive(Clone)]
pub struct EtcdCoordinationStore {
    endpoints: Vec<String>,
    http: Arc<dyn HttpClient>,
    /// Client for watch streams; must not time out long-lived responses
    watch_http: Arc<dyn HttpClient>,
    time: Arc<dyn TimeProvider>,
    revisions: Arc<Mutex<HashMap<String, i64>>>,
}

impl std::fmt::Debug for EtcdCoordinationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdCoordinationStore")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl EtcdCoordinationStore {
    /// Store over `endpoints` such as `http://10.0.0.1:2379`
    pub fn new(endpoints: Vec<String>, http: Arc<dyn HttpClient>, time: Arc<dyn TimeProvider>) -> Self {
        let endpoints: Vec<String> = endpoints
            .iter()
            .map(|e| e.trim().trim_end_matches('/'))
            .filter(|e| !e.is_empty())
            .map(|e| {
                if e.contains("://") {
                    e.to_string()
                } else {
                    format!("http://{}", e)
                }
            })
            .collect();
        assert!(!endpoints.is_empty(), "at least one etcd endpoint required");
        Self {
            endpoints,
            watch_http: http.clone(),
            http,
            time,
            revisions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Use a separate client for watch streams
    pub fn with_watch_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.watch_http = http;
        self
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// POST `body` to `path` on the first endpoint that answers
    async fn call<T: DeserializeOwned>(&self, operation: &str, key: &str, path: &str, body: &Value) -> Result<T> {
        let mut last_error = None;
        for endpoint in &self.endpoints {
            let url = format!("{}{}", endpoint, path);
            let request = HttpRequest::post(&url)
                .json(body)
                .map_err(|e| Error::SerializationFailed { reason: e })?;
            let response = match self.http.send(request).await {
                Ok(response) => response,
                Err(reason) => {
                    tracing::debug!(url = %url, error = %reason, "etcd endpoint unreachable");
                    last_error = Some(Error::HttpRequestFailed { url, reason });
                    continue;
                }
            };
            if response.status >= 500 {
                let reason = response.text().unwrap_or_default();
                tracing::debug!(url = %url, status = response.status, "etcd endpoint failing");
                last_error = Some(Error::store_unavailable(format!("{} on {}: {}", response.status, url, reason)));
                continue;
            }
            if !response.is_success() {
                let reason = response.text().unwrap_or_default();
                return Err(Error::store_operation_failed(operation, key, reason));
            }
            return response
                .json()
                .map_err(|e| Error::store_operation_failed(operation, key, e));
        }
        Err(last_error.unwrap_or_else(|| Error::store_unavailable("no etcd endpoint configured")))
    }

    async fn range(&self, operation: &str, key: &str, body: Value) -> Result<Vec<(String, String)>> {
        let response: RangeResponse = self.call(operation, key, "/v3/kv/range", &body).await?;
        response
            .kvs
            .iter()
            .map(|kv| Ok((decode(operation, &kv.key)?, decode(operation, &kv.value)?)))
            .collect()
    }

    fn lease_error(err: Error, lease_id: LeaseId) -> Error {
        match &err {
            Error::StoreOperationFailed { reason, .. } if lease_not_found(reason) => Error::LeaseNotFound { lease_id },
            _ => err,
        }
    }

    /// One renewal; the remaining TTL in seconds
    async fn renew(&self, lease_id: LeaseId) -> Result<u64> {
        let key = lease_id.to_string();
        let body = json!({ "ID": key });
        let mut last_error = None;
        for endpoint in &self.endpoints {
            let url = format!("{}/v3/lease/keepalive", endpoint);
            let request = HttpRequest::post(&url)
                .json(&body)
                .map_err(|e| Error::SerializationFailed { reason: e })?;
            let response = match self.http.send(request).await {
                Ok(response) => response,
                Err(reason) => {
                    last_error = Some(Error::HttpRequestFailed { url, reason });
                    continue;
                }
            };
            let text = response.text().map_err(|e| Error::store_operation_failed("keepalive", &key, e))?;
            if !response.is_success() {
                if lease_not_found(&text) {
                    return Err(Error::LeaseNotFound { lease_id });
                }
                last_error = Some(Error::store_operation_failed("keepalive", &key, text));
                continue;
            }
            // streaming endpoint: one JSON object per line
            let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("{}");
            let envelope: KeepAliveEnvelope = serde_json::from_str(line)
                .map_err(|e| Error::store_operation_failed("keepalive", &key, e.to_string()))?;
            if let Some(error) = envelope.error {
                return Err(Error::store_operation_failed("keepalive", &key, error.to_string()));
            }
            let ttl = envelope.result.map(|r| r.ttl).unwrap_or(0);
            if ttl <= 0 {
                return Err(Error::LeaseNotFound { lease_id });
            }
            return Ok(ttl as u64);
        }
        Err(last_error.unwrap_or_else(|| Error::store_unavailable("no etcd endpoint configured")))
    }
}

#[async_trait]
impl CoordinationStore for EtcdCoordinationStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let pairs = self.range("get", key, json!({ "key": encode(key) })).await?;
        Ok(pairs.into_iter().next().map(|(_, value)| value))
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let body = json!({
            "key": encode(prefix),
            "range_end": BASE64.encode(prefix_range_end(prefix)),
            "sort_order": "ASCEND",
            "sort_target": "KEY",
        });
        let mut pairs = self.range("get_prefix", prefix, body).await?;
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pairs)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        assert!(!key.is_empty(), "key cannot be empty");
        let body = json!({ "key": encode(key), "value": encode(value) });
        let _: Value = self.call("put", key, "/v3/kv/put", &body).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let body = json!({ "key": encode(key) });
        let response: DeleteRangeResponse = self.call("delete", key, "/v3/kv/deleterange", &body).await?;
        Ok(response.deleted > 0)
    }

    async fn watch(&self, prefix: &str) -> Result<WatchStream> {
        let start_revision = self
            .revisions
            .lock()
            .ok()
            .and_then(|revisions| revisions.get(prefix).copied())
            .map(|seen| seen + 1)
            .unwrap_or(0);
        let mut create = json!({
            "key": encode(prefix),
            "range_end": BASE64.encode(prefix_range_end(prefix)),
        });
        if start_revision > 0 {
            create["start_revision"] = json!(start_revision.to_string());
        }
        let body = json!({ "create_request": create });

        let mut last_error = None;
        for endpoint in &self.endpoints {
            let url = format!("{}/v3/watch", endpoint);
            let request = HttpRequest::post(&url)
                .json(&body)
                .map_err(|e| Error::SerializationFailed { reason: e })?;
            let bytes = match self.watch_http.send_streaming(request).await {
                Ok(bytes) => bytes,
                Err(reason) => {
                    tracing::debug!(url = %url, error = %reason, "etcd watch endpoint unreachable");
                    last_error = Some(Error::HttpRequestFailed { url, reason });
                    continue;
                }
            };
            tracing::debug!(prefix, start_revision, url = %url, "etcd watch opened");

            let state = WatchState {
                buffer: String::new(),
                prefix: prefix.to_string(),
                revisions: self.revisions.clone(),
                closed: false,
            };
            let events = bytes
                .scan(state, |state, chunk| {
                    if state.closed {
                        return ready(None);
                    }
                    let events = match chunk {
                        Ok(chunk) => {
                            state.buffer.push_str(&String::from_utf8_lossy(&chunk));
                            state.drain()
                        }
                        Err(e) => {
                            tracing::warn!(prefix = %state.prefix, error = %e, "etcd watch stream broke");
                            state.closed = true;
                            Vec::new()
                        }
                    };
                    ready(Some(events))
                })
                .flat_map(stream::iter);
            return Ok(Box::pin(events));
        }
        Err(last_error.unwrap_or_else(|| Error::store_unavailable("no etcd endpoint configured")))
    }

    async fn grant_lease(&self, ttl_secs: u64) -> Result<LeaseId> {
        if ttl_secs == 0 || ttl_secs > LEASE_TTL_SECS_MAX {
            return Err(Error::LeaseTtlOutOfRange {
                ttl_secs,
                min: 1,
                max: LEASE_TTL_SECS_MAX,
            });
        }
        let body = json!({ "TTL": ttl_secs.to_string(), "ID": "0" });
        let response: LeaseResponse = self.call("grant_lease", "", "/v3/lease/grant", &body).await?;
        if !response.error.is_empty() || response.id <= 0 {
            return Err(Error::store_operation_failed("grant_lease", "", response.error));
        }
        tracing::debug!(lease_id = response.id, ttl_secs = response.ttl, "etcd lease granted");
        Ok(response.id)
    }

    async fn put_with_lease(&self, key: &str, value: &str, lease_id: LeaseId) -> Result<()> {
        assert!(!key.is_empty(), "key cannot be empty");
        let body = json!({
            "key": encode(key),
            "value": encode(value),
            "lease": lease_id.to_string(),
        });
        let _: Value = self
            .call("put_with_lease", key, "/v3/kv/put", &body)
            .await
            .map_err(|e| Self::lease_error(e, lease_id))?;
        Ok(())
    }

    async fn keepalive(&self, lease_id: LeaseId) -> Result<KeepAliveStream> {
        let ttl_secs = self.renew(lease_id).await?;
        let interval_ms = (ttl_secs * 1000 / 3).max(1);
        let store = self.clone();

        let ticks = stream::unfold((store, Some(ttl_secs)), move |(store, first)| async move {
            if let Some(ttl_secs) = first {
                return Some((LeaseTick { lease_id, ttl_secs }, (store, None)));
            }
            store.time.sleep_ms(interval_ms).await;
            match store.renew(lease_id).await {
                Ok(ttl_secs) => Some((LeaseTick { lease_id, ttl_secs }, (store, None))),
                Err(e) => {
                    tracing::warn!(lease_id, error = %e, "etcd lease renewal failed");
                    None
                }
            }
        });
        Ok(Box::pin(ticks))
    }

    async fn revoke(&self, lease_id: LeaseId) -> Result<()> {
        let body = json!({ "ID": lease_id.to_string() });
        let _: Value = self
            .call("revoke", "", "/v3/lease/revoke", &body)
            .await
            .map_err(|e| Self::lease_error(e, lease_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ByteStream, HttpResponse};
    use crate::io::WallClockTime;
    use crate::store::WatchEventKind;
    use std::collections::VecDeque;

    /// Answers by URL path from scripted queues and records every request
    #[derive(Default)]
    struct ScriptedEtcd {
        replies: Mutex<HashMap<String, VecDeque<std::result::Result<HttpResponse, String>>>>,
        watch_lines: Mutex<VecDeque<Vec<String>>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedEtcd {
        fn reply(self: &Arc<Self>, path: &str, status: u16, body: Value) -> Arc<Self> {
            let response = HttpResponse {
                status,
                headers: HashMap::new(),
                body: body.to_string().into_bytes(),
            };
            self.replies
                .lock()
                .unwrap()
                .entry(path.to_string())
                .or_default()
                .push_back(Ok(response));
            self.clone()
        }

        fn refuse(self: &Arc<Self>, path: &str) -> Arc<Self> {
            self.replies
                .lock()
                .unwrap()
                .entry(path.to_string())
                .or_default()
                .push_back(Err("connection refused".to_string()));
            self.clone()
        }

        fn watch(self: &Arc<Self>, lines: &[Value]) -> Arc<Self> {
            self.watch_lines
                .lock()
                .unwrap()
                .push_back(lines.iter().map(|l| l.to_string()).collect());
            self.clone()
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    fn path_of(url: &str) -> String {
        let after_scheme = url.split("://").nth(1).unwrap_or(url);
        after_scheme.find('/').map(|i| after_scheme[i..].to_string()).unwrap_or_default()
    }

    #[async_trait]
    impl HttpClient for ScriptedEtcd {
        async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, String> {
            let path = path_of(&request.url);
            self.seen.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .get_mut(&path)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Err(format!("no scripted reply for {}", path)))
        }

        async fn send_streaming(&self, request: HttpRequest) -> std::result::Result<ByteStream, String> {
            self.seen.lock().unwrap().push(request);
            let lines = self
                .watch_lines
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| "no scripted watch".to_string())?;
            let chunks: Vec<std::result::Result<bytes::Bytes, String>> = lines
                .into_iter()
                .map(|l| Ok(bytes::Bytes::from(format!("{}\n", l))))
                .collect();
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    fn store(http: Arc<ScriptedEtcd>) -> EtcdCoordinationStore {
        EtcdCoordinationStore::new(vec!["10.0.0.1:2379/".to_string()], http, Arc::new(WallClockTime::new()))
    }

    fn kv(key: &str, value: &str) -> Value {
        json!({ "key": encode(key), "value": encode(value), "mod_revision": "7" })
    }

    #[test]
    fn test_prefix_range_end() {
        assert_eq!(prefix_range_end("/a/"), b"/a0".to_vec());
        assert_eq!(prefix_range_end("ab"), b"ac".to_vec());
        assert_eq!(prefix_range_end(""), vec![0]);
    }

    #[test]
    fn test_endpoints_normalized() {
        let s = store(Arc::new(ScriptedEtcd::default()));
        assert_eq!(s.endpoints(), ["http://10.0.0.1:2379".to_string()]);
    }

    #[tokio::test]
    async fn test_get_and_prefix_decode_values() {
        let http = Arc::new(ScriptedEtcd::default())
            .reply("/v3/kv/range", 200, json!({ "kvs": [kv("/a/1", "一")], "count": "1" }))
            .reply("/v3/kv/range", 200, json!({ "header": { "revision": "9" } }))
            .reply(
                "/v3/kv/range",
                200,
                json!({ "kvs": [kv("/a/2", "二"), kv("/a/1", "一")], "count": "2" }),
            );
        let s = store(http.clone());

        assert_eq!(s.get("/a/1").await.unwrap().as_deref(), Some("一"));
        assert_eq!(s.get("/a/3").await.unwrap(), None);
        let pairs = s.get_prefix("/a/").await.unwrap();
        assert_eq!(
            pairs,
            vec![("/a/1".to_string(), "一".to_string()), ("/a/2".to_string(), "二".to_string())]
        );

        let last = http.requests().pop().unwrap().json_body().unwrap();
        assert_eq!(last["key"], encode("/a/"));
        assert_eq!(last["range_end"], encode("/a0"));
    }

    #[tokio::test]
    async fn test_put_delete_and_lease_calls() {
        let http = Arc::new(ScriptedEtcd::default())
            .reply("/v3/lease/grant", 200, json!({ "ID": "7587", "TTL": "60" }))
            .reply("/v3/kv/put", 200, json!({ "header": {} }))
            .reply("/v3/kv/deleterange", 200, json!({ "deleted": "1" }))
            .reply("/v3/kv/deleterange", 200, json!({ "header": {} }))
            .reply("/v3/lease/revoke", 200, json!({ "header": {} }));
        let s = store(http.clone());

        let lease_id = s.grant_lease(60).await.unwrap();
        assert_eq!(lease_id, 7587);
        s.put_with_lease("/instances/a", "{}", lease_id).await.unwrap();
        assert!(s.delete("/instances/a").await.unwrap());
        assert!(!s.delete("/instances/a").await.unwrap());
        s.revoke(lease_id).await.unwrap();

        let put = http.requests()[1].json_body().unwrap();
        assert_eq!(put["lease"], "7587");
        assert_eq!(put["value"], encode("{}"));
        assert!(matches!(s.grant_lease(0).await, Err(Error::LeaseTtlOutOfRange { .. })));
    }

    #[tokio::test]
    async fn test_lost_lease_is_lease_not_found() {
        let not_found = json!({ "error": "etcdserver: requested lease not found", "code": 5 });
        let http = Arc::new(ScriptedEtcd::default())
            .reply("/v3/kv/put", 404, not_found.clone())
            .reply("/v3/lease/revoke", 404, not_found)
            .reply("/v3/lease/keepalive", 200, json!({ "result": { "ID": "5", "TTL": "0" } }));
        let s = store(http);

        assert!(matches!(
            s.put_with_lease("/k", "v", 5).await,
            Err(Error::LeaseNotFound { lease_id: 5 })
        ));
        assert!(matches!(s.revoke(5).await, Err(Error::LeaseNotFound { lease_id: 5 })));
        assert!(matches!(s.keepalive(5).await, Err(Error::LeaseNotFound { lease_id: 5 })));
    }

    #[tokio::test]
    async fn test_keepalive_first_tick() {
        let http = Arc::new(ScriptedEtcd::default())
            .reply("/v3/lease/keepalive", 200, json!({ "result": { "ID": "5", "TTL": "30" } }));
        let s = store(http);
        let mut ticks = s.keepalive(5).await.unwrap();
        assert_eq!(
            ticks.next().await,
            Some(LeaseTick {
                lease_id: 5,
                ttl_secs: 30
            })
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_over() {
        let http = Arc::new(ScriptedEtcd::default())
            .refuse("/v3/kv/range")
            .reply("/v3/kv/range", 200, json!({ "kvs": [kv("/k", "v")] }));
        let s = EtcdCoordinationStore::new(
            vec!["http://10.0.0.1:2379".to_string(), "http://10.0.0.2:2379".to_string()],
            http.clone(),
            Arc::new(WallClockTime::new()),
        );
        assert_eq!(s.get("/k").await.unwrap().as_deref(), Some("v"));
        let urls: Vec<String> = http.requests().iter().map(|r| r.url.clone()).collect();
        assert_eq!(urls, ["http://10.0.0.1:2379/v3/kv/range", "http://10.0.0.2:2379/v3/kv/range"]);

        let down = Arc::new(ScriptedEtcd::default()).refuse("/v3/kv/range");
        let err = store(down).get("/k").await.unwrap_err();
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_watch_decodes_events_and_resumes() {
        let http = Arc::new(ScriptedEtcd::default())
            .watch(&[
                json!({ "result": { "header": { "revision": "10" }, "created": true } }),
                json!({ "result": { "header": { "revision": "11" }, "events": [ { "kv": kv("/cfg/a", "1") } ] } }),
                json!({ "result": { "header": { "revision": "12" }, "events": [ { "type": "DELETE", "kv": { "key": encode("/cfg/a") } } ] } }),
            ])
            .watch(&[]);
        let s = store(http.clone());

        let events: Vec<WatchEvent> = s.watch("/cfg/").await.unwrap().collect().await;
        assert_eq!(events, vec![WatchEvent::put("/cfg/a", "1"), WatchEvent::delete("/cfg/a")]);
        assert_eq!(events[1].kind, WatchEventKind::Delete);

        let _ = s.watch("/cfg/").await.unwrap();
        let resumed = http.requests().pop().unwrap().json_body().unwrap();
        assert_eq!(resumed["create_request"]["start_revision"], "13");
        assert_eq!(resumed["create_request"]["key"], encode("/cfg/"));
    }

    #[tokio::test]
    async fn test_compacted_watch_starts_fresh() {
        let http = Arc::new(ScriptedEtcd::default())
            .watch(&[
                json!({ "result": { "header": { "revision": "20" }, "created": true } }),
                json!({ "result": { "canceled": true, "compact_revision": "25" } }),
                json!({ "result": { "header": { "revision": "30" }, "events": [ { "kv": kv("/cfg/b", "2") } ] } }),
            ])
            .watch(&[]);
        let s = store(http.clone());

        let events: Vec<WatchEvent> = s.watch("/cfg/").await.unwrap().collect().await;
        assert!(events.is_empty());

        let _ = s.watch("/cfg/").await.unwrap();
        let fresh = http.requests().pop().unwrap().json_body().unwrap();
        assert!(fresh["create_request"].get("start_revision").is_none());
    }

    #[tokio::test]
    #[ignore = "requires running etcd at 127.0.0.1:2379"]
    async fn test_etcd_integration_lease_lifecycle() {
        let s = EtcdCoordinationStore::new(
            vec![ETCD_ENDPOINT_DEFAULT.to_string()],
            Arc::new(crate::http::ReqwestHttpClient::new()),
            Arc::new(WallClockTime::new()),
        );
        let lease_id = s.grant_lease(10).await.expect("grant failed");
        s.put_with_lease("/medway-it/instance", "{}", lease_id).await.unwrap();
        assert_eq!(s.get("/medway-it/instance").await.unwrap().as_deref(), Some("{}"));
        assert_eq!(s.get_prefix("/medway-it/").await.unwrap().len(), 1);
        s.revoke(lease_id).await.unwrap();
        assert_eq!(s.get("/medway-it/instance").await.unwrap(), None);
    }
}

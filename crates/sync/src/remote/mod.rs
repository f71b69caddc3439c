// Remote store tier: the authoritative copy of persisted documents.
//
// The engine only needs `fetch` and `update`; errors are opaque beyond
// success or failure. `MemoryRemoteStore` backs offline sessions and tests,
// `HttpRemoteStore` talks to the document API.

mod http;

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use folio_common::normalize::normalize;
use folio_common::{Document, DocumentContent, DocumentStatus, Visibility};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

pub use http::HttpRemoteStore;

// ── Store trait ─────────────────────────────────────────────────────

/// Abstraction over the remote document API.
///
/// All methods return `Send` futures so sessions can run on a multi-threaded
/// runtime.
pub trait RemoteStore: Send + Sync + 'static {
    /// Fetch the stored record for `id` in whatever shape the store keeps it.
    /// `Ok(None)` means the document does not exist.
    fn fetch(&self, id: &str) -> impl Future<Output = Result<Option<Value>, RemoteError>> + Send;

    /// Write `patch` to `id`, creating the record if needed.
    fn update(
        &self,
        id: &str,
        patch: &DocumentPatch,
    ) -> impl Future<Output = Result<(), RemoteError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("remote store unreachable: {0}")]
    Unavailable(String),
    #[error("remote store rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("remote store returned an unreadable response: {0}")]
    Decode(String),
    #[error("invalid remote store url: {0}")]
    InvalidUrl(String),
}

// ── Patch ───────────────────────────────────────────────────────────

/// Fields submitted on a remote write.
///
/// Background flushes carry content fields only; publish status and
/// visibility ride along on forced flushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    pub title: String,
    pub content: DocumentContent,
    pub cover_image: String,
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DocumentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
}

impl DocumentPatch {
    pub fn content_of(doc: &Document, updated_at: DateTime<Utc>) -> Self {
        Self {
            title: doc.title.clone(),
            content: doc.content.clone(),
            cover_image: doc.cover_image.clone(),
            tags: doc.tags.clone(),
            updated_at,
            status: None,
            visibility: None,
        }
    }

    pub fn full(doc: &Document, updated_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(doc.status),
            visibility: Some(doc.visibility),
            ..Self::content_of(doc, updated_at)
        }
    }

    pub fn apply_to(&self, doc: &mut Document) {
        doc.title = self.title.clone();
        doc.content = self.content.clone();
        doc.cover_image = self.cover_image.clone();
        doc.tags = self.tags.clone();
        doc.updated_at = Some(self.updated_at);
        if let Some(status) = self.status {
            doc.status = status;
        }
        if let Some(visibility) = self.visibility {
            doc.visibility = visibility;
        }
    }
}

// ── In-memory store ─────────────────────────────────────────────────

/// In-process remote store with artificial latency and scripted failures.
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteStore {
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: Mutex<HashMap<String, Value>>,
    updates: Mutex<Vec<(String, DocumentPatch)>>,
    update_failures: Mutex<VecDeque<RemoteError>>,
    fetch_failure: Mutex<Option<RemoteError>>,
    latency: Mutex<Duration>,
    update_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `update` by `latency` before it resolves.
    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.inner.latency) = latency;
        self
    }

    /// Seed a stored record.
    pub fn insert(&self, id: impl Into<String>, record: Value) {
        lock(&self.inner.records).insert(id.into(), record);
    }

    /// Delete a record, as if removed by another client.
    pub fn delete(&self, id: &str) -> Option<Value> {
        lock(&self.inner.records).remove(id)
    }

    pub fn record(&self, id: &str) -> Option<Value> {
        lock(&self.inner.records).get(id).cloned()
    }

    /// The stored record for `id`, normalized.
    pub fn document(&self, id: &str) -> Option<Document> {
        self.record(id).map(|record| normalize(&record))
    }

    /// Fail the next `update` with `error`. Failures queue up in order.
    pub fn fail_next_update(&self, error: RemoteError) {
        lock(&self.inner.update_failures).push_back(error);
    }

    /// Fail every `fetch` with `error` until cleared with `None`.
    pub fn set_fetch_failure(&self, error: Option<RemoteError>) {
        *lock(&self.inner.fetch_failure) = error;
    }

    /// Successful updates, in order.
    pub fn updates(&self) -> Vec<(String, DocumentPatch)> {
        lock(&self.inner.updates).clone()
    }

    /// Every `update` call, including failed ones.
    pub fn update_calls(&self) -> usize {
        self.inner.update_calls.load(Ordering::SeqCst)
    }

    /// Highest number of updates observed in flight at once.
    pub fn max_concurrent_updates(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn fetch(&self, id: &str) -> Result<Option<Value>, RemoteError> {
        if let Some(error) = lock(&self.inner.fetch_failure).clone() {
            return Err(error);
        }
        Ok(self.record(id))
    }

    async fn update(&self, id: &str, patch: &DocumentPatch) -> Result<(), RemoteError> {
        self.inner.update_calls.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.inner.in_flight, &self.inner.max_in_flight);

        let latency = *lock(&self.inner.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = lock(&self.inner.update_failures).pop_front() {
            return Err(error);
        }

        let mut records = lock(&self.inner.records);
        let mut doc = records
            .get(id)
            .map(normalize)
            .unwrap_or_else(|| normalize(&json!({ "id": id })));
        patch.apply_to(&mut doc);
        let record = serde_json::to_value(&doc).map_err(|e| RemoteError::Decode(e.to_string()))?;
        records.insert(id.to_string(), record);
        drop(records);

        lock(&self.inner.updates).push((id.to_string(), patch.clone()));
        debug!(doc_id = id, "memory store updated");
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tracks concurrent updates; decrements on drop so cancelled writes count too.
struct InFlight<'a> {
    current: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self { current }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

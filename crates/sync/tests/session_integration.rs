// Session behavior under tokio's paused clock. Every `sleep` below advances
// virtual time instantly, so the 30s idle window costs nothing.

use std::time::Duration;

use folio_common::{Document, DocumentStatus};
use folio_sync::engine::SaveTier;
use folio_sync::local::read_cached;
use folio_sync::{
    open_document, EngineConfig, LocalCache, MemoryCache, MemoryRemoteStore, RemoteError,
    SessionHandle, SqliteCache, SyncEngine, SyncError, SyncSession, SyncStatus,
};
use serde_json::json;
use tokio::time::{self, Instant};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// `{id: "draft-1", title: "", blocks: []}`
fn empty_draft() -> Document {
    Document { id: "draft-1".into(), ..Document::default() }
}

fn start<C: LocalCache>(cache: C, store: &MemoryRemoteStore) -> SessionHandle {
    let engine = SyncEngine::with_clean_baseline(
        empty_draft(),
        cache,
        EngineConfig::default(),
        Instant::now(),
    );
    SyncSession::spawn(engine, store.clone())
}

fn set_title(session: &SessionHandle, title: &str) {
    let title = title.to_string();
    session.edit(move |doc| doc.title = title).expect("session should accept edits");
}

// ── Primary path ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn draft_edit_reaches_cache_then_remote() {
    let cache = MemoryCache::new();
    let store = MemoryRemoteStore::new();
    let session = start(cache.clone(), &store);
    let mut status = session.status();

    set_title(&session, "Hello");
    status
        .wait_for(|s| *s == SyncStatus::Saving { tier: SaveTier::Local })
        .await
        .expect("status should report the pending local save");

    time::sleep(ms(1_100)).await;
    assert_eq!(cache.document("draft-1").map(|d| d.title), Some("Hello".to_string()));
    assert_eq!(store.update_calls(), 0);
    assert_eq!(session.current_status(), SyncStatus::SavedLocally);

    time::sleep(secs(31)).await;
    let updates = store.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, "draft-1");
    assert_eq!(updates[0].1.title, "Hello");
    assert_eq!(session.current_status().label(), "saved");

    let stats = session.stats().await.expect("stats");
    assert_eq!(stats.local_saves, 1);
    assert_eq!(stats.remote_saves, 1);
    assert!(!stats.dirty);
}

#[tokio::test(start_paused = true)]
async fn rapid_edits_collapse_into_one_local_write() {
    let cache = MemoryCache::new();
    let store = MemoryRemoteStore::new();
    let session = start(cache.clone(), &store);

    for i in 0..10 {
        set_title(&session, &format!("draft {i}"));
        time::sleep(ms(100)).await;
    }
    assert_eq!(cache.write_count(), 0);

    time::sleep(ms(1_500)).await;
    assert_eq!(cache.write_count(), 1);
    assert_eq!(cache.document("draft-1").map(|d| d.title), Some("draft 9".to_string()));
}

#[tokio::test(start_paused = true)]
async fn idle_fire_skips_remote_when_nothing_changed() {
    let cache = MemoryCache::new();
    let store = MemoryRemoteStore::new();
    let session = start(cache.clone(), &store);

    set_title(&session, "typo");
    set_title(&session, "");
    time::sleep(secs(45)).await;

    assert_eq!(cache.write_count(), 1);
    assert_eq!(store.update_calls(), 0);
    assert_eq!(session.current_status(), SyncStatus::Saved);
}

#[tokio::test(start_paused = true)]
async fn replacing_the_document_schedules_a_save() {
    let cache = MemoryCache::new();
    let store = MemoryRemoteStore::new();
    let session = start(cache.clone(), &store);

    let mut doc = session.document().await.expect("document");
    doc.tags = vec!["rust".into(), "sync".into()];
    session.on_change(doc).expect("session should accept changes");

    time::sleep(secs(32)).await;
    let updates = store.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.tags, vec!["rust".to_string(), "sync".to_string()]);
}

// ── Mutual exclusion ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn overlapping_force_flushes_write_once() {
    let cache = MemoryCache::new();
    let store = MemoryRemoteStore::new().with_latency(secs(5));
    let session = start(cache, &store);
    set_title(&session, "Publish");

    let (a, b) = tokio::join!(session.force_flush(), session.force_flush());
    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|r| matches!(r, Err(SyncError::FlushInProgress))));

    assert_eq!(store.update_calls(), 1);
    assert_eq!(store.max_concurrent_updates(), 1);
    assert_eq!(session.current_status(), SyncStatus::Saved);
}

#[tokio::test(start_paused = true)]
async fn idle_cycle_does_not_overlap_a_slow_write() {
    let cache = MemoryCache::new();
    let store = MemoryRemoteStore::new().with_latency(secs(45));
    let session = start(cache, &store);

    set_title(&session, "first");
    time::sleep(secs(32)).await;
    assert_eq!(store.update_calls(), 1);

    // Keep editing while the first write hangs; the next idle fire lands
    // mid-flight and must not start a second write.
    set_title(&session, "second");
    time::sleep(secs(40)).await;
    assert_eq!(store.max_concurrent_updates(), 1);

    time::sleep(secs(120)).await;
    let updates = store.updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[1].1.title, "second");
    assert_eq!(store.max_concurrent_updates(), 1);
}

// ── Failures and retries ────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failed_write_surfaces_error_and_reconciler_retries() {
    let cache = MemoryCache::new();
    let store = MemoryRemoteStore::new();
    store.fail_next_update(RemoteError::Unavailable("offline".into()));
    let session = start(cache, &store);

    set_title(&session, "Hello");
    time::sleep(secs(32)).await;
    assert_eq!(store.update_calls(), 1);
    assert_eq!(session.current_status().label(), "error");
    assert!(session.stats().await.expect("stats").dirty);

    // No further edits: the reconciler picks it up once the remote tier is
    // older than 3× the idle delay.
    time::sleep(secs(70)).await;
    assert_eq!(store.update_calls(), 2);
    assert_eq!(store.updates().len(), 1);
    assert_eq!(session.current_status(), SyncStatus::Saved);
}

#[tokio::test(start_paused = true)]
async fn force_flush_propagates_remote_failure() {
    let store = MemoryRemoteStore::new();
    store.fail_next_update(RemoteError::Rejected { status: 500, message: "boom".into() });
    let session = start(MemoryCache::new(), &store);
    session.edit(|doc| doc.status = DocumentStatus::Published).expect("edit");

    let err = session.force_flush().await.expect_err("failure should reach the caller");
    assert!(matches!(err, SyncError::Remote(RemoteError::Rejected { status: 500, .. })));
    assert!(session.current_status().is_error());

    session.force_flush().await.expect("second attempt succeeds");
    let updates = store.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].1.status, Some(DocumentStatus::Published));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn force_flush_result_and_status_agree_across_workers() {
    let store = MemoryRemoteStore::new();
    let session = start(MemoryCache::new(), &store);

    for round in 0..200 {
        set_title(&session, &format!("Revision {round}"));
        session.force_flush().await.expect("flush should succeed");
        assert_eq!(session.current_status(), SyncStatus::Saved, "round {round}");
    }

    store.fail_next_update(RemoteError::Unavailable("offline".into()));
    set_title(&session, "Unsent");
    session.force_flush().await.expect_err("failure should reach the caller");
    assert!(session.current_status().is_error());
}

#[tokio::test(start_paused = true)]
async fn local_cache_failure_does_not_block_remote_sync() {
    let cache = MemoryCache::new();
    cache.set_fail_writes(true);
    let store = MemoryRemoteStore::new();
    let session = start(cache.clone(), &store);

    set_title(&session, "Hello");
    time::sleep(secs(32)).await;
    assert_eq!(cache.write_count(), 0);
    assert_eq!(store.updates().len(), 1);
    assert_eq!(session.current_status(), SyncStatus::Saved);
}

// ── Safety net ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn reconciler_bounds_staleness_during_continuous_editing() {
    let cache = MemoryCache::new();
    let store = MemoryRemoteStore::new();
    let session = start(cache.clone(), &store);

    // An edit every 5s keeps re-arming the 30s idle timer indefinitely.
    for i in 0..19 {
        set_title(&session, &format!("v{i}"));
        time::sleep(secs(5)).await;
    }
    assert_eq!(store.update_calls(), 0, "nothing is forced within the staleness bound");

    for i in 19..30 {
        set_title(&session, &format!("v{i}"));
        time::sleep(secs(5)).await;
    }
    assert_eq!(store.update_calls(), 1, "exactly one forced write past 3× idle delay");
    assert!(cache.write_count() >= 25);

    let stats = session.stats().await.expect("stats");
    assert!(stats.merged_edits > 0);
    assert!(stats.dirty);
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn teardown_persists_pending_save_and_cancels_timers() {
    let cache = MemoryCache::new();
    let store = MemoryRemoteStore::new();
    let session = start(cache.clone(), &store);

    set_title(&session, "Unsaved");
    let stats = session.teardown().await.expect("teardown");
    assert_eq!(stats.local_saves, 1);
    assert!(stats.dirty);
    assert_eq!(cache.document("draft-1").map(|d| d.title), Some("Unsaved".to_string()));

    time::sleep(secs(300)).await;
    assert_eq!(store.update_calls(), 0);
    assert_eq!(cache.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_the_session() {
    let cache = MemoryCache::new();
    let store = MemoryRemoteStore::new();
    let session = start(cache.clone(), &store);
    set_title(&session, "never saved");
    drop(session);

    time::sleep(secs(300)).await;
    assert_eq!(cache.write_count(), 0);
    assert_eq!(store.update_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn recovered_draft_is_pushed_after_one_idle_window() {
    let store = MemoryRemoteStore::new();
    store.insert("42", json!({ "id": "42", "title": "Remote title", "tags": "a, b" }));

    let mut cache = MemoryCache::new();
    let mut local = Document { id: "42".into(), ..Document::default() };
    local.cover_image = "https://img.example/new.png".into();
    cache
        .set("document-42", &serde_json::to_string(&local).expect("serialize"))
        .expect("seed cache");

    let loaded = open_document("42", &store, &mut cache).await.expect("open");
    assert!(loaded.is_dirty());
    let engine = loaded.into_engine(cache, EngineConfig::default(), Instant::now());
    let session = SyncSession::spawn(engine, store.clone());

    time::sleep(secs(31)).await;
    let stored = store.document("42").expect("record");
    assert_eq!(stored.title, "Remote title");
    assert_eq!(stored.cover_image, "https://img.example/new.png");
    assert_eq!(stored.tags, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(session.current_status(), SyncStatus::Saved);
}

#[tokio::test(start_paused = true)]
async fn sqlite_cache_holds_draft_across_sessions() {
    let tmp = tempfile::TempDir::new().expect("tempdir");
    let path = tmp.path().join("cache.db");
    let store = MemoryRemoteStore::new();

    let session = start(SqliteCache::open(&path).expect("open cache"), &store);
    set_title(&session, "Persisted");
    time::sleep(secs(2)).await;
    session.teardown().await.expect("teardown");

    let reopened = SqliteCache::open(&path).expect("reopen cache");
    let cached = read_cached(&reopened, "draft-1").expect("read").expect("entry exists");
    assert_eq!(cached.title, "Persisted");
}

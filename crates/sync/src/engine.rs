// Autosave state machine for one open document.
//
// The engine owns the live document, the baseline snapshot, both timers and
// the activity flags. It never sleeps and never awaits: every method takes the
// current instant, and the remote write is split into `begin_flush_at`, which
// hands out a `FlushTicket`, and `complete_flush_at`, which applies the
// outcome. Holding `&mut self` across both halves is what makes "one remote
// write in flight" hold.
//
//   Saved ──edit──▶ Saving(local) ──debounce──▶ SavedLocally
//     ▲                                              │ idle / reconcile
//     └───────── ok ──── Saving(remote) ◀────────────┘
//                          │ err
//                          ▼
//                        Error ── next idle / reconcile pass ──▶ Saving(remote)

use chrono::Utc;
use folio_common::{is_dirty, Document, Snapshot};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::activity::ActivityTracker;
use crate::config::EngineConfig;
use crate::error::SyncError;
use crate::local::{LocalCache, LocalWriter};
use crate::remote::{DocumentPatch, RemoteError};
use crate::timers::{IdleTimer, LocalDebounce};

// ── Status ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveTier {
    Local,
    Remote,
}

/// Save state observable by the host editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    /// Remote copy matches the live document.
    Saved,
    Saving { tier: SaveTier },
    /// Local cache is current; the remote tier is waiting for the idle window.
    SavedLocally,
    /// Last remote write failed; retried on the next idle or reconcile pass.
    Error { message: String },
}

impl SyncStatus {
    /// Coarse `saved | saving | error` label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Saved | Self::SavedLocally => "saved",
            Self::Saving { .. } => "saving",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Counters for observability and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub local_saves: u64,
    pub remote_saves: u64,
    pub failed_flushes: u64,
    pub merged_edits: u64,
    pub dirty: bool,
}

// ── Flush tickets ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The idle timer fired with unsynced changes.
    Idle,
    /// The safety-net reconciler found the remote tier stale.
    Reconcile,
    /// The host asked for an immediate publish.
    Forced,
}

impl FlushReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Reconcile => "reconcile",
            Self::Forced => "forced",
        }
    }
}

/// Permission to perform one remote write. Exactly one ticket exists while
/// `saving` is set; it must be handed back to `complete_flush_at`.
#[derive(Debug)]
#[must_use = "a flush ticket must be completed or the engine stays in `saving`"]
pub struct FlushTicket {
    doc_id: String,
    patch: DocumentPatch,
    snapshot: Snapshot,
    reason: FlushReason,
}

impl FlushTicket {
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn patch(&self) -> &DocumentPatch {
        &self.patch
    }

    pub fn reason(&self) -> FlushReason {
        self.reason
    }
}

// ── Engine ──────────────────────────────────────────────────────────

pub struct SyncEngine<C> {
    config: EngineConfig,
    doc: Document,
    baseline: Option<Snapshot>,
    activity: ActivityTracker,
    local_timer: LocalDebounce,
    idle: IdleTimer,
    writer: LocalWriter<C>,
    status: SyncStatus,
    remote_saves: u64,
    failed_flushes: u64,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    last_remote_save_at: Instant,
    torn_down: bool,
}

impl<C: LocalCache> SyncEngine<C> {
    /// Start a session for `doc` with the given remote baseline.
    ///
    /// A document that already differs from its baseline (a recovered local
    /// draft) is treated as a pending local save, so the idle cycle picks it
    /// up without waiting for a new edit.
    pub fn new(
        doc: Document,
        baseline: Option<Snapshot>,
        cache: C,
        config: EngineConfig,
        now: Instant,
    ) -> Self {
        let mut engine = Self {
            local_timer: LocalDebounce::from_config(&config),
            idle: IdleTimer::new(config.idle_delay()),
            config,
            doc,
            baseline,
            activity: ActivityTracker::new(),
            writer: LocalWriter::new(cache),
            status: SyncStatus::Saved,
            remote_saves: 0,
            failed_flushes: 0,
            consecutive_failures: 0,
            last_failure_at: None,
            last_remote_save_at: now,
            torn_down: false,
        };
        if engine.is_dirty() {
            debug!(doc_id = %engine.doc.id, "opened with unsynced changes");
            engine.activity.mark_local_save();
            engine.idle.arm_at(now);
            engine.status = SyncStatus::SavedLocally;
        }
        engine
    }

    /// Start a session whose baseline is the document as given.
    pub fn with_clean_baseline(doc: Document, cache: C, config: EngineConfig, now: Instant) -> Self {
        let baseline = Snapshot::of(&doc);
        Self::new(doc, Some(baseline), cache, config, now)
    }

    // ── Host-facing edits ───────────────────────────────────────────

    /// Replace the live document with the editor's latest state.
    pub fn apply_at(&mut self, doc: Document, now: Instant) {
        self.doc = doc;
        self.on_change_at(now);
    }

    /// Mutate the live document in place.
    pub fn edit_at(&mut self, now: Instant, edit: impl FnOnce(&mut Document)) {
        edit(&mut self.doc);
        self.on_change_at(now);
    }

    /// Record a mutation: (re)schedule the local save.
    pub fn on_change_at(&mut self, now: Instant) {
        if self.torn_down {
            debug!(doc_id = %self.doc.id, "change after teardown ignored");
            return;
        }
        self.local_timer.schedule_at(now);
        if matches!(self.status, SyncStatus::Saved | SyncStatus::SavedLocally) {
            self.status = SyncStatus::Saving { tier: SaveTier::Local };
        }
    }

    // ── Timers ──────────────────────────────────────────────────────

    /// Earliest instant at which `tick_at` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.local_timer.deadline(), self.idle.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run whichever timers are due. Returns a ticket if the idle timer
    /// started a remote write.
    pub fn tick_at(&mut self, now: Instant) -> Option<FlushTicket> {
        self.run_local_save_at(now);
        self.fire_idle_at(now)
    }

    /// Write the local cache if the debounce window has elapsed.
    pub fn run_local_save_at(&mut self, now: Instant) -> bool {
        if !self.local_timer.take_ready_at(now) {
            return false;
        }
        self.persist_local(now);
        true
    }

    fn persist_local(&mut self, now: Instant) {
        if self.writer.write(&self.doc)
            && matches!(self.status, SyncStatus::Saving { tier: SaveTier::Local })
        {
            self.status = SyncStatus::SavedLocally;
        }
        self.activity.mark_local_save();
        self.idle.arm_at(now);
    }

    /// Idle-timer callback: the user stopped editing.
    pub fn fire_idle_at(&mut self, now: Instant) -> Option<FlushTicket> {
        if !self.idle.take_ready_at(now) {
            return None;
        }
        self.activity.mark_idle();

        if self.activity.is_saving() {
            // The in-flight write re-arms on completion if changes remain.
            debug!(doc_id = %self.doc.id, "idle fired during remote write");
            return None;
        }
        if self.activity.should_sync_on_stop() && self.is_dirty() {
            return self.begin_flush_at(now, FlushReason::Idle);
        }

        self.activity.clear_pending();
        if !self.is_dirty() && !self.status.is_error() {
            self.status = SyncStatus::Saved;
        }
        None
    }

    /// Safety-net pass. Forces a write when the document is dirty and the
    /// last successful remote write is older than the staleness bound, even
    /// while edits keep re-arming the idle timer. Never overlaps a write in
    /// flight and respects retry backoff after failures.
    pub fn reconcile_at(&mut self, now: Instant) -> Option<FlushTicket> {
        if self.activity.is_saving() || self.torn_down {
            return None;
        }
        let stale = now.duration_since(self.last_remote_save_at) > self.config.staleness_bound();
        if !stale {
            // Within the bound the idle path owns the next write.
            return None;
        }
        if !self.is_dirty() {
            return None;
        }
        if let Some(retry_at) = self.retry_at() {
            if now < retry_at {
                debug!(doc_id = %self.doc.id, failures = self.consecutive_failures, "reconcile backing off");
                return None;
            }
        }
        info!(
            doc_id = %self.doc.id,
            idle_armed = self.idle.is_armed(),
            editing = self.activity.is_editing(),
            "remote tier stale, forcing flush"
        );
        self.begin_flush_at(now, FlushReason::Reconcile)
    }

    fn retry_at(&self) -> Option<Instant> {
        self.last_failure_at.map(|failed| failed + self.config.retry_delay(self.consecutive_failures))
    }

    // ── Remote writer ───────────────────────────────────────────────

    /// Claim the remote writer and capture what to send. `None` if a write is
    /// already in flight; the caller does not queue.
    pub fn begin_flush_at(&mut self, _now: Instant, reason: FlushReason) -> Option<FlushTicket> {
        if !self.activity.begin_save() {
            debug!(doc_id = %self.doc.id, reason = reason.as_str(), "flush skipped: write in flight");
            return None;
        }
        let updated_at = Utc::now();
        let patch = match reason {
            FlushReason::Forced => DocumentPatch::full(&self.doc, updated_at),
            FlushReason::Idle | FlushReason::Reconcile => {
                DocumentPatch::content_of(&self.doc, updated_at)
            }
        };
        self.status = SyncStatus::Saving { tier: SaveTier::Remote };
        debug!(doc_id = %self.doc.id, reason = reason.as_str(), "remote flush started");
        Some(FlushTicket {
            doc_id: self.doc.id.clone(),
            patch,
            snapshot: Snapshot::of(&self.doc),
            reason,
        })
    }

    /// Apply the outcome of a remote write and release the writer.
    pub fn complete_flush_at(
        &mut self,
        ticket: FlushTicket,
        result: Result<(), RemoteError>,
        now: Instant,
    ) -> Result<(), RemoteError> {
        self.activity.end_save();
        match result {
            Ok(()) => {
                self.baseline = Some(ticket.snapshot);
                self.doc.updated_at = Some(ticket.patch.updated_at);
                self.remote_saves += 1;
                self.consecutive_failures = 0;
                self.last_failure_at = None;
                self.last_remote_save_at = now;

                if self.is_dirty() {
                    // Edits landed while the write was in flight.
                    self.status = SyncStatus::SavedLocally;
                    if !self.torn_down && !self.idle.is_armed() && !self.local_timer.is_pending()
                    {
                        self.idle.arm_at(now);
                    }
                } else {
                    self.activity.clear_pending();
                    self.status = SyncStatus::Saved;
                }
                info!(
                    doc_id = %ticket.doc_id,
                    reason = ticket.reason.as_str(),
                    remote_saves = self.remote_saves,
                    "remote flush succeeded"
                );
                Ok(())
            }
            Err(e) => {
                self.failed_flushes += 1;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.last_failure_at = Some(now);
                self.status = SyncStatus::Error { message: e.to_string() };
                warn!(
                    doc_id = %ticket.doc_id,
                    reason = ticket.reason.as_str(),
                    failures = self.consecutive_failures,
                    error = %e,
                    "remote flush failed"
                );
                Err(e)
            }
        }
    }

    /// Manual publish: persist any pending local save, then claim the remote
    /// writer regardless of the idle timer or dirtiness.
    pub fn force_flush_at(&mut self, now: Instant) -> Result<FlushTicket, SyncError> {
        if self.activity.is_saving() {
            return Err(SyncError::FlushInProgress);
        }
        if self.local_timer.take_pending_at(now) {
            self.persist_local(now);
        }
        self.idle.cancel();
        self.begin_flush_at(now, FlushReason::Forced).ok_or(SyncError::FlushInProgress)
    }

    /// End the session: persist a pending local save and cancel both timers.
    /// Later changes are ignored.
    pub fn teardown_at(&mut self, now: Instant) -> SessionStats {
        if self.local_timer.take_pending_at(now) {
            self.persist_local(now);
        }
        self.local_timer.cancel();
        self.idle.cancel();
        self.torn_down = true;
        debug!(doc_id = %self.doc.id, "sync engine torn down");
        self.stats()
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn is_dirty(&self) -> bool {
        is_dirty(&self.doc, self.baseline.as_ref())
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn baseline(&self) -> Option<&Snapshot> {
        self.baseline.as_ref()
    }

    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    pub fn activity(&self) -> ActivityTracker {
        self.activity
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            local_saves: self.writer.saves(),
            remote_saves: self.remote_saves,
            failed_flushes: self.failed_flushes,
            merged_edits: self.idle.merged_edits(),
            dirty: self.is_dirty(),
        }
    }

    pub fn cache(&self) -> &C {
        self.writer.cache()
    }

    pub fn into_cache(self) -> C {
        self.writer.into_inner()
    }
}

// Session driver: runs one `SyncEngine` on a tokio task.
//
// The task owns the engine outright. Host calls arrive as commands; timers
// are a `sleep_until` on the engine's next deadline plus a fixed reconcile
// interval; at most one remote write future is polled at a time. Dropping
// the `SessionHandle` aborts the task, which cancels every timer with it.

use std::future::{self, Future};
use std::pin::Pin;
use std::sync::Arc;

use folio_common::Document;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::engine::{FlushTicket, SessionStats, SyncEngine, SyncStatus};
use crate::error::SyncError;
use crate::local::LocalCache;
use crate::remote::{RemoteError, RemoteStore};

type WriteFuture = Pin<Box<dyn Future<Output = Result<(), RemoteError>> + Send>>;
type Edit = Box<dyn FnOnce(&mut Document) + Send>;

enum Command {
    Replace(Document),
    Edit(Edit),
    ForceFlush(oneshot::Sender<Result<(), SyncError>>),
    Stats(oneshot::Sender<SessionStats>),
    Document(oneshot::Sender<Document>),
    Teardown(oneshot::Sender<SessionStats>),
}

/// A remote write being polled by the session loop.
struct PendingWrite {
    ticket: FlushTicket,
    write: WriteFuture,
    /// Set when the write was started by `force_flush`.
    responder: Option<oneshot::Sender<Result<(), SyncError>>>,
}

pub struct SyncSession;

impl SyncSession {
    /// Move `engine` onto a new task talking to `store`.
    pub fn spawn<C, S>(engine: SyncEngine<C>, store: S) -> SessionHandle
    where
        C: LocalCache,
        S: RemoteStore,
    {
        let doc_id = engine.document().id.clone();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(engine.status().clone());

        info!(doc_id = %doc_id, "sync session started");
        let task = tokio::spawn(run(engine, Arc::new(store), command_rx, status_tx));

        SessionHandle { doc_id, commands: command_tx, status: status_rx, task }
    }
}

/// Host-side handle to a running session.
pub struct SessionHandle {
    doc_id: String,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SyncStatus>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// Replace the live document with the editor's state and schedule a save.
    pub fn on_change(&self, doc: Document) -> Result<(), SyncError> {
        self.send(Command::Replace(doc))
    }

    /// Mutate the live document in place and schedule a save.
    pub fn edit(&self, edit: impl FnOnce(&mut Document) + Send + 'static) -> Result<(), SyncError> {
        self.send(Command::Edit(Box::new(edit)))
    }

    /// Observable save status.
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    pub fn current_status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Persist locally and write remotely now, bypassing the idle window.
    /// Fails with `FlushInProgress` if a write is already running.
    pub async fn force_flush(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::ForceFlush(tx))?;
        rx.await.map_err(|_| SyncError::SessionClosed)?
    }

    pub async fn stats(&self) -> Result<SessionStats, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stats(tx))?;
        rx.await.map_err(|_| SyncError::SessionClosed)
    }

    /// Current live document.
    pub async fn document(&self) -> Result<Document, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Document(tx))?;
        rx.await.map_err(|_| SyncError::SessionClosed)
    }

    /// Cancel timers, persist a pending local save, let an in-flight write
    /// settle, and stop the task.
    pub async fn teardown(self) -> Result<SessionStats, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Teardown(tx))?;
        rx.await.map_err(|_| SyncError::SessionClosed)
    }

    fn send(&self, command: Command) -> Result<(), SyncError> {
        self.commands.send(command).map_err(|_| SyncError::SessionClosed)
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ── Session loop ────────────────────────────────────────────────────

async fn run<C: LocalCache, S: RemoteStore>(
    mut engine: SyncEngine<C>,
    store: Arc<S>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    status_tx: watch::Sender<SyncStatus>,
) {
    let period = engine.config().reconcile_interval();
    let mut reconcile = time::interval_at(Instant::now() + period, period);
    reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending: Option<PendingWrite> = None;

    loop {
        let deadline = engine.next_deadline();
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    engine.teardown_at(Instant::now());
                    break;
                };
                match command {
                    Command::Replace(doc) => engine.apply_at(doc, Instant::now()),
                    Command::Edit(edit) => engine.edit_at(Instant::now(), edit),
                    Command::ForceFlush(reply) => match engine.force_flush_at(Instant::now()) {
                        Ok(ticket) => pending = Some(start_write(&store, ticket, Some(reply))),
                        Err(e) => {
                            publish(&status_tx, engine.status());
                            let _ = reply.send(Err(e));
                        }
                    },
                    Command::Stats(reply) => {
                        let _ = reply.send(engine.stats());
                    }
                    Command::Document(reply) => {
                        let _ = reply.send(engine.document().clone());
                    }
                    Command::Teardown(reply) => {
                        engine.teardown_at(Instant::now());
                        if let Some(mut write) = pending.take() {
                            debug!(doc_id = %engine.document().id, "teardown waiting for in-flight write");
                            let result = write.write.as_mut().await;
                            finish_write(&mut engine, &status_tx, write, result);
                        }
                        publish(&status_tx, engine.status());
                        let stats = engine.stats();
                        info!(
                            doc_id = %engine.document().id,
                            local_saves = stats.local_saves,
                            remote_saves = stats.remote_saves,
                            "sync session torn down"
                        );
                        let _ = reply.send(stats);
                        break;
                    }
                }
            }
            _ = sleep_until(deadline) => {
                if let Some(ticket) = engine.tick_at(Instant::now()) {
                    pending = Some(start_write(&store, ticket, None));
                }
            }
            _ = reconcile.tick() => {
                if let Some(ticket) = engine.reconcile_at(Instant::now()) {
                    pending = Some(start_write(&store, ticket, None));
                }
            }
            result = wait_write(&mut pending) => {
                if let Some(write) = pending.take() {
                    finish_write(&mut engine, &status_tx, write, result);
                }
            }
        }
        publish(&status_tx, engine.status());
    }
}

fn start_write<S: RemoteStore>(
    store: &Arc<S>,
    ticket: FlushTicket,
    responder: Option<oneshot::Sender<Result<(), SyncError>>>,
) -> PendingWrite {
    let store = Arc::clone(store);
    let id = ticket.doc_id().to_string();
    let patch = ticket.patch().clone();
    let write: WriteFuture = Box::pin(async move { store.update(&id, &patch).await });
    PendingWrite { ticket, write, responder }
}

/// Settle a finished write. The new status is published before a
/// `force_flush` caller is woken, so it never observes the pre-write status.
fn finish_write<C: LocalCache>(
    engine: &mut SyncEngine<C>,
    status_tx: &watch::Sender<SyncStatus>,
    write: PendingWrite,
    result: Result<(), RemoteError>,
) {
    let outcome = engine.complete_flush_at(write.ticket, result, Instant::now());
    publish(status_tx, engine.status());
    if let Some(reply) = write.responder {
        let _ = reply.send(outcome.map_err(SyncError::from));
    }
}

async fn wait_write(pending: &mut Option<PendingWrite>) -> Result<(), RemoteError> {
    match pending {
        Some(write) => write.write.as_mut().await,
        None => future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

fn publish(status_tx: &watch::Sender<SyncStatus>, status: &SyncStatus) {
    status_tx.send_if_modified(|current| {
        if current == status {
            return false;
        }
        *current = status.clone();
        true
    });
}

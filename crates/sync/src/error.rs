use thiserror::Error;

use crate::local::LocalCacheError;
use crate::remote::RemoteError;

/// Errors surfaced to the host editor.
///
/// Background saves never return these; they are converted into status and
/// flags. Only explicit calls (`force_flush`, `open_document`) propagate them.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("document `{id}` not found")]
    NotFound { id: String },
    #[error("a remote write for this document is already in flight")]
    FlushInProgress,
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Cache(#[from] LocalCacheError),
    #[error("sync session has shut down")]
    SessionClosed,
}

// Initial load for an editing session.
//
// Every named document is fetched, normalized and overlaid with any cached
// copy of the same id; the remote copy becomes the baseline. Drafts are
// written remotely under their `draft-` id too, so a draft found remotely is
// treated the same way. A draft the store has never seen (or cannot reach)
// opens from the cache or as a fresh placeholder. For persisted documents a
// remote "not found" deletes the cache entry so a removed document is never
// resurrected from local state.

use folio_common::types::is_draft_id;
use folio_common::{merge, normalize, Document, Snapshot};
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::local::{cache_key, read_cached, LocalCache};
use crate::remote::RemoteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    /// No cached copy; a fresh draft was created.
    NewDraft,
    /// Draft restored from the local cache.
    CachedDraft,
    /// Remote copy, no local draft.
    Remote,
    /// Remote copy overlaid with a cached local draft.
    Merged,
    /// Remote unreachable; the cached copy was used.
    CacheFallback,
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: Document,
    pub baseline: Snapshot,
    pub source: LoadSource,
}

impl LoadedDocument {
    pub fn is_dirty(&self) -> bool {
        !self.baseline.matches(&self.document)
    }

    /// Start an engine for this document.
    pub fn into_engine<C: LocalCache>(
        self,
        cache: C,
        config: EngineConfig,
        now: Instant,
    ) -> SyncEngine<C> {
        SyncEngine::new(self.document, Some(self.baseline), cache, config, now)
    }
}

/// Build the document an editing session starts from.
pub async fn open_document<S, C>(
    id: &str,
    store: &S,
    cache: &mut C,
) -> Result<LoadedDocument, SyncError>
where
    S: RemoteStore,
    C: LocalCache,
{
    let cached = match read_cached(cache, id) {
        Ok(cached) => cached,
        Err(e) => {
            warn!(doc_id = id, error = %e, "ignoring unreadable cache entry");
            None
        }
    };

    if id.is_empty() {
        return Ok(open_draft(id, cached));
    }

    let fetched = store.fetch(id).await;
    if is_draft_id(id) {
        return Ok(match fetched {
            Ok(Some(raw)) => overlay_remote(id, &raw, cached),
            Ok(None) => open_draft(id, cached),
            Err(e) => {
                warn!(doc_id = id, error = %e, "remote fetch failed; opening draft locally");
                open_draft(id, cached)
            }
        });
    }

    match fetched {
        Ok(Some(raw)) => Ok(overlay_remote(id, &raw, cached)),
        Ok(None) => {
            if let Err(e) = cache.remove(&cache_key(id)) {
                warn!(doc_id = id, error = %e, "failed to drop cache entry for deleted document");
            } else if cached.is_some() {
                info!(doc_id = id, "document deleted remotely; local copy discarded");
            }
            Err(SyncError::NotFound { id: id.to_string() })
        }
        Err(e) => match cached {
            Some(local) => {
                warn!(doc_id = id, error = %e, "remote fetch failed; opening cached copy");
                let baseline = Snapshot::of(&local);
                Ok(LoadedDocument { document: local, baseline, source: LoadSource::CacheFallback })
            }
            None => Err(SyncError::Remote(e)),
        },
    }
}

/// Remote copy as baseline, with the cached copy merged over it.
fn overlay_remote(id: &str, raw: &Value, cached: Option<Document>) -> LoadedDocument {
    let mut remote = normalize(raw);
    if remote.id.is_empty() {
        remote.id = id.to_string();
    }
    let baseline = Snapshot::of(&remote);
    let (document, source) = match cached {
        Some(local) => (merge(&remote, &local), LoadSource::Merged),
        None => (remote, LoadSource::Remote),
    };
    debug!(doc_id = id, source = ?source, "document loaded");
    LoadedDocument { document, baseline, source }
}

fn open_draft(id: &str, cached: Option<Document>) -> LoadedDocument {
    let fresh = if id.is_empty() { Document::new_draft() } else { Document::draft_with_id(id) };
    // The store has no copy: the placeholder is the baseline.
    let baseline = Snapshot::of(&fresh);
    match cached {
        Some(document) => LoadedDocument { document, baseline, source: LoadSource::CachedDraft },
        None => LoadedDocument { document: fresh, baseline, source: LoadSource::NewDraft },
    }
}

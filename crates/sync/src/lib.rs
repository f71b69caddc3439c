// folio-sync: dual-tier autosave engine for block documents.
//
// A `SyncEngine` owns one live document and decides when it is written to the
// local cache and when to the remote store. `SyncSession` drives an engine on
// a tokio task; `loader` builds the initial document for a session.

pub mod activity;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod local;
pub mod remote;
pub mod session;
pub mod timers;

pub use config::{EngineConfig, FolioConfig};
pub use engine::{SessionStats, SyncEngine, SyncStatus};
pub use error::SyncError;
pub use loader::{open_document, LoadSource, LoadedDocument};
pub use local::{cache_key, LocalCache, LocalCacheError, MemoryCache, SqliteCache};
pub use remote::{DocumentPatch, HttpRemoteStore, MemoryRemoteStore, RemoteError, RemoteStore};
pub use session::{SessionHandle, SyncSession};

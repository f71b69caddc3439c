// `folio push`: load a document the way the editor does (remote copy merged
// with the cached draft) and force-flush it to the remote store.

use anyhow::Context;
use clap::Args;
use folio_sync::{
    open_document, EngineConfig, HttpRemoteStore, LoadSource, LocalCache, RemoteStore,
    SyncSession,
};
use serde::Serialize;
use tokio::time::Instant;
use tracing::info;

use super::CacheArgs;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct PushArgs {
    /// Document id.
    pub id: String,

    #[command(flatten)]
    cache: CacheArgs,

    /// Base URL of the document API. Defaults to `remote.base_url` in config.
    #[arg(long)]
    remote: Option<String>,

    /// Bearer token. Defaults to `remote.token` in config.
    #[arg(long)]
    token: Option<String>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushReport {
    pub id: String,
    pub source: LoadSource,
    /// Whether the loaded document differed from the remote copy.
    pub had_changes: bool,
    pub status: &'static str,
    pub local_saves: u64,
    pub remote_saves: u64,
}

pub fn run(args: PushArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    match execute(&args) {
        Ok(report) => {
            if !report.had_changes {
                output::print_warning(
                    format,
                    "NO_LOCAL_CHANGES",
                    "no local changes; the remote copy was rewritten as-is",
                );
            }
            output::print_output(format, &report, format_human)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

fn execute(args: &PushArgs) -> anyhow::Result<PushReport> {
    let config = args.cache.load_config()?;
    let base_url = args
        .remote
        .clone()
        .or_else(|| config.remote.base_url.clone())
        .context("no remote: pass --remote or set remote.base_url in the config file")?;
    let token = args.token.clone().or_else(|| config.remote.token.clone());
    let store = HttpRemoteStore::new(&base_url, token)?;
    let (cache, _) = args.cache.open_cache(&config)?;

    super::runtime()?.block_on(push_document(&args.id, store, cache, config.engine))
}

/// Open `id`, write it remotely through a sync session, and tear the session
/// down.
pub async fn push_document<S, C>(
    id: &str,
    store: S,
    mut cache: C,
    config: EngineConfig,
) -> anyhow::Result<PushReport>
where
    S: RemoteStore,
    C: LocalCache,
{
    let loaded = open_document(id, &store, &mut cache)
        .await
        .with_context(|| format!("failed to open document `{id}`"))?;
    let source = loaded.source;
    let had_changes = loaded.is_dirty();

    let engine = loaded.into_engine(cache, config, Instant::now());
    let session = SyncSession::spawn(engine, store);
    let flushed = session.force_flush().await;
    let status = session.current_status().label();
    let stats = session.teardown().await?;
    flushed.with_context(|| format!("failed to push document `{id}`"))?;

    info!(doc_id = id, source = ?source, had_changes, "document pushed");
    Ok(PushReport {
        id: id.to_string(),
        source,
        had_changes,
        status,
        local_saves: stats.local_saves,
        remote_saves: stats.remote_saves,
    })
}

fn format_human(report: &PushReport) -> String {
    let origin = match report.source {
        LoadSource::Merged => "remote copy merged with cached draft",
        LoadSource::Remote => "remote copy",
        LoadSource::CachedDraft | LoadSource::NewDraft => "local draft",
        LoadSource::CacheFallback => "cached copy",
    };
    format!(
        "Pushed `{}` from {origin}: {} ({} remote write(s))",
        report.id, report.status, report.remote_saves
    )
}

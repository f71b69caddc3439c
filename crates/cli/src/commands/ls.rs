// `folio ls`: list documents held in the local cache.

use clap::Args;
use folio_sync::local::{read_cached, CACHE_KEY_PREFIX};
use folio_sync::SqliteCache;
use serde::Serialize;
use tracing::warn;

use super::CacheArgs;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct LsArgs {
    #[command(flatten)]
    cache: CacheArgs,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LsResult {
    pub documents: Vec<CachedEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CachedEntry {
    pub id: String,
    pub title: String,
    pub status: &'static str,
    pub draft: bool,
    pub blocks: usize,
}

pub fn run(args: LsArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = args
        .cache
        .load_config()
        .and_then(|config| args.cache.open_cache(&config))
        .and_then(|(cache, _)| list_cached(&cache));

    match result {
        Ok(result) => {
            output::print_output(format, &result, format_human)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

pub fn list_cached(cache: &SqliteCache) -> anyhow::Result<LsResult> {
    let mut documents = Vec::new();
    for key in cache.keys()? {
        let Some(id) = key.strip_prefix(CACHE_KEY_PREFIX) else {
            continue;
        };
        match read_cached(cache, id) {
            Ok(Some(doc)) => documents.push(CachedEntry {
                id: id.to_string(),
                draft: doc.is_draft(),
                status: doc.status.as_str(),
                blocks: doc.blocks().len(),
                title: doc.title,
            }),
            Ok(None) => {}
            Err(e) => warn!(doc_id = id, error = %e, "skipping unreadable cache entry"),
        }
    }
    Ok(LsResult { documents })
}

fn format_human(result: &LsResult) -> String {
    if result.documents.is_empty() {
        return "No cached documents.".into();
    }

    let mut lines = Vec::new();
    lines.push(format!("{} cached document(s)", result.documents.len()));
    for d in &result.documents {
        let title = if d.title.is_empty() { "(untitled)" } else { &d.title };
        let draft = if d.draft { ", draft" } else { "" };
        lines.push(format!("  {}  {} ({}, {} blocks{draft})", d.id, title, d.status, d.blocks));
    }
    lines.join("\n")
}

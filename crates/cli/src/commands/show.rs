// `folio show`: print the cached copy of a document.

use clap::Args;
use folio_common::{Block, BlockKind, Document};
use folio_sync::local::read_cached;
use folio_sync::{LocalCache, SyncError};

use super::CacheArgs;
use crate::output::{self, OutputFormat};

const PREVIEW_CHARS: usize = 60;

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// Document id (`draft-…` for unsaved drafts).
    pub id: String,

    #[command(flatten)]
    cache: CacheArgs,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

pub fn run(args: ShowArgs) -> anyhow::Result<()> {
    let format = OutputFormat::detect(args.json);
    let result = args
        .cache
        .load_config()
        .and_then(|config| args.cache.open_cache(&config))
        .and_then(|(cache, path)| {
            show_cached(&cache, &args.id)
                .map_err(|e| e.context(format!("cache {}", path.display())))
        });

    match result {
        Ok(doc) => {
            output::print_output(format, &doc, format_human)?;
            Ok(())
        }
        Err(e) => {
            output::print_anyhow_error(format, &e);
            Err(e)
        }
    }
}

pub fn show_cached<C: LocalCache>(cache: &C, id: &str) -> anyhow::Result<Document> {
    read_cached(cache, id)?.ok_or_else(|| SyncError::NotFound { id: id.to_string() }.into())
}

fn format_human(doc: &Document) -> String {
    let mut lines = Vec::new();
    let title = if doc.title.is_empty() { "(untitled)" } else { &doc.title };
    lines.push(format!("# {title}"));
    lines.push(format!(
        "id: {}  status: {}  visibility: {}",
        doc.id,
        doc.status.as_str(),
        doc.visibility.as_str()
    ));
    if !doc.tags.is_empty() {
        lines.push(format!("tags: {}", doc.tags.join(", ")));
    }
    if !doc.cover_image.is_empty() {
        lines.push(format!("cover: {}", doc.cover_image));
    }
    if let Some(updated_at) = doc.updated_at {
        lines.push(format!("updated: {}", updated_at.to_rfc3339()));
    }
    lines.push(String::new());
    lines.extend(doc.blocks().iter().map(block_line));
    lines.join("\n")
}

fn block_line(block: &Block) -> String {
    let label = match block.heading_level() {
        Some(level) => format!("h{level}"),
        None => block.kind.as_str().to_string(),
    };
    let body = match block.kind {
        BlockKind::Image => block.image_url().unwrap_or_default().to_string(),
        _ => preview(&block.content),
    };
    format!("  [{label}] {body}")
}

fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() > PREVIEW_CHARS {
        let cut: String = first_line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    } else {
        first_line.to_string()
    }
}
